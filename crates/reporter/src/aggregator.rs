//! Event aggregation
//!
//! Rebuilds tests and their step trees from the flat stream of events a
//! browser test process emits. Arrival order is not trusted: events are
//! stable-sorted by timestamp and walked once. During the walk the aggregator
//! keeps the steps that are still open and, per test, the most recently
//! opened command group and the set of skipped step and group ids. All of
//! that state lives and dies inside a single [`aggregate`] call.

use std::collections::{HashMap, HashSet};
use steptrace_common::{
    sanitize_arguments, CommandInfo, Error, EventKind, HookKind, RawEvent, Result, Step,
    StepPayload, Test, Timestamp,
};
use tracing::{debug, trace};

/// Reconstruct tests from raw events.
///
/// Tests come back in the order their `test:start` events occur after
/// sorting. An empty input yields an empty result. A step that ends without
/// having started, and that was not skipped, fails the whole call.
pub fn aggregate(mut events: Vec<RawEvent>) -> Result<Vec<Test>> {
    // sort_by is stable: equal timestamps keep arrival order
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let Some(first) = events.first().map(|event| event.timestamp) else {
        return Ok(Vec::new());
    };

    let mut aggregation = Aggregation::seed(&events, first);
    for event in &events {
        aggregation.apply(event)?;
    }

    Ok(aggregation.finish())
}

/// A step that has started and not yet ended
struct OpenStep {
    test: usize,
    step: usize,
}

/// Most recently opened command group of a test
struct Group {
    group_id: String,
    parent_id: String,
}

/// Outcome of matching a `step:end` to a known step
enum StepLookup {
    Found(usize),
    KnownSkipped,
    Unexpected,
}

struct Aggregation {
    first: Timestamp,
    tests: Vec<Test>,
    /// Absolute start of each test, parallel to `tests`
    starts: Vec<Timestamp>,
    by_path: HashMap<Vec<String>, usize>,
    open: Vec<OpenStep>,
    /// Keyed by test index; tests never share groups or skips
    groups: HashMap<usize, Group>,
    skipped: HashMap<usize, HashSet<String>>,
    current: Option<usize>,
}

impl Aggregation {
    fn seed(events: &[RawEvent], first: Timestamp) -> Self {
        let mut tests = Vec::new();
        let mut starts = Vec::new();
        let mut by_path = HashMap::new();

        for event in events {
            if event.kind != EventKind::TestStart {
                continue;
            }
            if by_path.contains_key(&event.test_path) {
                debug!(test = %event.test_path.join(" > "), "Ignoring repeated test:start");
                continue;
            }

            by_path.insert(event.test_path.clone(), tests.len());
            tests.push(Test::new(
                event.test_path.clone(),
                event.timestamp.millis_since(first),
            ));
            starts.push(event.timestamp);
        }

        debug!(tests = tests.len(), events = events.len(), "Seeded tests");

        Self {
            first,
            tests,
            starts,
            by_path,
            open: Vec::new(),
            groups: HashMap::new(),
            skipped: HashMap::new(),
            current: None,
        }
    }

    fn apply(&mut self, event: &RawEvent) -> Result<()> {
        let test = self.resolve_test(&event.test_path)?;

        match &event.kind {
            EventKind::TestStart => {}
            EventKind::TestEnd => self.end_test(test, event.timestamp),
            EventKind::StepEnqueue(payload) => self.enqueue_step(test, payload),
            EventKind::StepStart(payload) => self.start_step(test, event.timestamp, payload),
            EventKind::StepEnd(payload) => self.end_step(test, event.timestamp, payload)?,
        }

        Ok(())
    }

    /// Index of the test owning `path`, re-resolved only when the path changes
    fn resolve_test(&mut self, path: &[String]) -> Result<usize> {
        if let Some(current) = self.current {
            if self.tests[current].path == path {
                return Ok(current);
            }
        }

        let index = *self
            .by_path
            .get(path)
            .ok_or_else(|| Error::UnknownTest {
                path: path.join(" > "),
            })?;
        self.current = Some(index);
        Ok(index)
    }

    fn end_test(&mut self, test: usize, at: Timestamp) {
        let end = at.millis_since(self.first);
        let entry = &mut self.tests[test];
        entry.duration = (end - entry.relative_start_time).max(0.0);
    }

    fn enqueue_step(&mut self, test: usize, payload: &StepPayload) {
        let command = &payload.command;
        if command.suppresses_logging() {
            trace!(step = %command.id, "Enqueued step will not be logged");
            self.skip(test, &command.id);
        }
    }

    fn skip(&mut self, test: usize, id: &str) {
        self.skipped.entry(test).or_default().insert(id.to_string());
    }

    fn is_skipped(&self, test: usize, command: &CommandInfo) -> bool {
        let Some(skipped) = self.skipped.get(&test) else {
            return false;
        };
        skipped.contains(&command.id)
            || command
                .group_id
                .as_ref()
                .map_or(false, |group_id| skipped.contains(group_id))
    }

    fn start_step(&mut self, test: usize, at: Timestamp, payload: &StepPayload) {
        let command = &payload.command;
        let opens_group = command.group_id.as_deref().map_or(false, |group_id| {
            self.groups
                .get(&test)
                .map_or(true, |active| active.group_id != group_id)
        });

        if self.is_skipped(test, command) || command.suppresses_logging() {
            debug!(
                step = %command.id,
                test = %self.tests[test].display_path(),
                "Skipping step"
            );
            self.skip(test, &command.id);
            if let (true, Some(group_id)) = (opens_group, &command.group_id) {
                self.skip(test, group_id);
            }
            return;
        }

        if let Some(position) = self.tests[test].position(&command.id) {
            trace!(step = %command.id, "Reopening step");
            self.open.push(OpenStep {
                test,
                step: position,
            });
            return;
        }

        // A group head is top-level; later members hang under it
        let parent_id = match &command.group_id {
            Some(group_id) if opens_group => {
                self.groups.insert(
                    test,
                    Group {
                        group_id: group_id.clone(),
                        parent_id: command.id.clone(),
                    },
                );
                None
            }
            Some(_) => self.groups.get(&test).map(|active| active.parent_id.clone()),
            None => None,
        };

        let step = Step {
            id: command.id.clone(),
            parent_id,
            name: command.name.clone(),
            arguments: sanitize_arguments(&command.args),
            category: payload.category,
            hook_kind: payload.hook_kind,
            relative_start_time: at.millis_since(self.starts[test]).max(0.0),
            duration: 0.0,
            error: payload.error.clone(),
            assert_ids: Vec::new(),
        };

        let entry = &mut self.tests[test];
        let position = entry.push_step(step);
        self.open.push(OpenStep {
            test,
            step: position,
        });

        if let Some(target) = &command.command_id {
            match entry.step_mut(target) {
                Some(target_step) => target_step.add_assert(&command.id),
                None => debug!(
                    assertion = %command.id,
                    target = %target,
                    "Assertion target not found; recording assertion without link"
                ),
            }
        }
    }

    fn end_step(&mut self, test: usize, at: Timestamp, payload: &StepPayload) -> Result<()> {
        let command = &payload.command;

        // afterEach step ends are never finalized; their durations stay at zero
        if payload.hook_kind == Some(HookKind::AfterEach) {
            let known = self.tests[test].position(&command.id).is_some()
                || self.is_skipped(test, command);
            if !known {
                trace!(
                    step = %command.id,
                    test = %self.tests[test].display_path(),
                    "afterEach step end has no matching start"
                );
            }
            debug!(step = %command.id, "Ignoring afterEach step end");
            return Ok(());
        }

        match self.lookup(test, command) {
            StepLookup::Found(position) => {
                let end = at.millis_since(self.starts[test]);
                let step = &mut self.tests[test].steps[position];
                step.duration = (end - step.relative_start_time).max(0.0);
                step.error = payload.error.clone();
                Ok(())
            }
            StepLookup::KnownSkipped => {
                trace!(step = %command.id, "Dropping end of skipped step");
                Ok(())
            }
            StepLookup::Unexpected => Err(Error::MismatchedStep {
                step_id: command.id.clone(),
                test: self.tests[test].display_path(),
            }),
        }
    }

    fn lookup(&mut self, test: usize, command: &CommandInfo) -> StepLookup {
        let tests = &self.tests;
        let slot = self.open.iter().rposition(|open| {
            open.test == test && tests[test].steps[open.step].id == command.id
        });
        if let Some(slot) = slot {
            let open = self.open.remove(slot);
            return StepLookup::Found(open.step);
        }

        // Already closed: a retried step ending again
        if let Some(position) = self.tests[test].position(&command.id) {
            return StepLookup::Found(position);
        }

        if self.is_skipped(test, command) {
            StepLookup::KnownSkipped
        } else {
            StepLookup::Unexpected
        }
    }

    fn finish(self) -> Vec<Test> {
        if !self.open.is_empty() {
            debug!(open = self.open.len(), "Steps left without an end event");
        }
        self.tests
    }
}
