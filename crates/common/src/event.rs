//! Raw instrumentation events emitted by a live browser test process

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::{ErrorInfo, HookKind, StepCategory};

/// Event time in milliseconds.
///
/// Accepts a number, a numeric string or an RFC 3339 date-time on input and
/// always serializes as a number. Ordering is total so events can be sorted
/// even when the upstream clock produced odd values.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub fn from_millis(millis: f64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> f64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`; negative under clock skew
    pub fn millis_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Timestamp {
    fn from(millis: f64) -> Self {
        Self(millis)
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis as f64)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis as f64)
    }
}

impl From<i32> for Timestamp {
    fn from(millis: i32) -> Self {
        Self(f64::from(millis))
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(millis) = trimmed.parse::<f64>() {
            if millis.is_finite() {
                return Ok(Self(millis));
            }
            return Err(Error::InvalidTimestamp(s.to_string()));
        }

        chrono::DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self(dt.timestamp_millis() as f64))
            .map_err(|e| Error::InvalidTimestamp(format!("{}: {}", s, e)))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(millis) => Ok(Self(millis)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Descriptor of the browser command a step event refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInfo {
    pub id: String,

    /// Chainer id shared by sibling commands
    #[serde(default)]
    pub group_id: Option<String>,

    /// Set on assertions: the command being asserted on
    #[serde(default)]
    pub command_id: Option<String>,

    pub name: String,

    #[serde(default)]
    pub args: Vec<Value>,
}

impl CommandInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group_id: None,
            command_id: None,
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn asserting(mut self, command_id: impl Into<String>) -> Self {
        self.command_id = Some(command_id.into());
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// True when the last positional argument is an options object with `log: false`
    pub fn suppresses_logging(&self) -> bool {
        match self.args.last() {
            Some(Value::Object(options)) => options.get("log") == Some(&Value::Bool(false)),
            _ => false,
        }
    }
}

/// Payload carried by every step-scoped event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPayload {
    pub command: CommandInfo,

    #[serde(default)]
    pub category: StepCategory,

    #[serde(default)]
    pub hook_kind: Option<HookKind>,

    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl StepPayload {
    pub fn new(command: CommandInfo) -> Self {
        Self {
            command,
            category: StepCategory::default(),
            hook_kind: None,
            error: None,
        }
    }

    pub fn category(mut self, category: StepCategory) -> Self {
        self.category = category;
        self
    }

    pub fn hook(mut self, hook_kind: HookKind) -> Self {
        self.hook_kind = Some(hook_kind);
        self
    }

    pub fn error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

/// What happened, tagged by the `kind` field on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    #[serde(rename = "test:start")]
    TestStart,

    #[serde(rename = "test:end")]
    TestEnd,

    #[serde(rename = "step:enqueue")]
    StepEnqueue(StepPayload),

    #[serde(rename = "step:start")]
    StepStart(StepPayload),

    #[serde(rename = "step:end")]
    StepEnd(StepPayload),
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TestStart => "test:start",
            EventKind::TestEnd => "test:end",
            EventKind::StepEnqueue(_) => "step:enqueue",
            EventKind::StepStart(_) => "step:start",
            EventKind::StepEnd(_) => "step:end",
        }
    }
}

/// A single timestamped instrumentation notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub timestamp: Timestamp,

    /// Suite titles followed by the test title
    pub test_path: Vec<String>,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(timestamp: impl Into<Timestamp>, test_path: &[&str], kind: EventKind) -> Self {
        Self {
            timestamp: timestamp.into(),
            test_path: test_path.iter().map(|s| s.to_string()).collect(),
            kind,
        }
    }

    pub fn test_start(timestamp: impl Into<Timestamp>, test_path: &[&str]) -> Self {
        Self::new(timestamp, test_path, EventKind::TestStart)
    }

    pub fn test_end(timestamp: impl Into<Timestamp>, test_path: &[&str]) -> Self {
        Self::new(timestamp, test_path, EventKind::TestEnd)
    }

    pub fn step_enqueue(
        timestamp: impl Into<Timestamp>,
        test_path: &[&str],
        payload: StepPayload,
    ) -> Self {
        Self::new(timestamp, test_path, EventKind::StepEnqueue(payload))
    }

    pub fn step_start(
        timestamp: impl Into<Timestamp>,
        test_path: &[&str],
        payload: StepPayload,
    ) -> Self {
        Self::new(timestamp, test_path, EventKind::StepStart(payload))
    }

    pub fn step_end(
        timestamp: impl Into<Timestamp>,
        test_path: &[&str],
        payload: StepPayload,
    ) -> Self {
        Self::new(timestamp, test_path, EventKind::StepEnd(payload))
    }

    /// Parse one event per non-empty line
    pub fn parse_jsonl(input: &str) -> crate::Result<Vec<Self>> {
        input
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_parse_step_event() {
        let line = r##"{"kind":"step:start","timestamp":5,"testPath":["login","shows form"],
            "command":{"id":"c1","groupId":"g1","name":"get","args":["#form"]},
            "category":"command"}"##;
        let event: RawEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.timestamp, Timestamp::from_millis(5.0));
        assert_eq!(event.test_path, vec!["login", "shows form"]);
        match event.kind {
            EventKind::StepStart(payload) => {
                assert_eq!(payload.command.id, "c1");
                assert_eq!(payload.command.group_id.as_deref(), Some("g1"));
                assert_eq!(payload.category, StepCategory::Command);
                assert!(payload.hook_kind.is_none());
            }
            other => panic!("unexpected kind {}", other.as_str()),
        }
    }

    #[test]
    fn test_parse_test_event_and_hook() {
        let input = r#"
{"kind":"test:start","timestamp":"0","testPath":["a"]}
{"kind":"step:end","timestamp":3,"testPath":["a"],"command":{"id":"x","name":"visit"},"hookKind":"afterEach","error":{"message":"boom","line":4}}
"#;
        let events = RawEvent::parse_jsonl(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::TestStart);
        match &events[1].kind {
            EventKind::StepEnd(payload) => {
                assert_eq!(payload.hook_kind, Some(HookKind::AfterEach));
                let error = payload.error.as_ref().unwrap();
                assert_eq!(error.message, "boom");
                assert_eq!(error.line, Some(4));
                assert_eq!(error.column, None);
            }
            other => panic!("unexpected kind {}", other.as_str()),
        }
    }

    #[test]
    fn test_event_roundtrips_through_json() {
        let event = RawEvent::step_start(
            7u64,
            &["suite", "test"],
            StepPayload::new(CommandInfo::new("a", "click").asserting("b"))
                .category(StepCategory::Assertion),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"step:start""#));
        let back: RawEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test_case("42", 42.0; "integer string")]
    #[test_case(" 12.5 ", 12.5; "padded fraction")]
    #[test_case("1970-01-01T00:00:01Z", 1000.0; "rfc3339")]
    #[test_case("1970-01-01T00:00:00.250+00:00", 250.0; "rfc3339 with millis")]
    fn test_timestamp_from_str(input: &str, expected: f64) {
        let ts: Timestamp = input.parse().unwrap();
        assert_eq!(ts.as_millis(), expected);
    }

    #[test_case("yesterday"; "words")]
    #[test_case("NaN"; "not a number")]
    #[test_case(""; "empty")]
    fn test_timestamp_rejects(input: &str) {
        assert!(matches!(
            input.parse::<Timestamp>(),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_timestamp_ordering_is_total() {
        let mut stamps = vec![
            Timestamp::from_millis(3.0),
            Timestamp::from_millis(-1.0),
            Timestamp::from_millis(2.5),
        ];
        stamps.sort();
        assert_eq!(stamps[0].as_millis(), -1.0);
        assert_eq!(stamps[2].as_millis(), 3.0);
        assert_eq!(
            Timestamp::from_millis(10.0).millis_since(Timestamp::from_millis(4.0)),
            6.0
        );
    }

    #[test]
    fn test_suppresses_logging_marker() {
        let hidden = CommandInfo::new("a", "get").with_args(vec![json!("#x"), json!({"log": false})]);
        let shown = CommandInfo::new("b", "get").with_args(vec![json!("#x"), json!({"log": true})]);
        let leading = CommandInfo::new("c", "get").with_args(vec![json!({"log": false}), json!("#x")]);

        assert!(hidden.suppresses_logging());
        assert!(!shown.suppresses_logging());
        assert!(!leading.suppresses_logging());
        assert!(!CommandInfo::new("d", "reload").suppresses_logging());
    }
}
