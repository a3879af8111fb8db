//! Reconstructed test and step types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Replacement for nested object arguments in step output
pub const OBJECT_MARKER: &str = "[object]";

/// Error details attached to a step or a test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{} ({}:{})", self.message, line, column),
            (Some(line), None) => write!(f, "{} (line {})", self.message, line),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Step category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCategory {
    Assertion,
    Command,
    Other,
}

impl Default for StepCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for StepCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepCategory::Assertion => write!(f, "assertion"),
            StepCategory::Command => write!(f, "command"),
            StepCategory::Other => write!(f, "other"),
        }
    }
}

/// Hook a step ran in; absent for steps in the test body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookKind {
    BeforeEach,
    AfterEach,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::BeforeEach => write!(f, "beforeEach"),
            HookKind::AfterEach => write!(f, "afterEach"),
        }
    }
}

/// Outcome of a test as decided by the host runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Passed,
    Failed,
    Skipped,
    Unknown,
}

impl Default for TestResult {
    fn default() -> Self {
        Self::Passed
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestResult::Passed => write!(f, "passed"),
            TestResult::Failed => write!(f, "failed"),
            TestResult::Skipped => write!(f, "skipped"),
            TestResult::Unknown => write!(f, "unknown"),
        }
    }
}

/// One reconstructed unit of test activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    /// `None` means top-level within its hook bucket
    pub parent_id: Option<String>,
    pub name: String,
    pub arguments: Vec<Value>,
    pub category: StepCategory,
    #[serde(default)]
    pub hook_kind: Option<HookKind>,
    /// Milliseconds since the owning test started
    pub relative_start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    /// Assertions that target this step
    #[serde(default)]
    pub assert_ids: Vec<String>,
}

impl Step {
    /// Record an assertion against this step; duplicates are ignored
    pub fn add_assert(&mut self, assert_id: &str) {
        if !self.assert_ids.iter().any(|id| id == assert_id) {
            self.assert_ids.push(assert_id.to_string());
        }
    }

    pub fn is_assertion(&self) -> bool {
        self.category == StepCategory::Assertion
    }
}

/// One reconstructed test case
///
/// Steps are stored flat; the tree is encoded through `Step::parent_id` and an
/// id index gives constant-time lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub title: String,
    pub path: Vec<String>,
    /// Milliseconds since the first event of the run
    pub relative_start_time: f64,
    pub duration: f64,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub result: TestResult,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for Test {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.path == other.path
            && self.relative_start_time == other.relative_start_time
            && self.duration == other.duration
            && self.steps == other.steps
            && self.result == other.result
            && self.error == other.error
    }
}

impl Test {
    pub fn new(path: Vec<String>, relative_start_time: f64) -> Self {
        Self {
            title: path.last().cloned().unwrap_or_default(),
            path,
            relative_start_time,
            duration: 0.0,
            steps: Vec::new(),
            result: TestResult::default(),
            error: None,
            index: HashMap::new(),
        }
    }

    /// Suite and test titles joined for display
    pub fn display_path(&self) -> String {
        self.path.join(" > ")
    }

    /// Append a step, returning its position
    pub fn push_step(&mut self, step: Step) -> usize {
        let position = self.steps.len();
        self.index.insert(step.id.clone(), position);
        self.steps.push(step);
        position
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        match self.index.get(id) {
            Some(&position) => Some(position),
            // Deserialized tests carry no index
            None if self.index.len() != self.steps.len() => {
                self.steps.iter().position(|step| step.id == id)
            }
            None => None,
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.position(id).and_then(|position| self.steps.get(position))
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        let position = self.position(id)?;
        self.steps.get_mut(position)
    }

    pub fn root_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|step| step.parent_id.is_none())
    }

    pub fn children<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps
            .iter()
            .filter(move |step| step.parent_id.as_deref() == Some(parent_id))
    }
}

/// Replace nested object arguments with an opaque marker
pub fn sanitize_arguments(args: &[Value]) -> Vec<Value> {
    args.iter().map(sanitize_value).collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::String(OBJECT_MARKER.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, parent: Option<&str>) -> Step {
        Step {
            id: id.to_string(),
            parent_id: parent.map(String::from),
            name: "get".to_string(),
            arguments: vec![],
            category: StepCategory::Command,
            hook_kind: None,
            relative_start_time: 0.0,
            duration: 0.0,
            error: None,
            assert_ids: vec![],
        }
    }

    #[test]
    fn test_sanitize_arguments() {
        let args = vec![
            json!("#submit"),
            json!(3),
            json!({"timeout": 100}),
            json!([1, {"deep": true}]),
            json!(null),
        ];
        let sanitized = sanitize_arguments(&args);
        assert_eq!(
            sanitized,
            vec![
                json!("#submit"),
                json!(3),
                json!(OBJECT_MARKER),
                json!([1, OBJECT_MARKER]),
                json!(null),
            ]
        );
    }

    #[test]
    fn test_tree_queries() {
        let mut test = Test::new(vec!["suite".into(), "case".into()], 0.0);
        test.push_step(step("a", None));
        test.push_step(step("b", Some("a")));
        test.push_step(step("c", Some("a")));
        test.push_step(step("d", None));

        assert_eq!(test.title, "case");
        assert_eq!(test.display_path(), "suite > case");
        assert_eq!(test.root_steps().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["a", "d"]);
        assert_eq!(test.children("a").count(), 2);
        assert_eq!(test.step("c").map(|s| s.parent_id.as_deref()), Some(Some("a")));
        assert!(test.step("zzz").is_none());
    }

    #[test]
    fn test_lookup_after_deserialize() {
        let mut test = Test::new(vec!["case".into()], 1.0);
        test.push_step(step("a", None));
        test.push_step(step("b", Some("a")));

        let json = serde_json::to_string(&test).unwrap();
        assert!(json.contains("relativeStartTime"));
        let back: Test = serde_json::from_str(&json).unwrap();
        assert_eq!(back, test);
        assert_eq!(back.step("b").map(|s| s.id.as_str()), Some("b"));
    }

    #[test]
    fn test_add_assert_is_a_set() {
        let mut target = step("a", None);
        target.add_assert("x");
        target.add_assert("y");
        target.add_assert("x");
        assert_eq!(target.assert_ids, vec!["x", "y"]);
    }

    #[test]
    fn test_error_info_display() {
        assert_eq!(ErrorInfo::new("boom").to_string(), "boom");
        assert_eq!(ErrorInfo::new("boom").at(3, 9).to_string(), "boom (3:9)");
        assert_eq!(TestResult::default(), TestResult::Passed);
        assert_eq!(HookKind::AfterEach.to_string(), "afterEach");
    }
}
