//! Core types for uireplay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a recorded or replayed user-interaction step.
///
/// Serialized lowercase so step JSON produced by the in-page recorder
/// replays without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Click,
    Input,
    Keydown,
    Scroll,
    Touchstart,
    Touchend,
    Change,
    Submit,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::Click => "click",
            StepKind::Input => "input",
            StepKind::Keydown => "keydown",
            StepKind::Scroll => "scroll",
            StepKind::Touchstart => "touchstart",
            StepKind::Touchend => "touchend",
            StepKind::Change => "change",
            StepKind::Submit => "submit",
        };
        write!(f, "{}", s)
    }
}

/// One recorded/replayable user-interaction step.
///
/// Ordering within a sequence is significant; steps are immutable once
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub coordinates: Map<String, Value>,
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Capture time in epoch milliseconds, as reported by the page.
    #[serde(default)]
    pub timestamp: i64,
}

impl Step {
    /// Shorthand for a selector-only step, used widely in tests.
    pub fn new(kind: StepKind, selector: impl Into<String>) -> Self {
        Self {
            kind,
            selector: selector.into(),
            value: String::new(),
            coordinates: Map::new(),
            options: Map::new(),
            timestamp: 0,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Read a numeric coordinate (e.g. `scrollY`) if present.
    pub fn coordinate(&self, key: &str) -> Option<f64> {
        self.coordinates.get(key).and_then(Value::as_f64)
    }
}

/// Viewport + user-agent emulation target. Supplied externally, read-only
/// to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub user_agent: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            name: "Desktop 1280x800".to_string(),
            width: 1280,
            height: 800,
            user_agent: String::new(),
        }
    }
}

/// One request to replay a stored step sequence and produce a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    pub execution_id: u64,
    pub steps: Vec<Step>,
    pub device: DeviceProfile,
    pub target_url: String,
    /// Run with a visible browser window instead of headless.
    #[serde(default)]
    pub visual: bool,
}

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Step index marker for log entries not scoped to a step.
pub const LOG_NO_STEP: i32 = -1;

/// One log line accumulated during a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Index of the step this entry refers to, or [`LOG_NO_STEP`].
    pub step_index: i32,
}

/// Best-effort page performance sample. Absent fields stay zero and never
/// fail the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub dom_content_loaded_ms: u64,
    pub memory_usage_mb: f64,
    pub network_request_count: u64,
    pub page_load_time_ms: u64,
}

/// Outcome of one execution job. Produced exactly once per job, immutable
/// thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    /// Evidence filenames in capture order.
    #[serde(default)]
    pub screenshots: Vec<String>,
    #[serde(default)]
    pub logs: Vec<ExecutionLog>,
    pub metrics: Option<PerformanceMetric>,
}

impl ExecutionResult {
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>, step_index: i32) {
        self.logs.push(ExecutionLog {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_index,
        });
    }
}

/// Snapshot of a recording session's state, safe to hand to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub session_id: String,
    pub is_recording: bool,
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&StepKind::Touchstart).unwrap(), "\"touchstart\"");
        let kind: StepKind = serde_json::from_str("\"keydown\"").unwrap();
        assert_eq!(kind, StepKind::Keydown);
    }

    #[test]
    fn test_step_parses_recorder_payload() {
        // Shape emitted by the injected capture script.
        let json = r##"{
            "type": "click",
            "selector": "#login",
            "coordinates": {"x": 10.0, "y": 22.5, "pageX": 10.0, "pageY": 122.5},
            "timestamp": 1700000000000,
            "options": {"button": 0}
        }"##;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.kind, StepKind::Click);
        assert_eq!(step.selector, "#login");
        assert_eq!(step.value, "");
        assert_eq!(step.coordinate("y"), Some(22.5));
        assert_eq!(step.coordinate("missing"), None);
    }

    #[test]
    fn test_result_log_accumulation() {
        let mut result = ExecutionResult::default();
        result.push_log(LogLevel::Info, "navigating", LOG_NO_STEP);
        result.push_log(LogLevel::Error, "step blew up", 3);
        assert_eq!(result.logs.len(), 2);
        assert_eq!(result.logs[0].step_index, LOG_NO_STEP);
        assert_eq!(result.logs[1].step_index, 3);
        assert_eq!(result.logs[1].level, LogLevel::Error);
    }

    #[test]
    fn test_metric_defaults_to_zero() {
        let metric = PerformanceMetric::default();
        assert_eq!(metric.dom_content_loaded_ms, 0);
        assert_eq!(metric.memory_usage_mb, 0.0);
        assert_eq!(metric.network_request_count, 0);
    }
}
