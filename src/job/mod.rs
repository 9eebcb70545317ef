//! Remote jobs: identity, poll snapshots and summaries.

mod classifier;
mod poller;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub use classifier::{MAX_REPORTED_PROBLEMS, classify, failure_details};
pub use poller::JobPoller;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Export,
    Import,
    Inspect,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Export => write!(f, "export"),
            JobKind::Import => write!(f, "import"),
            JobKind::Inspect => write!(f, "inspect"),
        }
    }
}

/// One submitted remote job, mutated only by [`JobPoller`].
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Absolute status URL, either returned by the service or derived from the id.
    pub status_endpoint: String,
    pub elapsed_wait: Duration,
    pub consecutive_transient_errors: u32,
    /// Status requests issued so far, failed ones included.
    pub polls: u32,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, status_endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            status_endpoint: status_endpoint.into(),
            elapsed_wait: Duration::ZERO,
            consecutive_transient_errors: 0,
            polls: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedStatus {
    Pending,
    Completed,
    CompletedWithWarnings,
    Failed,
}

impl NormalizedStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NormalizedStatus::Pending)
    }
}

/// Immutable snapshot of one status response.
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Service-reported status, upper-cased.
    pub raw_status: String,
    pub status: NormalizedStatus,
    pub summary: JobSummary,
    /// The full status document, kept for artifact pointers.
    pub payload: Value,
}

impl PollResult {
    pub fn from_payload(kind: JobKind, payload: Value) -> Self {
        let raw_status = payload
            .get("status")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
            .to_uppercase();
        let summary = JobSummary::from_payload(&payload);
        let status = classify(kind, &raw_status, &summary);
        Self {
            raw_status,
            status,
            summary,
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub object_name: Option<String>,
    pub object_uuid: Option<String>,
    pub message: Option<String>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.object_name.as_deref().unwrap_or("?"),
            self.object_uuid.as_deref().unwrap_or("?"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectCounts {
    pub imported: Option<u64>,
    pub failed: Option<u64>,
    pub skipped: Option<u64>,
}

/// The parts of a status document's `summary` this crate acts on.
///
/// Parsing is lenient: the service omits or nulls sections freely, and
/// counts sometimes arrive as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub total_errors: u64,
    pub total_warnings: u64,
    pub errors: Vec<Problem>,
    pub objects: ObjectCounts,
    pub deployment_log_url: Option<String>,
}

impl JobSummary {
    pub fn from_payload(payload: &Value) -> Self {
        let summary = payload.get("summary").filter(|v| v.is_object());
        let problems = summary
            .and_then(|s| s.get("problems"))
            .filter(|v| v.is_object());
        let objects = summary
            .and_then(|s| s.get("objects"))
            .filter(|v| v.is_object());

        let errors = problems
            .and_then(|p| p.get("errors"))
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(parse_problem).collect())
            .unwrap_or_default();

        let deployment_log_url = summary
            .and_then(|s| s.get("deploymentLogUrl"))
            .or_else(|| payload.get("deploymentLogUrl"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            total_errors: problems
                .and_then(|p| count(p.get("totalErrors")))
                .unwrap_or(0),
            total_warnings: problems
                .and_then(|p| count(p.get("totalWarnings")))
                .unwrap_or(0),
            errors,
            objects: ObjectCounts {
                imported: objects.and_then(|o| count(o.get("imported"))),
                failed: objects.and_then(|o| count(o.get("failed"))),
                skipped: objects.and_then(|o| count(o.get("skipped"))),
            },
            deployment_log_url,
        }
    }
}

fn parse_problem(entry: &Value) -> Option<Problem> {
    let obj = entry.as_object()?;
    let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    Some(Problem {
        object_name: text("objectName"),
        object_uuid: text("objectUuid"),
        message: text("errorMessage").or_else(|| text("message")),
    })
}

/// Reads a non-negative count from a number or a numeric string.
pub(crate) fn count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
