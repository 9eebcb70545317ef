//! Terminal-state classification per job kind.

use super::{JobKind, JobSummary, NormalizedStatus, PollResult};

/// How many problem entries a failure message carries at most.
pub const MAX_REPORTED_PROBLEMS: usize = 10;

const EXPORT_FAILURES: &[&str] = &["FAILED", "COMPLETED_WITH_EXPORT_ERRORS"];

const IMPORT_FAILURES: &[&str] = &[
    "FAILED",
    "REJECTED",
    "COMPLETED_WITH_ERRORS",
    "COMPLETED_WITH_IMPORT_ERRORS",
    "COMPLETED_WITH_PUBLISH_ERRORS",
];

/// Map a service status to its normalized meaning. Anything unknown keeps polling.
pub fn classify(kind: JobKind, raw_status: &str, summary: &JobSummary) -> NormalizedStatus {
    let status = raw_status.trim().to_uppercase();
    let status = status.as_str();

    match kind {
        JobKind::Export => match status {
            "COMPLETED" => NormalizedStatus::Completed,
            s if EXPORT_FAILURES.contains(&s) => NormalizedStatus::Failed,
            _ => NormalizedStatus::Pending,
        },
        JobKind::Import => match status {
            "COMPLETED" => NormalizedStatus::Completed,
            "PENDING_REVIEW" => NormalizedStatus::CompletedWithWarnings,
            s if IMPORT_FAILURES.contains(&s) => NormalizedStatus::Failed,
            _ => NormalizedStatus::Pending,
        },
        JobKind::Inspect => match status {
            "FAILED" => NormalizedStatus::Failed,
            "COMPLETED" if summary.total_errors > 0 => NormalizedStatus::Failed,
            "COMPLETED" if summary.total_warnings > 0 => NormalizedStatus::CompletedWithWarnings,
            "COMPLETED" => NormalizedStatus::Completed,
            _ => NormalizedStatus::Pending,
        },
    }
}

/// Human-readable detail lines for a failed job.
pub fn failure_details(result: &PollResult) -> Vec<String> {
    let summary = &result.summary;
    let mut details: Vec<String> = summary
        .errors
        .iter()
        .take(MAX_REPORTED_PROBLEMS)
        .map(|p| p.to_string())
        .collect();

    if summary.total_errors as usize > details.len() && !details.is_empty() {
        details.push(format!(
            "... {} error(s) in total",
            summary.total_errors
        ));
    } else if details.is_empty() && summary.total_errors > 0 {
        details.push(format!("{} error(s) reported", summary.total_errors));
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Problem;
    use serde_json::json;

    fn summary(errors: u64, warnings: u64) -> JobSummary {
        JobSummary {
            total_errors: errors,
            total_warnings: warnings,
            ..Default::default()
        }
    }

    #[test]
    fn test_failure_statuses_never_succeed() {
        let empty = JobSummary::default();
        for status in EXPORT_FAILURES {
            assert_eq!(classify(JobKind::Export, status, &empty), NormalizedStatus::Failed);
        }
        for status in IMPORT_FAILURES {
            assert_eq!(classify(JobKind::Import, status, &empty), NormalizedStatus::Failed);
        }
        assert_eq!(classify(JobKind::Inspect, "FAILED", &empty), NormalizedStatus::Failed);
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let empty = JobSummary::default();
        assert_eq!(
            classify(JobKind::Import, "pending_review", &empty),
            NormalizedStatus::CompletedWithWarnings
        );
        assert_eq!(
            classify(JobKind::Export, "Completed_With_Export_Errors", &empty),
            NormalizedStatus::Failed
        );
    }

    #[test]
    fn test_statuses_are_kind_specific() {
        let empty = JobSummary::default();
        // Import-only failure statuses do not end an export.
        assert_eq!(
            classify(JobKind::Export, "REJECTED", &empty),
            NormalizedStatus::Pending
        );
        assert_eq!(
            classify(JobKind::Export, "PENDING_REVIEW", &empty),
            NormalizedStatus::Pending
        );
        assert_eq!(
            classify(JobKind::Inspect, "COMPLETED_WITH_ERRORS", &empty),
            NormalizedStatus::Pending
        );
    }

    #[test]
    fn test_unknown_statuses_keep_polling() {
        let empty = JobSummary::default();
        for kind in [JobKind::Export, JobKind::Import, JobKind::Inspect] {
            for status in ["", "RUNNING", "IN_PROGRESS", "QUEUED"] {
                assert_eq!(classify(kind, status, &empty), NormalizedStatus::Pending);
            }
        }
    }

    #[test]
    fn test_inspection_uses_problem_counts() {
        assert_eq!(
            classify(JobKind::Inspect, "COMPLETED", &summary(0, 0)),
            NormalizedStatus::Completed
        );
        assert_eq!(
            classify(JobKind::Inspect, "COMPLETED", &summary(0, 4)),
            NormalizedStatus::CompletedWithWarnings
        );
        assert_eq!(
            classify(JobKind::Inspect, "COMPLETED", &summary(1, 4)),
            NormalizedStatus::Failed
        );
    }

    #[test]
    fn test_failure_details_caps_entries() {
        let mut s = summary(12, 0);
        s.errors = (0..12)
            .map(|i| Problem {
                object_name: Some(format!("Obj{}", i)),
                object_uuid: Some(format!("u{}", i)),
                message: Some("broken".to_string()),
            })
            .collect();
        let result = PollResult {
            raw_status: "COMPLETED".to_string(),
            status: NormalizedStatus::Failed,
            summary: s,
            payload: json!({}),
        };

        let details = failure_details(&result);
        assert_eq!(details.len(), MAX_REPORTED_PROBLEMS + 1);
        assert_eq!(details[0], "Obj0 (u0): broken");
        assert_eq!(details[MAX_REPORTED_PROBLEMS], "... 12 error(s) in total");
    }

    #[test]
    fn test_failure_details_without_entries() {
        let result = PollResult {
            raw_status: "FAILED".to_string(),
            status: NormalizedStatus::Failed,
            summary: JobSummary::default(),
            payload: json!({}),
        };
        assert!(failure_details(&result).is_empty());
    }
}
