use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// When the sync stage releases the resources it created.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Release on every exit path.
    #[default]
    Always,
    /// Release only when every step succeeded; anything left is reported.
    OnSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    Authenticate,
    Upload,
    Propagate,
    Timestamp,
    Cleanup,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Authenticate => "authenticate",
            SyncStep::Upload => "upload",
            SyncStep::Propagate => "propagate",
            SyncStep::Timestamp => "timestamp",
            SyncStep::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A transient resource owned by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientResource {
    LocalReport(PathBuf),
    TempSpreadsheet(String),
}

impl fmt::Display for TransientResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientResource::LocalReport(path) => write!(f, "local report {}", path.display()),
            TransientResource::TempSpreadsheet(id) => write!(f, "temporary spreadsheet {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: SyncStep,
    pub message: String,
}

/// What the sync stage did, including anything it could not undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub temp_spreadsheet_id: Option<String>,
    pub rows_uploaded: usize,
    pub rows_propagated: usize,
    pub timestamp: Option<String>,
    pub failures: Vec<StepFailure>,
    pub released: Vec<TransientResource>,
    pub leaked: Vec<TransientResource>,
}

impl SyncReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record_failure(&mut self, step: SyncStep, message: impl Into<String>) {
        self.failures.push(StepFailure {
            step,
            message: message.into(),
        });
    }

    pub fn failed_at(&self, step: SyncStep) -> bool {
        self.failures.iter().any(|f| f.step == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_policy_serde() {
        let policy: CleanupPolicy = serde_json::from_str("\"on_success\"").unwrap();
        assert_eq!(policy, CleanupPolicy::OnSuccess);
        assert_eq!(CleanupPolicy::default(), CleanupPolicy::Always);
    }

    #[test]
    fn test_report_tracks_failures() {
        let mut report = SyncReport::default();
        assert!(report.succeeded());
        report.record_failure(SyncStep::Propagate, "API error (500): backend");
        assert!(!report.succeeded());
        assert!(report.failed_at(SyncStep::Propagate));
        assert!(!report.failed_at(SyncStep::Upload));
    }
}
