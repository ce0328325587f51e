use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::error::{AppError, Result};
use crate::domain::sync_report::{CleanupPolicy, SyncReport, SyncStep, TransientResource};
use crate::infrastructure::google::DriveApi;
use crate::infrastructure::storage::remove_report;

/// Owns the transient resources of one sync run.
///
/// Resources are tracked the moment they exist and must leave the scope
/// through [`finish`](Self::finish), [`release`](Self::release) or
/// [`abandon`](Self::abandon). Either way every resource ends up in the
/// report as released or leaked; a scope dropped with resources still
/// pending logs each one.
pub struct CleanupScope {
    drive: Option<Arc<dyn DriveApi>>,
    pending: Vec<TransientResource>,
}

impl CleanupScope {
    /// A scope with no Drive access yet. Local files can be tracked and
    /// released right away; remote ones need [`attach_drive`](Self::attach_drive).
    pub fn new() -> Self {
        Self {
            drive: None,
            pending: Vec::new(),
        }
    }

    pub fn attach_drive(&mut self, drive: Arc<dyn DriveApi>) {
        self.drive = Some(drive);
    }

    pub fn track(&mut self, resource: TransientResource) {
        self.pending.push(resource);
    }

    /// Releases or abandons according to `policy` and how the run ended.
    pub async fn finish(self, policy: CleanupPolicy, succeeded: bool, report: &mut SyncReport) {
        match (succeeded, policy) {
            (true, _) | (false, CleanupPolicy::Always) => self.release(report).await,
            (false, CleanupPolicy::OnSuccess) => self.abandon(report),
        }
    }

    /// Deletes every tracked resource in the order it was tracked. A failed
    /// deletion does not stop the others.
    pub async fn release(mut self, report: &mut SyncReport) {
        for resource in std::mem::take(&mut self.pending) {
            match self.delete(&resource).await {
                Ok(()) => report.released.push(resource),
                Err(err) => {
                    warn!(resource = %resource, error = %err, "Failed to clean up; remove it manually");
                    report.record_failure(SyncStep::Cleanup, format!("{}: {}", resource, err));
                    report.leaked.push(resource);
                }
            }
        }
        if report.leaked.is_empty() {
            info!("Cleanup completed");
        }
    }

    /// Keeps every tracked resource and reports it as leaked.
    pub fn abandon(mut self, report: &mut SyncReport) {
        for resource in std::mem::take(&mut self.pending) {
            warn!(resource = %resource, "Left in place after a failed run; remove it manually");
            report.leaked.push(resource);
        }
    }

    async fn delete(&self, resource: &TransientResource) -> Result<()> {
        match resource {
            TransientResource::LocalReport(path) => match remove_report(path) {
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => Ok(other?),
            },
            TransientResource::TempSpreadsheet(id) => match &self.drive {
                Some(drive) => drive.delete_file(id).await,
                None => Err(AppError::Internal(
                    "No Drive client to delete the spreadsheet with".to_string(),
                )),
            },
        }
    }
}

impl Default for CleanupScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        for resource in &self.pending {
            warn!(resource = %resource, "Transient resource was never released");
        }
    }
}
