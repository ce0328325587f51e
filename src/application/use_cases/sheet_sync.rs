use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use serde_json::Value;
use tracing::{error, info, warn};

use super::cleanup_scope::CleanupScope;
use crate::domain::error::{AppError, Result};
use crate::domain::sync_report::{CleanupPolicy, SyncReport, SyncStep, TransientResource};
use crate::infrastructure::csv::CsvParser;
use crate::infrastructure::google::{GoogleClients, GoogleConnector, SheetsApi, ValueInputOption};
use crate::infrastructure::storage::ensure_report_present;

/// Which cells move where.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub temp_spreadsheet_name: String,
    pub upload_sheet: String,
    pub source_range: String,
    pub dashboard_spreadsheet_id: String,
    pub dashboard_range: String,
    pub timestamp_cell: String,
    pub timestamp_format: String,
    pub cleanup: CleanupPolicy,
}

/// Uploads the exported report and copies it into the dashboard.
pub struct SheetSyncUseCase {
    connector: Arc<dyn GoogleConnector>,
    settings: SyncSettings,
}

impl SheetSyncUseCase {
    pub fn new(connector: Arc<dyn GoogleConnector>, settings: SyncSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Authenticates, then runs upload, propagate and timestamp, then
    /// releases the temporary resources according to the cleanup policy.
    ///
    /// The local report is owned by the cleanup scope from the start, so a
    /// failure to authenticate still removes it (or reports it as leaked).
    /// Google API error responses are logged against their step and end the
    /// run with `Ok`; the returned report says what failed and what leaked.
    /// Any other error is returned after cleanup.
    pub async fn execute(&self, report_path: &Path) -> Result<SyncReport> {
        info!(path = %report_path.display(), "Starting Google Sheets sync");

        let mut report = SyncReport::default();
        let mut scope = CleanupScope::new();
        scope.track(TransientResource::LocalReport(report_path.to_path_buf()));

        let outcome = self.run_steps(report_path, &mut scope, &mut report).await;
        scope
            .finish(self.settings.cleanup, outcome.is_ok(), &mut report)
            .await;

        match outcome {
            Ok(()) => {
                info!(
                    rows = report.rows_propagated,
                    timestamp = report.timestamp.as_deref().unwrap_or(""),
                    "Dashboard updated"
                );
                Ok(report)
            }
            Err(err) if err.is_remote_api() => Ok(report),
            Err(err) => Err(err),
        }
    }

    async fn run_steps(
        &self,
        report_path: &Path,
        scope: &mut CleanupScope,
        report: &mut SyncReport,
    ) -> Result<()> {
        let clients = self
            .connector
            .connect()
            .await
            .map_err(|err| step_failed(report, SyncStep::Authenticate, err))?;
        scope.attach_drive(clients.drive.clone());

        let temp_id = self
            .upload(&clients, report_path, scope, report)
            .await
            .map_err(|err| step_failed(report, SyncStep::Upload, err))?;
        self.propagate(clients.sheets.as_ref(), &temp_id, report)
            .await
            .map_err(|err| step_failed(report, SyncStep::Propagate, err))?;
        self.stamp(clients.sheets.as_ref(), report)
            .await
            .map_err(|err| step_failed(report, SyncStep::Timestamp, err))?;
        Ok(())
    }

    async fn upload(
        &self,
        clients: &GoogleClients,
        report_path: &Path,
        scope: &mut CleanupScope,
        report: &mut SyncReport,
    ) -> Result<String> {
        ensure_report_present(report_path)?;
        let table = CsvParser::parse_file_auto_detect(report_path)?;
        info!(
            rows = table.row_count(),
            columns = table.column_count(),
            "Read exported report"
        );

        let spreadsheet_id = clients
            .drive
            .create_spreadsheet(&self.settings.temp_spreadsheet_name)
            .await?;
        scope.track(TransientResource::TempSpreadsheet(spreadsheet_id.clone()));
        report.temp_spreadsheet_id = Some(spreadsheet_id.clone());

        clients
            .sheets
            .update_values(
                &spreadsheet_id,
                &self.settings.upload_sheet,
                &table.to_sheet_values(),
                ValueInputOption::Raw,
            )
            .await?;
        report.rows_uploaded = table.row_count();

        Ok(spreadsheet_id)
    }

    async fn propagate(
        &self,
        sheets: &dyn SheetsApi,
        temp_id: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        let values = sheets.get_values(temp_id, &self.settings.source_range).await?;
        info!(rows = values.len(), "Retrieved current signup data");
        if values.is_empty() {
            warn!(range = %self.settings.source_range, "Uploaded report has no data rows");
        }

        sheets
            .update_values(
                &self.settings.dashboard_spreadsheet_id,
                &self.settings.dashboard_range,
                &values,
                ValueInputOption::UserEntered,
            )
            .await?;
        report.rows_propagated = values.len();
        Ok(())
    }

    async fn stamp(&self, sheets: &dyn SheetsApi, report: &mut SyncReport) -> Result<()> {
        let stamp = Local::now().format(&self.settings.timestamp_format).to_string();

        let written = sheets
            .update_values(
                &self.settings.dashboard_spreadsheet_id,
                &self.settings.timestamp_cell,
                &vec![vec![Value::String(stamp.clone())]],
                ValueInputOption::UserEntered,
            )
            .await;

        if written.is_err() {
            warn!(
                cell = %self.settings.timestamp_cell,
                "Dashboard data was updated but its timestamp was not"
            );
        }
        written?;

        report.timestamp = Some(stamp);
        Ok(())
    }
}

/// Records and logs a failed step before passing the error on.
fn step_failed(report: &mut SyncReport, step: SyncStep, err: AppError) -> AppError {
    error!(step = %step, error = %err, "Sync step failed");
    report.record_failure(step, err.to_string());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::SheetValues;
    use crate::infrastructure::google::DriveApi;
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, Timelike};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const DASHBOARD: &str = "dashboard-id";

    #[derive(Default)]
    struct GoogleState {
        next_id: usize,
        live: Vec<String>,
        deleted: Vec<String>,
        cells: HashMap<(String, String), SheetValues>,
        inputs: HashMap<(String, String), ValueInputOption>,
    }

    /// In-memory Drive and Sheets. Reading a range of the form `A2:...`
    /// returns everything written to the first sheet minus its header row.
    #[derive(Default)]
    struct FakeGoogle {
        state: Mutex<GoogleState>,
        fail_update_range: Option<String>,
        fail_delete: bool,
        reject_credentials: bool,
    }

    struct FakeConnector(Arc<FakeGoogle>);

    #[async_trait]
    impl GoogleConnector for FakeConnector {
        async fn connect(&self) -> Result<GoogleClients> {
            if self.0.reject_credentials {
                return Err(AppError::AuthError(
                    "No valid cached token and interactive consent is unavailable".to_string(),
                ));
            }
            Ok(GoogleClients {
                drive: self.0.clone(),
                sheets: self.0.clone(),
            })
        }
    }

    impl FakeGoogle {
        fn written(&self, id: &str, range: &str) -> Option<SheetValues> {
            self.state
                .lock()
                .unwrap()
                .cells
                .get(&(id.to_string(), range.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl DriveApi for FakeGoogle {
        async fn create_spreadsheet(&self, _name: &str) -> Result<String> {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = format!("temp-{}", state.next_id);
            state.live.push(id.clone());
            Ok(id)
        }

        async fn delete_file(&self, file_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(AppError::ApiError {
                    status: 500,
                    message: "Internal error".to_string(),
                });
            }
            let mut state = self.state.lock().unwrap();
            state.live.retain(|id| id != file_id);
            state.deleted.push(file_id.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl SheetsApi for FakeGoogle {
        async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<SheetValues> {
            let state = self.state.lock().unwrap();
            let uploaded = state
                .cells
                .get(&(spreadsheet_id.to_string(), "Sheet1".to_string()))
                .cloned()
                .unwrap_or_default();
            assert_eq!(range, "A2:H500");
            Ok(uploaded.into_iter().skip(1).collect())
        }

        async fn update_values(
            &self,
            spreadsheet_id: &str,
            range: &str,
            values: &SheetValues,
            input: ValueInputOption,
        ) -> Result<u64> {
            if self.fail_update_range.as_deref() == Some(range) {
                return Err(AppError::ApiError {
                    status: 403,
                    message: "The caller does not have permission".to_string(),
                });
            }
            let mut state = self.state.lock().unwrap();
            let key = (spreadsheet_id.to_string(), range.to_string());
            state.cells.insert(key.clone(), values.clone());
            state.inputs.insert(key, input);
            Ok(values.iter().map(|row| row.len() as u64).sum())
        }
    }

    fn settings(cleanup: CleanupPolicy) -> SyncSettings {
        SyncSettings {
            temp_spreadsheet_name: "Temporary Spreadsheet".to_string(),
            upload_sheet: "Sheet1".to_string(),
            source_range: "A2:H500".to_string(),
            dashboard_spreadsheet_id: DASHBOARD.to_string(),
            dashboard_range: "2025 Data!A2:H500".to_string(),
            timestamp_cell: "Report!B15".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            cleanup,
        }
    }

    fn use_case(google: &Arc<FakeGoogle>, cleanup: CleanupPolicy) -> SheetSyncUseCase {
        SheetSyncUseCase::new(Arc::new(FakeConnector(google.clone())), settings(cleanup))
    }

    fn write_report(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("Enrollment_Details.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle::default());

        let report = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap();

        let temp_id = report.temp_spreadsheet_id.clone().unwrap();
        let sheet = google.written(&temp_id, "Sheet1").unwrap();
        assert_eq!(sheet[0], vec![json!("A"), json!("B")]);
        assert_eq!(sheet[1], vec![json!(1), json!(2)]);
        assert_eq!(
            google.state.lock().unwrap().inputs[&(temp_id, "Sheet1".to_string())],
            ValueInputOption::Raw
        );
        assert_eq!(report.rows_uploaded, 1);
    }

    #[tokio::test]
    async fn test_propagates_exact_values_and_current_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(
            dir.path(),
            "Player,Division,Fee\nAna Lee,Majors,125.50\nSam Ortiz,Minors,07083\n",
        );
        let google = Arc::new(FakeGoogle::default());

        let before = Local::now().naive_local();
        let report = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap();
        let after = Local::now().naive_local();

        let temp_id = report.temp_spreadsheet_id.clone().unwrap();
        let uploaded = google.written(&temp_id, "Sheet1").unwrap();
        let dashboard = google.written(DASHBOARD, "2025 Data!A2:H500").unwrap();
        assert_eq!(dashboard, uploaded[1..].to_vec());
        assert_eq!(dashboard[1][2], json!("07083"));
        assert_eq!(report.rows_propagated, 2);

        let stamp_cells = google.written(DASHBOARD, "Report!B15").unwrap();
        let stamp = stamp_cells[0][0].as_str().unwrap();
        let parsed = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").unwrap();
        assert!(parsed >= before.with_nanosecond(0).unwrap());
        assert!(parsed <= after);
        assert_eq!(report.timestamp.as_deref(), Some(stamp));
    }

    #[tokio::test]
    async fn test_success_leaves_no_temporary_resources() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle::default());

        let report = use_case(&google, CleanupPolicy::OnSuccess)
            .execute(&path)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(report.leaked.is_empty());
        assert_eq!(report.released.len(), 2);
        assert!(google.state.lock().unwrap().live.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_handled_api_error_keeps_resources_under_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            fail_update_range: Some("2025 Data!A2:H500".to_string()),
            ..Default::default()
        });

        let report = use_case(&google, CleanupPolicy::OnSuccess)
            .execute(&path)
            .await
            .unwrap();

        assert!(report.failed_at(SyncStep::Propagate));
        assert!(path.exists());
        assert_eq!(google.state.lock().unwrap().live.len(), 1);
        assert_eq!(report.leaked.len(), 2);
        assert!(google.written(DASHBOARD, "Report!B15").is_none());
    }

    #[tokio::test]
    async fn test_handled_api_error_still_cleans_up_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            fail_update_range: Some("2025 Data!A2:H500".to_string()),
            ..Default::default()
        });

        let report = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap();

        assert!(report.failed_at(SyncStep::Propagate));
        assert!(!path.exists());
        assert!(google.state.lock().unwrap().live.is_empty());
        assert!(report.leaked.is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_failure_keeps_dashboard_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            fail_update_range: Some("Report!B15".to_string()),
            ..Default::default()
        });

        let report = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap();

        assert!(report.failed_at(SyncStep::Timestamp));
        assert!(google.written(DASHBOARD, "2025 Data!A2:H500").is_some());
        assert!(report.timestamp.is_none());
    }

    #[tokio::test]
    async fn test_missing_report_fails_before_creating_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Enrollment_Details.csv");
        let google = Arc::new(FakeGoogle::default());

        let err = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        let state = google.state.lock().unwrap();
        assert_eq!(state.next_id, 0);
        assert!(state.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_credentials_still_remove_local_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            reject_credentials: true,
            ..Default::default()
        });

        let err = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AuthError(_)));
        assert!(!path.exists());
        assert_eq!(google.state.lock().unwrap().next_id, 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials_under_on_success_keeps_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            reject_credentials: true,
            ..Default::default()
        });

        let sync = use_case(&google, CleanupPolicy::OnSuccess);
        assert!(sync.execute(&path).await.is_err());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_delete_is_reported_as_leak() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(dir.path(), "A,B\n1,2\n");
        let google = Arc::new(FakeGoogle {
            fail_delete: true,
            ..Default::default()
        });

        let report = use_case(&google, CleanupPolicy::Always)
            .execute(&path)
            .await
            .unwrap();

        assert!(report.failed_at(SyncStep::Cleanup));
        assert_eq!(
            report.leaked,
            vec![TransientResource::TempSpreadsheet("temp-1".to_string())]
        );
        assert!(!path.exists());
    }
}
