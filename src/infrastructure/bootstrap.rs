use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::{PortalExportUseCase, PortalSettings, SheetSyncUseCase, SyncSettings};
use crate::domain::error::Result;
use crate::domain::sync_report::SyncReport;
use crate::infrastructure::config::{AppConfig, BrowserConfig, GoogleConfig, PortalConfig, SyncConfig};
use crate::infrastructure::google::{AuthSettings, OAuthConnector};
use crate::infrastructure::storage::resolve_download_dir;
use crate::infrastructure::webdriver::{
    ChromeDriverProcess, ChromeLaunchOptions, Waits, WebDriverClient,
};

/// Export stage followed by sync stage.
pub async fn run_pipeline(config: &AppConfig) -> Result<SyncReport> {
    let report_path = export_report(config).await?;
    sync_report(config, report_path).await
}

async fn export_report(config: &AppConfig) -> Result<PathBuf> {
    let browser = &config.browser;

    // Kept alive until the export finishes; dropping it stops chromedriver.
    let _driver = match &browser.chromedriver_path {
        Some(binary) => Some(
            ChromeDriverProcess::spawn(binary, &browser.webdriver_url, browser.page_ready_timeout())
                .await?,
        ),
        None => None,
    };

    let download_dir = resolve_download_dir(&browser.download_dir).map_err(|err| {
        error!(
            error = %err,
            download_dir = %browser.download_dir.display(),
            "Failed to prepare download directory"
        );
        err
    })?;
    let report_path = browser.report_path_in(&download_dir);

    let options = ChromeLaunchOptions {
        headless: browser.headless,
        user_agent: browser.user_agent.clone(),
        download_dir,
    };
    let session =
        WebDriverClient::connect(&browser.webdriver_url, &options, browser.request_timeout())
            .await?;

    let export = PortalExportUseCase::new(
        Arc::new(session),
        portal_settings(&config.portal, browser),
        waits(browser),
        browser.download_timeout(),
        report_path,
    );
    export.execute().await
}

async fn sync_report(config: &AppConfig, report_path: PathBuf) -> Result<SyncReport> {
    let google = &config.google;
    let connector = OAuthConnector::new(
        auth_settings(google),
        &google.drive_base_url,
        &google.sheets_base_url,
        google.request_timeout(),
    );

    let sync = SheetSyncUseCase::new(Arc::new(connector), sync_settings(&config.sync));
    let report = sync.execute(&report_path).await?;

    for failure in &report.failures {
        warn!(step = %failure.step, message = %failure.message, "Sync finished with a failed step");
    }
    for resource in &report.leaked {
        warn!(resource = %resource, "Left behind by this run");
    }
    info!(
        succeeded = report.succeeded(),
        rows_uploaded = report.rows_uploaded,
        rows_propagated = report.rows_propagated,
        "Sync finished"
    );

    Ok(report)
}

fn portal_settings(portal: &PortalConfig, browser: &BrowserConfig) -> PortalSettings {
    PortalSettings {
        login_url: portal.login_url.clone(),
        report_url: portal.report_url.clone(),
        email: portal.email.clone(),
        password: portal.password.clone().unwrap_or_default(),
        email_field: portal.email_field.clone(),
        password_field: portal.password_field.clone(),
        submit_field: portal.submit_field.clone(),
        export_label: portal.export_label.clone(),
        csv_label: portal.csv_label.clone(),
        window_width: browser.window_width,
        window_height: browser.window_height,
    }
}

fn waits(browser: &BrowserConfig) -> Waits {
    Waits {
        element: browser.element_timeout(),
        redirect: browser.redirect_timeout(),
        page_ready: browser.page_ready_timeout(),
        interval: browser.poll_interval(),
    }
}

fn auth_settings(google: &GoogleConfig) -> AuthSettings {
    let interactive = google.interactive_consent && std::io::stdin().is_terminal();
    if google.interactive_consent && !interactive {
        info!("Stdin is not a terminal; consent flow disabled for this run");
    }

    AuthSettings {
        token_path: google.token_path.clone(),
        client_secret_path: google.client_secret_path.clone(),
        scopes: google.scopes.clone(),
        interactive,
        consent_timeout: google.consent_timeout(),
    }
}

fn sync_settings(sync: &SyncConfig) -> SyncSettings {
    SyncSettings {
        temp_spreadsheet_name: sync.temp_spreadsheet_name.clone(),
        upload_sheet: sync.upload_sheet.clone(),
        source_range: sync.source_range.clone(),
        dashboard_spreadsheet_id: sync.dashboard_spreadsheet_id.clone(),
        dashboard_range: sync.dashboard_range.clone(),
        timestamp_cell: sync.timestamp_cell.clone(),
        timestamp_format: sync.timestamp_format.clone(),
        cleanup: sync.cleanup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::sync_report::CleanupPolicy;
    use std::path::Path;

    fn unattended_config(dir: &Path, cleanup: CleanupPolicy) -> AppConfig {
        let mut config = AppConfig::default();
        config.google.token_path = dir.join("token.json");
        config.google.client_secret_path = dir.join("credentials.json");
        config.google.interactive_consent = false;
        config.sync.dashboard_spreadsheet_id = "dashboard-id".to_string();
        config.sync.cleanup = cleanup;
        config
    }

    #[tokio::test]
    async fn test_unattended_auth_failure_removes_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Enrollment_Details.csv");
        std::fs::write(&path, "A,B\n1,2\n").unwrap();

        let config = unattended_config(dir.path(), CleanupPolicy::Always);
        let err = sync_report(&config, path.clone()).await.unwrap_err();

        assert!(matches!(err, AppError::AuthError(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unattended_auth_failure_keeps_report_under_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Enrollment_Details.csv");
        std::fs::write(&path, "A,B\n1,2\n").unwrap();

        let config = unattended_config(dir.path(), CleanupPolicy::OnSuccess);
        let err = sync_report(&config, path.clone()).await.unwrap_err();

        assert!(matches!(err, AppError::AuthError(_)));
        assert!(path.exists());
    }

    #[test]
    fn test_sync_settings_follow_config() {
        let mut config = SyncConfig::default();
        config.dashboard_spreadsheet_id = "dashboard-id".to_string();
        config.cleanup = CleanupPolicy::OnSuccess;

        let settings = sync_settings(&config);

        assert_eq!(settings.dashboard_spreadsheet_id, "dashboard-id");
        assert_eq!(settings.dashboard_range, "2025 Data!A2:H500");
        assert_eq!(settings.cleanup, CleanupPolicy::OnSuccess);
    }

    #[test]
    fn test_portal_settings_carry_viewport_and_password() {
        let mut portal = PortalConfig::default();
        portal.password = Some("hunter2".to_string());
        let browser = BrowserConfig::default();

        let settings = portal_settings(&portal, &browser);

        assert_eq!(settings.password, "hunter2");
        assert_eq!(settings.window_width, 1920);
        assert_eq!(settings.submit_field, "continue");
    }

    #[test]
    fn test_waits_use_configured_timeouts() {
        let browser = BrowserConfig::default();
        let waits = waits(&browser);
        assert_eq!(waits.element.as_secs(), 10);
        assert_eq!(waits.page_ready.as_secs(), 30);
        assert_eq!(waits.interval.as_millis(), 250);
    }

    #[test]
    fn test_report_path_uses_resolved_dir() {
        let browser = BrowserConfig::default();
        assert_eq!(
            browser.report_path_in(Path::new("/srv/reports")),
            PathBuf::from("/srv/reports/Enrollment_Details.csv")
        );
        assert_eq!(browser.request_timeout().as_secs(), 60);
    }
}
