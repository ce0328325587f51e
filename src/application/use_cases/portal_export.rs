use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::error::Result;
use crate::infrastructure::storage::{remove_stale_report, wait_for_download};
use crate::infrastructure::webdriver::{
    wait_for_document_ready, wait_for_element, wait_for_url_change, BrowserSession,
    ElementCondition, Locator, Waits,
};

/// Portal addresses, account and the page controls the export relies on.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub login_url: String,
    pub report_url: String,
    pub email: String,
    pub password: String,
    pub email_field: String,
    pub password_field: String,
    pub submit_field: String,
    pub export_label: String,
    pub csv_label: String,
    pub window_width: u32,
    pub window_height: u32,
}

/// Logs in to the portal and downloads the enrollment report.
pub struct PortalExportUseCase {
    browser: Arc<dyn BrowserSession>,
    settings: PortalSettings,
    waits: Waits,
    download_timeout: Duration,
    report_path: PathBuf,
}

impl PortalExportUseCase {
    pub fn new(
        browser: Arc<dyn BrowserSession>,
        settings: PortalSettings,
        waits: Waits,
        download_timeout: Duration,
        report_path: PathBuf,
    ) -> Self {
        Self {
            browser,
            settings,
            waits,
            download_timeout,
            report_path,
        }
    }

    /// Runs login and export, then closes the browser whatever happened.
    pub async fn execute(&self) -> Result<PathBuf> {
        let outcome = self.login_and_export().await;

        if let Err(err) = self.browser.quit().await {
            warn!(error = %err, "Failed to close browser session");
        }

        outcome
    }

    async fn login_and_export(&self) -> Result<PathBuf> {
        self.login().await?;
        self.export().await
    }

    /// Returns the address the portal settled on after login.
    pub async fn login(&self) -> Result<String> {
        info!(url = %self.settings.login_url, "Logging in to the portal");
        let session = self.browser.as_ref();
        let submit = Locator::name(&self.settings.submit_field);

        session.goto(&self.settings.login_url).await?;

        let email = self
            .wait_for(&Locator::name(&self.settings.email_field), ElementCondition::Present)
            .await?;
        session.send_keys(&email, &self.settings.email).await?;
        let next = self.wait_for(&submit, ElementCondition::Clickable).await?;
        session.click(&next).await?;

        let password = self
            .wait_for(
                &Locator::name(&self.settings.password_field),
                ElementCondition::Present,
            )
            .await?;
        session.send_keys(&password, &self.settings.password).await?;
        let sign_in = self.wait_for(&submit, ElementCondition::Clickable).await?;

        let before = session.current_url().await?;
        session.click(&sign_in).await?;
        let landed = wait_for_url_change(
            session,
            &before,
            self.waits.redirect,
            self.waits.interval,
        )
        .await?;

        info!(url = %landed, "Logged in");
        Ok(landed)
    }

    /// Downloads the report to the configured path and returns it.
    pub async fn export(&self) -> Result<PathBuf> {
        info!(url = %self.settings.report_url, "Starting report export");
        let session = self.browser.as_ref();

        remove_stale_report(&self.report_path)?;

        session.goto(&self.settings.report_url).await?;
        // The export control is only rendered on wide viewports.
        session
            .set_window_size(self.settings.window_width, self.settings.window_height)
            .await?;
        wait_for_document_ready(session, self.waits.page_ready, self.waits.interval).await?;

        let export = wait_for_element(
            session,
            &Locator::exact_text(&self.settings.export_label),
            ElementCondition::Visible,
            self.waits.page_ready,
            self.waits.interval,
        )
        .await?;
        session.click(&export).await?;

        let csv = self
            .wait_for(
                &Locator::exact_text(&self.settings.csv_label),
                ElementCondition::Visible,
            )
            .await?;
        session.click(&csv).await?;

        wait_for_download(&self.report_path, self.download_timeout, self.waits.interval).await?;
        Ok(self.report_path.clone())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        condition: ElementCondition,
    ) -> Result<crate::infrastructure::webdriver::ElementRef> {
        wait_for_element(
            self.browser.as_ref(),
            locator,
            condition,
            self.waits.element,
            self.waits.interval,
        )
        .await
    }
}
