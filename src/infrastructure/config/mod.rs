use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use crate::domain::error::{AppError, Result};
use crate::domain::sync_report::CleanupPolicy;
use crate::infrastructure::security::keyring::KeyringManager;

pub const ENV_PREFIX: &str = "ENROLLMENT_SYNC_";
pub const CONFIG_PATH_ENV: &str = "ENROLLMENT_SYNC_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "enrollment-sync.toml";
pub const KEYRING_SERVICE: &str = "enrollment-sync";
pub const PORTAL_PASSWORD_KEY: &str = "portal-password";
const PORTAL_PASSWORD_ENV: &str = "ENROLLMENT_SYNC_PORTAL__PASSWORD";

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    #[validate(nested)]
    pub portal: PortalConfig,
    #[validate(nested)]
    pub browser: BrowserConfig,
    #[validate(nested)]
    pub google: GoogleConfig,
    #[validate(nested)]
    pub sync: SyncConfig,
}

/// Where and how to log in to the registration portal.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PortalConfig {
    #[validate(url)]
    pub login_url: String,
    #[validate(url)]
    pub report_url: String,
    #[validate(email)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[validate(length(min = 1))]
    pub email_field: String,
    #[validate(length(min = 1))]
    pub password_field: String,
    #[validate(length(min = 1))]
    pub submit_field: String,
    #[validate(length(min = 1))]
    pub export_label: String,
    #[validate(length(min = 1))]
    pub csv_label: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            report_url: String::new(),
            email: String::new(),
            password: None,
            email_field: "email".to_string(),
            password_field: "password".to_string(),
            submit_field: "continue".to_string(),
            export_label: "Export".to_string(),
            csv_label: "CSV".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BrowserConfig {
    #[validate(url)]
    pub webdriver_url: String,
    /// Spawn this chromedriver binary for the run instead of expecting one
    /// to be listening at `webdriver_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromedriver_path: Option<PathBuf>,
    pub headless: bool,
    #[validate(length(min = 1))]
    pub user_agent: String,
    #[validate(range(min = 1))]
    pub window_width: u32,
    #[validate(range(min = 1))]
    pub window_height: u32,
    pub download_dir: PathBuf,
    #[validate(length(min = 1))]
    pub report_file_name: String,
    #[validate(range(min = 1))]
    pub element_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub redirect_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub page_ready_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub download_timeout_secs: u64,
    /// Per-command limit for WebDriver HTTP calls.
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 10))]
    pub poll_interval_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            chromedriver_path: None,
            headless: false,
            // Google rejects some headless requests without a desktop user agent.
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36".to_string(),
            window_width: 1920,
            window_height: 1080,
            download_dir: PathBuf::from("."),
            report_file_name: "Enrollment_Details.csv".to_string(),
            element_timeout_secs: 10,
            redirect_timeout_secs: 10,
            page_ready_timeout_secs: 30,
            download_timeout_secs: 60,
            request_timeout_secs: 60,
            poll_interval_ms: 250,
        }
    }
}

impl BrowserConfig {
    /// Where the export lands once `download_dir` has been resolved.
    pub fn report_path_in(&self, resolved_dir: &Path) -> PathBuf {
        resolved_dir.join(&self.report_file_name)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.page_ready_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GoogleConfig {
    pub client_secret_path: PathBuf,
    pub token_path: PathBuf,
    #[validate(length(min = 1))]
    pub scopes: Vec<String>,
    pub interactive_consent: bool,
    #[validate(range(min = 1))]
    pub consent_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[validate(url)]
    pub drive_base_url: String,
    #[validate(url)]
    pub sheets_base_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_secret_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            scopes: vec![DRIVE_SCOPE.to_string(), SHEETS_SCOPE.to_string()],
            interactive_consent: true,
            consent_timeout_secs: 300,
            request_timeout_secs: 60,
            drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            sheets_base_url: "https://sheets.googleapis.com/v4".to_string(),
        }
    }
}

impl GoogleConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }
}

/// Which cells move where during the spreadsheet sync.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncConfig {
    #[validate(length(min = 1))]
    pub temp_spreadsheet_name: String,
    #[validate(length(min = 1))]
    pub upload_sheet: String,
    #[validate(length(min = 1))]
    pub source_range: String,
    #[validate(length(min = 1))]
    pub dashboard_spreadsheet_id: String,
    #[validate(length(min = 1))]
    pub dashboard_range: String,
    #[validate(length(min = 1))]
    pub timestamp_cell: String,
    #[validate(length(min = 1))]
    pub timestamp_format: String,
    pub cleanup: CleanupPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            temp_spreadsheet_name: "Temporary Spreadsheet".to_string(),
            upload_sheet: "Sheet1".to_string(),
            source_range: "A2:H500".to_string(),
            dashboard_spreadsheet_id: String::new(),
            dashboard_range: "2025 Data!A2:H500".to_string(),
            timestamp_cell: "Report!B15".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            cleanup: CleanupPolicy::Always,
        }
    }
}

impl AppConfig {
    /// Field validation plus the checks that span sources.
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;

        if self
            .portal
            .password
            .as_deref()
            .map_or(true, |p| p.is_empty())
        {
            return Err(AppError::ConfigError(format!(
                "portal.password is not set (set {}, add it to {}, or store it in the keyring entry {}/{})",
                PORTAL_PASSWORD_ENV, DEFAULT_CONFIG_FILE, KEYRING_SERVICE, PORTAL_PASSWORD_KEY
            )));
        }

        Ok(())
    }
}

pub struct ConfigService {
    keyring: KeyringManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            keyring: KeyringManager::new(KEYRING_SERVICE),
        }
    }

    /// Loads `.env`, the config file and the environment, resolves the
    /// portal password and validates everything before returning.
    pub fn load(&self) -> Result<AppConfig> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }

        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        info!(path = %path.display(), exists = path.exists(), "Loading configuration");

        let mut config: AppConfig = Self::figment(&path).extract()?;
        config.portal.password = self.resolve_portal_password(config.portal.password.take());
        config.validate_all()?;

        Ok(config)
    }

    /// Defaults, then the TOML file, then `ENROLLMENT_SYNC_*` variables.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["config", "portal__password"])
                    .split("__"),
            )
    }

    // Read raw so an all-digit password is not coerced into a number.
    fn resolve_portal_password(&self, from_file: Option<String>) -> Option<String> {
        if let Ok(password) = std::env::var(PORTAL_PASSWORD_ENV) {
            if !password.is_empty() {
                return Some(password);
            }
        }
        if from_file.as_deref().is_some_and(|p| !p.is_empty()) {
            return from_file;
        }
        match self.keyring.get_secret(PORTAL_PASSWORD_KEY) {
            Ok(password) => Some(password),
            Err(err) => {
                debug!(error = %err, "No portal password in keyring");
                None
            }
        }
    }
}
