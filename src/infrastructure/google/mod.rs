//! Google Drive v3 and Sheets v4 clients plus OAuth credential handling.

pub mod connector;
pub mod drive;
pub mod oauth;
pub mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::domain::error::{AppError, Result};
use crate::domain::report::SheetValues;

pub use connector::OAuthConnector;
pub use drive::DriveClient;
pub use oauth::{AuthSettings, GoogleAuthenticator, HttpTokenEndpoint, TokenEndpoint};
pub use sheets::SheetsClient;

/// How the Sheets API interprets written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInputOption {
    /// Stored exactly as sent.
    Raw,
    /// Parsed as if typed into the UI (numbers, dates, formulas).
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInputOption::Raw => "RAW",
            ValueInputOption::UserEntered => "USER_ENTERED",
        }
    }
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Creates an empty native spreadsheet and returns its file id.
    async fn create_spreadsheet(&self, name: &str) -> Result<String>;
    async fn delete_file(&self, file_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Values in `range`; trailing empty rows and cells are omitted by the API.
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<SheetValues>;
    /// Overwrites `range` and returns the number of updated cells.
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &SheetValues,
        input: ValueInputOption,
    ) -> Result<u64>;
}

/// Authorised Drive and Sheets clients for one run.
#[derive(Clone)]
pub struct GoogleClients {
    pub drive: Arc<dyn DriveApi>,
    pub sheets: Arc<dyn SheetsApi>,
}

#[async_trait]
pub trait GoogleConnector: Send + Sync {
    /// Acquires credentials and builds clients that carry them.
    async fn connect(&self) -> Result<GoogleClients>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a non-success Google API response onto the handled error category.
pub(crate) fn api_error(status: u16, body: &str) -> AppError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(kind) => format!("{} ({})", envelope.error.message, kind),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    };
    AppError::ApiError { status, message }
}

/// Sends an authorised request and turns error responses into `ApiError`.
pub(crate) async fn send_checked(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let response = request.send().await?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Appends percent-encoded path segments to an API base URL.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid API base URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| AppError::ConfigError(format!("API base URL {} cannot have a path", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}
