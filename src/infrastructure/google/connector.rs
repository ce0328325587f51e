use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::oauth::{AuthSettings, GoogleAuthenticator, HttpTokenEndpoint};
use super::{DriveClient, GoogleClients, GoogleConnector, SheetsClient};
use crate::domain::error::{AppError, Result};

/// Connects through the OAuth token file and the real REST endpoints.
pub struct OAuthConnector {
    auth: AuthSettings,
    drive_base_url: String,
    sheets_base_url: String,
    request_timeout: Duration,
}

impl OAuthConnector {
    pub fn new(
        auth: AuthSettings,
        drive_base_url: &str,
        sheets_base_url: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            drive_base_url: drive_base_url.to_string(),
            sheets_base_url: sheets_base_url.to_string(),
            request_timeout,
        }
    }
}

#[async_trait]
impl GoogleConnector for OAuthConnector {
    async fn connect(&self) -> Result<GoogleClients> {
        let endpoint = HttpTokenEndpoint::new(self.request_timeout)?;
        let authenticator = GoogleAuthenticator::new(Arc::new(endpoint), self.auth.clone());
        let token = authenticator.acquire().await?;
        let access_token = token
            .access_token()
            .ok_or_else(|| AppError::AuthError("Credentials carry no access token".to_string()))?;

        Ok(GoogleClients {
            drive: Arc::new(DriveClient::new(
                &self.drive_base_url,
                access_token,
                self.request_timeout,
            )?),
            sheets: Arc::new(SheetsClient::new(
                &self.sheets_base_url,
                access_token,
                self.request_timeout,
            )?),
        })
    }
}
