//! OAuth 2.0 credentials for the Drive and Sheets clients.
//!
//! A cached token is reused while valid, refreshed when it has expired and
//! carries a refresh token, and otherwise replaced through the installed-app
//! consent flow (loopback redirect + PKCE). Whatever comes out is written
//! back to the token file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::credentials::{ClientSecret, ClientSecretFile, StoredToken};
use crate::domain::error::{AppError, Result};
use crate::interfaces::http::consent_callback::{ConsentCallback, ConsentListener};

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, token: &StoredToken) -> Result<TokenResponse>;
    async fn exchange_code(
        &self,
        client: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse>;
}

pub struct HttpTokenEndpoint {
    client: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: super::http_client(timeout)?,
        })
    }

    async fn post_form(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.client.post(token_uri).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AppError::AuthError(format!(
                "Token endpoint rejected the request ({}): {}",
                status, reason
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::AuthError(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(&self, token: &StoredToken) -> Result<TokenResponse> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::AuthError("No refresh token".to_string()))?;

        self.post_form(
            &token.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ],
        )
        .await
    }

    async fn exchange_code(
        &self,
        client: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        self.post_form(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub token_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub scopes: Vec<String>,
    /// Whether a person is present to complete the consent flow.
    pub interactive: bool,
    pub consent_timeout: Duration,
}

pub struct GoogleAuthenticator {
    endpoint: Arc<dyn TokenEndpoint>,
    settings: AuthSettings,
}

impl GoogleAuthenticator {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, settings: AuthSettings) -> Self {
        Self { endpoint, settings }
    }

    /// Returns usable credentials, persisting them whenever they changed.
    pub async fn acquire(&self) -> Result<StoredToken> {
        let now = Utc::now();

        if let Some(cached) = load_token(&self.settings.token_path)? {
            if !cached.covers_scopes(&self.settings.scopes) {
                warn!(
                    path = %self.settings.token_path.display(),
                    "Cached token was granted fewer scopes than requested; API calls may be rejected"
                );
            }
            if cached.is_valid(now) {
                info!("Using cached Google credentials");
                return Ok(cached);
            }
            if cached.can_refresh() {
                info!("Refreshing expired Google credentials");
                let response = self.endpoint.refresh(&cached).await?;
                let refreshed = apply_response(cached, response);
                save_token(&self.settings.token_path, &refreshed)?;
                return Ok(refreshed);
            }
        }

        if !self.settings.interactive {
            return Err(AppError::AuthError(format!(
                "No valid cached token at {} and interactive consent is unavailable",
                self.settings.token_path.display()
            )));
        }

        let token = self.run_consent_flow().await?;
        save_token(&self.settings.token_path, &token)?;
        Ok(token)
    }

    async fn run_consent_flow(&self) -> Result<StoredToken> {
        let secret_file = load_client_secret(&self.settings.client_secret_path)?;
        let client = secret_file.client().cloned().ok_or_else(|| {
            AppError::AuthError(format!(
                "{} has neither an \"installed\" nor a \"web\" client",
                self.settings.client_secret_path.display()
            ))
        })?;

        let listener = ConsentListener::start()?;
        let redirect_uri = listener.redirect_uri();
        let pkce = Pkce::generate();
        let state = Uuid::new_v4().simple().to_string();
        let auth_url = authorization_url(
            &client,
            &self.settings.scopes,
            &redirect_uri,
            &state,
            &pkce.challenge,
        )?;

        info!(url = %auth_url, "Open this URL in a browser to authorize access to Drive and Sheets");

        let callback = listener.wait(self.settings.consent_timeout).await?;
        let code = authorization_code(callback, &state)?;
        let response = self
            .endpoint
            .exchange_code(&client, &code, &redirect_uri, &pkce.verifier)
            .await?;

        info!("Consent granted");
        let token = StoredToken {
            token: None,
            refresh_token: None,
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: self.settings.scopes.clone(),
            expiry: None,
        };
        Ok(apply_response(token, response))
    }
}

/// Folds a token endpoint response into stored credentials. A refresh
/// response without a new refresh token keeps the old one.
fn apply_response(mut token: StoredToken, response: TokenResponse) -> StoredToken {
    token.token = Some(response.access_token);
    token.expiry = response
        .expires_in
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
    if let Some(refresh) = response.refresh_token {
        token.refresh_token = Some(refresh);
    }
    if let Some(scope) = response.scope {
        token.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
    token
}

pub fn load_token(path: &Path) -> Result<Option<StoredToken>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str(&raw) {
        Ok(token) => Ok(Some(token)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Ignoring unreadable token file");
            Ok(None)
        }
    }
}

/// Writes the token next to its final path and renames it into place.
pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    let json = serde_json::to_string_pretty(token)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp, path)?;
    info!(path = %path.display(), "Saved Google credentials");
    Ok(())
}

fn load_client_secret(path: &Path) -> Result<ClientSecretFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::AuthError(format!(
            "Cannot read client secret {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::AuthError(format!("Invalid client secret {}: {}", path.display(), e)))
}

struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    fn generate() -> Self {
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let challenge = code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn authorization_url(
    client: &ClientSecret,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let mut url = Url::parse(&client.auth_uri)
        .map_err(|e| AppError::AuthError(format!("Invalid auth_uri {}: {}", client.auth_uri, e)))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client.client_id.as_str())
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    Ok(url)
}

/// Checks the redirect belongs to this flow and extracts the code.
fn authorization_code(callback: ConsentCallback, expected_state: &str) -> Result<String> {
    if let Some(error) = callback.error {
        return Err(AppError::AuthError(format!("Consent was not granted: {}", error)));
    }
    if callback.state.as_deref() != Some(expected_state) {
        return Err(AppError::AuthError(
            "Consent redirect carried an unexpected state".to_string(),
        ));
    }
    callback
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::AuthError("Consent redirect carried no code".to_string()))
}
