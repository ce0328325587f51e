use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{BrowserSession, ChromeLaunchOptions, ElementRef, Locator};
use crate::domain::error::{AppError, Result};

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const NO_SUCH_ELEMENT: &str = "no such element";
const STALE_ELEMENT: &str = "stale element reference";

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

/// Error payload of a failed command.
#[derive(Debug, Clone, Deserialize, PartialEq)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

impl From<WireError> for AppError {
    fn from(err: WireError) -> Self {
        AppError::BrowserError(format!("{}: {}", err.error, err.message))
    }
}

#[derive(Debug, Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// One WebDriver session against a chromedriver endpoint.
pub struct WebDriverClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Starts a Chrome session with the given options.
    pub async fn connect(
        webdriver_url: &str,
        options: &ChromeLaunchOptions,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        let base_url = webdriver_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/session", base_url))
            .json(&options.new_session_body())
            .send()
            .await
            .map_err(|e| {
                AppError::BrowserError(format!(
                    "Cannot reach WebDriver at {}: {}",
                    base_url, e
                ))
            })?;
        let status = response.status();
        let body = response.text().await?;
        let value = parse_response(status, &body)?.map_err(AppError::from)?;
        let session: NewSessionValue = serde_json::from_value(value)?;

        info!(session_id = %session.session_id, headless = options.headless, "Browser session started");

        Ok(Self {
            client,
            base_url,
            session_id: session.session_id,
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    /// Sends one command and separates protocol errors from transport errors.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<std::result::Result<Value, WireError>> {
        let url = self.session_url(path);
        debug!(%method, %url, "WebDriver command");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        parse_response(status, &text)
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        Ok(self.send(method, path, body).await??)
    }

    async fn element_flag(&self, element: &ElementRef, property: &str) -> Result<bool> {
        let path = format!("/element/{}/{}", element.0, property);
        match self.send(Method::GET, &path, None).await? {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(err) if err.error == STALE_ELEMENT => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Splits a WebDriver response into its `value` or its error payload.
fn parse_response(
    status: StatusCode,
    body: &str,
) -> Result<std::result::Result<Value, WireError>> {
    let parsed: WireResponse = serde_json::from_str(body).map_err(|e| {
        AppError::BrowserError(format!(
            "Unreadable WebDriver response ({}): {}: {}",
            status, e, body
        ))
    })?;

    if status.is_success() {
        return Ok(Ok(parsed.value));
    }

    match serde_json::from_value::<WireError>(parsed.value) {
        Ok(err) => Ok(Err(err)),
        Err(_) => Err(AppError::BrowserError(format!(
            "WebDriver request failed ({}): {}",
            status, body
        ))),
    }
}

fn element_from_value(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

#[async_trait]
impl BrowserSession for WebDriverClient {
    async fn goto(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::BrowserError(format!("Unexpected URL value: {}", value)))
    }

    async fn find(&self, locator: &Locator) -> Result<Option<ElementRef>> {
        let (using, selector) = locator.strategy();
        let body = json!({ "using": using, "value": selector });

        match self.send(Method::POST, "/element", Some(body)).await? {
            Ok(value) => element_from_value(&value).map(Some).ok_or_else(|| {
                AppError::BrowserError(format!("Malformed element reference: {}", value))
            }),
            Err(err) if err.error == NO_SUCH_ELEMENT => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        self.element_flag(element, "displayed").await
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        self.element_flag(element, "enabled").await
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        let path = format!("/element/{}/value", element.0);
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
        self.command(
            Method::POST,
            "/window/rect",
            Some(json!({ "width": width, "height": height })),
        )
        .await?;
        Ok(())
    }

    async fn ready_state(&self) -> Result<String> {
        let body = json!({ "script": "return document.readyState;", "args": [] });
        let value = self.command(Method::POST, "/execute/sync", Some(body)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn quit(&self) -> Result<()> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(session_id = %self.session_id, "Browser session closed");
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(session_id = %self.session_id, %status, "Browser session did not close cleanly");
                Err(AppError::BrowserError(format!(
                    "Failed to close session ({}): {}",
                    status, body
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}
