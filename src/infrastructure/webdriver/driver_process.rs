use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::domain::error::{AppError, Result};
use crate::shared::wait::poll_until;

const DEFAULT_PORT: u16 = 9515;

/// A chromedriver child process that lives as long as this value.
pub struct ChromeDriverProcess {
    child: Child,
    url: String,
}

impl ChromeDriverProcess {
    /// Spawns `binary` listening on the port of `webdriver_url` and waits
    /// until its `/status` endpoint reports ready.
    pub async fn spawn(binary: &Path, webdriver_url: &str, timeout: Duration) -> Result<Self> {
        let port = port_of(webdriver_url)?;
        let child = Command::new(binary)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AppError::BrowserError(format!(
                    "Failed to launch chromedriver at {}: {}",
                    binary.display(),
                    e
                ))
            })?;

        info!(pid = child.id(), port, "Started chromedriver");
        let process = Self {
            child,
            url: webdriver_url.trim_end_matches('/').to_string(),
        };
        process.wait_ready(timeout).await?;
        Ok(process)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        let status_url = format!("{}/status", self.url);

        poll_until(
            "waiting for chromedriver to accept sessions",
            timeout,
            Duration::from_millis(200),
            || {
                let request = client.get(&status_url).send();
                async move {
                    // Connection refused just means it is still starting.
                    let Ok(response) = request.await else {
                        return Ok(None);
                    };
                    let Ok(body) = response.json::<Value>().await else {
                        return Ok(None);
                    };
                    Ok(is_ready(&body).then_some(()))
                }
            },
        )
        .await
    }
}

impl Drop for ChromeDriverProcess {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            warn!(error = %err, "Failed to stop chromedriver");
            return;
        }
        let _ = self.child.wait();
        info!("Stopped chromedriver");
    }
}

fn port_of(webdriver_url: &str) -> Result<u16> {
    let url = Url::parse(webdriver_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid WebDriver URL {}: {}", webdriver_url, e)))?;
    Ok(url.port().unwrap_or(DEFAULT_PORT))
}

fn is_ready(status: &Value) -> bool {
    status["value"]["ready"].as_bool().unwrap_or(false)
}
