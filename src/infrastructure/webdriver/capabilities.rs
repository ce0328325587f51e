use std::path::PathBuf;

use serde_json::{json, Value};

/// Chrome settings for a portal session.
#[derive(Debug, Clone)]
pub struct ChromeLaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    /// Must be absolute; Chrome ignores relative download directories.
    pub download_dir: PathBuf,
}

impl ChromeLaunchOptions {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={}", self.user_agent),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args
    }

    /// Body for `POST /session`.
    pub fn new_session_body(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": self.args(),
                        "prefs": {
                            "download.default_directory": self.download_dir.display().to_string(),
                            "download.prompt_for_download": false,
                            "profile.default_content_settings.popups": 0
                        }
                    }
                }
            }
        })
    }
}
