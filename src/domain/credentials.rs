use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their real expiry so a
/// request never starts with a token that dies mid-flight.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Persisted OAuth credentials, in Google's "authorized user" file layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty()) && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// True when every requested scope was granted to this token.
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// The client secret JSON downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretFile {
    pub installed: Option<ClientSecret>,
    pub web: Option<ClientSecret>,
}

impl ClientSecretFile {
    pub fn client(&self) -> Option<&ClientSecret> {
        self.installed.as_ref().or(self.web.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
