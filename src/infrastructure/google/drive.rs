use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{endpoint, http_client, send_checked, DriveApi};
use crate::domain::error::{AppError, Result};

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Serialize)]
struct CreateFileRequest<'a> {
    name: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl DriveClient {
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn create_spreadsheet(&self, name: &str) -> Result<String> {
        let mut url = endpoint(&self.base_url, &["files"])?;
        url.query_pairs_mut().append_pair("fields", "id");

        let response = send_checked(
            self.client
                .post(url)
                .bearer_auth(&self.access_token)
                .json(&CreateFileRequest {
                    name,
                    mime_type: SPREADSHEET_MIME,
                }),
        )
        .await?;

        let file: CreatedFile = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Failed to parse created file: {}", e)))?;

        info!(file_id = %file.id, name, "Created spreadsheet");
        Ok(file.id)
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let url = endpoint(&self.base_url, &["files", file_id])?;
        send_checked(self.client.delete(url).bearer_auth(&self.access_token)).await?;

        info!(file_id, "Deleted file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::stub_server::{RecordedRequest, StubServer};
    use actix_web::HttpResponse;
    use serde_json::json;

    #[test]
    fn test_create_request_body() {
        let body = serde_json::to_value(CreateFileRequest {
            name: "Temporary Spreadsheet",
            mime_type: SPREADSHEET_MIME,
        })
        .unwrap();
        assert_eq!(body["name"], "Temporary Spreadsheet");
        assert_eq!(body["mimeType"], "application/vnd.google-apps.spreadsheet");
    }

    fn fake_drive(req: &RecordedRequest) -> HttpResponse {
        match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/files") => HttpResponse::Ok().json(json!({ "id": "tmp-1" })),
            ("DELETE", "/files/locked") => HttpResponse::Forbidden().json(json!({
                "error": {
                    "code": 403,
                    "message": "The caller does not have permission",
                    "status": "PERMISSION_DENIED"
                }
            })),
            ("DELETE", _) => HttpResponse::NoContent().finish(),
            _ => HttpResponse::NotFound().finish(),
        }
    }

    #[tokio::test]
    async fn test_create_spreadsheet_over_http() {
        let server = StubServer::start(fake_drive);
        let drive = DriveClient::new(&server.base_url, "ya29.test", Duration::from_secs(5)).unwrap();

        let id = drive.create_spreadsheet("Temporary Spreadsheet").await.unwrap();
        assert_eq!(id, "tmp-1");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query, "fields=id");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer ya29.test"));
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["mimeType"], SPREADSHEET_MIME);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_delete_refusal_is_api_error() {
        let server = StubServer::start(fake_drive);
        let drive = DriveClient::new(&server.base_url, "ya29.test", Duration::from_secs(5)).unwrap();

        drive.delete_file("tmp-1").await.unwrap();
        match drive.delete_file("locked").await.unwrap_err() {
            AppError::ApiError { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other}"),
        }

        server.stop().await;
    }
}
