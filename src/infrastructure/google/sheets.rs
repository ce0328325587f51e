use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{endpoint, http_client, send_checked, SheetsApi, ValueInputOption};
use crate::domain::error::{AppError, Result};
use crate::domain::report::SheetValues;

#[derive(Serialize)]
struct ValueRange<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a SheetValues,
}

#[derive(Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: SheetValues,
}

#[derive(Deserialize)]
struct UpdateValuesResponse {
    #[serde(rename = "updatedCells", default)]
    updated_cells: u64,
}

pub struct SheetsClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SheetsClient {
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<SheetValues> {
        let url = endpoint(
            &self.base_url,
            &["spreadsheets", spreadsheet_id, "values", range],
        )?;

        let response =
            send_checked(self.client.get(url).bearer_auth(&self.access_token)).await?;
        let body: ValueRangeResponse = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Failed to parse value range: {}", e)))?;

        info!(spreadsheet_id, range, rows = body.values.len(), "Read values");
        Ok(body.values)
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &SheetValues,
        input: ValueInputOption,
    ) -> Result<u64> {
        let mut url = endpoint(
            &self.base_url,
            &["spreadsheets", spreadsheet_id, "values", range],
        )?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str());

        let response = send_checked(
            self.client
                .put(url)
                .bearer_auth(&self.access_token)
                .json(&ValueRange {
                    range,
                    major_dimension: "ROWS",
                    values,
                }),
        )
        .await?;
        let body: UpdateValuesResponse = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("Failed to parse update result: {}", e)))?;

        info!(
            spreadsheet_id,
            range,
            updated_cells = body.updated_cells,
            input = input.as_str(),
            "Wrote values"
        );
        Ok(body.updated_cells)
    }
}
