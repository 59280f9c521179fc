//! API client for the analyzer's record endpoints

use health_lib::models::{AnalysisRecord, ErrorBody};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid analyzer URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to analyzer failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer; `message` comes from the error body when it parses
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Query for `GET /api/v1/records`
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub predicted_class: Option<u32>,
    pub before_id: Option<i64>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(class) = self.predicted_class {
            pairs.push(("predicted_class", class.to_string()));
        }
        if let Some(before_id) = self.before_id {
            pairs.push(("before_id", before_id.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

/// Read-only client for stored analysis records
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // Without a trailing slash, `join` would drop the last path segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { client, base_url })
    }

    pub async fn list_records(&self, query: &RecordQuery) -> Result<Vec<AnalysisRecord>, ClientError> {
        self.get("api/v1/records", &query.pairs()).await
    }

    pub async fn get_record(&self, id: i64) -> Result<AnalysisRecord, ClientError> {
        self.get(&format!("api/v1/records/{}", id), &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ClientError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })?;

        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
