//! Remote history API client.
//!
//! Talks to the four chat-history endpoints exposed by the history service.
//! Every response carries a success flag and either a data payload or an
//! error message; the flag is authoritative, and HTTP status codes are not
//! load-bearing for success/failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use studio_core::{HistoryError, HistoryRecord, HistoryRepository, NewHistoryRecord};

use crate::record_validation::validate_new_record;

/// HTTP-backed implementation of the history repository.
#[derive(Clone)]
pub struct HttpHistoryRepository {
    client: Client,
    base_url: String,
}

impl HttpHistoryRepository {
    /// # Arguments
    ///
    /// * `base_url` - Root of the history API, e.g. `https://host/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/chatHistory", self.base_url)
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/chatHistory/{}", self.base_url, id)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        id: Option<&str>,
    ) -> Result<T, HistoryError> {
        let envelope: ApiEnvelope<T> = response.json().await.map_err(|err| {
            HistoryError::Remote(format!("malformed history API response: {err}"))
        })?;
        envelope.into_result(id)
    }
}

#[async_trait]
impl HistoryRepository for HttpHistoryRepository {
    async fn create(&self, record: NewHistoryRecord) -> Result<HistoryRecord, HistoryError> {
        validate_new_record(&record)?;

        let response = self
            .client
            .post(self.collection_url())
            .json(&record)
            .send()
            .await
            .map_err(|err| HistoryError::Unavailable(err.to_string()))?;
        Self::decode(response, None).await
    }

    async fn get(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        let response = self
            .client
            .get(self.record_url(id))
            .send()
            .await
            .map_err(|err| HistoryError::Unavailable(err.to_string()))?;
        Self::decode(response, Some(id)).await
    }

    async fn list(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|err| HistoryError::Unavailable(err.to_string()))?;
        Self::decode(response, None).await
    }

    async fn delete(&self, id: &str) -> Result<HistoryRecord, HistoryError> {
        let response = self
            .client
            .delete(self.record_url(id))
            .send()
            .await
            .map_err(|err| HistoryError::Unavailable(err.to_string()))?;
        Self::decode(response, Some(id)).await
    }
}

/// The wire envelope shared by every history endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwraps the payload; the success flag decides, not the HTTP status.
    fn into_result(self, id: Option<&str>) -> Result<T, HistoryError> {
        if self.success {
            return self.data.ok_or_else(|| {
                HistoryError::Remote("history API reported success without a payload".to_string())
            });
        }

        let message = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "history API reported failure".to_string());
        tracing::debug!("history API reported failure: {message}");
        if message.to_lowercase().contains("not found") {
            Err(HistoryError::not_found(id.unwrap_or_default()))
        } else {
            Err(HistoryError::Remote(message))
        }
    }
}
