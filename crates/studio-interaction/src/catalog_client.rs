//! Model catalog client for the Groq models endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;

use studio_core::{CatalogClient, CatalogError, ModelCatalog, ModelId};

use crate::config::GroqConfig;

/// Catalog client implementation that lists models from the provider.
///
/// Listing doubles as credential verification: a rejected key surfaces as
/// `Unauthenticated` before any conversation work begins.
#[derive(Clone)]
pub struct GroqCatalogClient {
    client: Client,
    config: GroqConfig,
}

impl GroqCatalogClient {
    pub fn new(config: GroqConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CatalogClient for GroqCatalogClient {
    async fn list_models(&self) -> Result<ModelCatalog, CatalogError> {
        let response = self
            .client
            .get(self.config.endpoint("models"))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .send()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            let message = if message.trim().is_empty() {
                format!("provider rejected the API key (status {})", status.as_u16())
            } else {
                message
            };
            return Err(CatalogError::Unauthenticated(message));
        }
        if !status.is_success() {
            return Err(CatalogError::Unavailable(format!(
                "models endpoint returned status {}",
                status.as_u16()
            )));
        }

        let parsed: ModelsResponse = response.json().await.map_err(|err| {
            CatalogError::Unavailable(format!("failed to parse models response: {err}"))
        })?;

        let catalog = ModelCatalog::new(
            parsed
                .data
                .into_iter()
                .map(|descriptor| ModelId::new(descriptor.id))
                .collect(),
        );
        tracing::debug!(models = catalog.len(), "model catalog fetched");
        Ok(catalog)
    }
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelDescriptor>,
}

#[derive(Deserialize)]
struct ModelDescriptor {
    id: String,
}
