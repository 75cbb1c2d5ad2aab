//! Provider configuration.
//!
//! Credentials come from the process environment; secret management beyond
//! that is outside this crate's scope.

use std::env;

use studio_core::CatalogError;

/// Default base URL of the Groq OpenAI-compatible API.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Connection settings shared by the dispatcher and the catalog client.
#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
    pub base_url: String,
}

impl GroqConfig {
    /// Creates a configuration with the default base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Loads the configuration from `GROQ_API_KEY` and `GROQ_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` when the API key is missing or blank, the
    /// same failure the provider would report on the first request.
    pub fn from_env() -> Result<Self, CatalogError> {
        let api_key = env::var("GROQ_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CatalogError::Unauthenticated("GROQ_API_KEY is not set".to_string())
            })?;

        let base_url = env::var("GROQ_BASE_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self { api_key, base_url })
    }

    /// Overrides the base URL after construction.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Joins an endpoint path onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
