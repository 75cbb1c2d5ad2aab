//! Model catalog types and the catalog client seam.
//!
//! The catalog is the set of model identifiers the completion provider
//! currently offers. A non-empty catalog must be obtained at least once per
//! session before any turn can be dispatched.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque string identifier naming a backend model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The ordered set of model identifiers offered by the provider.
///
/// Provider order is preserved (the first entry is the default selection);
/// duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<ModelId>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelId>) -> Self {
        let mut deduped: Vec<ModelId> = Vec::with_capacity(models.len());
        for model in models {
            if !deduped.contains(&model) {
                deduped.push(model);
            }
        }
        Self { models: deduped }
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.models.contains(id)
    }

    /// The provider's first model, used as the default selection.
    pub fn first(&self) -> Option<&ModelId> {
        self.models.first()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelId> {
        self.models.iter()
    }
}

/// Errors from the model catalog provider.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Provider credential is missing or was rejected.
    #[error("catalog authentication failed: {0}")]
    Unauthenticated(String),

    /// Transport-level or service failure.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Fetches the list of available model identifiers from the provider.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn list_models(&self) -> Result<ModelCatalog, CatalogError>;
}
