//! The dispatch seam against the completion provider.
//!
//! A dispatch is a single request/response cycle for one new turn. The
//! provider's loosely-shaped failures are normalized into [`DispatchError`]
//! immediately after the network call, so the rest of the pipeline only ever
//! observes this closed taxonomy.

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::ModelId;
use crate::conversation::{AttachmentRef, Turn};

/// Everything the provider needs for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    /// The accumulated turn context, replayed in dialogue order.
    pub prior_turns: &'a [Turn],
    /// The new user text.
    pub text: &'a str,
    /// The model selected for this dispatch.
    pub model: &'a ModelId,
    /// Optional attachment forwarded verbatim to the provider.
    pub attachment: Option<&'a AttachmentRef>,
}

/// Typed dispatch failures.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The model is unknown to the provider or was rejected by it.
    #[error("model rejected by provider: {0}")]
    InvalidModel(String),

    /// Transport-level failure; no response was received.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The provider responded with a non-success status.
    #[error("provider error: {message}")]
    ProviderError {
        status: Option<u16>,
        message: String,
    },

    /// Success status but no usable content in the response.
    #[error("provider returned no usable content")]
    EmptyResponse,
}

impl DispatchError {
    /// Whether a user-initiated retry of the same send is reasonable.
    ///
    /// Only transport failures qualify; everything else needs a different
    /// model, prompt, or provider-side fix first.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}

/// Performs the request/response cycle for one new turn.
///
/// Implementations never retry internally (retry policy belongs to the
/// caller) and must apply one history policy consistently across calls.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest<'_>) -> Result<String, DispatchError>;
}
