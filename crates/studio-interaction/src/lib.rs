//! Network clients against the completion provider.
//!
//! Studio talks to Groq's OpenAI-compatible REST surface: one client
//! dispatches chat completions, the other lists the model catalog. Both
//! share [`GroqConfig`] and normalize provider failures into the typed
//! taxonomies from `studio-core` immediately after each network call.

mod catalog_client;
mod config;
mod dispatcher;

pub use catalog_client::GroqCatalogClient;
pub use config::{DEFAULT_BASE_URL, GroqConfig};
pub use dispatcher::GroqDispatcher;
