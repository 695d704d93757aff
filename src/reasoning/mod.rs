//! Reasoning client boundary and the resilient call wrapper.
//!
//! The [`ReasoningClient`] trait is the only interface the pipeline has to the
//! underlying model: a rendered prompt in, free text out, with failures split
//! into transient and permanent classes. [`ResilientCaller`] wraps every call
//! with bounded retry, exponential backoff and tolerant parsing.

mod gemini;
mod resilient;

pub use gemini::GeminiClient;
pub use resilient::{extract_json_block, ResilientCaller};

use async_trait::async_trait;

use crate::error::ReasoningResult;

/// Abstract reasoning capability consumed by the pipeline stages.
///
/// Implementations may fail transiently (network, rate limit, empty response)
/// or permanently (invalid credentials); see
/// [`ReasoningError::is_transient`](crate::error::ReasoningError::is_transient).
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Generate free text for the given prompt.
    ///
    /// `schema_hint` describes the structured shape the caller expects back;
    /// implementations may use it to request JSON output from the model, but
    /// the returned text is not guaranteed to conform.
    async fn generate(&self, prompt: &str, schema_hint: Option<&str>) -> ReasoningResult<String>;
}
