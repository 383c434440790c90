//! The `Provider` and `ModelPool` traits -- the adapter interfaces for AI
//! backends.
//!
//! A `Provider` is a single fixed model (the primary, high-quality backend).
//! A `ModelPool` exposes a changing set of interchangeable fallback models
//! discovered per request. Both traits are object-safe so the chain can hold
//! them as `Arc<dyn ...>`.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A text-completion backend with one fixed model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Model identifier used to label artifacts this provider produced
    /// (e.g. "gemini-2.0-flash").
    fn name(&self) -> &str;

    /// Run one completion. Rate limiting and server overload must surface
    /// as [`ProviderError::Transient`]; the chain owns retry policy.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// A pool of interchangeable fallback models.
///
/// Availability changes over time, so the candidate list is fetched per
/// request rather than configured.
#[async_trait]
pub trait ModelPool: Send + Sync {
    /// Pool name for diagnostics (e.g. "openrouter").
    fn name(&self) -> &str;

    /// Discover the currently available candidate models, best first.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;

    /// Run one completion against a specific candidate model.
    async fn complete_with(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;
}

// Compile-time assertions: both traits must be object-safe.
const _: () = {
    fn _assert_provider_object_safe(_: &dyn Provider) {}
    fn _assert_pool_object_safe(_: &dyn ModelPool) {}
};
