//! Error taxonomy for the generation pipeline.
//!
//! The variants of [`GenerationError`] are the only failures a caller ever
//! sees. Provider-level failures ([`ProviderError`], [`MalformedResponse`])
//! stay inside the provider chain and are converted into an advance to the
//! next candidate; only exhaustion of the whole chain surfaces, as
//! [`GenerationError::GenerationUnavailable`].

use crate::quota::{ClassUsage, QuotaClass};

/// Error returned by [`crate::store::DocumentStore`] implementations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document store backend error: {0}")]
    Backend(String),

    #[error("stored record at {key} has an unreadable shape: {reason}")]
    CorruptRecord { key: String, reason: String },
}

/// Failure of a single provider attempt.
///
/// `Transient` failures (rate limiting, server overload) are eligible for
/// the primary provider's single retry; everything else is terminal for the
/// candidate that produced it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider returned retryable status {status}: {message}")]
    Transient { status: u16, message: String },

    #[error("provider request failed: {message}")]
    Permanent { message: String },

    #[error("provider returned an empty completion")]
    EmptyResponse,
}

impl ProviderError {
    /// Classify an HTTP status code: 429 and 5xx are retryable.
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 429 || status >= 500 {
            Self::Transient { status, message }
        } else {
            Self::Permanent { message }
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Raw provider text that could not be parsed into a structured artifact.
///
/// Always caught by the provider chain and converted into an advance to the
/// next candidate; never surfaced to the caller directly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MalformedResponse {
    #[error("completion is not valid JSON: {0}")]
    NotJson(String),

    #[error("completion is missing required field {0:?}")]
    MissingField(&'static str),

    #[error("completion field {0:?} has the wrong shape")]
    WrongShape(&'static str),
}

/// Failure to fetch and reduce the content behind a user-supplied URL.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("failed to fetch url: {0}")]
    Transport(String),

    #[error("url returned status {0}")]
    Status(u16),

    #[error("page content too short or empty after reduction")]
    TooShort,
}

/// Every provider in the chain was exhausted without a validated artifact.
#[derive(Debug, Clone, thiserror::Error)]
#[error("all providers exhausted: {last_error}")]
pub struct AllProvidersExhausted {
    /// Diagnostic from the last candidate that failed.
    pub last_error: String,
}

/// The caller-facing discriminated failure for one generation request.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Bad input shape. Not retryable; the client must fix the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid identity.
    #[error("authentication required")]
    AuthRequired,

    /// A quota class is at its limit. Carries the caller's current usage so
    /// the client can decide whether to offer a manual fallback path.
    #[error("{class} quota exceeded")]
    QuotaExceeded {
        class: QuotaClass,
        usage: Vec<ClassUsage>,
    },

    /// Cache-only probe found nothing. A negative result, not a failure.
    #[error("no cached result")]
    NoCachedResult,

    /// Every provider was exhausted. The quota reservation made before the
    /// attempt is not rolled back: cost is incurred on attempt, not success.
    #[error("generation unavailable: {message}")]
    GenerationUnavailable {
        message: String,
        usage: Vec<ClassUsage>,
    },

    /// Quota state could not be read or written. Fatal: the request cannot
    /// proceed without billing certainty.
    #[error(transparent)]
    Store(#[from] StoreError),
}
