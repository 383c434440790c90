//! The provider chain: ordered attempts across the primary provider and the
//! fallback pool, with retry, fallback and validation policy in one place.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::StructuredArtifact;
use crate::error::{AllProvidersExhausted, ProviderError};
use crate::request::ArtifactKind;
use crate::validate;

use super::trait_def::{ModelPool, Provider};

/// Chain policy knobs.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Fixed wait before the primary provider's single retry.
    pub retry_backoff: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(3),
        }
    }
}

/// A validated artifact labeled with the model that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub artifact: StructuredArtifact,
    pub model: String,
}

/// Attempts AI generation across the ordered provider list.
///
/// Per request: the primary provider gets one attempt plus exactly one retry
/// after a fixed backoff when the failure was transient (rate limiting or
/// overload). Any other failure, including a validation failure of its
/// output, is terminal for the primary. The fallback pool's candidates are
/// then tried once each in discovery order, stopping at the first validated
/// artifact. The chain never retries a candidate that already failed.
pub struct ProviderChain {
    primary: Option<Arc<dyn Provider>>,
    fallback: Option<Arc<dyn ModelPool>>,
    config: ChainConfig,
}

impl ProviderChain {
    pub fn new(
        primary: Option<Arc<dyn Provider>>,
        fallback: Option<Arc<dyn ModelPool>>,
        config: ChainConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
        }
    }

    /// Generate and validate an artifact of `kind`, or exhaust every
    /// candidate.
    pub async fn generate(
        &self,
        prompt: &str,
        kind: ArtifactKind,
    ) -> Result<GeneratedArtifact, AllProvidersExhausted> {
        let mut last_error = "no providers configured".to_string();

        if let Some(primary) = &self.primary {
            match self.try_primary(primary.as_ref(), prompt, kind).await {
                Ok(generated) => return Ok(generated),
                Err(message) => last_error = message,
            }
        }

        if let Some(pool) = &self.fallback {
            if let Some(generated) = self
                .try_pool(pool.as_ref(), prompt, kind, &mut last_error)
                .await
            {
                return Ok(generated);
            }
        }

        tracing::warn!(last_error = %last_error, "provider chain exhausted");
        Err(AllProvidersExhausted { last_error })
    }

    /// One attempt against the primary, plus one retry on a transient
    /// failure. Returns the diagnostic of the last failure on exhaustion.
    async fn try_primary(
        &self,
        primary: &dyn Provider,
        prompt: &str,
        kind: ArtifactKind,
    ) -> Result<GeneratedArtifact, String> {
        let mut retried = false;
        loop {
            tracing::info!(model = %primary.name(), retry = retried, "attempting primary provider");
            match primary.complete(prompt).await {
                Ok(raw) => {
                    return match validate::validate(&raw, kind) {
                        Ok(artifact) => Ok(GeneratedArtifact {
                            artifact,
                            model: primary.name().to_string(),
                        }),
                        Err(e) => {
                            tracing::warn!(
                                model = %primary.name(),
                                error = %e,
                                "primary output failed validation"
                            );
                            Err(format!("{}: {e}", primary.name()))
                        }
                    };
                }
                Err(e) if e.is_transient() && !retried => {
                    tracing::warn!(
                        model = %primary.name(),
                        error = %e,
                        backoff_ms = self.config.retry_backoff.as_millis() as u64,
                        "transient primary failure, retrying once"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    retried = true;
                }
                Err(e) => {
                    tracing::warn!(model = %primary.name(), error = %e, "primary provider failed");
                    return Err(format!("{}: {e}", primary.name()));
                }
            }
        }
    }

    /// Try each discovered candidate once, in discovery order. Discovery
    /// failure means an empty pool, not an error.
    async fn try_pool(
        &self,
        pool: &dyn ModelPool,
        prompt: &str,
        kind: ArtifactKind,
        last_error: &mut String,
    ) -> Option<GeneratedArtifact> {
        let models = match pool.list_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(pool = %pool.name(), error = %e, "model discovery failed");
                *last_error = format!("{} discovery: {e}", pool.name());
                return None;
            }
        };
        if models.is_empty() {
            tracing::warn!(pool = %pool.name(), "no fallback models available");
            *last_error = format!("{}: no models available", pool.name());
            return None;
        }

        tracing::info!(pool = %pool.name(), candidates = models.len(), "trying fallback pool");
        for model in &models {
            match pool.complete_with(model, prompt).await {
                Ok(raw) => match validate::validate(&raw, kind) {
                    Ok(artifact) => {
                        tracing::info!(model = %model, "fallback model succeeded");
                        return Some(GeneratedArtifact {
                            artifact,
                            model: model.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "fallback output failed validation");
                        *last_error = format!("{model}: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "fallback model failed");
                    *last_error = format!("{model}: {e}");
                }
            }
        }
        None
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}
