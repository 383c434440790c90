//! End-to-end request flow: the only component that knows the full
//! sequence. Authenticate, look up the cache, short-circuit cache-only
//! probes, reserve quota, generate, validate, persist, respond.

use std::sync::Arc;

use crate::cache::CacheCascade;
use crate::error::GenerationError;
use crate::fetch::ContentFetcher;
use crate::identity::{Identity, IdentityVerifier};
use crate::prompt;
use crate::provider::ProviderChain;
use crate::quota::{ClassUsage, QuotaBucket, QuotaClass, QuotaDecision, QuotaLedger};
use crate::request::{ArtifactKind, GenerationRequest};
use crate::artifact::StructuredArtifact;

/// Per-kind quota buckets, monthly checked before daily.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    pub summary: Vec<QuotaBucket>,
    pub import: Vec<QuotaBucket>,
}

impl QuotaPolicy {
    /// The stock limits: one summary per month, thirty imports per month
    /// and five per day.
    pub fn new(summary_monthly: u32, import_monthly: u32, import_daily: u32) -> Self {
        Self {
            summary: vec![QuotaBucket {
                scope: "summary",
                class: QuotaClass::Monthly,
                limit: summary_monthly,
            }],
            import: vec![
                QuotaBucket {
                    scope: "import",
                    class: QuotaClass::Monthly,
                    limit: import_monthly,
                },
                QuotaBucket {
                    scope: "import",
                    class: QuotaClass::Daily,
                    limit: import_daily,
                },
            ],
        }
    }

    fn buckets(&self, kind: ArtifactKind) -> &[QuotaBucket] {
        match kind {
            ArtifactKind::Summary => &self.summary,
            ArtifactKind::Itinerary => &self.import,
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new(1, 30, 5)
    }
}

/// A completed generation: the artifact plus where it came from and what it
/// cost.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: StructuredArtifact,
    pub from_cache: bool,
    /// Model that produced the artifact. `None` only when a cached entry
    /// predates model labeling.
    pub model: Option<String>,
    /// Usage figures, present when quota was consulted (never on a cache
    /// hit).
    pub usage: Option<Vec<ClassUsage>>,
}

/// Composes the ledger, cascade, chain and collaborators into the request
/// flow. One instance serves every request; all state lives in the document
/// store.
pub struct Orchestrator {
    identity: Arc<dyn IdentityVerifier>,
    cache: CacheCascade,
    quota: QuotaLedger,
    chain: ProviderChain,
    fetcher: Arc<dyn ContentFetcher>,
    policy: QuotaPolicy,
}

impl Orchestrator {
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        cache: CacheCascade,
        quota: QuotaLedger,
        chain: ProviderChain,
        fetcher: Arc<dyn ContentFetcher>,
        policy: QuotaPolicy,
    ) -> Self {
        Self {
            identity,
            cache,
            quota,
            chain,
            fetcher,
            policy,
        }
    }

    /// Run one request through the full sequence.
    pub async fn handle(
        &self,
        bearer_token: Option<&str>,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        // 1. Fail fast on bad input.
        request.validate()?;

        // 2. Resolve identity.
        let identity = match bearer_token {
            Some(token) => self
                .identity
                .verify(token)
                .await
                .ok_or(GenerationError::AuthRequired)?,
            None => return Err(GenerationError::AuthRequired),
        };

        // 3. Cache cascade: a hit costs nothing and calls no provider.
        if let Some(hit) = self
            .cache
            .lookup(
                request.kind,
                request.primary_key.as_deref(),
                request.secondary_key.as_deref(),
            )
            .await
        {
            return Ok(GenerationOutcome {
                artifact: hit.entry.artifact,
                from_cache: true,
                model: (!hit.entry.model.is_empty()).then(|| hit.entry.model),
                usage: None,
            });
        }

        // 4. Cache-only probes stop here.
        if request.cache_only {
            return Err(GenerationError::NoCachedResult);
        }

        // 5. Reserve quota. Charged on attempt, not on success.
        let usage = self.reserve_quota(&identity, request.kind).await?;

        // 6. Generate. The reservation above is not rolled back on failure.
        let content = self.resolve_content(request, &usage).await?;
        let prompt = prompt::build_prompt(request.kind, &request.language, &content);
        let generated = match self.chain.generate(&prompt, request.kind).await {
            Ok(generated) => generated,
            Err(e) => {
                return Err(GenerationError::GenerationUnavailable {
                    message: e.last_error,
                    usage,
                });
            }
        };

        // 7. Persist, best-effort.
        self.cache
            .store(
                request.primary_key.as_deref(),
                request.secondary_key.as_deref(),
                &generated.artifact,
                &generated.model,
                &request.language,
            )
            .await;

        // 8. Respond.
        Ok(GenerationOutcome {
            artifact: generated.artifact,
            from_cache: false,
            model: Some(generated.model),
            usage: Some(usage),
        })
    }

    async fn reserve_quota(
        &self,
        identity: &Identity,
        kind: ArtifactKind,
    ) -> Result<Vec<ClassUsage>, GenerationError> {
        let decision = self
            .quota
            .check_and_reserve(
                &identity.user_id,
                identity.email_hint.as_deref(),
                self.policy.buckets(kind),
            )
            .await?;
        match decision {
            QuotaDecision::Allowed { usage } => Ok(usage),
            QuotaDecision::Denied { exhausted, usage } => Err(GenerationError::QuotaExceeded {
                class: exhausted,
                usage,
            }),
        }
    }

    /// Itinerary payloads are URLs whose content must be fetched; summary
    /// payloads are already plain text.
    async fn resolve_content(
        &self,
        request: &GenerationRequest,
        usage: &[ClassUsage],
    ) -> Result<String, GenerationError> {
        match request.kind {
            ArtifactKind::Summary => Ok(request.payload.clone()),
            ArtifactKind::Itinerary => {
                self.fetcher
                    .fetch(request.payload.trim())
                    .await
                    .map_err(|e| GenerationError::GenerationUnavailable {
                        message: e.to_string(),
                        usage: usage.to_vec(),
                    })
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("chain", &self.chain)
            .field("policy", &self.policy)
            .finish()
    }
}
