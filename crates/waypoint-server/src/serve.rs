//! The HTTP boundary: JSON endpoints for summary generation and itinerary
//! import, with permissive CORS for the browser clients.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use waypoint_core::artifact::{extract_places, StructuredArtifact};
use waypoint_core::error::GenerationError;
use waypoint_core::orchestrator::{GenerationOutcome, Orchestrator};
use waypoint_core::request::{
    flatten_outline, normalize_catalog_key, ArtifactKind, GenerationRequest, OutlineStop,
};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SummaryBody {
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub steps: Vec<OutlineStop>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub cache_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub cache_only: bool,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/summary", post(generate_summary))
        .route("/api/itinerary", post(import_itinerary))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(orchestrator: Arc<Orchestrator>, bind: &str, port: u16) -> Result<()> {
    let app = build_router(orchestrator);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("waypoint serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("waypoint serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

async fn generate_summary(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    Json(body): Json<SummaryBody>,
) -> axum::response::Response {
    if body.steps.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            Some("steps required"),
            None,
        );
    }

    let mut payload = String::new();
    if let Some(title) = body.title.as_deref().filter(|t| !t.is_empty()) {
        payload.push_str(&format!("\"{title}\"\n"));
    }
    payload.push_str(&flatten_outline(&body.steps));

    let request = GenerationRequest {
        kind: ArtifactKind::Summary,
        primary_key: body.catalog_id.as_deref().map(normalize_catalog_key),
        secondary_key: body.trip_id,
        payload,
        language: body.language.unwrap_or_else(|| "fr".to_string()),
        cache_only: body.cache_only,
    };

    let outcome = orchestrator.handle(bearer_token(&headers), &request).await;
    respond(outcome, false)
}

async fn import_itinerary(
    State(orchestrator): State<Arc<Orchestrator>>,
    headers: HeaderMap,
    Json(body): Json<ImportBody>,
) -> axum::response::Response {
    let request = GenerationRequest {
        kind: ArtifactKind::Itinerary,
        primary_key: None,
        secondary_key: Some(body.url.clone()),
        payload: body.url,
        language: body.language.unwrap_or_else(|| "en".to_string()),
        cache_only: body.cache_only,
    };

    let outcome = orchestrator.handle(bearer_token(&headers), &request).await;
    respond(outcome, true)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

/// Map a generation outcome onto the discriminated wire shape: a `success`
/// flag, a typed error code, and usage figures wherever quota was consulted.
fn respond(
    outcome: Result<GenerationOutcome, GenerationError>,
    with_places: bool,
) -> axum::response::Response {
    match outcome {
        Ok(outcome) => {
            let places = match (&outcome.artifact, with_places) {
                (StructuredArtifact::Itinerary(itinerary), true) => {
                    Some(extract_places(itinerary))
                }
                _ => None,
            };
            let mut body = json!({
                "success": true,
                "data": outcome.artifact,
                "from_cache": outcome.from_cache,
            });
            if let Some(model) = &outcome.model {
                body["model"] = json!(model);
            }
            if let Some(usage) = &outcome.usage {
                body["usage"] = json!(usage);
            }
            if let Some(places) = places {
                body["places"] = json!(places);
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => match e {
            GenerationError::InvalidRequest(message) => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                Some(&message),
                None,
            ),
            GenerationError::AuthRequired => {
                error_response(StatusCode::UNAUTHORIZED, "auth_required", None, None)
            }
            GenerationError::QuotaExceeded { class, usage } => error_response(
                StatusCode::TOO_MANY_REQUESTS,
                &format!("{class}_quota"),
                None,
                Some(&usage),
            ),
            // A cache-only miss is a negative result, not a failure.
            GenerationError::NoCachedResult => {
                error_response(StatusCode::OK, "no_cache", None, None)
            }
            GenerationError::GenerationUnavailable { message, usage } => error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "generation_unavailable",
                Some(&message),
                Some(&usage),
            ),
            GenerationError::Store(e) => {
                tracing::error!(error = %e, "document store failure");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_unavailable",
                    None,
                    None,
                )
            }
        },
    }
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: Option<&str>,
    usage: Option<&[waypoint_core::quota::ClassUsage]>,
) -> axum::response::Response {
    let mut body = json!({"success": false, "error": code});
    if let Some(message) = message {
        body["message"] = json!(message);
    }
    if let Some(usage) = usage {
        body["usage"] = json!(usage);
    }
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use waypoint_core::cache::CacheCascade;
    use waypoint_core::error::{FetchError, ProviderError};
    use waypoint_core::fetch::ContentFetcher;
    use waypoint_core::orchestrator::{Orchestrator, QuotaPolicy};
    use waypoint_core::provider::{ChainConfig, Provider, ProviderChain};
    use waypoint_core::quota::QuotaLedger;
    use waypoint_test_utils::{MemoryStore, StaticVerifier};

    const TOKEN: &str = "test-token";

    struct FixedProvider {
        response: Result<String, ProviderError>,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "test-model"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.response.clone()
        }
    }

    struct FixedFetcher {
        content: String,
    }

    #[async_trait]
    impl ContentFetcher for FixedFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            Ok(self.content.clone())
        }
    }

    fn router_with(store: Arc<MemoryStore>, response: Result<String, ProviderError>) -> axum::Router {
        let verifier = Arc::new(StaticVerifier::new().with_user(
            TOKEN,
            "user-1",
            Some("user@example.com"),
        ));
        let chain = ProviderChain::new(
            Some(Arc::new(FixedProvider { response })),
            None,
            ChainConfig {
                retry_backoff: Duration::from_millis(1),
            },
        );
        let orchestrator = Arc::new(Orchestrator::new(
            verifier,
            CacheCascade::new(store.clone()),
            QuotaLedger::new(store, vec![]),
            chain,
            Arc::new(FixedFetcher {
                content: "Fresselines, Crozant and Aubusson over two days of driving \
                          through the Creuse valley, following the painters."
                    .into(),
            }),
            QuotaPolicy::default(),
        ));
        super::build_router(orchestrator)
    }

    fn summary_json() -> String {
        serde_json::json!({
            "review": ["strengths", "weaknesses", "verdict"],
            "steps": [{"day": 1, "city": "Aubusson", "highlights": "TAPESTRY", "next": ""}],
        })
        .to_string()
    }

    fn itinerary_json() -> String {
        serde_json::json!({
            "itins": [{
                "itin_id": "FR::23::creuse",
                "title": "Creuse",
                "days_plan": [{
                    "day": 1,
                    "night": {"place_id": "FR::fresselines", "coords": [46.38, 1.65]},
                }],
            }],
        })
        .to_string()
    }

    async fn send(
        router: axum::Router,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let response = router
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn summary_body() -> serde_json::Value {
        serde_json::json!({
            "catalog_id": "FR_creuse-valley-fr",
            "trip_id": "trip_9",
            "title": "Painters' Valley",
            "steps": [{"name": "Aubusson", "nights": 1}],
            "language": "en",
        })
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(summary_json()));
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn summary_success_reports_model_and_usage() {
        let store = Arc::new(MemoryStore::new());
        let router = router_with(store.clone(), Ok(summary_json()));

        let (status, body) = send(router, "/api/summary", Some(TOKEN), summary_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["from_cache"], false);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["usage"][0]["class"], "monthly");
        assert_eq!(body["data"]["review"][0], "strengths");
        // The shared key was normalized to its language-agnostic form.
        assert!(store.contains("cache:shared:FR_creuse-valley"));
    }

    #[tokio::test]
    async fn summary_without_steps_is_a_bad_request() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(summary_json()));
        let mut body = summary_body();
        body["steps"] = serde_json::json!([]);

        let (status, response) = send(router, "/api/summary", Some(TOKEN), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], "invalid_request");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(summary_json()));
        let (status, body) = send(router, "/api/summary", None, summary_body()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "auth_required");
    }

    #[tokio::test]
    async fn quota_exhaustion_is_429_with_usage() {
        let store = Arc::new(MemoryStore::new());

        // Exhaust the monthly summary quota (limit 1).
        let router = router_with(store.clone(), Ok(summary_json()));
        send(router, "/api/summary", Some(TOKEN), summary_body()).await;

        // A different catalog id misses the cache and hits the ledger.
        let router = router_with(store, Ok(summary_json()));
        let mut body = summary_body();
        body["catalog_id"] = serde_json::json!("FR_other-route");
        body["trip_id"] = serde_json::json!("trip_10");

        let (status, response) = send(router, "/api/summary", Some(TOKEN), body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response["error"], "monthly_quota");
        assert_eq!(response["usage"][0]["remaining"], 0);
    }

    #[tokio::test]
    async fn cache_only_miss_is_200_negative() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(summary_json()));
        let mut body = summary_body();
        body["cache_only"] = serde_json::json!(true);

        let (status, response) = send(router, "/api/summary", Some(TOKEN), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], false);
        assert_eq!(response["error"], "no_cache");
    }

    #[tokio::test]
    async fn provider_exhaustion_is_503_with_usage() {
        let router = router_with(
            Arc::new(MemoryStore::new()),
            Err(ProviderError::Permanent {
                message: "provider down".into(),
            }),
        );

        let (status, body) = send(router, "/api/summary", Some(TOKEN), summary_body()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "generation_unavailable");
        assert!(body["message"].as_str().unwrap().contains("provider down"));
        assert_eq!(body["usage"][0]["count"], 1);
    }

    #[tokio::test]
    async fn itinerary_import_returns_places() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(itinerary_json()));

        let (status, body) = send(
            router,
            "/api/itinerary",
            Some(TOKEN),
            serde_json::json!({"url": "https://example.com/trip", "language": "en"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["itin_id"], "FR::23::creuse");
        assert_eq!(body["places"][0]["place_id"], "FR::fresselines");
        // Imports charge both the monthly and daily buckets.
        assert_eq!(body["usage"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn itinerary_with_bad_url_is_a_bad_request() {
        let router = router_with(Arc::new(MemoryStore::new()), Ok(itinerary_json()));
        let (status, body) = send(
            router,
            "/api/itinerary",
            Some(TOKEN),
            serde_json::json!({"url": "ftp://example.com/trip"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn second_summary_request_is_served_from_cache() {
        let store = Arc::new(MemoryStore::new());
        let router = router_with(store.clone(), Ok(summary_json()));
        send(router, "/api/summary", Some(TOKEN), summary_body()).await;

        let router = router_with(store, Ok(summary_json()));
        let (status, body) = send(router, "/api/summary", Some(TOKEN), summary_body()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["from_cache"], true);
        assert!(body.get("usage").is_none(), "cache hits report no usage");
    }
}
