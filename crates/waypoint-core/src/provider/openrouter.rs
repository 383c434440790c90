//! OpenRouter adapter -- the fallback pool of free text models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

use super::trait_def::ModelPool;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_REFERER: &str = "https://waypoint.example";

/// Free models known to handle strict-JSON instructions well, tried first
/// when available.
const PREFERRED_MODELS: &[&str] = &[
    "meta-llama/llama-3.1-8b-instruct:free",
    "meta-llama/llama-3.2-3b-instruct:free",
    "mistralai/mistral-7b-instruct:free",
    "google/gemma-2-9b-it:free",
    "qwen/qwen-2.5-7b-instruct:free",
];

/// Minimum context window for a free model to be worth trying.
const MIN_CONTEXT_LENGTH: u32 = 16_000;

/// At most this many candidates per request.
const MAX_CANDIDATES: usize = 5;

/// Client for the OpenRouter models and chat-completions endpoints.
pub struct OpenRouterPool {
    client: Client,
    api_key: String,
    base_url: String,
    referer: String,
}

impl OpenRouterPool {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
        }
    }

    /// Override the endpoint base URL (tests point this at a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ModelPool for OpenRouterPool {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Permanent {
                message: format!("openrouter transport: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("openrouter models http {status}"),
            ));
        }

        let parsed: ModelsResponse =
            response.json().await.map_err(|e| ProviderError::Permanent {
                message: format!("openrouter models unreadable: {e}"),
            })?;

        Ok(select_candidates(&parsed.data))
    }

    async fn complete_with(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
            max_tokens: 8192,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Permanent {
                message: format!("openrouter transport: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect::<String>();
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| ProviderError::Permanent {
                message: format!("openrouter response unreadable: {e}"),
            })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Pick the candidate models to try, preferred list first; when none of the
/// preferred models are available, fall back to any free text model with a
/// usable context window.
fn select_candidates(models: &[ModelInfo]) -> Vec<String> {
    let available: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
    let preferred: Vec<String> = PREFERRED_MODELS
        .iter()
        .filter(|m| available.contains(*m))
        .map(|m| m.to_string())
        .collect();
    if !preferred.is_empty() {
        return preferred;
    }

    models
        .iter()
        .filter(|m| m.is_free() && !m.id.contains("vision"))
        .filter(|m| m.context_length.unwrap_or(0) >= MIN_CONTEXT_LENGTH)
        .map(|m| m.id.clone())
        .take(MAX_CANDIDATES)
        .collect()
}

impl std::fmt::Debug for OpenRouterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterPool")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    id: String,
    #[serde(default)]
    pricing: Option<ModelPricing>,
    #[serde(default)]
    context_length: Option<u32>,
}

/// Prices arrive as decimal strings (e.g. "0", "0.000007").
#[derive(Deserialize)]
struct ModelPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
}

impl ModelInfo {
    fn is_free(&self) -> bool {
        let Some(pricing) = &self.pricing else {
            return false;
        };
        let zero = |p: &Option<String>| {
            p.as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .is_some_and(|v| v == 0.0)
        };
        zero(&pricing.prompt) && zero(&pricing.completion)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, prompt: &str, completion: &str, context: u32) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            pricing: Some(ModelPricing {
                prompt: Some(prompt.to_string()),
                completion: Some(completion.to_string()),
            }),
            context_length: Some(context),
        }
    }

    #[test]
    fn preferred_models_win_when_available() {
        let models = vec![
            model("some/other-model:free", "0", "0", 32_000),
            model("mistralai/mistral-7b-instruct:free", "0", "0", 32_000),
            model("meta-llama/llama-3.1-8b-instruct:free", "0", "0", 128_000),
        ];
        let picked = select_candidates(&models);
        assert_eq!(
            picked,
            vec![
                "meta-llama/llama-3.1-8b-instruct:free",
                "mistralai/mistral-7b-instruct:free",
            ]
        );
    }

    #[test]
    fn falls_back_to_free_models_with_enough_context() {
        let models = vec![
            model("a/free-big:free", "0", "0", 32_000),
            model("b/free-small:free", "0", "0", 8_000),
            model("c/paid", "0.000007", "0.00001", 128_000),
            model("d/free-vision:free", "0", "0", 32_000),
        ];
        let picked = select_candidates(&models);
        assert_eq!(picked, vec!["a/free-big:free"]);
    }

    #[test]
    fn fallback_filter_caps_candidate_count() {
        let models: Vec<ModelInfo> = (0..10)
            .map(|i| model(&format!("m/free-{i}:free"), "0", "0", 32_000))
            .collect();
        assert_eq!(select_candidates(&models).len(), MAX_CANDIDATES);
    }

    #[test]
    fn missing_pricing_is_not_free() {
        let info = ModelInfo {
            id: "x/no-pricing".into(),
            pricing: None,
            context_length: Some(32_000),
        };
        assert!(!info.is_free());
    }

    #[test]
    fn chat_request_wire_shape() {
        let body = ChatRequest {
            model: "m1",
            messages: vec![ChatMessage {
                role: "user",
                content: "prompt",
            }],
            temperature: 0.2,
            max_tokens: 8192,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m1");
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn chat_response_content_extraction() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  {\"a\":1}  "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|t| t.trim().to_string());
        assert_eq!(text.as_deref(), Some("{\"a\":1}"));
    }
}
