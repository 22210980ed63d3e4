//! Language model seam.
//!
//! Stages talk to a [`LanguageModel`]; the orchestrator never knows whether
//! replies come from a local Ollama server or the deterministic
//! [`OfflineModel`] used for mock runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use wealthdesk_core::{HttpClient, HttpRequest, ReqwestHttpClient};

use crate::agents::{AgentId, OutputSchema};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";
const OLLAMA_URL_ENV: &str = "WEALTHDESK_OLLAMA_URL";
const MODEL_ENV: &str = "WEALTHDESK_MODEL";

/// Generation can be slow on local hardware; the stage timeout is the real bound.
const GENERATE_TIMEOUT_MS: u64 = 300_000;

pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    pub agent: AgentId,
    pub schema: OutputSchema,
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model transport failed: {0}")]
    Transport(String),

    #[error("model server returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model returned an empty response")]
    Empty,
}

impl ModelError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "model.transport",
            Self::Status { .. } => "model.status",
            Self::Malformed(_) => "model.malformed",
            Self::Empty => "model.empty",
        }
    }
}

pub trait LanguageModel: Send + Sync {
    /// Name recorded in run reports.
    fn name(&self) -> &str;

    fn generate<'a>(&'a self, request: ModelRequest) -> ModelFuture<'a>;
}

/// Ollama `/api/generate` over the core HTTP client.
#[derive(Clone)]
pub struct OllamaModel {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OllamaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OllamaModel {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
        }
    }

    /// Reads `WEALTHDESK_OLLAMA_URL` and `WEALTHDESK_MODEL`, falling back to local defaults.
    pub fn from_env() -> Self {
        let base_url = std::env::var(OLLAMA_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_OLLAMA_URL));
        let model = std::env::var(MODEL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_MODEL));
        Self::new(Arc::new(ReqwestHttpClient::new()), base_url, model)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, request: ModelRequest) -> Result<String, ModelError> {
        let body = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "format": "json",
            "options": { "temperature": 0.2 },
        });
        let http_request =
            HttpRequest::post_json(format!("{}/api/generate", self.base_url), body.to_string())
                .with_timeout_ms(GENERATE_TIMEOUT_MS);

        debug!(agent = %request.agent, model = %self.model, "calling ollama");
        let response = self
            .http_client
            .execute(http_request)
            .await
            .map_err(|error| ModelError::Transport(error.to_string()))?;

        if !response.is_success() {
            return Err(ModelError::Status {
                status: response.status,
                body: truncate(&response.body, 200),
            });
        }

        let reply: GenerateResponse = serde_json::from_str(&response.body)
            .map_err(|error| ModelError::Malformed(error.to_string()))?;
        if reply.response.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(reply.response)
    }
}

impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(&'a self, request: ModelRequest) -> ModelFuture<'a> {
        Box::pin(self.call(request))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Deterministic replies derived from the prompt; never touches the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineModel;

impl OfflineModel {
    fn reply(request: &ModelRequest) -> String {
        let digest = fnv1a(request.agent.as_str().as_bytes()) ^ fnv1a(request.prompt.as_bytes());
        let confidence = 0.55 + (digest % 30) as f64 / 100.0;
        let stance = match request.schema {
            OutputSchema::Synthesis => "recommend",
            OutputSchema::Planning => "neutral",
            OutputSchema::Allocation | OutputSchema::MarketView => match digest % 3 {
                0 => "bullish",
                1 => "neutral",
                _ => "bearish",
            },
        };

        json!({
            "stance": stance,
            "confidence": confidence,
            "reasoning": format!(
                "Offline {} assessment generated without a language model.",
                request.agent.display_name()
            ),
            "recommendations": [format!("Review {} guidance with the client", request.agent.display_name())],
            "risk_factors": ["Offline mode: no model reasoning was performed"],
        })
        .to_string()
    }
}

impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    fn generate<'a>(&'a self, request: ModelRequest) -> ModelFuture<'a> {
        Box::pin(async move { Ok(Self::reply(&request)) })
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use wealthdesk_core::{HttpFuture, HttpMethod, HttpResponse};

    use super::*;
    use crate::signal::{parse_response, Stance};

    struct RecordingClient {
        reply: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl HttpClient for RecordingClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.seen.lock().expect("lock").push(request);
            let reply = self.reply.clone();
            Box::pin(async move { Ok(reply) })
        }
    }

    fn request(agent: AgentId) -> ModelRequest {
        ModelRequest {
            agent,
            schema: agent.descriptor().output_schema,
            system: String::from("You are an advisor."),
            prompt: String::from("{\"client\": {}}"),
        }
    }

    #[tokio::test]
    async fn ollama_posts_generate_request() {
        let client = Arc::new(RecordingClient {
            reply: HttpResponse::ok_json(r#"{"model":"llama3.1","response":"{\"stance\":\"bullish\"}","done":true}"#),
            seen: Mutex::new(Vec::new()),
        });
        let model = OllamaModel::new(client.clone(), "http://ollama.test:11434/", "llama3.1");

        let text = model.generate(request(AgentId::Esg)).await.expect("reply");

        assert_eq!(text, r#"{"stance":"bullish"}"#);
        let seen = client.seen.lock().expect("lock");
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].url, "http://ollama.test:11434/api/generate");
        let body: serde_json::Value =
            serde_json::from_str(seen[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["format"], json!("json"));
        assert_eq!(body["system"], json!("You are an advisor."));
    }

    #[tokio::test]
    async fn ollama_maps_http_failures() {
        let client = Arc::new(RecordingClient {
            reply: HttpResponse {
                status: 500,
                body: String::from("model not loaded"),
            },
            seen: Mutex::new(Vec::new()),
        });
        let model = OllamaModel::new(client, DEFAULT_OLLAMA_URL, DEFAULT_MODEL);

        let error = model.generate(request(AgentId::Esg)).await.expect_err("status");

        assert_eq!(error.code(), "model.status");
    }

    #[tokio::test]
    async fn ollama_rejects_blank_replies() {
        let client = Arc::new(RecordingClient {
            reply: HttpResponse::ok_json(r#"{"response":"   "}"#),
            seen: Mutex::new(Vec::new()),
        });
        let model = OllamaModel::new(client, DEFAULT_OLLAMA_URL, DEFAULT_MODEL);

        assert_eq!(
            model.generate(request(AgentId::Esg)).await,
            Err(ModelError::Empty)
        );
    }

    #[tokio::test]
    async fn offline_replies_are_deterministic_and_parseable() {
        let model = OfflineModel;
        let first = model.generate(request(AgentId::PortfolioManager)).await.expect("reply");
        let second = model.generate(request(AgentId::PortfolioManager)).await.expect("reply");

        assert_eq!(first, second);
        let parsed = parse_response(&first);
        assert_eq!(parsed.payload.stance, Stance::Recommend);
        assert!((0.0..=1.0).contains(&parsed.confidence));
        assert_eq!(parsed.payload.recommendations.len(), 1);
    }
}
