//! Gemini REST client
//!
//! Long-lived reqwest::Client for connection pooling. In-flight requests are
//! bounded by a semaphore; transient failures (429, 5xx, connect/timeout)
//! are retried with exponential backoff.

use crate::config::AnalystConfig;
use crate::error::AnalystError;
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
/// Ceiling for a single retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_base_delay: Duration,
    in_flight: Arc<Semaphore>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            in_flight: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        })
    }

    pub fn from_config(config: &AnalystConfig) -> Result<Self> {
        Ok(Self::new(&config.gemini_api_key, &config.gemini_base_url)?
            .with_retries(config.inference_max_retries, Duration::from_millis(500))
            .with_max_in_flight(config.gemini_max_in_flight))
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_max_in_flight(mut self, permits: usize) -> Self {
        self.in_flight = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    /// `models/{model}:generateContent`
    pub(crate) async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.post(model, "generateContent", request).await
    }

    /// `models/{model}:batchEmbedContents`, one vector per input text
    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let qualified = format!("models/{}", model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: qualified.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part::text(text.clone())],
                    },
                })
                .collect(),
        };

        let response: BatchEmbedResponse = self.post(model, "batchEmbedContents", &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(AnalystError::InferenceError(format!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    async fn post<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        if self.api_key.is_empty() {
            return Err(AnalystError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        let mut attempt = 0;

        loop {
            match self.post_once(&url, body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = backoff_delay(self.retry_base_delay, attempt);
                    warn!(
                        method,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient Gemini failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let _permit = self.in_flight.acquire().await.map_err(|_| {
            AnalystError::InferenceUnavailable("Gemini client is shutting down".to_string())
        })?;

        debug!(url, "Calling Gemini API");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                if e.is_timeout() || e.is_connect() {
                    AnalystError::InferenceUnavailable(format!("Gemini API error: {}", e))
                } else {
                    AnalystError::InferenceError(format!("Gemini API error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            let detail = format!("Gemini API returned {}: {}", status, error_text);
            return Err(if is_transient_status(status) {
                AnalystError::InferenceUnavailable(detail)
            } else {
                AnalystError::InferenceError(detail)
            });
        }

        response.json::<R>().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AnalystError::InferenceError(format!("Gemini parse error: {}", e))
        })
    }
}

/// `base * 2^attempt`, capped at [`MAX_BACKOFF`]
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclarations>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    /// Set on thinking-model reasoning parts; never sent back
    #[serde(default, skip_serializing)]
    pub thought: Option<bool>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FunctionCall {
    /// Backend-issued id; call ids are ours once inside the conversation
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
