use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::ReasoningClient;
use crate::config::{GeminiConfig, RequestConfig};
use crate::error::{ReasoningError, ReasoningResult};

/// Client for the Gemini generateContent API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_ms: u64,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &GeminiConfig, request_config: &RequestConfig) -> ReasoningResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ReasoningError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_ms: request_config.timeout_ms,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn generate(&self, prompt: &str, schema_hint: Option<&str>) -> ReasoningResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = GenerateRequest::new(prompt, schema_hint);

        debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ReasoningError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ReasoningError::InvalidCredentials {
                    message: error_body,
                },
                429 => ReasoningError::RateLimited {
                    message: error_body,
                },
                code => ReasoningError::Api {
                    status: code,
                    message: error_body,
                },
            });
        }

        let body: GenerateResponse = response.json().await.map_err(ReasoningError::Http)?;

        let text = body.first_text();
        if text.trim().is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }

        Ok(text)
    }
}

/// Request payload for generateContent
#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// Response payload from generateContent
#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateRequest {
    fn new(prompt: &str, schema_hint: Option<&str>) -> Self {
        // A schema hint means the stage wants machine-parseable output, so ask
        // the model for JSON and restate the expected shape in the prompt.
        let (text, generation_config) = match schema_hint {
            Some(hint) => (
                format!("{}\n\nRespond with JSON matching: {}", prompt, hint),
                Some(GenerationConfig {
                    response_mime_type: "application/json".to_string(),
                }),
            ),
            None => (prompt.to_string(), None),
        };

        Self {
            contents: vec![Content {
                parts: vec![Part { text }],
            }],
            generation_config,
        }
    }
}

impl GenerateResponse {
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}
