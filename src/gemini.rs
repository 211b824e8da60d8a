//! Gemini API client
//!
//! Implements [`LanguageModel`] over the Gemini REST API. Uses a long-lived
//! reqwest::Client for connection pooling. Transient failures (429, 5xx,
//! transport errors) are retried here so the orchestrator never retries.

use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_ATTEMPTS: u32 = 3;
const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, embedding_model: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            embedding_model,
        })
    }

    async fn generate(&self, prompt: &str, config: GenerationConfig) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: config,
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        let url = format!("{}/{}:generateContent", BASE_URL, self.model);
        let gemini_response: GeminiResponse = self.post_with_retry(&url, &request).await?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                OrchestrationError::LlmError("Empty response from Gemini".to_string())
            })?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini generation complete"
            );
        }

        Ok(answer)
    }

    async fn post_with_retry<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let mut backoff = MIN_BACKOFF;
        let mut attempt = 1;

        loop {
            let outcome = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await;

            let last_error = match outcome {
                Ok(response) if response.status().is_success() => {
                    return response.json::<Resp>().await.map_err(|e| {
                        error!("Failed to parse Gemini response: {}", e);
                        OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();
                    error!(%status, "Gemini API error response: {}", error_text);
                    if !is_transient(status) {
                        return Err(OrchestrationError::LlmError(format!(
                            "Gemini API error ({}): {}",
                            status, error_text
                        )));
                    }
                    format!("status {}", status)
                }
                Err(e) => {
                    error!("Gemini API request failed: {}", e);
                    e.to_string()
                }
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(OrchestrationError::LlmError(format!(
                    "Gemini API unavailable after {} attempts: {}",
                    MAX_ATTEMPTS, last_error
                )));
            }

            warn!(attempt, backoff_secs = backoff.as_secs(), "Retrying Gemini call");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
            attempt += 1;
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn classify_text(&self, prompt: &str) -> Result<String> {
        self.generate(
            prompt,
            GenerationConfig {
                temperature: 0.0,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: 8,
            },
        )
        .await
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.generate(
            prompt,
            GenerationConfig {
                temperature: 0.1,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
        )
        .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let url = format!("{}/{}:embedContent", BASE_URL, self.embedding_model);
        let response: EmbedResponse = self.post_with_retry(&url, &request).await?;
        Ok(response.embedding.values)
    }
}

const SYSTEM_PROMPT: &str = r#"You are a GST compliance assistant working with Indian invoice data.

Guidelines:
- Follow the output format requested in each prompt exactly
- Never invent invoice figures that are not supplied to you
- Use precise regulatory language and cite rules briefly"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}
