
use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::rag::{Generator, TokenStream};
use crate::retriever::Embedder;
use crate::{RagError, Result as RagResult};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const TOKEN_CHANNEL_CAPACITY: usize = 32;

/// Blocking HTTP client for a local Ollama server, covering both the
/// embedding and generation endpoints. Async callers go through the
/// [`Embedder`] and [`Generator`] trait implementations, which dispatch
/// onto blocking tasks.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    agent: ureq::Agent,
    generate_agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// One NDJSON line of a streaming generation response
#[derive(Debug, Deserialize)]
struct GenerateStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama
            .base_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            embedding_model: config.ollama.embedding_model.clone(),
            generation_model: config.generation.model.clone(),
            batch_size: config.ollama.batch_size,
            max_tokens: config.generation.max_tokens,
            temperature: config.generation.temperature,
            top_p: config.generation.top_p,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            generate_agent: build_agent(Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generate_agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Test connection to the Ollama server and verify that both
    /// configured models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;
        self.validate_models().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} (embedding: {}, generation: {})",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build ping URL")?;

        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to ping Ollama server")?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured embedding and generation models are
    /// available on the server
    #[inline]
    pub fn validate_models(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;

        for wanted in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| &m.name == wanted) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!("Model {} not found. Available models: {:?}", wanted, available);
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    wanted,
                    available
                ));
            }
        }

        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            prompt: text.to_string(),
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embedding")?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );

        Ok(embed_response.embedding)
    }

    /// Generate embeddings for multiple texts, batched to the configured
    /// batch size. The result is parallel to `texts`.
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let batch_results = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(batch_results);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            // Use the single embedding API for single texts
            return Ok(vec![self.embed_text(&texts[0])?]);
        }

        let request = BatchEmbedRequest {
            model: self.embedding_model.clone(),
            inputs: texts.to_vec(),
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build batch embedding URL")?;

        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate batch embeddings")?;

        let batch_response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if batch_response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                batch_response.embeddings.len()
            ));
        }

        Ok(batch_response.embeddings)
    }

    /// Generate a complete answer for a prompt. A single attempt: a
    /// failed generation is reported, not silently retried.
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generation URL")?;

        let request_json = serde_json::to_string(&self.generate_request(prompt, false))
            .context("Failed to serialize generation request")?;

        debug!("Generating completion (prompt length: {})", prompt.len());

        let response_text = self
            .generate_agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow::anyhow!("Generation request failed: {}", e))?;

        let generate_response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generation response")?;

        Ok(generate_response.response)
    }

    /// Open a streaming generation request. The returned response body is
    /// an NDJSON sequence of incremental chunks.
    fn open_generate_stream(&self, prompt: &str) -> Result<ureq::http::Response<ureq::Body>> {
        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generation URL")?;

        let request_json = serde_json::to_string(&self.generate_request(prompt, true))
            .context("Failed to serialize generation request")?;

        debug!("Opening generation stream (prompt length: {})", prompt.len());

        self.generate_agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| anyhow::anyhow!("Generation request failed: {}", e))
    }

    fn generate_request(&self, prompt: &str, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.generation_model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: GenerateOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
            },
        }
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Read NDJSON generation chunks off the response body and forward the
/// incremental text. Stops as soon as the receiver goes away.
fn forward_generation_stream(
    response: ureq::http::Response<ureq::Body>,
    tx: mpsc::Sender<RagResult<String>>,
) {
    let reader = BufReader::new(response.into_body().into_reader());

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = tx.blocking_send(Err(RagError::Backend(format!(
                    "Generation stream read failed: {}",
                    e
                ))));
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let chunk: GenerateStreamChunk = match serde_json::from_str(&line) {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.blocking_send(Err(RagError::Backend(format!(
                    "Malformed generation stream chunk: {}",
                    e
                ))));
                return;
            }
        };

        if let Some(message) = chunk.error {
            let _ = tx.blocking_send(Err(RagError::Backend(message)));
            return;
        }

        if !chunk.response.is_empty() && tx.blocking_send(Ok(chunk.response)).is_err() {
            // Consumer cancelled the stream
            debug!("Generation stream receiver dropped, stopping read");
            return;
        }

        if chunk.done {
            return;
        }
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.embed_text(&text))
            .await
            .map_err(|e| RagError::Backend(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Backend(format!("{:#}", e)))
    }

    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.embed_texts(&texts))
            .await
            .map_err(|e| RagError::Backend(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Backend(format!("{:#}", e)))
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let client = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || client.complete(&prompt))
            .await
            .map_err(|e| RagError::Backend(format!("Generation task failed: {}", e)))?
            .map_err(|e| RagError::Backend(format!("{:#}", e)))
    }

    async fn generate_stream(&self, prompt: &str) -> RagResult<TokenStream> {
        let client = self.clone();
        let prompt = prompt.to_string();

        // Open the request before returning so an unreachable backend is
        // reported as a backend error rather than a broken stream.
        let response = tokio::task::spawn_blocking(move || client.open_generate_stream(&prompt))
            .await
            .map_err(|e| RagError::Backend(format!("Generation task failed: {}", e)))?
            .map_err(|e| RagError::Backend(format!("{:#}", e)))?;

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || forward_generation_stream(response, tx));

        Ok(TokenStream::new(rx))
    }
}
