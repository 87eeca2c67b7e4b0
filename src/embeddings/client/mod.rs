
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::{MeetsearchError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Upper bound on request text, in bytes. The service enforces an 8192 token
/// limit; four bytes per token is a conservative ceiling.
const MAX_TEXT_BYTES: usize = 8192 * 4;

/// Client for the embedding service. One text per request; the service
/// returns a normalized vector of the requested dimension.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: Url,
    model: String,
    dimension: u32,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    text: &'a str,
    dimension: u32,
    normalize: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .embedding_url()
            .map_err(|e| MeetsearchError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.embedding.model.clone(),
            dimension: config.embedding.dimension,
            batch_size: config.embedding.batch_size as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Dimension every returned vector is validated against.
    #[inline]
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Check that the embedding service is reachable.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/health")
            .map_err(|e| MeetsearchError::Embedding(format!("Failed to build health URL: {e}")))?;

        debug!("Pinging embedding service at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        debug!("Embedding service is reachable");
        Ok(())
    }

    /// Generate a normalized embedding for a single text.
    ///
    /// Text beyond the service's token budget is truncated before sending.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let truncated = truncate_to_byte_budget(text, MAX_TEXT_BYTES);
        if truncated.len() < text.len() {
            warn!(
                "Truncated embedding input from {} to {} bytes",
                text.len(),
                truncated.len()
            );
        }

        let request = EmbedRequest {
            model: &self.model,
            text: truncated,
            dimension: self.dimension,
            normalize: true,
        };

        let url = self
            .base_url
            .join("/embed")
            .map_err(|e| MeetsearchError::Embedding(format!("Failed to build embed URL: {e}")))?;

        let request_json = serde_json::to_string(&request).map_err(|e| {
            MeetsearchError::Embedding(format!("Failed to serialize embed request: {e}"))
        })?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            MeetsearchError::Embedding(format!("Failed to parse embed response: {e}"))
        })?;

        if embed_response.embedding.len() != self.dimension as usize {
            return Err(MeetsearchError::Embedding(format!(
                "Expected {} dimensions, service returned {}",
                self.dimension,
                embed_response.embedding.len()
            )));
        }

        Ok(embed_response.embedding)
    }

    /// Generate embeddings for multiple texts, processed in configured
    /// batch-size groups. Each text yields its own result so one failure
    /// does not abort its siblings.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let batch_size = usize::max(self.batch_size, 1);
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            debug!("Processing batch of {} texts", batch.len());
            results.extend(batch.iter().map(|text| self.embed(text)));
        }

        results
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
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
                                return Err(MeetsearchError::Embedding(format!(
                                    "Client error: HTTP {status}"
                                )));
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
                        return Err(MeetsearchError::Embedding(format!(
                            "Non-retryable error: {error}"
                        )));
                    }

                    last_error = Some(MeetsearchError::Embedding(format!(
                        "Request error: {error}"
                    )));

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

        Err(last_error.unwrap_or_else(|| {
            MeetsearchError::Embedding("Request failed after retries".to_string())
        }))
    }
}

/// Truncate to at most `budget` bytes without splitting a UTF-8 character.
fn truncate_to_byte_budget(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default()
}
