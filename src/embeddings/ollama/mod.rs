
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Embedder;
use crate::config::OllamaConfig;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

const TAGS_ENDPOINT: &str = "/api/tags";
const EMBED_ENDPOINT: &str = "/api/embed";

/// Blocking client for an Ollama server's embedding API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// What to do after a failed HTTP attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Server-side or transport problem; worth another attempt
    Transient,
    /// The request itself was rejected
    Rejected,
}

fn classify(error: &ureq::Error) -> Failure {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => Failure::Transient,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Failure::Transient,
        _ => Failure::Rejected,
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Invalid Ollama connection settings")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Total attempts per request, at least one
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on each further attempt
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn get_text(&self, url: &Url) -> Result<String> {
        self.with_retry(url, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String> {
        self.with_retry(url, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    /// Check the server answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.ping().context("Ollama server is not reachable")?;
        self.validate_model()
            .context("Configured embedding model is unavailable")?;

        info!("Ollama at {} is serving {}", self.base_url, self.model);
        Ok(())
    }

    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint(TAGS_ENDPOINT)?;
        debug!("Pinging Ollama at {}", url);
        self.get_text(&url)
            .context("Failed to reach Ollama server")
            .map(|_| ())
    }

    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!("Model {} not found among {:?}", self.model, available);
        bail!(
            "Model '{}' is not available. Available models: {:?}",
            self.model,
            available
        )
    }

    /// Models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint(TAGS_ENDPOINT)?;
        let body = self.get_text(&url).context("Failed to fetch models")?;
        let response: ModelsResponse =
            serde_json::from_str(&body).context("Failed to parse models response")?;

        debug!("Server lists {} models", response.models.len());
        Ok(response.models)
    }

    /// Embed `texts` in request batches of `batch_size`, preserving input order
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(EMBED_ENDPOINT)?;
        let batch_count = texts.len().div_ceil(self.batch_size as usize);
        info!(
            "Embedding {} texts with {} in {} requests",
            texts.len(),
            self.model,
            batch_count
        );

        let mut embeddings = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(self.batch_size as usize).enumerate() {
            let vectors = self
                .embed_one_request(&url, batch)
                .with_context(|| format!("Embedding request {}/{} failed", n + 1, batch_count))?;
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    fn embed_one_request(&self, url: &Url, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::to_string(&BatchEmbedRequest {
            model: &self.model,
            inputs: batch,
        })
        .context("Failed to serialize embedding request")?;

        let response: BatchEmbedResponse = serde_json::from_str(&self.post_json(url, &body)?)
            .context("Failed to parse embedding response")?;

        if response.embeddings.len() != batch.len() {
            bail!(
                "Mismatch between request and response counts: {} vs {}",
                batch.len(),
                response.embeddings.len()
            );
        }

        if let Some(position) = response.embeddings.iter().position(Vec::is_empty) {
            bail!("Empty embedding returned for input {} of the batch", position);
        }

        debug!(
            "Received {} vectors of dimension {}",
            response.embeddings.len(),
            response.embeddings.first().map_or(0, Vec::len)
        );
        Ok(response.embeddings)
    }

    /// Run `attempt` until it succeeds, a rejection comes back, or attempts run out
    fn with_retry<F>(&self, url: &Url, mut attempt: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut delay = self.retry_delay;

        for n in 1..=self.retry_attempts {
            let error = match attempt() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if classify(&error) == Failure::Rejected {
                warn!("Request to {} rejected: {}", url, error);
                return Err(anyhow!("Request to {} rejected: {}", url, error));
            }

            warn!(
                "Request to {} failed ({}), attempt {}/{}",
                url, error, n, self.retry_attempts
            );

            if n == self.retry_attempts {
                error!("Giving up on {} after {} attempts", url, n);
                return Err(anyhow!(
                    "Request to {} failed after {} attempts: {}",
                    url,
                    n,
                    error
                ));
            }

            std::thread::sleep(delay);
            delay = delay.saturating_mul(2);
        }

        Err(anyhow!("No request attempts were made to {}", url))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
    }
}
