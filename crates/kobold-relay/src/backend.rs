//! Text-generation backends.
//!
//! The [`GenerationBackend`] trait is the seam between the relay and the
//! model server. [`KoboldClient`] implements it for KoboldAI-compatible
//! servers (KoboldAI, koboldcpp, and anything else serving
//! `POST /api/v1/generate`).

use crate::error::{RelayError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Path of the generate endpoint, relative to the backend base URL.
pub const GENERATE_PATH: &str = "/api/v1/generate";

/// Boxed future returned by [`GenerationBackend::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A backend that turns a request body into completion text.
///
/// The body is the prompt merged with the current generation config (see
/// [`GenerationConfig::request_body`](crate::config::GenerationConfig::request_body)).
/// Implementations make a single attempt: no retries. Any failure,
/// including a timeout or an empty result list, is a
/// [`RelayError::Generation`].
///
/// Uses a boxed future so that the trait is dyn-compatible (object-safe).
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, body: Value) -> GenerateFuture<'_>;
}

/// Response shape of `/api/v1/generate`.
#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    results: Vec<GenerateResult>,
}

#[derive(Deserialize, Debug)]
struct GenerateResult {
    text: String,
}

/// Async HTTP client for KoboldAI-compatible generate endpoints.
#[derive(Debug, Clone)]
pub struct KoboldClient {
    client: reqwest::Client,
    generate_url: String,
}

impl KoboldClient {
    /// Create a client for the backend at `endpoint` (e.g. `http://localhost:5000`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kobold-relay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            generate_url: format!("{}{GENERATE_PATH}", endpoint.trim_end_matches('/')),
        })
    }

    pub fn generate_url(&self) -> &str {
        &self.generate_url
    }

    async fn send(&self, body: Value) -> Result<String> {
        let prompt_len = body
            .get("prompt")
            .and_then(Value::as_str)
            .map_or(0, str::len);
        debug!(
            "Generate request: {} bytes of prompt to {}",
            prompt_len, self.generate_url
        );
        trace!("Request payload: {body}");

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.generate_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Generation(format!("request timed out: {e}"))
                } else {
                    RelayError::Generation(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Generation(format!("failed to read response: {e}")))?;

        debug!(
            "Generate response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(RelayError::Generation(format!("backend HTTP {status}: {text}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| RelayError::Generation(format!("failed to parse response: {e}")))?;

        parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.text)
            .ok_or_else(|| RelayError::Generation("backend returned no results".into()))
    }
}

impl GenerationBackend for KoboldClient {
    fn generate(&self, body: Value) -> GenerateFuture<'_> {
        Box::pin(self.send(body))
    }
}
