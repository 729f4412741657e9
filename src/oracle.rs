//! Text-oracle client with per-call timeout and retry logic.
//!
//! Every judgment in the pipeline (link classification, group ranking,
//! keyword extraction, article structuring) goes through one text-completion
//! call against an OpenAI-compatible endpoint.
//!
//! # Architecture
//!
//! - [`Oracle`]: core trait defining the completion call
//! - [`ChatOracle`]: speaks `/chat/completions` over HTTP
//! - [`RetryOracle`]: decorator adding bounded retries with exponential
//!   backoff and jitter to any [`Oracle`] implementation
//!
//! The retry delay follows `min(base_delay * 2^(attempt-1), max_delay)`
//! plus 0-250ms of random jitter.

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{error, instrument, warn};

use crate::config::OracleConfig;
use crate::utils::BoxError;

/// One turn of the conversation sent to the oracle.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for async oracle interaction.
///
/// The pipeline never depends on a response schema beyond "plain text";
/// call-sites parse defensively. The abstraction also lets tests script
/// responses without a network.
pub trait Oracle {
    /// Send a conversation to the oracle and receive its raw text reply.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, BoxError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Oracle backed by an OpenAI-compatible chat-completions endpoint.
pub struct ChatOracle {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatOracle {
    pub fn new(config: &OracleConfig, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.or_else(|| config.api_key.clone()),
        }
    }
}

impl fmt::Debug for ChatOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOracle")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl Oracle for ChatOracle {
    #[instrument(level = "debug", skip_all)]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        call_timeout: Duration,
    ) -> Result<String, BoxError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let mut builder = self.http.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = timeout(call_timeout, builder.send())
            .await
            .map_err(|_| format!("oracle call timed out after {call_timeout:?}"))??;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("oracle API error ({status}): {body}").into());
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err("oracle returned an empty response".into());
        }
        Ok(content)
    }
}

/// Wrapper that adds retry logic to any [`Oracle`] implementation.
pub struct RetryOracle<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: Oracle> RetryOracle<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryOracle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOracle")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Oracle> Oracle for RetryOracle<T> {
    #[instrument(level = "debug", skip_all)]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        call_timeout: Duration,
    ) -> Result<String, BoxError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.complete(messages, temperature, call_timeout).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "complete() exhausted retries"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
