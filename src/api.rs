//! Chat-completions client for the model-assisted classifier.
//!
//! - [`AskAsync`]: one prompt in, one response body out
//! - [`ChatClient`]: OpenAI-compatible `/chat/completions` over `reqwest`,
//!   requesting a JSON object response
//! - [`RetryAsk`]: wraps any [`AskAsync`] with exponential backoff
//!
//! Retries default to [`DEFAULT_MAX_RETRIES`]. The delay doubles from the base
//! delay, is capped at 30 seconds, and gets up to 250ms of random jitter.

use std::fmt;
use std::time::{Duration as StdDuration, Instant};

use rand::{Rng, rng};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::error::PipelineError;
use crate::utils::truncate_for_log;

/// Default number of retries wrapped around every model call.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Trait for async model interaction.
///
/// Implementors send a prompt and receive the model's text response. This
/// abstraction allows different backends, decorators (like retry logic), and
/// in-process stubs for tests.
pub trait AskAsync {
    /// Send a prompt and receive the response text.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The full prompt text
    ///
    /// # Returns
    ///
    /// The model's response body (JSON text when the backend honours the JSON
    /// response format), or an error if the request failed.
    async fn ask(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Arguments
    ///
    /// * `inner` - The underlying client to wrap
    /// * `max_retries` - Maximum number of retry attempts
    /// * `base_delay` - Initial delay between retries
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ChatClient::new(&base_url, api_key, "gpt-4o-mini")?;
    /// let retry_client = RetryAsk::new(client, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<String, PipelineError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(prompt).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
///
/// Every request asks for a JSON object response.
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    /// * `api_key` - Bearer credential
    /// * `model` - Model name sent with every request
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: chat_endpoint(base_url),
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// `<base_url>/chat/completions`, tolerating a trailing slash.
pub fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

impl AskAsync for ChatClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &str) -> Result<String, PipelineError> {
        let t0 = Instant::now();
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| truncate_for_log(&raw, 300));
            warn!(
                elapsed_ms = t0.elapsed().as_millis(),
                %status,
                "API call failed"
            );
            return Err(PipelineError::Classification(format!(
                "model API error ({status}): {message}"
            )));
        }

        let value: Value = serde_json::from_str(&raw)?;
        let content = extract_message_content(&value)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis(),
            response = %truncate_for_log(&content, 400),
            "API call succeeded"
        );
        Ok(content)
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// The first choice's message content of a chat completion response.
pub fn extract_message_content(value: &Value) -> Result<String, PipelineError> {
    let content = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PipelineError::Classification("response has no choices[0].message.content".to_string())
        })?;
    if content.trim().is_empty() {
        return Err(PipelineError::Classification(
            "model returned empty content".to_string(),
        ));
    }
    Ok(content.to_string())
}
