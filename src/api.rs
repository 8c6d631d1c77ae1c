//! HTTP plumbing and LLM API interaction with exponential backoff retry logic.
//!
//! This module provides:
//! - [`with_backoff`]: retry any fallible async operation with exponential
//!   backoff and jitter, used by every network adapter
//! - [`AskAsync`]: core trait defining async LLM interaction
//! - [`RetryAsk`]: decorator that adds retry logic to any `AskAsync` implementation
//! - [`ChatClient`]: an OpenAI-compatible chat-completions client
//!
//! # Retry Strategy
//!
//! The delay between retries follows this formula:
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```
//! Responses with a 4xx status other than 429 are returned immediately;
//! retrying them cannot succeed.

use rand::{Rng, rng};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("news_relay/", env!("CARGO_PKG_VERSION"));

/// Retry budget shared by all network adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of retry attempts after the first failure.
    pub max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    pub max_delay: StdDuration,
    /// Upper bound of the random delay added to every backoff.
    pub jitter: StdDuration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: StdDuration::from_secs(1),
            max_delay: StdDuration::from_secs(30),
            jitter: StdDuration::from_millis(250),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> StdDuration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        self.delay_for(attempt) + StdDuration::from_millis(jitter)
    }
}

/// A non-success HTTP response, kept so retry logic can inspect the status.
#[derive(Debug)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub body: String,
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.body)
    }
}

impl Error for HttpStatusError {}

impl HttpStatusError {
    /// Turn a non-success response into an error, keeping a body preview.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Self {
            status,
            body: crate::utils::truncate_for_log(&body, 300),
        }
    }

    fn is_retryable(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS || !self.status.is_client_error()
    }
}

fn is_retryable(e: &(dyn Error + 'static)) -> bool {
    match e.downcast_ref::<HttpStatusError>() {
        Some(status) => status.is_retryable(),
        None => true,
    }
}

/// Run `op` until it succeeds or the retry budget in `policy` is spent.
///
/// `label` names the operation in log lines.
pub async fn with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    label: &str,
    mut op: F,
) -> Result<T, Box<dyn Error>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Box<dyn Error>>>,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        let attempt_t0 = Instant::now();
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                let attempt_dt = attempt_t0.elapsed();
                let total_dt = total_t0.elapsed();

                if !is_retryable(e.as_ref()) {
                    warn!(label, attempt, error = %e, "non-retryable failure");
                    return Err(e);
                }

                if attempt > policy.max_retries {
                    error!(
                        label,
                        attempt,
                        max = policy.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        error = %e,
                        "exhausted retries"
                    );
                    return Err(e);
                }

                let delay = policy.jittered(attempt);
                warn!(
                    label,
                    attempt,
                    max = policy.max_retries,
                    elapsed_ms_attempt = attempt_dt.as_millis(),
                    elapsed_ms_total = total_dt.as_millis(),
                    ?delay,
                    error = %e,
                    "attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Build the shared HTTP client with a request timeout.
pub fn http_client(timeout: StdDuration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    policy: BackoffPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ChatClient::new(http, api_base, api_key, model, SYSTEM_PROMPT);
    /// let retry_client = RetryAsk::new(client, BackoffPolicy::default());
    /// ```
    pub fn new(inner: T, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = with_backoff(&self.policy, "ask", move || self.inner.ask(text)).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => info!(elapsed_ms_total = dt.as_millis(), "ask succeeded"),
            Err(e) => error!(elapsed_ms_total = dt.as_millis(), error = %e, "ask failed"),
        }
        res
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client that asks for JSON output.
pub struct ChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        api_key: &str,
        model: &str,
        system_prompt: &str,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            temperature: 0.4,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl AskAsync for ChatClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = HttpStatusError::from_response(resp).await;
            warn!(elapsed_ms = t0.elapsed().as_millis(), error = %err, "API call failed");
            return Err(Box::new(err));
        }

        let parsed = resp.json::<ChatResponse>().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "LLM returned no content".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_retries: usize) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(2),
            jitter: StdDuration::ZERO,
        }
    }

    #[test]
    fn test_delay_for_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), StdDuration::from_secs(1));
        assert_eq!(policy.delay_for(2), StdDuration::from_secs(2));
        assert_eq!(policy.delay_for(4), StdDuration::from_secs(8));
        assert_eq!(policy.delay_for(10), StdDuration::from_secs(30));
        assert_eq!(policy.delay_for(100), StdDuration::from_secs(30));
    }

    #[tokio::test]
    async fn test_with_backoff_recovers() {
        let calls = Cell::new(0);
        let result = with_backoff(&fast_policy(3), "test", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err::<u32, Box<dyn Error>>("transient".into())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_exhausts_budget() {
        let calls = Cell::new(0);
        let result = with_backoff(&fast_policy(2), "test", || {
            calls.set(calls.get() + 1);
            async { Err::<(), Box<dyn Error>>("down".into()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_skips_client_errors() {
        let calls = Cell::new(0);
        let result = with_backoff(&fast_policy(5), "test", || {
            calls.set(calls.get() + 1);
            async {
                Err::<(), Box<dyn Error>>(Box::new(HttpStatusError {
                    status: StatusCode::FORBIDDEN,
                    body: "duplicate content".to_string(),
                }))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_with_backoff_retries_rate_limits() {
        let calls = Cell::new(0);
        let _ = with_backoff(&fast_policy(2), "test", || {
            calls.set(calls.get() + 1);
            async {
                Err::<(), Box<dyn Error>>(Box::new(HttpStatusError {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: String::new(),
                }))
            }
        })
        .await;

        assert_eq!(calls.get(), 3);
    }

    #[derive(Debug)]
    struct FlakyAsk {
        failures: Cell<usize>,
    }

    impl AskAsync for FlakyAsk {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err("flaky".into());
            }
            Ok(format!("echo: {text}"))
        }
    }

    #[tokio::test]
    async fn test_retry_ask_wraps_inner() {
        let api = RetryAsk::new(
            FlakyAsk {
                failures: Cell::new(2),
            },
            fast_policy(3),
        );
        assert_eq!(api.ask("hi").await.unwrap(), "echo: hi");
    }

    #[test]
    fn test_chat_client_debug_redacts_key() {
        let client = ChatClient::new(
            reqwest::Client::new(),
            "https://api.example.com/v1/",
            "sk-secret",
            "gpt-test",
            "system",
        );
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("https://api.example.com/v1\""));
    }
}
