//! Chat completion against OpenAI-compatible servers.
//!
//! A completion is obtained by walking an ordered chain of strategies:
//!
//! 1. the `openai-api-rs` client,
//! 2. a raw `POST .../chat/completions`,
//! 3. a legacy `POST .../v1/completions` with a flattened prompt.
//!
//! One walk through the chain is a round. A failed round is retried after a
//! fixed backoff, and each retry starts again from the first strategy.

use async_trait::async_trait;
use openai_api_rs::v1::api::OpenAIClient;
use openai_api_rs::v1::chat_completion::{
    ChatCompletionMessage, ChatCompletionRequest, Content, MessageRole,
};
use openai_api_rs::v1::error::APIError;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{info, warn};

use super::endpoint::chat_completions_url;
use super::extract::{CompletionBody, RawResponse, extract};
use crate::core::models::CompletionRequest;
use crate::errors::RelayError;

pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);
/// Retries after the first round, so three rounds in total.
pub const MAX_RETRIES: usize = 2;
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const LEGACY_MAX_TOKENS: u32 = 2000;
pub const LEGACY_TEMPERATURE: f32 = 0.7;

/// Why a single strategy attempt did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Move on to the next strategy in the chain.
    Skip(String),
    /// Give up on the current round.
    Abort(String),
}

impl AttemptError {
    #[must_use]
    pub fn cause(&self) -> &str {
        match self {
            AttemptError::Skip(cause) | AttemptError::Abort(cause) => cause,
        }
    }
}

/// One way of obtaining a chat completion.
#[async_trait]
pub trait CompletionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, request: &CompletionRequest) -> Result<RawResponse, AttemptError>;
}

/// Calls the endpoint through `openai-api-rs`.
///
/// Failures that mean the client library and the server disagree (the
/// client can't be built, or the body doesn't decode into the SDK types)
/// skip to the next strategy. Anything reported by the remote side ends the
/// round.
#[derive(Debug, Clone)]
pub struct SdkChatStrategy {
    timeout: Duration,
}

impl SdkChatStrategy {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CompletionStrategy for SdkChatStrategy {
    fn name(&self) -> &'static str {
        "sdk"
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<RawResponse, AttemptError> {
        let built = OpenAIClient::builder()
            .with_endpoint(request.base_url.clone())
            .with_api_key(request.api_key.clone())
            .with_timeout(self.timeout.as_secs())
            .build()
            .map_err(|e| e.to_string());

        let mut client = match built {
            Ok(client) => client,
            Err(e) => {
                return Err(AttemptError::Skip(format!(
                    "Failed to create OpenAI client: {e}"
                )));
            }
        };

        let sdk_request = ChatCompletionRequest::new(
            request.model.clone(),
            vec![
                sdk_message(MessageRole::system, &request.system_prompt),
                sdk_message(MessageRole::user, &request.user_prompt),
            ],
        );

        match client.chat_completion(sdk_request).await {
            Ok(response) => Ok(RawResponse::Structured(CompletionBody::from(response))),
            Err(e) => {
                let incompatible = is_client_incompatibility(&e);
                let cause = RelayError::from(e).to_string();
                if incompatible {
                    Err(AttemptError::Skip(cause))
                } else {
                    Err(AttemptError::Abort(cause))
                }
            }
        }
    }
}

fn sdk_message(role: MessageRole, text: &str) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Content::Text(text.to_string()),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Prefix the SDK gives a success body that doesn't fit its response types.
const SDK_DECODE_PREFIX: &str = "Failed to parse JSON";

/// True only when the server answered with success and the SDK couldn't
/// decode the body. A non-success status is reported as `"{status}: {body}"`
/// and is the remote side's answer, whatever the body says.
fn is_client_incompatibility(error: &APIError) -> bool {
    match error {
        APIError::CustomError { message } => message.starts_with(SDK_DECODE_PREFIX),
        APIError::ReqwestError(e) => e.is_decode(),
    }
}

/// Posts the chat payload straight to `.../chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsHttpStrategy {
    http: Client,
    timeout: Duration,
}

impl ChatCompletionsHttpStrategy {
    #[must_use]
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl CompletionStrategy for ChatCompletionsHttpStrategy {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<RawResponse, AttemptError> {
        let url = chat_completions_url(&request.base_url);
        let payload = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ]
        });

        post_json(&self.http, &url, &request.api_key, &payload, self.timeout)
            .await
            .map(RawResponse::Mapping)
            .map_err(AttemptError::Skip)
    }
}

/// Falls back to the pre-chat `/v1/completions` API.
#[derive(Debug, Clone)]
pub struct LegacyCompletionsStrategy {
    http: Client,
    timeout: Duration,
}

impl LegacyCompletionsStrategy {
    #[must_use]
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl CompletionStrategy for LegacyCompletionsStrategy {
    fn name(&self) -> &'static str {
        "legacy-completions"
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<RawResponse, AttemptError> {
        let url = format!("{}/v1/completions", request.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": request.model,
            "prompt": flatten_prompt(&request.system_prompt, &request.user_prompt),
            "max_tokens": LEGACY_MAX_TOKENS,
            "temperature": LEGACY_TEMPERATURE,
        });

        post_json(&self.http, &url, &request.api_key, &payload, self.timeout)
            .await
            .map(RawResponse::Mapping)
            .map_err(AttemptError::Abort)
    }
}

/// Folds the system and user turns into a single completion prompt.
#[must_use]
pub fn flatten_prompt(system_prompt: &str, user_prompt: &str) -> String {
    format!("系统: {system_prompt}\n\n用户: {user_prompt}")
}

async fn post_json(
    http: &Client,
    url: &str,
    api_key: &str,
    payload: &Value,
    timeout: Duration,
) -> Result<Value, String> {
    #[cfg(feature = "debug-logs")]
    info!(url = %url, "Request payload: {}", payload);

    #[cfg(not(feature = "debug-logs"))]
    info!(url = %url, "Posting completion request");

    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(payload)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| RelayError::from(e).to_string())?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_else(|e| {
            format!("Failed to read error response body (status {status}): {e}")
        });
        return Err(format!("API returned status {status}: {body}"));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| format!("Failed to parse response from {url}: {e}"))
}

/// Drives the strategy chain and the round retry policy.
pub struct CompletionInvoker {
    strategies: Vec<Box<dyn CompletionStrategy>>,
    max_retries: usize,
    backoff: Duration,
}

impl std::fmt::Debug for CompletionInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionInvoker")
            .field("strategies", &self.strategy_names())
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl CompletionInvoker {
    /// The standard SDK, chat-completions, legacy-completions chain.
    #[must_use]
    pub fn new(http: Client) -> Self {
        Self::with_strategies(vec![
            Box::new(SdkChatStrategy::new(COMPLETION_TIMEOUT)),
            Box::new(ChatCompletionsHttpStrategy::new(
                http.clone(),
                COMPLETION_TIMEOUT,
            )),
            Box::new(LegacyCompletionsStrategy::new(http, COMPLETION_TIMEOUT)),
        ])
    }

    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn CompletionStrategy>>) -> Self {
        Self {
            strategies,
            max_retries: MAX_RETRIES,
            backoff: RETRY_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Obtains a completion and extracts its answer text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Completion`] carrying the last round's cause once
    /// every round has failed.
    #[tracing::instrument(level = "info", skip_all, fields(model = %request.model, base_url = %request.base_url))]
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, RelayError> {
        let started = Instant::now();
        let retry_strategy = FixedInterval::new(self.backoff).take(self.max_retries);
        let total_rounds = self.max_retries + 1;
        let mut round = 0;

        let raw = Retry::spawn(retry_strategy, move || {
            round += 1;
            self.run_round(request, round, total_rounds)
        })
        .await
        .map_err(|cause| {
            warn!("All completion rounds failed: {}", cause);
            RelayError::Completion(cause)
        })?;

        info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Completion succeeded"
        );
        Ok(extract(&raw))
    }

    async fn run_round(
        &self,
        request: &CompletionRequest,
        round: usize,
        total_rounds: usize,
    ) -> Result<RawResponse, String> {
        let mut last_cause = String::from("No completion strategies configured");

        for strategy in &self.strategies {
            info!(strategy = strategy.name(), round, "Trying completion strategy");
            match strategy.attempt(request).await {
                Ok(raw) => {
                    info!(strategy = strategy.name(), round, "Completion strategy succeeded");
                    return Ok(raw);
                }
                Err(AttemptError::Skip(cause)) => {
                    warn!(strategy = strategy.name(), round, "Strategy failed, trying next: {}", cause);
                    last_cause = cause;
                }
                Err(AttemptError::Abort(cause)) => {
                    last_cause = cause;
                    break;
                }
            }
        }

        warn!(round, total_rounds, "Completion round failed: {}", last_cause);
        Err(last_cause)
    }
}
