use crate::core::config::{DEFAULT_BASE_URL, StoredConfig};
use crate::core::models::{ChatRequest, CompletionRequest, TestApiRequest};
use crate::errors::RelayError;

/// System prompt used when the caller doesn't send one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "假如你是一名资深简历提升官，请使用STAR+改写简历，并且最后提供完整输出，帮助更多应届大学生顺利找到他们的工作 输出限制： 1.请不要使用任何表情符号 2.请在一个自然段内完整输出 3.请不要过度夸大，请符合岗位实际 4.语言请说人话，平白直叙，拒绝任何行业黑话";

fn provided(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Merges a chat request with the stored defaults and validates the result.
///
/// Caller fields win over stored ones; a field sent as an empty string
/// counts as not sent.
///
/// # Errors
///
/// Returns [`RelayError::Configuration`] when the question, API key or model
/// is missing, or the base URL is not http(s).
pub fn build_completion_request(
    body: ChatRequest,
    defaults: &StoredConfig,
) -> Result<CompletionRequest, RelayError> {
    let user_prompt = provided(body.question)
        .ok_or_else(|| RelayError::Configuration("question must not be empty".to_string()))?;

    let api_key = provided(body.api_key)
        .or_else(|| defaults.api_key.clone().filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            RelayError::Configuration(
                "No API key configured; set one in the configuration first".to_string(),
            )
        })?;

    let base_url = provided(body.base_url).unwrap_or_else(|| defaults.base_url.clone());
    validate_base_url(&base_url)?;

    let model = provided(body.model)
        .or_else(|| Some(defaults.model.clone()).filter(|m| !m.is_empty()))
        .ok_or_else(|| RelayError::Configuration("model must not be empty".to_string()))?;

    let system_prompt =
        provided(body.system_prompt).unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    Ok(CompletionRequest {
        model,
        system_prompt,
        user_prompt,
        api_key,
        base_url,
    })
}

/// Validates a `/test_api` body, returning `(base_url, api_key)`.
///
/// # Errors
///
/// Returns [`RelayError::Configuration`] when the key is missing or the base
/// URL is not http(s).
pub fn parse_test_request(body: TestApiRequest) -> Result<(String, String), RelayError> {
    let api_key = provided(body.api_key)
        .ok_or_else(|| RelayError::Configuration("No API key provided".to_string()))?;
    let base_url = provided(body.base_url).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    validate_base_url(&base_url)?;
    Ok((base_url, api_key))
}

/// # Errors
///
/// Returns [`RelayError::Configuration`] unless the URL starts with
/// `http://` or `https://`.
pub fn validate_base_url(base_url: &str) -> Result<(), RelayError> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(())
    } else {
        Err(RelayError::Configuration(
            "API address must start with http:// or https://".to_string(),
        ))
    }
}
