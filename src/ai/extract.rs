//! Answer extraction from chat-completion responses.
//!
//! OpenAI-compatible servers hand back the same logical payload in several
//! representations: a decoded SDK response, a JSON document, or raw JSON
//! text. [`extract`] accepts any of them and always yields a string.

use openai_api_rs::v1::chat_completion::ChatCompletionResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const PREVIEW_CHARS: usize = 200;

/// Typed view of a completion body, shared by the SDK and HTTP paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionBody {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl From<ChatCompletionResponse> for CompletionBody {
    fn from(response: ChatCompletionResponse) -> Self {
        let choices = response
            .choices
            .into_iter()
            .map(|choice| CompletionChoice {
                message: Some(ChoiceMessage {
                    content: choice.message.content,
                }),
                text: None,
            })
            .collect();

        Self {
            choices,
            content: None,
            text: None,
        }
    }
}

/// A completion payload in whichever shape the upstream produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Structured(CompletionBody),
    Mapping(Value),
    Text(String),
}

impl From<CompletionBody> for RawResponse {
    fn from(body: CompletionBody) -> Self {
        RawResponse::Structured(body)
    }
}

impl From<Value> for RawResponse {
    fn from(value: Value) -> Self {
        RawResponse::Mapping(value)
    }
}

impl From<String> for RawResponse {
    fn from(text: String) -> Self {
        RawResponse::Text(text)
    }
}

/// Pulls the answer text out of `raw`.
///
/// Never fails: when no known shape matches, the textual form of the
/// response is returned instead.
#[must_use]
pub fn extract(raw: &RawResponse) -> String {
    let found = match raw {
        RawResponse::Structured(body) => from_structured(body).or_else(|| {
            debug!("Typed lookup found no text, retrying as a JSON document");
            serde_json::to_value(body)
                .ok()
                .and_then(|value| from_mapping(&value))
        }),
        RawResponse::Mapping(value) => from_mapping(value),
        RawResponse::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => from_mapping(&value),
            Err(e) => {
                debug!("Response text is not JSON: {}", e);
                None
            }
        },
    };

    found.unwrap_or_else(|| fallback(raw))
}

fn from_structured(body: &CompletionBody) -> Option<String> {
    let choice = body.choices.first()?;
    choice
        .message
        .as_ref()
        .and_then(|m| m.content.clone())
        .or_else(|| choice.text.clone())
}

fn from_mapping(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if !choice.is_object() {
        return None;
    }

    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))
        .or_else(|| choice.get("content").and_then(Value::as_str))
        .map(ToString::to_string)
}

fn fallback(raw: &RawResponse) -> String {
    let text = match raw {
        RawResponse::Structured(body) => body
            .content
            .clone()
            .or_else(|| body.text.clone())
            .unwrap_or_else(|| {
                serde_json::to_string(body).unwrap_or_else(|_| format!("{body:?}"))
            }),
        RawResponse::Mapping(value) => value.to_string(),
        RawResponse::Text(text) => text.clone(),
    };

    warn!(
        preview = %text.chars().take(PREVIEW_CHARS).collect::<String>(),
        "Could not extract an answer the standard way, returning raw response"
    );

    if text.is_empty() {
        "Unable to parse API response: empty body".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_content_wins_over_text() {
        let value = json!({"choices": [{"message": {"content": "A"}, "text": "B"}]});
        assert_eq!(from_mapping(&value).as_deref(), Some("A"));
    }

    #[test]
    fn null_content_falls_back_to_text() {
        let value = json!({"choices": [{"message": {"content": null}, "text": "B"}]});
        assert_eq!(from_mapping(&value).as_deref(), Some("B"));
    }

    #[test]
    fn non_object_choice_is_ignored() {
        assert_eq!(from_mapping(&json!({"choices": ["plain"]})), None);
    }
}
