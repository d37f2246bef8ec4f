use relay::ai::extract::{ChoiceMessage, CompletionBody, CompletionChoice};
use relay::ai::{RawResponse, extract};
use serde_json::json;

fn structured(content: Option<&str>, text: Option<&str>) -> RawResponse {
    RawResponse::Structured(CompletionBody {
        choices: vec![CompletionChoice {
            message: content.map(|c| ChoiceMessage {
                content: Some(c.to_string()),
            }),
            text: text.map(ToString::to_string),
        }],
        ..CompletionBody::default()
    })
}

#[test]
fn test_structured_message_content() {
    assert_eq!(extract(&structured(Some("X"), None)), "X");
}

#[test]
fn test_structured_flat_text() {
    assert_eq!(extract(&structured(None, Some("legacy"))), "legacy");
}

#[test]
fn test_structured_without_choices_uses_flat_fields() {
    let raw = RawResponse::Structured(CompletionBody {
        choices: Vec::new(),
        content: Some("flat content".to_string()),
        text: None,
    });
    assert_eq!(extract(&raw), "flat content");
}

#[test]
fn test_mapping_with_text_choice() {
    let raw = RawResponse::Mapping(json!({"choices": [{"text": "Y"}]}));
    assert_eq!(extract(&raw), "Y");
}

#[test]
fn test_mapping_with_message_content() {
    let raw = RawResponse::Mapping(json!({
        "choices": [{"message": {"role": "assistant", "content": "hello"}}]
    }));
    assert_eq!(extract(&raw), "hello");
}

#[test]
fn test_mapping_with_flat_choice_content() {
    let raw = RawResponse::Mapping(json!({"choices": [{"content": "Z"}]}));
    assert_eq!(extract(&raw), "Z");
}

#[test]
fn test_json_text_is_parsed() {
    let encoded = json!({"choices": [{"text": "Y"}]}).to_string();
    assert_eq!(extract(&RawResponse::Text(encoded)), "Y");
}

#[test]
fn test_plain_text_is_returned_as_is() {
    let raw = RawResponse::Text("just words".to_string());
    assert_eq!(extract(&raw), "just words");
}

#[test]
fn test_unrecognized_value_falls_back_to_its_text() {
    let answer = extract(&RawResponse::Mapping(json!(42)));
    assert_eq!(answer, "42");
}

#[test]
fn test_empty_choices_never_yields_empty_answer() {
    let answer = extract(&RawResponse::Mapping(json!({"choices": []})));
    assert!(!answer.is_empty());
    assert!(answer.contains("choices"));

    let answer = extract(&RawResponse::Text(String::new()));
    assert!(!answer.is_empty());
}

#[test]
fn test_conversions_pick_the_matching_variant() {
    assert!(matches!(
        RawResponse::from(json!({})),
        RawResponse::Mapping(_)
    ));
    assert!(matches!(
        RawResponse::from("{}".to_string()),
        RawResponse::Text(_)
    ));
    assert!(matches!(
        RawResponse::from(CompletionBody::default()),
        RawResponse::Structured(_)
    ));
}
