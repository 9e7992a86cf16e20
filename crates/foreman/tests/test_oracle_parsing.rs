//! Oracle adapter: response parsing and the provider round trip

mod common;

use async_trait::async_trait;
use aura_foreman::oracle::parse_decision;
use aura_foreman::{Action, Decision, LlmOracle, Oracle, OracleError, OracleRequest};
use aura_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall, Usage};
use common::{registry_of, StubApprentice};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

fn is_malformed(result: Result<Decision, OracleError>) -> bool {
    matches!(result, Err(OracleError::Malformed { .. }))
}

#[test]
fn test_envelope_action() {
    let decision = parse_decision(&ChatResponse::text(
        r#"{"action": {"capability": "file_reader", "parameters": {"filename": "a.txt"}}}"#,
    ))
    .unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::from_json("file_reader", json!({"filename": "a.txt"})))
    );
}

#[test]
fn test_envelope_final_answer_fenced() {
    let decision = parse_decision(&ChatResponse::text(
        "```json\n{\"final_answer\": \"All done.\"}\n```",
    ))
    .unwrap();
    assert_eq!(decision, Decision::Finish("All done.".to_string()));
}

#[test]
fn test_envelope_aliases_and_thought() {
    let decision = parse_decision(&ChatResponse::text(
        r#"{"thought": "need the file", "action": {"apprentice": "file_reader", "payload": {"filename": "b"}}}"#,
    ))
    .unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::from_json("file_reader", json!({"filename": "b"})))
    );
}

#[test]
fn test_envelope_without_parameters() {
    let decision =
        parse_decision(&ChatResponse::text(r#"{"action": {"capability": "cache_manager"}}"#))
            .unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::from_json("cache_manager", json!({})))
    );
}

#[test]
fn test_malformed_envelopes() {
    for text in [
        "",
        "I think we should read the file.",
        "[1, 2, 3]",
        r#"{"final_answer": "x", "action": {"capability": "a"}}"#,
        r#"{"thought": "hmm"}"#,
        r#"{"final_answer": {"text": "x"}}"#,
        r#"{"action": {"capability": "a", "parameters": [1]}}"#,
        r#"{"action": {"capability": ""}}"#,
        r#"{"action": "file_reader"}"#,
        r#"{"action": {"capability": "a"}, "extra": 1}"#,
        "{not json}",
    ] {
        assert!(
            is_malformed(parse_decision(&ChatResponse::text(text))),
            "should be malformed: {:?}",
            text
        );
    }
}

#[test]
fn test_null_keys_count_as_absent() {
    for text in [
        r#"{"action": null}"#,
        r#"{"final_answer": null}"#,
        r#"{"action": null, "final_answer": null}"#,
    ] {
        match parse_decision(&ChatResponse::text(text)) {
            Err(OracleError::Malformed { detail }) => {
                assert!(detail.contains("neither"), "{}: {}", text, detail)
            }
            other => panic!("{} should be malformed, got {:?}", text, other),
        }
    }

    let decision = parse_decision(&ChatResponse::text(
        r#"{"final_answer": null, "action": {"capability": "file_reader"}}"#,
    ))
    .unwrap();
    assert_eq!(decision, Decision::Act(Action::from_json("file_reader", json!({}))));
}

#[test]
fn test_single_native_tool_call() {
    let decision = parse_decision(&ChatResponse::tool_call(
        "web_searcher",
        json!({"query": "rust"}),
    ))
    .unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::from_json("web_searcher", json!({"query": "rust"})))
    );

    let stringly = parse_decision(&ChatResponse::tool_call(
        "web_searcher",
        json!("{\"query\": \"rust\"}"),
    ))
    .unwrap();
    assert_eq!(stringly, decision);
}

#[test]
fn test_native_final_answer_call() {
    let decision = parse_decision(&ChatResponse::tool_call(
        "final_answer",
        json!({"answer": "42"}),
    ))
    .unwrap();
    assert_eq!(decision, Decision::Finish("42".to_string()));
}

#[test]
fn test_multiple_tool_calls_rejected() {
    let call = |id: &str| ToolCall {
        id: id.to_string(),
        name: "file_reader".to_string(),
        arguments: json!({"filename": "a"}),
    };
    let response = ChatResponse {
        content: None,
        tool_calls: vec![call("1"), call("2")],
        finish_reason: "tool_calls".to_string(),
        usage: Usage::default(),
    };
    assert!(is_malformed(parse_decision(&response)));
}

#[test]
fn test_tool_call_with_non_object_arguments_rejected() {
    assert!(is_malformed(parse_decision(&ChatResponse::tool_call(
        "file_reader",
        json!([1, 2])
    ))));
}

fn request<'a>(notices: &'a [String]) -> OracleRequest<'a> {
    OracleRequest {
        goal: "read a.txt",
        history: &[],
        omitted: 0,
        notices,
    }
}

#[tokio::test]
async fn test_llm_oracle_json_mode_round_trip() {
    let registry = registry_of(vec![Arc::new(StubApprentice::ok("file_reader", json!("")))]);

    let mut provider = MockProvider::new();
    provider
        .expect_default_model()
        .return_const("test-model".to_string());
    provider
        .expect_chat()
        .times(1)
        .withf(|params| {
            params.json_mode
                && params.tools.is_empty()
                && params.model == "test-model"
                && params.messages.len() == 2
                && params.messages[0]
                    .content
                    .as_deref()
                    .map_or(false, |s| s.contains("file_reader"))
                && params.messages[1]
                    .content
                    .as_deref()
                    .map_or(false, |s| s.contains("read a.txt") && s.contains("retry please"))
        })
        .returning(|_| {
            Ok(ChatResponse::text(
                r#"{"action": {"capability": "file_reader", "parameters": {"input": "a.txt"}}}"#,
            ))
        });

    let oracle = LlmOracle::new(provider, &registry);
    let notices = vec!["retry please".to_string()];
    let decision = oracle.next(&request(&notices)).await.unwrap();
    assert_eq!(
        decision,
        Decision::Act(Action::from_json("file_reader", json!({"input": "a.txt"})))
    );
}

#[tokio::test]
async fn test_llm_oracle_native_tools_advertised() {
    let registry = registry_of(vec![Arc::new(StubApprentice::ok("file_reader", json!("")))]);

    let mut provider = MockProvider::new();
    provider
        .expect_default_model()
        .return_const("test-model".to_string());
    provider
        .expect_chat()
        .times(1)
        .withf(|params| {
            !params.json_mode
                && params.tools.len() == 1
                && params.tools[0].function.name == "file_reader"
                && params.model == "override"
        })
        .returning(|_| Ok(ChatResponse::text(r#"{"final_answer": "nothing to do"}"#)));

    let oracle = LlmOracle::new(provider, &registry)
        .with_model("override")
        .with_native_tools(&registry, true);
    let decision = oracle.next(&request(&[])).await.unwrap();
    assert_eq!(decision, Decision::Finish("nothing to do".to_string()));
}

#[tokio::test]
async fn test_llm_oracle_backend_error() {
    let registry = registry_of(vec![Arc::new(StubApprentice::ok("file_reader", json!("")))]);

    let mut provider = MockProvider::new();
    provider
        .expect_default_model()
        .return_const("test-model".to_string());
    provider
        .expect_chat()
        .returning(|_| Err(ProviderError::RateLimited));

    let oracle = LlmOracle::new(provider, &registry);
    let err = oracle.next(&request(&[])).await.unwrap_err();
    assert_eq!(
        err,
        OracleError::Backend {
            detail: "RATE LIMITED".to_string()
        }
    );
}
