//! ORACLE LINE: reasoning backend transport
//!
//! Chat-completion nodes the foreman consults for its next move.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thiserror::Error;
use tracing::{debug, trace};

pub mod ollama;
pub mod openrouter;

pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

/// Backend transport errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("LINE DOWN: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GARBLED PAYLOAD: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BACKEND REFUSED: {0}")]
    Api(String),

    #[error("NO API KEY")]
    NoApiKey,

    #[error("EMPTY RESPONSE")]
    InvalidResponse,

    #[error("RATE LIMITED")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Native tool call returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Backend response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_0".to_string(),
                name: name.into(),
                arguments,
            }],
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
        }
    }
}

/// Tool specification advertised to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
    /// Ask the backend to answer with a JSON object
    pub json_mode: bool,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.2,
            tool_choice: ToolChoice::Auto,
            json_mode: false,
        }
    }
}

/// Tool selection mode
#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// A reasoning backend node
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for std::sync::Arc<P> {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        (**self).chat(params).await
    }

    fn default_model(&self) -> String {
        (**self).default_model()
    }

    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }
}

/// Read tool-call arguments that may arrive as a JSON string or as an object
pub(crate) fn decode_arguments(raw: &Value) -> Value {
    match raw.as_str() {
        Some(s) => match serde_json::from_str(s) {
            Ok(v) => v,
            Err(e) => {
                debug!("◆ TOOL ARGUMENTS NOT JSON: {}", e);
                raw.clone()
            }
        },
        None => {
            trace!("◆ TOOL ARGUMENTS ALREADY STRUCTURED");
            raw.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoApiKey.to_string(), "NO API KEY");
        assert_eq!(
            ProviderError::Api("quota".to_string()).to_string(),
            "BACKEND REFUSED: quota"
        );
        assert_eq!(ProviderError::InvalidResponse.to_string(), "EMPTY RESPONSE");
        assert_eq!(ProviderError::RateLimited.to_string(), "RATE LIMITED");
    }

    #[test]
    fn test_chat_response_text_builder() {
        let response = ChatResponse::text("Hello");
        assert_eq!(response.content, Some("Hello".to_string()));
        assert!(!response.has_tool_calls());
        assert_eq!(response.finish_reason, "stop");
    }

    #[test]
    fn test_chat_response_tool_call_builder() {
        let response = ChatResponse::tool_call("file_reader", json!({"filename": "a.txt"}));
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls[0].name, "file_reader");
        assert_eq!(response.tool_calls[0].arguments["filename"], "a.txt");
        assert!(response.content.is_none());
    }

    #[test]
    fn test_message_roles() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::user("u").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
        assert_eq!(Message::user("u").content, Some("u".to_string()));
    }

    #[test]
    fn test_chat_params_default() {
        let params = ChatParams::default();
        assert!(params.model.is_empty());
        assert!(params.messages.is_empty());
        assert_eq!(params.max_tokens, 4096);
        assert!(!params.json_mode);
        assert!(matches!(params.tool_choice, ToolChoice::Auto));
    }

    #[test]
    fn test_tool_serialization() {
        let tool = Tool::new("web_searcher", "Search the web", json!({"type": "object"}));
        let json_str = serde_json::to_string(&tool).unwrap();
        assert!(json_str.contains("\"type\":\"function\""));
        assert!(json_str.contains("\"name\":\"web_searcher\""));
    }

    #[test]
    fn test_decode_arguments_string_and_object() {
        let from_string = decode_arguments(&json!("{\"query\": \"rust\"}"));
        assert_eq!(from_string, json!({"query": "rust"}));

        let from_object = decode_arguments(&json!({"query": "rust"}));
        assert_eq!(from_object, json!({"query": "rust"}));

        let garbage = decode_arguments(&json!("not json"));
        assert_eq!(garbage, json!("not json"));
    }

    #[test]
    fn test_message_deserialization_without_content() {
        let msg: Message = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.role, "assistant");
        assert!(msg.content.is_none());
    }
}
