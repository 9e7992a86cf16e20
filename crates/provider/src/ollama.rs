//! Ollama node
//!
//! Local backend speaking the `/api/chat` protocol.

use crate::*;
use reqwest::Client;
use serde_json::json;

const DEFAULT_BASE: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

/// Local Ollama backend
pub struct OllamaProvider {
    client: Client,
    api_base: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(api_base: Option<String>, default_model: Option<String>) -> Self {
        let api_base = api_base
            .unwrap_or_else(|| DEFAULT_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client: Client::new(),
            api_base,
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> = params
            .messages
            .iter()
            .map(|m| json!({"role": &m.role, "content": m.content.clone().unwrap_or_default()}))
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            }
        });

        if params.json_mode {
            body["format"] = json!("json");
        }

        if !params.tools.is_empty() && !matches!(params.tool_choice, ToolChoice::None) {
            body["tools"] = json!(params.tools);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let message = json
            .get("message")
            .filter(|m| m.is_object())
            .ok_or(ProviderError::InvalidResponse)?;

        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .enumerate()
                    .map(|(i, call)| ToolCall {
                        id: format!("call_{}", i),
                        name: call["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: decode_arguments(&call["function"]["arguments"]),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let prompt_tokens = json["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = json["eval_count"].as_u64().unwrap_or(0) as u32;

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason: json["done_reason"].as_str().unwrap_or("stop").to_string(),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        trace!("◆ CONSULTING LOCAL NODE {}", self.api_base);

        let url = format!("{}/api/chat", self.api_base);
        let body = self.build_request(&params);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"].as_str().unwrap_or("UNKNOWN ERROR").to_string();
            return Err(ProviderError::Api(error));
        }

        debug!("◆ LOCAL NODE ANSWERED");
        self.parse_response(json)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        true
    }
}
