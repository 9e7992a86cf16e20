//! ORACLE: the reasoning seam
//!
//! The foreman only sees [`Oracle::next`]. [`LlmOracle`] puts a chat
//! backend behind it and is strict about what counts as an answer: one
//! action or one final answer, nothing in between.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

use aura_provider::{ChatParams, ChatResponse, Provider, Tool, ToolChoice};

use crate::capability::CapabilityRegistry;
use crate::history::{Action, StepRecord};
use crate::prompt::PromptBuilder;

/// The oracle's verdict for one reasoning round
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Act(Action),
    Finish(String),
}

/// What the oracle is shown each round
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub goal: &'a str,
    /// Visible tail of the history, in order
    pub history: &'a [StepRecord],
    /// Steps cut from the front by the history window
    pub omitted: usize,
    /// Why earlier rounds produced nothing usable
    pub notices: &'a [String],
}

/// A reasoning round that produced no decision
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleError {
    #[error("◆ MALFORMED PLAN: {detail}")]
    Malformed { detail: String },

    #[error("◆ ORACLE TIMEOUT AFTER {secs}s")]
    Timeout { secs: u64 },

    #[error("◆ ORACLE UNREACHABLE: {detail}")]
    Backend { detail: String },
}

impl OracleError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        OracleError::Malformed {
            detail: detail.into(),
        }
    }
}

/// Maps (goal, history) to the next move
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn next(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError>;
}

#[async_trait]
impl<O: Oracle + ?Sized> Oracle for std::sync::Arc<O> {
    async fn next(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        (**self).next(request).await
    }
}

/// Oracle backed by a chat-completion provider
pub struct LlmOracle<P: Provider> {
    provider: P,
    prompts: PromptBuilder,
    tools: Vec<Tool>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    native_tools: bool,
}

impl<P: Provider> LlmOracle<P> {
    pub fn new(provider: P, registry: &CapabilityRegistry) -> Self {
        let model = provider.default_model();
        Self {
            provider,
            prompts: PromptBuilder::new(registry, false),
            tools: registry.definitions(),
            model,
            max_tokens: 4096,
            temperature: 0.2,
            native_tools: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Advertise apprentices as native tools instead of a JSON envelope
    pub fn with_native_tools(mut self, registry: &CapabilityRegistry, enabled: bool) -> Self {
        self.native_tools = enabled;
        self.prompts = PromptBuilder::new(registry, enabled);
        self
    }

    fn params(&self, request: &OracleRequest<'_>) -> ChatParams {
        ChatParams {
            model: self.model.clone(),
            messages: self.prompts.build_messages(request),
            tools: if self.native_tools {
                self.tools.clone()
            } else {
                Vec::new()
            },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_choice: if self.native_tools {
                ToolChoice::Auto
            } else {
                ToolChoice::None
            },
            json_mode: !self.native_tools,
        }
    }
}

#[async_trait]
impl<P: Provider> Oracle for LlmOracle<P> {
    async fn next(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        debug!(
            "◆ CONSULTING ORACLE: {} visible step(s), {} notice(s)",
            request.history.len(),
            request.notices.len()
        );
        let response = self
            .provider
            .chat(self.params(request))
            .await
            .map_err(|e| OracleError::Backend {
                detail: e.to_string(),
            })?;
        trace!("◆ ORACLE SAID: {:?}", response);
        parse_decision(&response)
    }
}

/// Turn a raw backend response into exactly one decision
pub fn parse_decision(response: &ChatResponse) -> Result<Decision, OracleError> {
    match response.tool_calls.len() {
        0 => {}
        1 => {
            let call = &response.tool_calls[0];
            if call.name == "final_answer" {
                return final_from_arguments(&call.arguments);
            }
            let parameters = arguments_object(&call.arguments)?;
            return Ok(Decision::Act(Action::new(call.name.clone(), parameters)));
        }
        n => {
            return Err(OracleError::malformed(format!(
                "expected one tool call, got {}",
                n
            )))
        }
    }

    let text = response
        .content
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OracleError::malformed("empty response"))?;

    parse_envelope(text)
}

fn arguments_object(arguments: &Value) -> Result<Map<String, Value>, OracleError> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(OracleError::malformed("tool arguments are not a JSON object")),
        },
        _ => Err(OracleError::malformed("tool arguments are not a JSON object")),
    }
}

fn final_from_arguments(arguments: &Value) -> Result<Decision, OracleError> {
    let args = arguments_object(arguments)?;
    match args.get("answer").or_else(|| args.get("final_answer")) {
        Some(Value::String(s)) => Ok(Decision::Finish(s.clone())),
        _ => Err(OracleError::malformed("final_answer call carries no answer text")),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    action: Option<Value>,
    final_answer: Option<Value>,
    #[serde(default, alias = "reasoning")]
    #[allow(dead_code)]
    thought: Option<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionBody {
    #[serde(alias = "apprentice", alias = "tool")]
    capability: String,
    #[serde(default, alias = "payload")]
    parameters: Option<Value>,
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_json(text: &str) -> Result<Value, OracleError> {
    let body = strip_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&body[start..=end])
            .map_err(|e| OracleError::malformed(format!("not valid JSON: {}", e))),
        _ => Err(OracleError::malformed("no JSON object in response")),
    }
}

fn parse_envelope(text: &str) -> Result<Decision, OracleError> {
    let value = extract_json(text)?;
    if !value.is_object() {
        return Err(OracleError::malformed("response is not a JSON object"));
    }
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| OracleError::malformed(format!("bad envelope: {}", e)))?;

    match (envelope.action, envelope.final_answer) {
        (Some(_), Some(_)) => Err(OracleError::malformed(
            "both \"action\" and \"final_answer\" present",
        )),
        (None, None) => Err(OracleError::malformed(
            "neither \"action\" nor \"final_answer\" present",
        )),
        (None, Some(Value::String(answer))) => Ok(Decision::Finish(answer)),
        (None, Some(_)) => Err(OracleError::malformed("\"final_answer\" must be a string")),
        (Some(action), None) => {
            let body: ActionBody = serde_json::from_value(action)
                .map_err(|e| OracleError::malformed(format!("bad action: {}", e)))?;
            if body.capability.trim().is_empty() {
                return Err(OracleError::malformed("action names no capability"));
            }
            let parameters = match body.parameters {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map,
                Some(_) => {
                    return Err(OracleError::malformed(
                        "\"parameters\" must be a JSON object",
                    ))
                }
            };
            Ok(Decision::Act(Action::new(body.capability, parameters)))
        }
    }
}
