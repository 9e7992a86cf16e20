//! APPRENTICES: the capability interface and its registry

pub mod filesystem;
pub mod path_utils;
pub mod process;
pub mod system;
pub mod web;

pub use filesystem::{FileManager, FileReader, FileWriter};
pub use process::ProcessManager;
pub use system::CacheManager;
pub use web::{WebFetcher, WebSearcher};

use async_trait::async_trait;
use aura_config::Config;
use aura_provider::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ForemanError;

/// Parameter value types an apprentice can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

/// Name of the JSON type a value actually has
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
}

/// What an apprentice accepts and does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn required(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check bound parameters against the declared schema.
    ///
    /// Optional parameters bound to `null` count as absent.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), String> {
        for spec in &self.params {
            match params.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(format!("missing required parameter '{}'", spec.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(format!(
                        "parameter '{}' expects {}, got {}",
                        spec.name,
                        spec.kind.as_str(),
                        value_type_name(value)
                    ));
                }
                Some(_) => {}
            }
        }

        let mut unknown: Vec<&str> = params
            .keys()
            .filter(|k| self.param(k).is_none())
            .map(|k| k.as_str())
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(format!("unknown parameter(s): {}", unknown.join(", ")));
        }

        Ok(())
    }

    /// JSON-schema rendering advertised to the oracle
    pub fn json_schema(&self) -> Value {
        let mut props = Map::new();
        let mut required = Vec::new();

        for spec in &self.params {
            let mut prop = json!({ "description": spec.description });
            if spec.kind != ParamType::Any {
                prop["type"] = json!(spec.kind.as_str());
            }
            props.insert(spec.name.clone(), prop);
            if spec.required {
                required.push(spec.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }

    /// Compact signature, e.g. `file_writer(filename: string, action?: string)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                format!(
                    "{}{}: {}",
                    p.name,
                    if p.required { "" } else { "?" },
                    p.kind.as_str()
                )
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    pub fn to_tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.json_schema())
    }
}

/// Failure raised inside an apprentice
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CapabilityError {
    pub message: String,
}

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid payload: {}", e))
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(format!("request failed: {}", e))
    }
}

impl From<path_utils::PathValidationError> for CapabilityError {
    fn from(e: path_utils::PathValidationError) -> Self {
        Self::new(e.to_string())
    }
}

/// Per-invocation context handed to an apprentice
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub step: usize,
    /// Fires when the session is cancelled; long-running work should stop
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(step: usize, cancel: CancellationToken) -> Self {
        Self { step, cancel }
    }

    pub fn detached(step: usize) -> Self {
        Self::new(step, CancellationToken::new())
    }
}

/// A self-contained unit of external work
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    async fn invoke(
        &self,
        params: Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// Read a typed payload out of validated parameters
pub fn parse_params<T: serde::de::DeserializeOwned>(
    params: Map<String, Value>,
) -> Result<T, CapabilityError> {
    let cleaned: Map<String, Value> = params.into_iter().filter(|(_, v)| !v.is_null()).collect();
    Ok(serde_json::from_value(Value::Object(cleaned))?)
}

/// Ordered, immutable-after-setup set of apprentices
#[derive(Default)]
pub struct CapabilityRegistry {
    order: Vec<String>,
    entries: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: Capability + 'static>(&mut self, capability: C) -> crate::Result<()> {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) -> crate::Result<()> {
        let name = capability.name().to_string();
        if self.entries.contains_key(&name) {
            return Err(ForemanError::DuplicateCapability(name));
        }
        debug!("◆ APPRENTICE ENLISTED: {}", name);
        self.order.push(name.clone());
        self.entries.insert(name, capability);
        Ok(())
    }

    /// Descriptors in registration order
    pub fn list(&self) -> Vec<&CapabilityDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|c| c.descriptor())
            .collect()
    }

    pub fn lookup(&self, name: &str) -> crate::Result<&CapabilityDescriptor> {
        self.entries
            .get(name)
            .map(|c| c.descriptor())
            .ok_or_else(|| ForemanError::CapabilityNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tool definitions for backends with native tool calling
    pub fn definitions(&self) -> Vec<Tool> {
        self.list().into_iter().map(|d| d.to_tool()).collect()
    }

    /// Every registered apprentice answers to the name it was filed under
    pub fn verify(&self) -> crate::Result<()> {
        if self.order.len() != self.entries.len() {
            return Err(ForemanError::Config(
                "apprentice index out of step with registry".to_string(),
            ));
        }
        for name in &self.order {
            match self.entries.get(name) {
                Some(c) if c.name() == name => {}
                _ => return Err(ForemanError::CapabilityNotFound(name.clone())),
            }
        }
        Ok(())
    }
}

/// Enlist the stock apprentices, confined to the configured workspace
pub fn register_default_apprentices(
    registry: &mut CapabilityRegistry,
    config: &Config,
) -> crate::Result<()> {
    let workspace = config.workspace_path();

    registry.register(FileReader::new(workspace.clone()))?;
    registry.register(FileWriter::new(workspace.clone()))?;
    registry.register(FileManager::new(workspace.clone()))?;
    registry.register(ProcessManager::new(
        workspace,
        config.apprentices.exec.timeout_secs,
    ))?;
    registry.register(WebSearcher::new(
        config.brave_api_key(),
        config.apprentices.web.search.max_results,
    ))?;
    registry.register(WebFetcher::new(config.apprentices.web.fetch.max_chars))?;
    registry.register(CacheManager::new())?;

    Ok(())
}
