//! Shared fixtures: a scripted oracle and a handful of stub apprentices

#![allow(dead_code)]

use async_trait::async_trait;
use aura_foreman::{
    Action, Capability, CapabilityDescriptor, CapabilityError, CapabilityRegistry, Decision,
    InvocationContext, Oracle, OracleError, OracleRequest, ParamType, StepRecord,
};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the oracle was shown in one round
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub goal: String,
    pub history: Vec<StepRecord>,
    pub omitted: usize,
    pub notices: Vec<String>,
}

/// Replays a fixed list of replies and remembers every request
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Decision, OracleError>>>,
    seen: Mutex<Vec<SeenRequest>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<Decision, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration, script: Vec<Result<Decision, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn next(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        self.seen.lock().unwrap().push(SeenRequest {
            goal: request.goal.to_string(),
            history: request.history.to_vec(),
            omitted: request.omitted,
            notices: request.notices.to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Decision::Finish("script exhausted".to_string())))
    }
}

pub fn act(capability: &str, parameters: Value) -> Result<Decision, OracleError> {
    Ok(Decision::Act(Action::from_json(capability, parameters)))
}

pub fn finish(answer: &str) -> Result<Decision, OracleError> {
    Ok(Decision::Finish(answer.to_string()))
}

pub fn malformed(detail: &str) -> Result<Decision, OracleError> {
    Err(OracleError::malformed(detail))
}

/// Returns a fixed value and records what it was called with
pub struct StubApprentice {
    descriptor: CapabilityDescriptor,
    reply: Result<Value, String>,
    delay: Option<Duration>,
    stop_on_cancel: bool,
    saw_cancel: AtomicBool,
    pub calls: Mutex<Vec<Map<String, Value>>>,
}

impl StubApprentice {
    pub fn ok(name: &str, reply: Value) -> Self {
        Self::build(name, Ok(reply))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::build(name, Err(message.to_string()))
    }

    fn build(name: &str, reply: Result<Value, String>) -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(name, "stub apprentice")
                .optional("input", ParamType::Any, "anything"),
            reply,
            delay: None,
            stop_on_cancel: false,
            saw_cancel: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_descriptor(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Wait on the step's cancel token and reply `"stopped early"` once it fires
    pub fn stopping_on_cancel(mut self) -> Self {
        self.stop_on_cancel = true;
        self
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<Map<String, Value>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Capability for StubApprentice {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(
        &self,
        params: Map<String, Value>,
        ctx: &InvocationContext,
    ) -> Result<Value, CapabilityError> {
        self.calls.lock().unwrap().push(params);
        if self.stop_on_cancel {
            let limit = self.delay.unwrap_or(Duration::from_secs(10));
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    return Ok(Value::String("stopped early".to_string()));
                }
                _ = tokio::time::sleep(limit) => {}
            }
        } else if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(CapabilityError::new)
    }
}

pub fn registry_of(apprentices: Vec<Arc<StubApprentice>>) -> Arc<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    for apprentice in apprentices {
        registry.register_arc(apprentice).unwrap();
    }
    Arc::new(registry)
}
