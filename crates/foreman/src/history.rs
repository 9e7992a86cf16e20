//! Step records and the append-only session history

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StepError;

/// One move proposed by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub capability: String,
    /// Literal values or reference expressions, keyed by parameter name
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Action {
    pub fn new(capability: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            capability: capability.into(),
            parameters,
        }
    }

    /// Build from a JSON object literal; anything else yields no parameters
    pub fn from_json(capability: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(capability, parameters)
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { result: Value },
    Failure { error: StepError },
}

impl Outcome {
    pub fn success(result: Value) -> Self {
        Outcome::Success { result }
    }

    pub fn failure(error: impl Into<StepError>) -> Self {
        Outcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Outcome::Success { result } => Some(result),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(error),
        }
    }

    /// Render the outcome as the text the oracle will read
    pub fn observation(&self, max_chars: usize) -> String {
        let text = match self {
            Outcome::Success { result } => {
                let rendered = match result {
                    Value::String(s) => s.clone(),
                    other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
                };
                format!("SUCCESS: {}", rendered)
            }
            Outcome::Failure { error } => format!("FAILURE ({}): {}", error.label(), error),
        };
        truncate_chars(&text, max_chars)
    }
}

/// Truncate on a char boundary, noting how much was dropped
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}… [truncated {} chars]", kept, total - max_chars)
}

/// One immutable entry of the execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based, contiguous within a session
    pub index: usize,
    pub action: Action,
    /// Absent when reference resolution failed before execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Map<String, Value>>,
    pub outcome: Outcome,
    pub observation: String,
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Goal plus ordered history, owned by one plan loop
#[derive(Debug, Clone)]
pub struct SessionState {
    goal: String,
    steps: Vec<StepRecord>,
}

impl SessionState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: Vec::new(),
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index the next appended record will receive
    pub fn next_index(&self) -> usize {
        self.steps.len() + 1
    }

    /// Append a record; the index is assigned here and nowhere else
    pub fn append(
        &mut self,
        action: Action,
        resolved: Option<Map<String, Value>>,
        outcome: Outcome,
        observation: String,
        started_at: DateTime<Local>,
        duration_ms: u64,
    ) -> &StepRecord {
        let index = self.next_index();
        self.steps.push(StepRecord {
            index,
            action,
            resolved,
            outcome,
            observation,
            started_at,
            duration_ms,
        });
        &self.steps[index - 1]
    }

    /// The tail the oracle sees under a history window, and how many were cut
    pub fn window(&self, window: Option<usize>) -> (&[StepRecord], usize) {
        match window {
            Some(n) if self.steps.len() > n => {
                let omitted = self.steps.len() - n;
                (&self.steps[omitted..], omitted)
            }
            _ => (&self.steps, 0),
        }
    }

    pub fn into_steps(self) -> Vec<StepRecord> {
        self.steps
    }
}
