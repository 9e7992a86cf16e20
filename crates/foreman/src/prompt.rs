//! Prompt assembly for the reasoning backend

use chrono::Local;
use serde_json::Value;

use aura_provider::Message;

use crate::capability::{CapabilityDescriptor, CapabilityRegistry};
use crate::history::StepRecord;
use crate::oracle::OracleRequest;

/// Builds the system prompt and the per-round user message
pub struct PromptBuilder {
    capabilities: Vec<CapabilityDescriptor>,
    native_tools: bool,
}

impl PromptBuilder {
    pub fn new(registry: &CapabilityRegistry, native_tools: bool) -> Self {
        Self {
            capabilities: registry.list().into_iter().cloned().collect(),
            native_tools,
        }
    }

    pub fn system_prompt(&self) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!(
            r#"# aura foreman

You are the foreman of a workshop. You reach a goal by directing apprentices,
one at a time. After every step you see what happened, good or bad, and choose
the next move. A failed step is information: retry it differently, pick
another apprentice, or finish with what you know.

## Current Time
{now}

## Apprentices
{apprentices}

## Using earlier results
A parameter may point at the result of an earlier successful step instead of
repeating it. Either write the whole value as a string:

    "output of step 1, index 0, key 'href'"

or as an object:

    {{"$ref": {{"step": 1, "path": [0, "href"]}}}}

Indexes select from lists (starting at 0), keys select from objects. Only
steps that succeeded can be referenced.

## Response
{contract}"#,
            now = now,
            apprentices = self.render_capabilities(),
            contract = self.contract(),
        )
    }

    fn render_capabilities(&self) -> String {
        self.capabilities
            .iter()
            .map(|d| {
                let mut block = format!("- `{}`: {}", d.signature(), d.description);
                for p in &d.params {
                    block.push_str(&format!(
                        "\n    - {}{}: {}",
                        p.name,
                        if p.required { "" } else { " (optional)" },
                        p.description
                    ));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn contract(&self) -> &'static str {
        if self.native_tools {
            r#"Call exactly one apprentice tool per reply. When the goal is met, do not
call a tool; reply with a JSON object instead:

    {"final_answer": "<answer for the user>"}"#
        } else {
            r#"Reply with exactly one JSON object and nothing else. Either run a step:

    {"action": {"capability": "<apprentice>", "parameters": {...}}}

or finish:

    {"final_answer": "<answer for the user>"}

Never include both keys."#
        }
    }

    /// The goal, the visible history and any notices from failed rounds
    pub fn user_message(&self, request: &OracleRequest<'_>) -> String {
        let mut out = format!("# Goal\n{}\n\n# History\n", request.goal);

        if request.history.is_empty() && request.omitted == 0 {
            out.push_str("No steps taken yet.\n");
        }
        if request.omitted > 0 {
            out.push_str(&format!(
                "({} earlier step(s) omitted; they can still be referenced by number.)\n",
                request.omitted
            ));
        }
        for record in request.history {
            out.push('\n');
            out.push_str(&render_step(record));
        }

        if !request.notices.is_empty() {
            out.push_str("\n# Notices\n");
            for notice in request.notices {
                out.push_str(&format!("- {}\n", notice));
            }
        }

        out.push_str("\nDecide the next move.");
        out
    }

    pub fn build_messages(&self, request: &OracleRequest<'_>) -> Vec<Message> {
        vec![
            Message::system(self.system_prompt()),
            Message::user(self.user_message(request)),
        ]
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

fn render_step(record: &StepRecord) -> String {
    let mut block = format!(
        "## Step {}\napprentice: {}\nparameters: {}\n",
        record.index,
        record.action.capability,
        compact(&Value::Object(record.action.parameters.clone()))
    );
    if let Some(resolved) = &record.resolved {
        if resolved != &record.action.parameters {
            block.push_str(&format!(
                "resolved: {}\n",
                compact(&Value::Object(resolved.clone()))
            ));
        }
    }
    block.push_str(&format!("observation: {}\n", record.observation));
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        Capability, CapabilityError, InvocationContext, ParamType,
    };
    use crate::error::StepError;
    use crate::history::{Action, Outcome, SessionState};
    use async_trait::async_trait;
    use serde_json::{json, Map};

    struct Echo(CapabilityDescriptor);

    #[async_trait]
    impl Capability for Echo {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.0
        }
        async fn invoke(
            &self,
            params: Map<String, Value>,
            _ctx: &InvocationContext,
        ) -> Result<Value, CapabilityError> {
            Ok(Value::Object(params))
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(Echo(
                CapabilityDescriptor::new("echo", "Repeat parameters")
                    .required("text", ParamType::String, "What to say"),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_system_prompt_lists_apprentices_and_contract() {
        let builder = PromptBuilder::new(&registry(), false);
        let prompt = builder.system_prompt();
        assert!(prompt.contains("`echo(text: string)`: Repeat parameters"));
        assert!(prompt.contains("output of step 1, index 0, key 'href'"));
        assert!(prompt.contains(r#"{"final_answer""#));
        assert!(prompt.contains(r#"{"action""#));
    }

    #[test]
    fn test_user_message_shows_failures_and_notices() {
        let builder = PromptBuilder::new(&registry(), true);
        let mut state = SessionState::new("say hi");
        let outcome = Outcome::failure(StepError::CapabilityExecution {
            capability: "echo".to_string(),
            message: "boom".to_string(),
        });
        let observation = outcome.observation(1000);
        state.append(
            Action::from_json("echo", json!({"text": "output of step 9"})),
            None,
            outcome,
            observation,
            Local::now(),
            3,
        );

        let notices = vec!["previous reply was not valid JSON".to_string()];
        let request = OracleRequest {
            goal: state.goal(),
            history: state.steps(),
            omitted: 0,
            notices: &notices,
        };
        let text = builder.user_message(&request);
        assert!(text.contains("# Goal\nsay hi"));
        assert!(text.contains("## Step 1\napprentice: echo"));
        assert!(text.contains("◆ APPRENTICE echo FAILED: boom"));
        assert!(text.contains("- previous reply was not valid JSON"));
        assert!(!text.contains("resolved:"));
    }

    #[test]
    fn test_user_message_notes_omitted_steps() {
        let builder = PromptBuilder::new(&registry(), false);
        let request = OracleRequest {
            goal: "g",
            history: &[],
            omitted: 4,
            notices: &[],
        };
        let text = builder.user_message(&request);
        assert!(text.contains("4 earlier step(s) omitted"));
        assert!(!text.contains("No steps taken yet"));
    }
}
