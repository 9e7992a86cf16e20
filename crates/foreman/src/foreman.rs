//! The plan loop: Reasoning → Acting → Observing → (Reasoning | Finished | Aborted)

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aura_config::ForemanConfig;

use crate::capability::{CapabilityRegistry, InvocationContext};
use crate::executor::StepExecutor;
use crate::history::{Action, Outcome, SessionState, StepRecord};
use crate::oracle::{Decision, Oracle, OracleError, OracleRequest};
use crate::reference;

/// Numeric knobs of the loop; none of them are hardcoded in it
#[derive(Debug, Clone, PartialEq)]
pub struct ForemanPolicy {
    /// Consecutive reasoning failures tolerated before giving up (K)
    pub max_reasoning_retries: u32,
    pub max_steps: usize,
    pub oracle_timeout: Duration,
    pub capability_timeout: Duration,
    pub history_window: Option<usize>,
    pub max_observation_chars: usize,
}

impl From<&ForemanConfig> for ForemanPolicy {
    fn from(config: &ForemanConfig) -> Self {
        Self {
            max_reasoning_retries: config.max_reasoning_retries.max(1),
            max_steps: config.max_steps,
            oracle_timeout: Duration::from_secs(config.oracle_timeout_secs),
            capability_timeout: Duration::from_secs(config.capability_timeout_secs),
            history_window: config.history_window,
            max_observation_chars: config.max_observation_chars,
        }
    }
}

impl Default for ForemanPolicy {
    fn default() -> Self {
        Self::from(&ForemanConfig::default())
    }
}

impl ForemanPolicy {
    pub fn with_max_reasoning_retries(mut self, k: u32) -> Self {
        self.max_reasoning_retries = k.max(1);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_max_observation_chars(mut self, max_chars: usize) -> Self {
        self.max_observation_chars = max_chars;
        self
    }
}

/// Why a session stopped without an answer
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("◆ REASONING EXHAUSTED AFTER {attempts} ATTEMPT(S): {last_error}")]
    ReasoningExhausted {
        attempts: u32,
        last_error: OracleError,
    },

    #[error("◆ STEP LIMIT REACHED ({limit})")]
    StepLimit { limit: usize },

    #[error("◆ CANCELLED")]
    Cancelled,

    #[error("◆ FATAL: {detail}")]
    Fatal { detail: String },
}

/// Terminal state of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Finished { answer: String },
    Aborted { reason: AbortReason },
}

/// Everything a caller gets back from one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub goal: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub status: SessionStatus,
    pub steps: Vec<StepRecord>,
}

impl SessionReport {
    pub fn is_finished(&self) -> bool {
        matches!(self.status, SessionStatus::Finished { .. })
    }

    pub fn final_answer(&self) -> Option<&str> {
        match &self.status {
            SessionStatus::Finished { answer } => Some(answer),
            SessionStatus::Aborted { .. } => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.status {
            SessionStatus::Finished { .. } => None,
            SessionStatus::Aborted { reason } => Some(reason),
        }
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.succeeded()).count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// `<yyyymmdd-hhmmss>-<8 hex>`, sortable by start time
pub fn new_session_id(started_at: DateTime<Local>) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", started_at.format("%Y%m%d-%H%M%S"), &uuid[..8])
}

/// An attempted step waiting to be recorded
struct PendingStep {
    action: Action,
    resolved: Option<Map<String, Value>>,
    outcome: Outcome,
    started_at: DateTime<Local>,
    duration_ms: u64,
}

enum Phase {
    Reasoning,
    Acting(Action),
    Observing(PendingStep),
}

/// Drives one goal to a final answer or an abort
pub struct Foreman<O: Oracle> {
    oracle: O,
    registry: Arc<CapabilityRegistry>,
    executor: StepExecutor,
    policy: ForemanPolicy,
}

impl<O: Oracle> Foreman<O> {
    pub fn new(oracle: O, registry: Arc<CapabilityRegistry>, policy: ForemanPolicy) -> Self {
        let executor = StepExecutor::new(registry.clone(), policy.capability_timeout);
        Self {
            oracle,
            registry,
            executor,
            policy,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ForemanPolicy {
        &self.policy
    }

    pub async fn run(&self, goal: &str) -> SessionReport {
        self.run_with_cancel(goal, CancellationToken::new()).await
    }

    /// Run a session that stops at the next safe point once `cancel` fires
    pub async fn run_with_cancel(&self, goal: &str, cancel: CancellationToken) -> SessionReport {
        let started_at = Local::now();
        let id = new_session_id(started_at);
        info!("◆ SESSION {} OPEN: {}", id, goal);

        let mut state = SessionState::new(goal);
        let status = self.drive(&mut state, &cancel).await;

        match &status {
            SessionStatus::Finished { .. } => {
                info!("◆ SESSION {} FINISHED after {} step(s)", id, state.len())
            }
            SessionStatus::Aborted { reason } => {
                warn!("◆ SESSION {} ABORTED after {} step(s): {}", id, state.len(), reason)
            }
        }

        SessionReport {
            id,
            goal: goal.to_string(),
            started_at,
            finished_at: Local::now(),
            status,
            steps: state.into_steps(),
        }
    }

    async fn drive(&self, state: &mut SessionState, cancel: &CancellationToken) -> SessionStatus {
        let abort = |reason| SessionStatus::Aborted { reason };

        if self.registry.is_empty() {
            return abort(AbortReason::Fatal {
                detail: "no apprentices registered".to_string(),
            });
        }
        if let Err(e) = self.registry.verify() {
            return abort(AbortReason::Fatal {
                detail: e.to_string(),
            });
        }

        let mut notices: Vec<String> = Vec::new();
        let mut failures: u32 = 0;
        let mut phase = Phase::Reasoning;

        loop {
            phase = match phase {
                Phase::Reasoning => {
                    if cancel.is_cancelled() {
                        return abort(AbortReason::Cancelled);
                    }
                    debug!("◆ REASONING (history: {} step(s))", state.len());

                    let decision = {
                        let (visible, omitted) = state.window(self.policy.history_window);
                        let request = OracleRequest {
                            goal: state.goal(),
                            history: visible,
                            omitted,
                            notices: &notices,
                        };
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return abort(AbortReason::Cancelled),
                            r = tokio::time::timeout(self.policy.oracle_timeout, self.oracle.next(&request)) => {
                                r.unwrap_or(Err(OracleError::Timeout {
                                    secs: self.policy.oracle_timeout.as_secs(),
                                }))
                            }
                        }
                    };

                    match decision {
                        Ok(Decision::Finish(answer)) => {
                            debug!("◆ FINAL ANSWER RECEIVED");
                            return SessionStatus::Finished { answer };
                        }
                        Ok(Decision::Act(action)) => {
                            failures = 0;
                            notices.clear();
                            if state.len() >= self.policy.max_steps {
                                return abort(AbortReason::StepLimit {
                                    limit: self.policy.max_steps,
                                });
                            }
                            debug!("◆ ORACLE CHOSE {}", action.capability);
                            Phase::Acting(action)
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(
                                "◆ REASONING ROUND FAILED ({}/{}): {}",
                                failures, self.policy.max_reasoning_retries, e
                            );
                            if failures >= self.policy.max_reasoning_retries {
                                return abort(AbortReason::ReasoningExhausted {
                                    attempts: failures,
                                    last_error: e,
                                });
                            }
                            notices.push(format!(
                                "Your previous reply could not be used ({}). Answer with exactly one action or one final answer.",
                                e
                            ));
                            Phase::Reasoning
                        }
                    }
                }

                Phase::Acting(action) => {
                    if cancel.is_cancelled() {
                        return abort(AbortReason::Cancelled);
                    }
                    let step = state.next_index();
                    let started_at = Local::now();
                    let clock = Instant::now();

                    match reference::resolve(&action.parameters, state.steps()) {
                        Err(e) => {
                            debug!("◆ STEP {} UNRESOLVED: {}", step, e);
                            Phase::Observing(PendingStep {
                                action,
                                resolved: None,
                                outcome: Outcome::failure(e),
                                started_at,
                                duration_ms: clock.elapsed().as_millis() as u64,
                            })
                        }
                        Ok(resolved) => {
                            if cancel.is_cancelled() {
                                return abort(AbortReason::Cancelled);
                            }
                            info!("◆ STEP {}: {}", step, action.capability);
                            let ctx = InvocationContext::new(step, cancel.child_token());
                            let outcome = self
                                .executor
                                .execute(&action.capability, &resolved, ctx)
                                .await;
                            Phase::Observing(PendingStep {
                                action,
                                resolved: Some(resolved),
                                outcome,
                                started_at,
                                duration_ms: clock.elapsed().as_millis() as u64,
                            })
                        }
                    }
                }

                Phase::Observing(pending) => {
                    let observation = pending
                        .outcome
                        .observation(self.policy.max_observation_chars);
                    let record = state.append(
                        pending.action,
                        pending.resolved,
                        pending.outcome,
                        observation,
                        pending.started_at,
                        pending.duration_ms,
                    );
                    if record.succeeded() {
                        debug!("◆ STEP {} OK ({} ms)", record.index, record.duration_ms);
                    } else {
                        warn!("◆ STEP {} FAILED: {}", record.index, record.observation);
                    }
                    Phase::Reasoning
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let config = ForemanConfig {
            max_reasoning_retries: 0,
            history_window: Some(3),
            ..Default::default()
        };
        let policy = ForemanPolicy::from(&config);
        assert_eq!(policy.max_reasoning_retries, 1);
        assert_eq!(policy.history_window, Some(3));
        assert_eq!(policy.oracle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_builders_keep_bounds_positive() {
        let policy = ForemanPolicy::default()
            .with_max_steps(0)
            .with_max_reasoning_retries(0);
        assert_eq!(policy.max_steps, 1);
        assert_eq!(policy.max_reasoning_retries, 1);
        assert_eq!(ForemanPolicy::default().with_max_steps(7).max_steps, 7);
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id(Local::now());
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_abort_reason_serialized_shape() {
        let reason = AbortReason::ReasoningExhausted {
            attempts: 3,
            last_error: OracleError::malformed("no JSON"),
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["kind"], "reasoning_exhausted");
        assert_eq!(value["last_error"]["kind"], "malformed");

        let status = SessionStatus::Aborted { reason };
        let back: SessionStatus =
            serde_json::from_value(serde_json::to_value(&status).unwrap()).unwrap();
        assert_eq!(back, status);
    }
}
