//! Step executor: look up, validate, invoke, normalize

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::capability::{CapabilityRegistry, InvocationContext};
use crate::error::StepError;
use crate::history::Outcome;

/// Runs one capability call and always yields an [`Outcome`]
#[derive(Clone)]
pub struct StepExecutor {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl StepExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Execute `name` with already-resolved parameters.
    ///
    /// Unknown names and schema violations short-circuit before the
    /// capability runs. Panics inside a capability surface as execution
    /// failures.
    pub async fn execute(
        &self,
        name: &str,
        params: &Map<String, Value>,
        ctx: InvocationContext,
    ) -> Outcome {
        let Some(capability) = self.registry.get(name) else {
            warn!("◆ UNKNOWN APPRENTICE REQUESTED: {}", name);
            return Outcome::failure(StepError::UnknownCapability {
                name: name.to_string(),
            });
        };

        if let Err(detail) = capability.descriptor().validate(params) {
            debug!("◆ PARAMETERS REJECTED FOR {}: {}", name, detail);
            return Outcome::failure(StepError::ParameterValidation {
                capability: name.to_string(),
                detail,
            });
        }

        debug!("◆ DISPATCHING {} (step {})", name, ctx.step);
        let owned_params = params.clone();
        let mut handle =
            tokio::spawn(async move { capability.invoke(owned_params, &ctx).await });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => Outcome::success(result),
            Ok(Ok(Err(e))) => Outcome::failure(StepError::CapabilityExecution {
                capability: name.to_string(),
                message: e.message,
            }),
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    "apprentice panicked".to_string()
                } else {
                    join.to_string()
                };
                Outcome::failure(StepError::CapabilityExecution {
                    capability: name.to_string(),
                    message,
                })
            }
            Err(_) => {
                handle.abort();
                warn!("◆ {} TIMED OUT AFTER {:?}", name, self.timeout);
                Outcome::failure(StepError::CapabilityTimeout {
                    capability: name.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}
