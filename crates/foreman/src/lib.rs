//! FOREMAN: plan, act, observe
//!
//! Turns one natural-language goal into an ordered run of apprentice
//! invocations, feeding every outcome (good or bad) back to the oracle.

use thiserror::Error;

pub mod capability;
pub mod error;
pub mod executor;
pub mod foreman;
pub mod history;
pub mod oracle;
pub mod prompt;
pub mod reference;

pub use capability::{
    register_default_apprentices, Capability, CapabilityDescriptor, CapabilityError,
    CapabilityRegistry, InvocationContext, ParamSpec, ParamType,
};
pub use error::{ResolutionError, ResolutionErrorKind, StepError};
pub use executor::StepExecutor;
pub use foreman::{AbortReason, Foreman, ForemanPolicy, SessionReport, SessionStatus};
pub use history::{Action, Outcome, SessionState, StepRecord};
pub use oracle::{Decision, LlmOracle, Oracle, OracleError, OracleRequest};
pub use reference::{PathSegment, Reference};

/// Errors raised while assembling the foreman itself
#[derive(Error, Debug)]
pub enum ForemanError {
    #[error("◆ APPRENTICE NOT FOUND: {0}")]
    CapabilityNotFound(String),

    #[error("◆ DUPLICATE APPRENTICE: {0}")]
    DuplicateCapability(String),

    #[error("◆ BAD STANDING ORDERS: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ForemanError>;
