//! Step-level error taxonomy
//!
//! Everything here is data: a failed step is recorded in history and shown
//! to the oracle, never raised past the plan loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a reference expression could not be materialized
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("step {step} does not exist ({available} steps recorded)")]
    UnknownStep { step: usize, available: usize },

    #[error("step {step} did not succeed")]
    StepNotSucceeded { step: usize },

    #[error("step {step} has nothing at {path}")]
    PathNotFound { step: usize, path: String },

    #[error("step {step}: expected {expected} at {path}, found {found}")]
    TypeMismatch {
        step: usize,
        path: String,
        expected: String,
        found: String,
    },

    #[error("malformed reference: {detail}")]
    InvalidReference { detail: String },
}

/// Sub-kind of a [`ResolutionError`], without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    UnknownStep,
    StepNotSucceeded,
    PathNotFound,
    TypeMismatch,
    InvalidReference,
}

impl ResolutionError {
    pub fn kind(&self) -> ResolutionErrorKind {
        match self {
            ResolutionError::UnknownStep { .. } => ResolutionErrorKind::UnknownStep,
            ResolutionError::StepNotSucceeded { .. } => ResolutionErrorKind::StepNotSucceeded,
            ResolutionError::PathNotFound { .. } => ResolutionErrorKind::PathNotFound,
            ResolutionError::TypeMismatch { .. } => ResolutionErrorKind::TypeMismatch,
            ResolutionError::InvalidReference { .. } => ResolutionErrorKind::InvalidReference,
        }
    }
}

/// Failure detail of a recorded step
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("◆ UNKNOWN APPRENTICE: {name}")]
    UnknownCapability { name: String },

    #[error("◆ BAD PARAMETERS FOR {capability}: {detail}")]
    ParameterValidation { capability: String, detail: String },

    #[error("◆ UNRESOLVED REFERENCE: {error}")]
    Resolution { error: ResolutionError },

    #[error("◆ APPRENTICE {capability} FAILED: {message}")]
    CapabilityExecution { capability: String, message: String },

    #[error("◆ APPRENTICE {capability} TIMED OUT AFTER {secs}s")]
    CapabilityTimeout { capability: String, secs: u64 },
}

impl StepError {
    /// Short label used in observations and step summaries
    pub fn label(&self) -> &'static str {
        match self {
            StepError::UnknownCapability { .. } => "unknown_capability",
            StepError::ParameterValidation { .. } => "parameter_validation",
            StepError::Resolution { .. } => "resolution",
            StepError::CapabilityExecution { .. } => "capability_execution",
            StepError::CapabilityTimeout { .. } => "capability_timeout",
        }
    }
}

impl From<ResolutionError> for StepError {
    fn from(error: ResolutionError) -> Self {
        StepError::Resolution { error }
    }
}
