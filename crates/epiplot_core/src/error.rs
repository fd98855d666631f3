//! Error taxonomy for the simulation and feed pipeline.
//!
//! Every error here is recoverable: the dashboard layer turns each one into an
//! inline message plus a safe default chart.

use serde::Serialize;
use thiserror::Error;

/// A single parameter (or numeric form field) that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterViolation {
    pub parameter: String,
    pub reason: String,
}

impl std::fmt::Display for ParameterViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.parameter, self.reason)
    }
}

/// Bad user input. Lists every violated parameter, not just the first.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid parameters: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<ParameterViolation>,
}

impl ValidationError {
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.parameter.as_str())
    }
}

fn join_violations(violations: &[ParameterViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("invalid simulation request: {0}")]
    InvalidRequest(String),
    #[error("solver produced a non-finite state at t = {t}")]
    NonFinite { t: f64 },
    #[error("step size fell below the minimum at t = {t}")]
    StepSizeUnderflow { t: f64 },
    #[error("step budget of {max_steps} exhausted at t = {t}")]
    StepBudgetExceeded { t: f64, max_steps: usize },
}

impl IntegrationError {
    /// The time point at which the solver gave up, if any.
    pub fn time(&self) -> Option<f64> {
        match self {
            IntegrationError::InvalidRequest(_) => None,
            IntegrationError::NonFinite { t }
            | IntegrationError::StepSizeUnderflow { t }
            | IntegrationError::StepBudgetExceeded { t, .. } => Some(*t),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("syntax error at position {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("unknown identifier '{0}' (allowed: x, y)")]
    UnknownIdentifier(String),
    #[error("unknown function '{0}' (allowed: sin, cos, exp, sqrt, log)")]
    UnknownFunction(String),
    #[error("{function} is undefined for {argument} at (x = {x}, y = {y})")]
    Domain {
        function: &'static str,
        argument: f64,
        x: f64,
        y: f64,
    },
    #[error("expression evaluated to a non-finite value at (x = {x}, y = {y})")]
    NonFinite { x: f64, y: f64 },
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed responded with HTTP status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("feed request to {url} timed out")]
    Timeout { url: String },
    #[error("feed transport failure: {0}")]
    Transport(String),
    #[error("unexpected feed payload: {0}")]
    Shape(String),
    #[error("malformed feed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown country '{0}'")]
    UnknownCountry(String),
}

/// Umbrella error for callers that drive the whole pipeline.
#[derive(Error, Debug)]
pub enum EpiplotError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("unknown model family '{0}'")]
    UnknownModel(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = EpiplotError> = std::result::Result<T, E>;
