//! Model definitions: named state variables, constrained parameters and a
//! pure right-hand side.

use crate::traits::OdeSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter values keyed by parameter name, as they arrive from a form.
pub type ParamValues = BTreeMap<String, f64>;

/// Builds a `ParamValues` map from `(name, value)` pairs.
pub fn param_values<'a>(pairs: impl IntoIterator<Item = (&'a str, f64)>) -> ParamValues {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// `dx/dt` written into `out`. Parameters arrive in declaration order.
pub type Derivative = fn(t: f64, state: &[f64], params: &[f64], out: &mut [f64]);

/// Initial state built from the bound parameters and the initial-condition fields.
pub type InitialState = fn(params: &[f64], fields: &[f64]) -> Vec<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Positive,
    NonNegative,
    Unconstrained,
}

impl Constraint {
    /// Returns the reason the value is rejected, if it is.
    pub fn check(self, value: f64) -> Option<String> {
        if !value.is_finite() {
            return Some("must be a finite number".to_string());
        }
        match self {
            Constraint::Positive if value <= 0.0 => Some(format!("must be > 0 (got {value})")),
            Constraint::NonNegative if value < 0.0 => Some(format!("must be >= 0 (got {value})")),
            _ => None,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Positive => write!(f, "> 0"),
            Constraint::NonNegative => write!(f, ">= 0"),
            Constraint::Unconstrained => write!(f, "any real"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub constraint: Constraint,
    /// Value pre-filled in the input form.
    pub default: f64,
}

impl ParameterSpec {
    pub const fn new(
        name: &'static str,
        label: &'static str,
        constraint: Constraint,
        default: f64,
    ) -> Self {
        Self {
            name,
            label,
            constraint,
            default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Embedded Runge-Kutta pair with step-size control.
    Adaptive,
    /// RK4 with a fixed number of sub-steps between output samples.
    FixedGrid,
}

/// An immutable model family. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct ModelDefinition {
    pub name: &'static str,
    pub title: &'static str,
    pub state_vars: Vec<&'static str>,
    pub parameters: Vec<ParameterSpec>,
    /// Form fields used only to build the initial state (I0, E0, P0, ...).
    pub initial_fields: Vec<ParameterSpec>,
    pub solver: SolverKind,
    pub default_t_end: f64,
    pub default_resolution: usize,
    derivative: Derivative,
    initial_state: InitialState,
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("state_vars", &self.state_vars)
            .field("parameters", &self.parameters)
            .field("solver", &self.solver)
            .finish_non_exhaustive()
    }
}

impl ModelDefinition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        title: &'static str,
        state_vars: Vec<&'static str>,
        parameters: Vec<ParameterSpec>,
        initial_fields: Vec<ParameterSpec>,
        solver: SolverKind,
        derivative: Derivative,
        initial_state: InitialState,
    ) -> Self {
        Self {
            name,
            title,
            state_vars,
            parameters,
            initial_fields,
            solver,
            default_t_end: 100.0,
            default_resolution: 500,
            derivative,
            initial_state,
        }
    }

    pub fn with_defaults(mut self, t_end: f64, resolution: usize) -> Self {
        self.default_t_end = t_end;
        self.default_resolution = resolution;
        self
    }

    pub fn dimension(&self) -> usize {
        self.state_vars.len()
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parameters.iter().map(|p| p.name)
    }

    /// Invokes the right-hand side with parameters in declaration order.
    pub fn derivative(&self, t: f64, state: &[f64], params: &[f64], out: &mut [f64]) {
        (self.derivative)(t, state, params, out)
    }

    /// Orders named values according to `specs`. Returns the first missing name.
    pub fn ordered(specs: &[ParameterSpec], values: &ParamValues) -> Result<Vec<f64>, &'static str> {
        specs
            .iter()
            .map(|spec| values.get(spec.name).copied().ok_or(spec.name))
            .collect()
    }

    /// Builds the initial state from a validated form.
    pub fn initial_state(&self, values: &ParamValues) -> Result<Vec<f64>, &'static str> {
        let params = Self::ordered(&self.parameters, values)?;
        let fields = Self::ordered(&self.initial_fields, values)?;
        Ok((self.initial_state)(&params, &fields))
    }

    /// Form values pre-filled with every declared default.
    pub fn default_values(&self) -> ParamValues {
        self.parameters
            .iter()
            .chain(self.initial_fields.iter())
            .map(|spec| (spec.name.to_string(), spec.default))
            .collect()
    }
}

/// A model with its parameters bound, ready for a solver.
pub struct BoundModel<'a> {
    pub model: &'a ModelDefinition,
    pub params: Vec<f64>,
}

impl OdeSystem<f64> for BoundModel<'_> {
    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn rhs(&self, t: f64, x: &[f64], out: &mut [f64]) {
        self.model.derivative(t, x, &self.params, out);
    }
}
