//! Built-in model families and the catalog that owns them.
//!
//! Some SIR variants clamp negative S and I to zero before evaluating the
//! right-hand side and others do not. Each variant keeps its own behavior.

use crate::error::EpiplotError;
use crate::model::{Constraint, ModelDefinition, ParameterSpec, SolverKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Logistic,
    Exponential,
    Sir,
    Seir,
    SirMassAction,
    SirMassActionClamped,
    Rumor,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 7] = [
        ModelFamily::Logistic,
        ModelFamily::Exponential,
        ModelFamily::Sir,
        ModelFamily::Seir,
        ModelFamily::SirMassAction,
        ModelFamily::SirMassActionClamped,
        ModelFamily::Rumor,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ModelFamily::Logistic => "logistic",
            ModelFamily::Exponential => "exponential",
            ModelFamily::Sir => "sir",
            ModelFamily::Seir => "seir",
            ModelFamily::SirMassAction => "sir_mass_action",
            ModelFamily::SirMassActionClamped => "sir_mass_action_clamped",
            ModelFamily::Rumor => "rumor",
        }
    }

    pub fn definition(self) -> ModelDefinition {
        match self {
            ModelFamily::Logistic => logistic(),
            ModelFamily::Exponential => exponential(),
            ModelFamily::Sir => sir(),
            ModelFamily::Seir => seir(),
            ModelFamily::SirMassAction => sir_mass_action(),
            ModelFamily::SirMassActionClamped => sir_mass_action_clamped(),
            ModelFamily::Rumor => rumor(),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelFamily {
    type Err = EpiplotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.key() == s)
            .ok_or_else(|| EpiplotError::UnknownModel(s.to_string()))
    }
}

/// Every model family, constructed once and shared read-only.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: BTreeMap<ModelFamily, Arc<ModelDefinition>>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        let models = ModelFamily::ALL
            .into_iter()
            .map(|family| (family, Arc::new(family.definition())))
            .collect();
        Self { models }
    }

    pub fn get(&self, family: ModelFamily) -> Arc<ModelDefinition> {
        // `builtin` inserts every family.
        match self.models.get(&family) {
            Some(model) => Arc::clone(model),
            None => Arc::new(family.definition()),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<ModelDefinition>, EpiplotError> {
        Ok(self.get(name.parse()?))
    }

    pub fn families(&self) -> impl Iterator<Item = ModelFamily> + '_ {
        self.models.keys().copied()
    }
}

fn logistic() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        let (r, k) = (p[0], p[1]);
        out[0] = r * y[0] * (1.0 - y[0] / k);
    }
    fn init(_p: &[f64], f: &[f64]) -> Vec<f64> {
        vec![f[0]]
    }
    ModelDefinition::new(
        "logistic",
        "Modelo Logístico de Crecimiento Poblacional",
        vec!["P"],
        vec![
            ParameterSpec::new("r", "Tasa de crecimiento (r)", Constraint::Positive, 0.04),
            ParameterSpec::new("k", "Capacidad de carga (K)", Constraint::Positive, 750.0),
        ],
        vec![ParameterSpec::new("p0", "Población inicial (P0)", Constraint::Positive, 200.0)],
        SolverKind::Adaptive,
        rhs,
        init,
    )
    .with_defaults(100.0, 100)
}

fn exponential() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        out[0] = p[0] * y[0];
    }
    fn init(_p: &[f64], f: &[f64]) -> Vec<f64> {
        vec![f[0]]
    }
    ModelDefinition::new(
        "exponential",
        "Crecimiento de la población (modelo exponencial)",
        vec!["P"],
        vec![ParameterSpec::new("r", "Tasa de crecimiento (r)", Constraint::Unconstrained, 0.03)],
        vec![ParameterSpec::new("p0", "Población inicial (P0)", Constraint::NonNegative, 100.0)],
        SolverKind::FixedGrid,
        rhs,
        init,
    )
    .with_defaults(100.0, 50)
}

fn sir() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, i) = (y[0], y[1]);
        let (beta, gamma, n) = (p[0], p[1], p[2]);
        let infection = beta * s * i / n;
        out[0] = -infection;
        out[1] = infection - gamma * i;
        out[2] = gamma * i;
    }
    fn init(p: &[f64], f: &[f64]) -> Vec<f64> {
        vec![p[2] - f[0], f[0], 0.0]
    }
    ModelDefinition::new(
        "sir",
        "Evolución del Modelo SIR",
        vec!["S", "I", "R"],
        vec![
            ParameterSpec::new("beta", "Tasa de transmisión (β)", Constraint::Positive, 0.3),
            ParameterSpec::new("gamma", "Tasa de recuperación (γ)", Constraint::Positive, 0.1),
            ParameterSpec::new("n", "Población total (N)", Constraint::Positive, 1000.0),
        ],
        vec![ParameterSpec::new("i0", "Infectados iniciales (I0)", Constraint::NonNegative, 1.0)],
        SolverKind::Adaptive,
        rhs,
        init,
    )
}

fn seir() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, e, i) = (y[0], y[1], y[2]);
        let (beta, gamma, sigma, n) = (p[0], p[1], p[2], p[3]);
        let infection = beta * s * i / n;
        out[0] = -infection;
        out[1] = infection - sigma * e;
        out[2] = sigma * e - gamma * i;
        out[3] = gamma * i;
    }
    fn init(p: &[f64], f: &[f64]) -> Vec<f64> {
        let (i0, e0) = (f[0], f[1]);
        vec![p[3] - i0 - e0, e0, i0, 0.0]
    }
    ModelDefinition::new(
        "seir",
        "Modelo SEIR",
        vec!["S", "E", "I", "R"],
        vec![
            ParameterSpec::new("beta", "Tasa de transmisión (β)", Constraint::Positive, 0.5),
            ParameterSpec::new("gamma", "Tasa de recuperación (γ)", Constraint::Positive, 0.1),
            ParameterSpec::new("sigma", "Tasa de incubación (σ)", Constraint::Positive, 0.2),
            ParameterSpec::new("n", "Población total (N)", Constraint::Positive, 1000.0),
        ],
        vec![
            ParameterSpec::new("i0", "Infectados iniciales (I0)", Constraint::NonNegative, 1.0),
            ParameterSpec::new("e0", "Expuestos iniciales (E0)", Constraint::NonNegative, 0.0),
        ],
        SolverKind::Adaptive,
        rhs,
        init,
    )
}

fn compartments_from_fields(_p: &[f64], f: &[f64]) -> Vec<f64> {
    vec![f[0], f[1], f[2]]
}

fn compartment_fields(s0: f64, i0: f64, r0: f64) -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("s0", "Susceptibles iniciales (S0)", Constraint::NonNegative, s0),
        ParameterSpec::new("i0", "Infectados iniciales (I0)", Constraint::NonNegative, i0),
        ParameterSpec::new("r0", "Removidos iniciales (R0)", Constraint::NonNegative, r0),
    ]
}

fn mass_action_rhs(s: f64, i: f64, b: f64, g: f64, out: &mut [f64]) {
    out[0] = -b * s * i;
    out[1] = b * s * i - g * i;
    out[2] = g * i;
}

fn sir_mass_action() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        mass_action_rhs(y[0], y[1], p[0], p[1], out);
    }
    ModelDefinition::new(
        "sir_mass_action",
        "Modelo SIR (acción de masas)",
        vec!["S", "I", "R"],
        vec![
            ParameterSpec::new("b", "Tasa de contagio (b)", Constraint::Positive, 2.5 * 0.25 / 10_000.0),
            ParameterSpec::new("g", "Tasa de remoción (g)", Constraint::Positive, 0.25),
        ],
        compartment_fields(9_990.0, 10.0, 0.0),
        SolverKind::FixedGrid,
        rhs,
        compartments_from_fields,
    )
    .with_defaults(100.0, 100)
}

fn sir_mass_action_clamped() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        mass_action_rhs(y[0].max(0.0), y[1].max(0.0), p[0], p[1], out);
    }
    ModelDefinition::new(
        "sir_mass_action_clamped",
        "Modelo SIR - Universidad de San Marcos",
        vec!["S", "I", "R"],
        vec![
            ParameterSpec::new("b", "Tasa de contagio (β)", Constraint::Positive, 1.0 / 7138.0),
            ParameterSpec::new("g", "Tasa de recuperación (γ)", Constraint::Positive, 0.40),
        ],
        compartment_fields(7137.0, 1.0, 0.0),
        SolverKind::FixedGrid,
        rhs,
        compartments_from_fields,
    )
    .with_defaults(40.0, 400)
}

fn rumor() -> ModelDefinition {
    fn rhs(_t: f64, y: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, i, r) = (y[0], y[1], y[2]);
        let (b, k) = (p[0], p[1]);
        out[0] = -b * s * i;
        out[1] = b * s * i - k * i * r;
        out[2] = k * i * r;
    }
    ModelDefinition::new(
        "rumor",
        "Evolución del Rumor",
        vec!["S", "I", "R"],
        vec![
            ParameterSpec::new("b", "Tasa de difusión (b)", Constraint::Positive, 0.004),
            ParameterSpec::new("k", "Efectividad racional (k)", Constraint::Positive, 0.01),
        ],
        compartment_fields(266.0, 1.0, 8.0),
        SolverKind::FixedGrid,
        rhs,
        compartments_from_fields,
    )
    .with_defaults(15.0, 150)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(family: ModelFamily, state: &[f64], params: &[f64]) -> Vec<f64> {
        let model = family.definition();
        let mut out = vec![0.0; model.dimension()];
        model.derivative(0.0, state, params, &mut out);
        out
    }

    #[test]
    fn catalog_contains_every_family_and_parses_keys() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.families().count(), ModelFamily::ALL.len());
        for family in ModelFamily::ALL {
            let model = catalog.lookup(family.key()).expect("family should resolve");
            assert_eq!(model.name, family.key());
        }
        assert!(matches!(
            catalog.lookup("sirs"),
            Err(EpiplotError::UnknownModel(name)) if name == "sirs"
        ));
    }

    #[test]
    fn derivative_length_matches_state_vars() {
        for family in ModelFamily::ALL {
            let model = family.definition();
            let values = model.default_values();
            let state = model.initial_state(&values).expect("defaults cover the form");
            assert_eq!(state.len(), model.state_vars.len(), "{family}");
        }
    }

    #[test]
    fn clamped_variant_ignores_negative_infected() {
        let clamped = eval(ModelFamily::SirMassActionClamped, &[100.0, -5.0, 0.0], &[0.01, 0.4]);
        assert_eq!(clamped, vec![0.0, 0.0, 0.0]);

        let unclamped = eval(ModelFamily::SirMassAction, &[100.0, -5.0, 0.0], &[0.01, 0.4]);
        assert!(unclamped[0] > 0.0, "unclamped variant lets S grow: {unclamped:?}");
        assert!(unclamped[2] < 0.0);
    }

    #[test]
    fn closed_models_have_zero_net_flow() {
        let sir = eval(ModelFamily::Sir, &[990.0, 10.0, 0.0], &[0.3, 0.1, 1000.0]);
        assert!(sir.iter().sum::<f64>().abs() < 1e-12);

        let seir = eval(ModelFamily::Seir, &[980.0, 10.0, 10.0, 0.0], &[0.5, 0.1, 0.2, 1000.0]);
        assert!(seir.iter().sum::<f64>().abs() < 1e-12);

        let rumor = eval(ModelFamily::Rumor, &[266.0, 1.0, 8.0], &[0.004, 0.01]);
        assert!(rumor.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn seir_initial_state_subtracts_seeded_compartments() {
        let model = ModelFamily::Seir.definition();
        let mut values = model.default_values();
        values.insert("i0".into(), 5.0);
        values.insert("e0".into(), 20.0);
        let state = model.initial_state(&values).expect("complete form");
        assert_eq!(state, vec![975.0, 20.0, 5.0, 0.0]);
    }
}
