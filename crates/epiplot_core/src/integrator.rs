//! Samples a model's trajectory on an evenly spaced time grid.

use crate::error::{EpiplotError, IntegrationError};
use crate::model::{BoundModel, ModelDefinition, ParamValues, SolverKind};
use crate::solvers::{AdaptiveFailure, DormandPrince45, Tolerance, RK4};
use crate::traits::FixedStepper;
use crate::validation::validate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_RTOL: f64 = 1e-6;
pub const DEFAULT_ATOL: f64 = 1e-9;
pub const DEFAULT_MIN_STEP: f64 = 1e-12;
pub const DEFAULT_MAX_STEPS: usize = 100_000;
pub const DEFAULT_FIXED_SUBSTEPS: usize = 10;
pub const DEFAULT_MAX_RESOLUTION: usize = 100_000;

/// Solver configuration shared by every simulation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub rtol: f64,
    pub atol: f64,
    pub min_step: f64,
    /// Adaptive-solver step budget, on top of the one step each output
    /// sample needs. Fixed-grid runs take exactly
    /// `(resolution - 1) * fixed_substeps` steps and ignore it.
    pub max_steps: usize,
    /// RK4 steps taken between two consecutive output samples.
    pub fixed_substeps: usize,
    /// Largest accepted `resolution`; larger requests are rejected before
    /// anything is allocated.
    pub max_resolution: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
            min_step: DEFAULT_MIN_STEP,
            max_steps: DEFAULT_MAX_STEPS,
            fixed_substeps: DEFAULT_FIXED_SUBSTEPS,
            max_resolution: DEFAULT_MAX_RESOLUTION,
        }
    }
}

/// `param_values` holds the model parameters only; `run` validates them.
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub model: Arc<ModelDefinition>,
    pub initial_state: Vec<f64>,
    pub param_values: ParamValues,
    pub time_span: (f64, f64),
    pub resolution: usize,
}

/// Sampled trajectories, aligned index-for-index with `times`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub model: String,
    pub times: Vec<f64>,
    pub state_vars: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl SimulationResult {
    /// An all-zero result, used when a simulation cannot be shown.
    pub fn zeros(model: &ModelDefinition, time_span: (f64, f64), resolution: usize) -> Self {
        let times = linspace(time_span.0, time_span.1, resolution.max(2));
        let values = vec![vec![0.0; times.len()]; model.dimension()];
        Self {
            model: model.name.to_string(),
            state_vars: model.state_vars.iter().map(|s| s.to_string()).collect(),
            times,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn trajectory(&self, name: &str) -> Option<&[f64]> {
        self.state_vars
            .iter()
            .position(|var| var == name)
            .map(|idx| self.values[idx].as_slice())
    }

    pub fn trajectories(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.state_vars
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// Value of `name` at the last sample.
    pub fn final_value(&self, name: &str) -> Option<f64> {
        self.trajectory(name).and_then(|series| series.last().copied())
    }
}

/// `n` evenly spaced points from `start` to `end`; the last point is exactly `end`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            points[n - 1] = end;
            points
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Integrator {
    pub settings: IntegratorSettings,
}

impl Integrator {
    pub fn new(settings: IntegratorSettings) -> Self {
        Self { settings }
    }

    /// Validates the request's parameters, then integrates.
    pub fn run(&self, request: &SimulationRequest) -> Result<SimulationResult, EpiplotError> {
        validate(&request.model, &request.param_values)?;
        Ok(self.integrate(
            &request.model,
            &request.initial_state,
            &request.param_values,
            request.time_span,
            request.resolution,
        )?)
    }

    /// Integrates with the solver the model declares. Parameter domains are
    /// not checked here; callers validate first.
    pub fn integrate(
        &self,
        model: &ModelDefinition,
        initial_state: &[f64],
        param_values: &ParamValues,
        time_span: (f64, f64),
        resolution: usize,
    ) -> Result<SimulationResult, IntegrationError> {
        self.integrate_using(
            model.solver,
            model,
            initial_state,
            param_values,
            time_span,
            resolution,
        )
    }

    pub fn integrate_using(
        &self,
        solver: SolverKind,
        model: &ModelDefinition,
        initial_state: &[f64],
        param_values: &ParamValues,
        time_span: (f64, f64),
        resolution: usize,
    ) -> Result<SimulationResult, IntegrationError> {
        let (t_start, t_end) = time_span;
        if resolution < 2 {
            return Err(IntegrationError::InvalidRequest(format!(
                "resolution must be at least 2, got {resolution}"
            )));
        }
        if resolution > self.settings.max_resolution {
            return Err(IntegrationError::InvalidRequest(format!(
                "resolution must be at most {}, got {resolution}",
                self.settings.max_resolution
            )));
        }
        if !t_start.is_finite() || !t_end.is_finite() || t_end <= t_start {
            return Err(IntegrationError::InvalidRequest(format!(
                "time span must be finite with t_end > t_start, got ({t_start}, {t_end})"
            )));
        }
        if initial_state.len() != model.dimension() {
            return Err(IntegrationError::InvalidRequest(format!(
                "initial state has {} values but {} declares {} state variables",
                initial_state.len(),
                model.name,
                model.dimension()
            )));
        }
        if initial_state.iter().any(|v| !v.is_finite()) {
            return Err(IntegrationError::NonFinite { t: t_start });
        }
        let params = ModelDefinition::ordered(&model.parameters, param_values).map_err(|name| {
            IntegrationError::InvalidRequest(format!("missing parameter '{name}'"))
        })?;

        let system = BoundModel { model, params };
        let times = linspace(t_start, t_end, resolution);
        let dim = model.dimension();
        let mut values: Vec<Vec<f64>> = (0..dim)
            .map(|_| Vec::with_capacity(resolution))
            .collect();
        let mut state = initial_state.to_vec();
        record(&mut values, &state);

        let steps = match solver {
            SolverKind::Adaptive => self.sample_adaptive(&system, &times, &mut state, &mut values)?,
            SolverKind::FixedGrid => self.sample_fixed(&system, &times, &mut state, &mut values)?,
        };

        debug!(
            model = model.name,
            ?solver,
            samples = resolution,
            steps,
            "integration finished"
        );

        Ok(SimulationResult {
            model: model.name.to_string(),
            times,
            state_vars: model.state_vars.iter().map(|s| s.to_string()).collect(),
            values,
        })
    }

    fn sample_adaptive(
        &self,
        system: &BoundModel<'_>,
        times: &[f64],
        state: &mut [f64],
        values: &mut [Vec<f64>],
    ) -> Result<usize, IntegrationError> {
        let span = times[times.len() - 1] - times[0];
        let tol = Tolerance {
            rtol: self.settings.rtol,
            atol: self.settings.atol,
            min_step: self.settings.min_step,
            max_steps: self.settings.max_steps.saturating_add(times.len() - 1),
        };
        let mut stepper = DormandPrince45::new(state.len(), (span * 1e-3).max(tol.min_step));
        let mut t = times[0];

        for &target in &times[1..] {
            stepper
                .advance_to(system, &mut t, state, target, &tol)
                .map_err(|failure| match failure {
                    AdaptiveFailure::NonFinite => IntegrationError::NonFinite { t },
                    AdaptiveFailure::StepSizeUnderflow => IntegrationError::StepSizeUnderflow { t },
                    AdaptiveFailure::StepBudgetExceeded => IntegrationError::StepBudgetExceeded {
                        t,
                        max_steps: tol.max_steps,
                    },
                })?;
            record(values, state);
        }
        Ok(stepper.steps())
    }

    fn sample_fixed(
        &self,
        system: &BoundModel<'_>,
        times: &[f64],
        state: &mut [f64],
        values: &mut [Vec<f64>],
    ) -> Result<usize, IntegrationError> {
        let substeps = self.settings.fixed_substeps.max(1);
        let mut stepper = RK4::new(state.len());
        let mut steps = 0;

        for window in times.windows(2) {
            let (from, to) = (window[0], window[1]);
            let dt = (to - from) / substeps as f64;
            let mut t = from;
            for _ in 0..substeps {
                stepper.step(system, &mut t, state, dt);
            }
            steps += substeps;
            if state.iter().any(|v| !v.is_finite()) {
                return Err(IntegrationError::NonFinite { t: to });
            }
            record(values, state);
        }
        Ok(steps)
    }
}

fn record(values: &mut [Vec<f64>], state: &[f64]) {
    for (series, &value) in values.iter_mut().zip(state) {
        series.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::param_values;
    use crate::models::ModelFamily;

    fn integrator() -> Integrator {
        Integrator::default()
    }

    fn is_non_decreasing(series: &[f64], slack: f64) -> bool {
        series.windows(2).all(|w| w[1] >= w[0] - slack)
    }

    #[test]
    fn linspace_pins_both_endpoints() {
        let points = linspace(0.0, 0.3, 4);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], 0.0);
        assert_eq!(points[3], 0.3);
        assert!(points.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn sample_grid_matches_requested_resolution_and_span() {
        let model = ModelFamily::Sir.definition();
        let values = model.default_values();
        let state = model.initial_state(&values).expect("defaults cover the form");
        for solver in [SolverKind::Adaptive, SolverKind::FixedGrid] {
            let result = integrator()
                .integrate_using(solver, &model, &state, &values, (2.0, 37.5), 77)
                .expect("sir should integrate");
            assert_eq!(result.len(), 77);
            assert_eq!(result.times[0], 2.0);
            assert_eq!(result.times[76], 37.5);
            assert!(is_non_decreasing(&result.times, 0.0));
            assert_eq!(result.state_vars, vec!["S", "I", "R"]);
            for (_, series) in result.trajectories() {
                assert_eq!(series.len(), 77);
            }
        }
    }

    #[test]
    fn sir_conserves_total_population() {
        let model = ModelFamily::Sir.definition();
        let values = param_values([("beta", 0.3), ("gamma", 0.1), ("n", 1000.0), ("i0", 1.0)]);
        let state = model.initial_state(&values).expect("complete form");
        let result = integrator()
            .integrate(&model, &state, &values, (0.0, 160.0), 500)
            .expect("sir should integrate");
        for idx in 0..result.len() {
            let total: f64 = result.values.iter().map(|series| series[idx]).sum();
            assert!(
                (total - 1000.0).abs() < 1e-6,
                "population drifted to {total} at t = {}",
                result.times[idx]
            );
        }
    }

    #[test]
    fn seir_conserves_total_population() {
        let model = ModelFamily::Seir.definition();
        let values = model.default_values();
        let state = model.initial_state(&values).expect("defaults cover the form");
        let result = integrator()
            .integrate(&model, &state, &values, (0.0, 100.0), 500)
            .expect("seir should integrate");
        for idx in 0..result.len() {
            let total: f64 = result.values.iter().map(|series| series[idx]).sum();
            assert!((total - 1000.0).abs() < 1e-6, "population drifted to {total}");
        }
    }

    #[test]
    fn logistic_growth_approaches_capacity_without_overshoot() {
        let model = ModelFamily::Logistic.definition();
        let values = param_values([("r", 0.2), ("k", 150.0), ("p0", 10.0)]);
        let state = model.initial_state(&values).expect("complete form");
        let result = integrator()
            .integrate(&model, &state, &values, (0.0, 60.0), 200)
            .expect("logistic should integrate");
        let population = result.trajectory("P").expect("P trajectory");

        assert_eq!(population[0], 10.0);
        assert!(population[199] < 150.0, "ended at {}", population[199]);
        assert!(population.windows(2).all(|w| w[1] > w[0]), "must increase strictly");

        for (t, p) in result.times.iter().zip(population) {
            let exact = 150.0 / (1.0 + ((150.0 - 10.0) / 10.0) * (-0.2 * t).exp());
            assert!((p - exact).abs() < 1e-3, "t = {t}: {p} vs closed form {exact}");
        }
    }

    #[test]
    fn sir_removed_compartment_never_decreases() {
        let n = 10_000.0;
        let gamma = 0.25;
        let beta = 2.5 * gamma / n;
        let model = ModelFamily::SirMassAction.definition();
        let values = param_values([
            ("b", beta),
            ("g", gamma),
            ("s0", n - 10.0),
            ("i0", 10.0),
            ("r0", 0.0),
        ]);
        let state = model.initial_state(&values).expect("complete form");
        let result = integrator()
            .integrate(&model, &state, &values, (0.0, 100.0), 100)
            .expect("sir should integrate");
        let removed = result.trajectory("R").expect("R trajectory");
        assert!(is_non_decreasing(removed, 1e-9));
        assert!(removed[99] < n);
        assert!(removed[99] > 0.5 * n, "epidemic with R0 = 2.5 should reach most people");
    }

    #[test]
    fn fixed_and_adaptive_solvers_agree_at_samples() {
        let model = ModelFamily::Rumor.definition();
        let values = model.default_values();
        let state = model.initial_state(&values).expect("defaults cover the form");
        let fixed = integrator()
            .integrate_using(SolverKind::FixedGrid, &model, &state, &values, (0.0, 15.0), 150)
            .expect("fixed grid");
        let adaptive = integrator()
            .integrate_using(SolverKind::Adaptive, &model, &state, &values, (0.0, 15.0), 150)
            .expect("adaptive");
        for (a, b) in fixed.values.iter().flatten().zip(adaptive.values.iter().flatten()) {
            assert!((a - b).abs() < 1e-3 * a.abs().max(1.0), "{a} vs {b}");
        }
    }

    #[test]
    fn invalid_requests_fail_before_integration() {
        let model = ModelFamily::Sir.definition();
        let values = model.default_values();
        let state = model.initial_state(&values).expect("defaults cover the form");
        let integ = integrator();

        assert!(matches!(
            integ.integrate(&model, &state, &values, (0.0, 10.0), 1),
            Err(IntegrationError::InvalidRequest(_))
        ));
        assert!(matches!(
            integ.integrate(&model, &state, &values, (10.0, 10.0), 50),
            Err(IntegrationError::InvalidRequest(_))
        ));
        assert!(matches!(
            integ.integrate(&model, &state[..2], &values, (0.0, 10.0), 50),
            Err(IntegrationError::InvalidRequest(_))
        ));
        assert!(matches!(
            integ.integrate(&model, &state, &param_values([("beta", 0.3)]), (0.0, 10.0), 50),
            Err(IntegrationError::InvalidRequest(message)) if message.contains("gamma")
        ));
    }

    #[test]
    fn fine_grids_are_not_limited_by_the_step_budget() {
        let integ = integrator();
        let exponential = ModelFamily::Exponential.definition();
        let values = param_values([("r", 0.03), ("p0", 100.0)]);
        let result = integ
            .integrate(&exponential, &[100.0], &values, (0.0, 100.0), 20_000)
            .expect("fixed grid with 20 000 samples");
        assert_eq!(result.len(), 20_000);
        let last = result.final_value("P").expect("P trajectory");
        assert!((last - 100.0 * 3.0_f64.exp()).abs() < 1e-6, "ended at {last}");

        let logistic = ModelFamily::Logistic.definition();
        let values = param_values([("r", 0.2), ("k", 150.0)]);
        let result = integ
            .integrate(&logistic, &[10.0], &values, (0.0, 60.0), 20_000)
            .expect("adaptive with 20 000 samples");
        assert_eq!(result.len(), 20_000);
    }

    #[test]
    fn oversized_resolution_is_rejected_before_allocating() {
        let model = ModelFamily::Exponential.definition();
        let values = param_values([("r", 0.03)]);
        let integ = integrator();
        for resolution in [DEFAULT_MAX_RESOLUTION + 1, usize::MAX] {
            assert!(matches!(
                integ.integrate(&model, &[1.0], &values, (0.0, 1.0), resolution),
                Err(IntegrationError::InvalidRequest(message)) if message.contains("at most")
            ));
        }
        assert!(integ
            .integrate(&model, &[1.0], &values, (0.0, 1.0), DEFAULT_MAX_RESOLUTION)
            .is_ok());
    }

    #[test]
    fn run_validates_parameters_before_integrating() {
        let model = Arc::new(ModelFamily::Sir.definition());
        let request = |beta: f64| SimulationRequest {
            model: Arc::clone(&model),
            initial_state: vec![999.0, 1.0, 0.0],
            param_values: param_values([("beta", beta), ("gamma", 0.1), ("n", 1000.0)]),
            time_span: (0.0, 10.0),
            resolution: 11,
        };

        let err = integrator().run(&request(-1.0)).expect_err("negative beta");
        match err {
            EpiplotError::Validation(validation) => {
                assert_eq!(validation.parameters().collect::<Vec<_>>(), vec!["beta"]);
            }
            other => panic!("expected a validation error, got {other:?}"),
        }

        let result = integrator().run(&request(0.3)).expect("valid request");
        assert_eq!(result.len(), 11);
    }

    #[test]
    fn runaway_growth_reports_non_finite_time() {
        let model = ModelFamily::Exponential.definition();
        let values = param_values([("r", 800.0), ("p0", 1.0)]);
        let err = integrator()
            .integrate(&model, &[1.0], &values, (0.0, 10.0), 11)
            .expect_err("e^(800 t) overflows");
        match err {
            IntegrationError::NonFinite { t } => assert!(t > 0.0 && t <= 10.0),
            other => panic!("expected non-finite failure, got {other:?}"),
        }
    }
}
