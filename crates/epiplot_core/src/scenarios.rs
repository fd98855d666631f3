//! The fixed teaching scenarios rendered once at startup.

use crate::chart::ChartSpec;
use crate::error::{EpiplotError, IntegrationError};
use crate::integrator::{Integrator, SimulationResult};
use crate::model::{param_values, ModelDefinition, ParamValues};
use crate::models::{ModelCatalog, ModelFamily};
use crate::presenters::{self, ComparedSeries};
use crate::validation::validate_form;
use serde::Serialize;

pub const ADOPTION_POPULATION: f64 = 10_000.0;
pub const ADOPTION_SEED: f64 = 10.0;
pub const ADOPTION_GAMMA: f64 = 0.25;
pub const ADOPTION_BASIC_REPRODUCTION: f64 = 2.5;

pub const PROJECT_SUSCEPTIBLE: f64 = 7137.0;
pub const PROJECT_INFECTED: f64 = 1.0;
pub const PROJECT_GAMMA: f64 = 0.4;
/// Day at which the project reports the infected count.
pub const PROJECT_REPORT_DAY: f64 = 6.0;

/// Validates, seeds and integrates one scenario.
pub fn run_scenario(
    integrator: &Integrator,
    model: &ModelDefinition,
    values: &ParamValues,
    time_span: (f64, f64),
    resolution: usize,
) -> Result<SimulationResult, EpiplotError> {
    validate_form(model, values)?;
    let state = model.initial_state(values).map_err(|name| {
        IntegrationError::InvalidRequest(format!("missing initial field '{name}'"))
    })?;
    Ok(integrator.integrate(model, &state, values, time_span, resolution)?)
}

/// One of the three adoption scenarios: baseline, doubled contact rate,
/// doubled removal rate.
#[derive(Debug, Clone, Copy)]
struct AdoptionScenario {
    key: &'static str,
    adopters_title: &'static str,
    adopters_max: f64,
    promoters_title: &'static str,
    promoters_max: f64,
    color: &'static str,
    b_factor: f64,
    g_factor: f64,
}

const ADOPTION_SCENARIOS: [AdoptionScenario; 3] = [
    AdoptionScenario {
        key: "baseline",
        adopters_title: "R(t) - baseline",
        adopters_max: 9500.0,
        promoters_title: "I(t) - baseline (escenario)",
        promoters_max: 2500.0,
        color: "#0077CC",
        b_factor: 1.0,
        g_factor: 1.0,
    },
    AdoptionScenario {
        key: "b_double",
        adopters_title: "R(t) - β doble",
        adopters_max: 10200.0,
        promoters_title: "I(t) - β duplicado",
        promoters_max: 5000.0,
        color: "#FF8800",
        b_factor: 2.0,
        g_factor: 1.0,
    },
    AdoptionScenario {
        key: "k_double",
        adopters_title: "R(t) - γ doble",
        adopters_max: 4000.0,
        promoters_title: "I(t) - γ duplicado",
        promoters_max: 300.0,
        color: "#00AA44",
        b_factor: 1.0,
        g_factor: 2.0,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultFigures {
    pub rumor: [ChartSpec; 2],
    /// Passive adopters R(t) per adoption scenario.
    pub adopters: [ChartSpec; 3],
    /// Active promoters I(t) per adoption scenario.
    pub promoters: [ChartSpec; 3],
    pub comparison: ChartSpec,
    pub project: ChartSpec,
    pub project_infected_on_report_day: f64,
    pub logistic_homework: ChartSpec,
    pub exponential: ChartSpec,
}

impl DefaultFigures {
    pub fn compute(catalog: &ModelCatalog, integrator: &Integrator) -> Result<Self, EpiplotError> {
        let rumor = rumor_figures(catalog, integrator)?;
        let (adopters, promoters, comparison) = adoption_figures(catalog, integrator)?;
        let (project, project_infected_on_report_day) = project_figure(catalog, integrator)?;

        let logistic = catalog.get(ModelFamily::Logistic);
        let homework = run_scenario(
            integrator,
            &logistic,
            &param_values([("r", 0.2), ("k", 150.0), ("p0", 10.0)]),
            (0.0, 60.0),
            200,
        )?;

        let exponential = catalog.get(ModelFamily::Exponential);
        let growth = run_scenario(
            integrator,
            &exponential,
            &param_values([("r", 0.03), ("p0", 100.0)]),
            (0.0, 100.0),
            50,
        )?;

        Ok(Self {
            rumor,
            adopters,
            promoters,
            comparison,
            project,
            project_infected_on_report_day,
            logistic_homework: presenters::logistic_with_capacity(&homework, 150.0),
            exponential: presenters::exponential(&growth),
        })
    }

    /// Every chart with a stable key, in page order.
    pub fn charts(&self) -> Vec<(String, &ChartSpec)> {
        let mut charts = vec![
            ("rumor_k1".to_string(), &self.rumor[0]),
            ("rumor_k2".to_string(), &self.rumor[1]),
        ];
        for (scenario, chart) in ADOPTION_SCENARIOS.iter().zip(&self.adopters) {
            charts.push((format!("adopters_{}", scenario.key), chart));
        }
        for (scenario, chart) in ADOPTION_SCENARIOS.iter().zip(&self.promoters) {
            charts.push((format!("promoters_{}", scenario.key), chart));
        }
        charts.push(("comparison".to_string(), &self.comparison));
        charts.push(("project".to_string(), &self.project));
        charts.push(("logistic_homework".to_string(), &self.logistic_homework));
        charts.push(("exponential".to_string(), &self.exponential));
        charts
    }

    pub fn get(&self, key: &str) -> Option<&ChartSpec> {
        self.charts()
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, chart)| chart)
    }
}

fn rumor_figures(
    catalog: &ModelCatalog,
    integrator: &Integrator,
) -> Result<[ChartSpec; 2], EpiplotError> {
    let model = catalog.get(ModelFamily::Rumor);
    let chart = |k: f64| -> Result<ChartSpec, EpiplotError> {
        let values = param_values([("b", 0.004), ("k", k), ("s0", 266.0), ("i0", 1.0), ("r0", 8.0)]);
        let result = run_scenario(integrator, &model, &values, (0.0, 15.0), 150)?;
        Ok(presenters::rumor(&result, &format!("Evolución del Rumor (k = {k})")))
    };
    Ok([chart(0.01)?, chart(0.02)?])
}

fn adoption_values(scenario: &AdoptionScenario) -> ParamValues {
    let beta = ADOPTION_BASIC_REPRODUCTION * ADOPTION_GAMMA / ADOPTION_POPULATION;
    param_values([
        ("b", beta * scenario.b_factor),
        ("g", ADOPTION_GAMMA * scenario.g_factor),
        ("s0", ADOPTION_POPULATION - ADOPTION_SEED),
        ("i0", ADOPTION_SEED),
        ("r0", 0.0),
    ])
}

#[allow(clippy::type_complexity)]
fn adoption_figures(
    catalog: &ModelCatalog,
    integrator: &Integrator,
) -> Result<([ChartSpec; 3], [ChartSpec; 3], ChartSpec), EpiplotError> {
    let model = catalog.get(ModelFamily::SirMassAction);
    let mut results = Vec::with_capacity(ADOPTION_SCENARIOS.len());
    for scenario in &ADOPTION_SCENARIOS {
        results.push(run_scenario(
            integrator,
            &model,
            &adoption_values(scenario),
            (0.0, 100.0),
            100,
        )?);
    }

    let adopters = [0, 1, 2].map(|i| {
        let s = &ADOPTION_SCENARIOS[i];
        presenters::single_compartment(&results[i], "R", s.adopters_title, "#0077cc", Some(s.adopters_max))
    });
    let promoters = [0, 1, 2].map(|i| {
        let s = &ADOPTION_SCENARIOS[i];
        presenters::single_compartment(&results[i], "I", s.promoters_title, "#581D1D", Some(s.promoters_max))
    });
    let compared: Vec<ComparedSeries<'_>> = ADOPTION_SCENARIOS
        .iter()
        .zip(&results)
        .map(|(scenario, result)| ComparedSeries {
            name: scenario.key,
            color: scenario.color,
            result,
        })
        .collect();
    let comparison = presenters::comparison("Comparación de I(t) entre escenarios", "I", &compared);

    Ok((adopters, promoters, comparison))
}

fn project_figure(
    catalog: &ModelCatalog,
    integrator: &Integrator,
) -> Result<(ChartSpec, f64), EpiplotError> {
    let model = catalog.get(ModelFamily::SirMassActionClamped);
    let population = PROJECT_SUSCEPTIBLE + PROJECT_INFECTED;
    let values = param_values([
        ("b", 1.0 / population),
        ("g", PROJECT_GAMMA),
        ("s0", PROJECT_SUSCEPTIBLE),
        ("i0", PROJECT_INFECTED),
        ("r0", 0.0),
    ]);
    let full = run_scenario(integrator, &model, &values, (0.0, 40.0), 400)?;
    let report = run_scenario(integrator, &model, &values, (0.0, PROJECT_REPORT_DAY), 100)?;
    let infected = report.final_value("I").unwrap_or(f64::NAN);
    Ok((presenters::project_sir(&full, population), infected))
}
