//! Maps simulation results, vector fields and feed data onto [`ChartSpec`]s.
//!
//! Presenters are pure: they never call a solver or touch the network.

use crate::chart::{Axis, ChartSpec, Dash, Fill, Trace, TraceAxis, TraceMode};
use crate::feeds::{CountryHistory, HourlyTemperature};
use crate::integrator::SimulationResult;
use crate::model::{ModelDefinition, ParamValues};
use crate::models::ModelFamily;
use crate::vector_field::VectorFieldResult;
use chrono::NaiveTime;

const BLUE: &str = "blue";
const RED: &str = "red";
const GREEN: &str = "green";
const ORANGE: &str = "orange";

/// Every `n`th sample of the logistic curve gets a marker.
pub const LOGISTIC_MARKER_STRIDE: usize = 5;

fn series(result: &SimulationResult, var: &str) -> Vec<f64> {
    result.trajectory(var).map(<[f64]>::to_vec).unwrap_or_default()
}

fn compartment(result: &SimulationResult, var: &str, name: &str, color: &str, width: f64) -> Trace {
    Trace::line(name, &result.times, &series(result, var))
        .color(color)
        .width(width)
}

fn time_range(result: &SimulationResult) -> (f64, f64) {
    match (result.times.first(), result.times.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => (0.0, 0.0),
    }
}

/// Chart for `family` using the form values that produced `result`.
pub fn present(
    family: ModelFamily,
    model: &ModelDefinition,
    result: &SimulationResult,
    values: &ParamValues,
) -> ChartSpec {
    match family {
        ModelFamily::Logistic => {
            let k = values.get("k").copied().unwrap_or(0.0);
            logistic(result, k)
        }
        ModelFamily::Exponential => exponential(result),
        ModelFamily::Sir => sir(result),
        ModelFamily::Seir => seir(result),
        ModelFamily::SirMassAction => compartments(model.title, result),
        ModelFamily::SirMassActionClamped => {
            let population: f64 = ["s0", "i0", "r0"]
                .iter()
                .filter_map(|name| values.get(*name))
                .sum();
            project_sir(result, population)
        }
        ModelFamily::Rumor => rumor(result, model.title),
    }
}

/// Zero-valued chart for `family`, shown when a simulation cannot run.
pub fn empty(family: ModelFamily, model: &ModelDefinition) -> ChartSpec {
    let result = SimulationResult::zeros(model, (0.0, model.default_t_end), 2);
    present(family, model, &result, &model.default_values())
}

pub fn logistic(result: &SimulationResult, carrying_capacity: f64) -> ChartSpec {
    let population = series(result, "P");
    let (t0, t_end) = time_range(result);
    let (marker_t, marker_p): (Vec<f64>, Vec<f64>) = result
        .times
        .iter()
        .zip(&population)
        .step_by(LOGISTIC_MARKER_STRIDE)
        .map(|(&t, &p)| (t, p))
        .unzip();

    ChartSpec::new(
        "Modelo Logístico de Crecimiento Poblacional",
        Axis::titled("Tiempo (t)"),
        Axis::titled("Población P(t)"),
    )
    .trace(
        Trace::line("Población P(t)", &result.times, &population)
            .color("black")
            .width(2.0),
    )
    .trace(
        Trace::line("Puntos muestreados", &marker_t, &marker_p)
            .mode(TraceMode::Markers)
            .color(BLUE)
            .marker_size(8.0),
    )
    .trace(
        Trace::line(
            "Capacidad de Carga (K)",
            &[t0, t_end],
            &[carrying_capacity, carrying_capacity],
        )
        .color(RED)
        .width(3.0)
        .dash(Dash::Dot),
    )
}

/// The homework variant: plain curve against a dashed capacity line.
pub fn logistic_with_capacity(result: &SimulationResult, carrying_capacity: f64) -> ChartSpec {
    let capacity = vec![carrying_capacity; result.times.len()];
    ChartSpec::new(
        "Campo de vectores de dP/dt = rP(1 - P/k)",
        Axis::titled("Tiempo (t)"),
        Axis::titled("Población (P)"),
    )
    .trace(compartment(result, "P", "Ecuación Logística", BLUE, 2.0))
    .trace(
        Trace::line("Capacidad de carga", &result.times, &capacity)
            .color(RED)
            .width(3.0)
            .dash(Dash::Dash),
    )
}

pub fn exponential(result: &SimulationResult) -> ChartSpec {
    ChartSpec::new(
        "Crecimiento de la población (modelo exponencial)",
        Axis::titled("Tiempo (t)"),
        Axis::titled("Población P(t)"),
    )
    .trace(
        Trace::line("Población P(t)", &result.times, &series(result, "P"))
            .mode(TraceMode::LinesMarkers)
            .color("#d0021b"),
    )
}

pub fn sir(result: &SimulationResult) -> ChartSpec {
    let (t0, t_end) = time_range(result);
    ChartSpec::new(
        "Evolución del Modelo SIR",
        Axis::titled("Tiempo (días)").range(t0, t_end),
        Axis::titled("Número de personas"),
    )
    .trace(compartment(result, "S", "Susceptibles (S)", BLUE, 2.0))
    .trace(compartment(result, "I", "Infectados (I)", RED, 2.0))
    .trace(compartment(result, "R", "Recuperados (R)", GREEN, 2.0))
}

pub fn seir(result: &SimulationResult) -> ChartSpec {
    ChartSpec::new("Modelo SEIR", Axis::titled("Tiempo (t)"), Axis::titled("Población"))
        .trace(compartment(result, "S", "S(t)", BLUE, 2.0))
        .trace(compartment(result, "E", "E(t)", ORANGE, 2.0))
        .trace(compartment(result, "I", "I(t)", RED, 2.0))
        .trace(compartment(result, "R", "R(t)", GREEN, 2.0))
}

/// Plain S/I/R chart for the mass-action family.
pub fn compartments(title: &str, result: &SimulationResult) -> ChartSpec {
    ChartSpec::new(title, Axis::titled("Días"), Axis::titled("Personas"))
        .trace(compartment(result, "S", "S(t)", "#0077CC", 2.5))
        .trace(compartment(result, "I", "I(t)", "#581D1D", 2.5))
        .trace(compartment(result, "R", "R(t)", "#009933", 2.5))
}

pub fn rumor(result: &SimulationResult, title: &str) -> ChartSpec {
    ChartSpec::new(title, Axis::titled("Tiempo"), Axis::titled("Personas"))
        .trace(compartment(result, "S", "Susceptibles (S)", "#1976D2", 2.0))
        .trace(compartment(result, "I", "Infectados (I)", "#D32F2F", 3.0).fill(Fill::ToZeroY))
        .trace(compartment(result, "R", "Racionales (R)", "#388E3C", 2.0))
        .height(380)
}

/// Clamped SIR with the time axis fixed to the span and the population axis
/// to `[0, 1.01 N]`.
pub fn project_sir(result: &SimulationResult, population: f64) -> ChartSpec {
    let (t0, t_end) = time_range(result);
    ChartSpec::new(
        "Modelo SIR - Universidad de San Marcos",
        Axis::titled("Tiempo (días)").range(t0, t_end),
        Axis::titled("Número de personas").range(0.0, population * 1.01),
    )
    .trace(compartment(result, "S", "Susceptibles S(t)", "#0077cc", 2.5))
    .trace(compartment(result, "I", "Infectados I(t)", "#d11a2a", 3.0).fill(Fill::ToZeroY))
    .trace(compartment(result, "R", "Recuperados R(t)", "#009944", 2.5))
    .height(550)
}

/// One compartment on its own, as used by the adopter and promoter pages.
pub fn single_compartment(
    result: &SimulationResult,
    var: &str,
    title: &str,
    color: &str,
    y_max: Option<f64>,
) -> ChartSpec {
    let mut y_axis = Axis::titled("Personas");
    if let Some(max) = y_max {
        y_axis = y_axis.range(0.0, max);
    }
    ChartSpec::new(title, Axis::titled("Días"), y_axis)
        .trace(compartment(result, var, &format!("{var}(t)"), color, 2.5))
        .height(300)
}

/// One scenario of a [`comparison`] chart.
pub struct ComparedSeries<'a> {
    pub name: &'a str,
    pub color: &'a str,
    pub result: &'a SimulationResult,
}

/// Overlays one compartment from several scenarios.
pub fn comparison(title: &str, var: &str, scenarios: &[ComparedSeries<'_>]) -> ChartSpec {
    scenarios.iter().fold(
        ChartSpec::new(title, Axis::titled("Días"), Axis::titled("Personas")).height(430),
        |chart, scenario| {
            chart.trace(compartment(scenario.result, var, scenario.name, scenario.color, 3.0))
        },
    )
}

pub fn vector_field(field: &VectorFieldResult) -> ChartSpec {
    let mut xs = Vec::with_capacity(field.arrows.len() * 3);
    let mut ys = Vec::with_capacity(field.arrows.len() * 3);
    for arrow in &field.arrows {
        xs.extend([Some(arrow.x), Some(arrow.end_x), None]);
        ys.extend([Some(arrow.y), Some(arrow.end_y), None]);
    }
    let (grid_x, grid_y): (Vec<f64>, Vec<f64>) = field.grid.iter().map(|&[x, y]| (x, y)).unzip();

    empty_vector_field(field.range_x, field.range_y)
        .trace(
            Trace::with_axis("Campo", TraceAxis::Numeric(xs), ys)
                .color(BLUE)
                .width(1.2)
                .hide_legend(),
        )
        .trace(
            Trace::line("Malla", &grid_x, &grid_y)
                .mode(TraceMode::Markers)
                .color(RED)
                .marker_size(2.0)
                .hide_legend(),
        )
}

/// Axes of a vector-field chart without any glyphs.
pub fn empty_vector_field(range_x: f64, range_y: f64) -> ChartSpec {
    ChartSpec::new(
        "Campo Vectorial",
        Axis::titled("x").range(-range_x, range_x),
        Axis::titled("y").range(-range_y, range_y),
    )
    .equal_aspect()
}

fn covid_title(country: &str) -> String {
    format!("Evolución COVID-19 en {country}")
}

pub fn covid(history: &CountryHistory) -> ChartSpec {
    let dates: Vec<_> = history
        .rows
        .iter()
        .map(|row| row.date.and_time(NaiveTime::MIN))
        .collect();
    let counts = |pick: fn(&crate::feeds::CovidRow) -> i64| -> Vec<Option<f64>> {
        history.rows.iter().map(|row| Some(pick(row) as f64)).collect()
    };

    ChartSpec::new(
        covid_title(&history.country),
        Axis::titled("Fecha"),
        Axis::titled("Número de personas"),
    )
    .trace(
        Trace::with_axis("Casos Totales", TraceAxis::Timestamps(dates.clone()), counts(|r| r.cases))
            .color(ORANGE)
            .width(3.0),
    )
    .trace(
        Trace::with_axis("Muertes Totales", TraceAxis::Timestamps(dates.clone()), counts(|r| r.deaths))
            .color(RED)
            .width(3.0),
    )
    .trace(
        Trace::with_axis("Recuperados", TraceAxis::Timestamps(dates), counts(|r| r.recovered))
            .color(GREEN)
            .width(2.0)
            .dash(Dash::Dash),
    )
    .height(430)
}

pub fn empty_covid(country: &str) -> ChartSpec {
    ChartSpec::new(
        covid_title(country),
        Axis::titled("Fecha"),
        Axis::titled("Número de personas"),
    )
    .trace(Trace::line("No data", &[0.0, 1.0], &[0.0, 0.0]))
    .height(430)
}

fn weather_title(country: &str) -> String {
    format!("Temperatura Horaria - {country}")
}

pub fn weather(forecast: &HourlyTemperature, country: &str) -> ChartSpec {
    ChartSpec::new(
        weather_title(country),
        Axis::titled("Hora"),
        Axis::titled("Temperatura (°C)"),
    )
    .trace(
        Trace::with_axis(
            "Temperatura",
            TraceAxis::Timestamps(forecast.times.clone()),
            forecast.temperatures.clone(),
        )
        .color("black")
        .width(2.0),
    )
}

pub fn empty_weather(country: &str) -> ChartSpec {
    ChartSpec::new(
        weather_title(country),
        Axis::titled("Hora"),
        Axis::titled("Temperatura (°C)"),
    )
}
