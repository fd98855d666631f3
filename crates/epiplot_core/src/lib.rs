pub mod cache;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod equation_engine;
pub mod error;
pub mod feeds;
pub mod integrator;
pub mod model;
pub mod models;
pub mod presenters;
pub mod scenarios;
pub mod solvers;
/// The `epiplot_core` crate holds everything behind the teaching dashboard:
/// compartmental and growth models, their integration, chart packaging and
/// the two external data feeds.
///
/// Key components:
/// - **Models**: `ModelDefinition` (state variables, constrained parameters, pure RHS) and the built-in `ModelCatalog`.
/// - **Integrator**: fixed-step RK4 and adaptive Dormand-Prince sampling onto an even time grid.
/// - **Validation**: per-parameter domain checks that report every violation at once.
/// - **Equation Engine**: a closed-grammar parser and bytecode VM for user-typed vector fields.
/// - **Presenters**: pure mapping from results to renderer-independent `ChartSpec`s.
/// - **Feeds**: COVID-19 history and hourly weather adapters behind an `HttpGet` transport.
pub mod traits;
pub mod validation;
pub mod vector_field;

pub use chart::ChartSpec;
pub use config::DashboardConfig;
pub use dashboard::{CovidPanel, Dashboard, PanelOutcome, SimulationForm};
pub use error::{EpiplotError, Result};
pub use integrator::{Integrator, IntegratorSettings, SimulationRequest, SimulationResult};
pub use model::{ModelDefinition, ParamValues};
pub use models::{ModelCatalog, ModelFamily};
