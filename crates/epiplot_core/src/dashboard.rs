//! Page-level operations. Every failure is turned into a message plus a
//! safe chart here; nothing below this layer decides what the user sees.

use crate::chart::ChartSpec;
use crate::config::DashboardConfig;
use crate::error::{EpiplotError, FeedError, IntegrationError, ParameterViolation, ValidationError};
use crate::feeds::{Country, CovidFeed, HttpGet, SummaryCards, WeatherFeed};
use crate::integrator::{Integrator, SimulationResult};
use crate::model::{Constraint, ParamValues};
use crate::models::{ModelCatalog, ModelFamily};
use crate::presenters;
use crate::scenarios::DefaultFigures;
use crate::validation::validate_form;
use crate::vector_field::VectorFieldRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A chart plus the inline message shown above it, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelOutcome {
    pub chart: ChartSpec,
    pub message: Option<String>,
}

impl PanelOutcome {
    pub fn ok(chart: ChartSpec) -> Self {
        Self {
            chart,
            message: None,
        }
    }

    pub fn with_message(chart: ChartSpec, message: impl Into<String>) -> Self {
        Self {
            chart,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovidPanel {
    #[serde(flatten)]
    pub panel: PanelOutcome,
    pub cards: SummaryCards,
}

/// Values typed into a model page. `t_end` and `resolution` default to the
/// model's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationForm {
    pub values: ParamValues,
    pub t_end: Option<f64>,
    pub resolution: Option<usize>,
}

impl SimulationForm {
    pub fn defaults_for(family: ModelFamily) -> Self {
        Self {
            values: family.definition().default_values(),
            ..Self::default()
        }
    }
}

pub fn no_data_message(country: &str) -> String {
    format!("No data for {country}.")
}

pub struct Dashboard {
    config: DashboardConfig,
    catalog: ModelCatalog,
    integrator: Integrator,
    covid: CovidFeed,
    weather: WeatherFeed,
    defaults: DefaultFigures,
}

impl Dashboard {
    /// Builds the catalog and renders every default figure up front.
    pub fn new(config: DashboardConfig, transport: Arc<dyn HttpGet>) -> Result<Self, EpiplotError> {
        let catalog = ModelCatalog::builtin();
        let integrator = Integrator::new(config.integrator);
        let defaults = DefaultFigures::compute(&catalog, &integrator)?;
        let covid = CovidFeed::new(Arc::clone(&transport), config.feeds.clone());
        let weather = WeatherFeed::new(transport, config.feeds.clone());

        info!(
            models = ModelFamily::ALL.len(),
            figures = defaults.charts().len(),
            weather_cache = config.feeds.weather_cache_capacity,
            "dashboard ready"
        );

        Ok(Self {
            config,
            catalog,
            integrator,
            covid,
            weather,
            defaults,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn default_figures(&self) -> &DefaultFigures {
        &self.defaults
    }

    pub fn covid_feed(&self) -> &CovidFeed {
        &self.covid
    }

    pub fn weather_feed(&self) -> &WeatherFeed {
        &self.weather
    }

    /// Validates the form and integrates. Validation failures stop before
    /// the solver runs.
    pub fn run_simulation(
        &self,
        family: ModelFamily,
        form: &SimulationForm,
    ) -> Result<(SimulationResult, ChartSpec), EpiplotError> {
        let model = self.catalog.get(family);
        validate_form(&model, &form.values)?;

        let t_end = form.t_end.unwrap_or(model.default_t_end);
        if let Some(reason) = Constraint::Positive.check(t_end) {
            return Err(ValidationError {
                violations: vec![ParameterViolation {
                    parameter: "t_end".to_string(),
                    reason,
                }],
            }
            .into());
        }
        let resolution = form.resolution.unwrap_or(model.default_resolution);

        let state = model.initial_state(&form.values).map_err(|name| {
            IntegrationError::InvalidRequest(format!("missing initial field '{name}'"))
        })?;
        let result =
            self.integrator
                .integrate(&model, &state, &form.values, (0.0, t_end), resolution)?;
        let chart = presenters::present(family, &model, &result, &form.values);
        Ok((result, chart))
    }

    pub fn simulate(&self, family: ModelFamily, form: &SimulationForm) -> PanelOutcome {
        match self.run_simulation(family, form) {
            Ok((_, chart)) => PanelOutcome::ok(chart),
            Err(err) => {
                warn!(model = family.key(), error = %err, "simulation fell back to empty chart");
                let model = self.catalog.get(family);
                PanelOutcome::with_message(presenters::empty(family, &model), err.to_string())
            }
        }
    }

    /// Evaluates a direction field. On failure the previous chart (or an
    /// empty field) is kept and the error becomes the message.
    pub fn vector_field(
        &self,
        request: &VectorFieldRequest,
        previous: Option<&ChartSpec>,
    ) -> PanelOutcome {
        match request.evaluate() {
            Ok(field) => PanelOutcome::ok(presenters::vector_field(&field)),
            Err(err) => {
                warn!(dx = %request.dx_expr, dy = %request.dy_expr, error = %err, "vector field rejected");
                let chart = previous.cloned().unwrap_or_else(|| {
                    presenters::empty_vector_field(
                        finite_or(request.range_x, 1.0),
                        finite_or(request.range_y, 1.0),
                    )
                });
                PanelOutcome::with_message(chart, format!("ERROR: {err}"))
            }
        }
    }

    pub fn covid(&self, country: Option<&str>, last_days: Option<usize>) -> CovidPanel {
        let Some(country) = country.filter(|name| !name.is_empty()) else {
            return CovidPanel {
                panel: PanelOutcome::with_message(presenters::empty_covid(""), "Select a country."),
                cards: SummaryCards::unknown(),
            };
        };

        let history = self
            .covid
            .historical(country, last_days)
            .and_then(|history| match history.summary() {
                Some(cards) => Ok((history, cards)),
                None => Err(FeedError::Shape(format!("empty history for {country}"))),
            });

        match history {
            Ok((history, cards)) => CovidPanel {
                panel: PanelOutcome::with_message(
                    presenters::covid(&history),
                    format!("Data updated for {country}."),
                ),
                cards,
            },
            Err(err) => {
                warn!(country, error = %err, "covid feed unavailable");
                CovidPanel {
                    panel: PanelOutcome::with_message(
                        presenters::empty_covid(country),
                        no_data_message(country),
                    ),
                    cards: SummaryCards::unknown(),
                }
            }
        }
    }

    /// Country names offered by the statistics feed; empty when unreachable.
    pub fn covid_countries(&self) -> Vec<String> {
        self.covid.countries().unwrap_or_else(|err| {
            warn!(error = %err, "covid country list unavailable");
            Vec::new()
        })
    }

    pub fn weather(&self, country: &str) -> PanelOutcome {
        let forecast = self
            .weather
            .find_country(country)
            .and_then(|found| self.weather.hourly_temperature(found.latitude, found.longitude));
        match forecast {
            Ok(forecast) => PanelOutcome::ok(presenters::weather(&forecast, country)),
            Err(err) => {
                warn!(country, error = %err, "weather feed unavailable");
                PanelOutcome::with_message(presenters::empty_weather(country), no_data_message(country))
            }
        }
    }

    pub fn weather_countries(&self) -> Vec<Country> {
        match self.weather.countries() {
            Ok(countries) => countries.as_ref().clone(),
            Err(err) => {
                warn!(error = %err, "weather country list unavailable");
                Vec::new()
            }
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}
