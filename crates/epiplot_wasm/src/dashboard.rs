//! `WasmDashboard`: the page-level operations exposed to JavaScript.

use crate::transport::HostTransport;
use anyhow::{anyhow, Context};
use epiplot_core::feeds::HttpResponse;
use epiplot_core::model::{ModelDefinition, ParameterSpec, SolverKind};
use epiplot_core::vector_field::{FieldPreset, VectorFieldRequest};
use epiplot_core::{ChartSpec, Dashboard, DashboardConfig, ModelFamily, SimulationForm};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use std::sync::Arc;
use wasm_bindgen::prelude::*;

fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn deserialize_or_default<T>(value: JsValue, what: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| anyhow!("Invalid {what}: {e}"))
}

fn family(name: &str) -> anyhow::Result<ModelFamily> {
    name.parse::<ModelFamily>()
        .with_context(|| format!("cannot simulate '{name}'"))
}

#[derive(Serialize)]
struct ModelSummary<'a> {
    key: &'static str,
    title: &'static str,
    state_vars: &'a [&'static str],
    parameters: &'a [ParameterSpec],
    initial_fields: &'a [ParameterSpec],
    solver: SolverKind,
    default_t_end: f64,
    default_resolution: usize,
}

impl<'a> ModelSummary<'a> {
    fn new(family: ModelFamily, model: &'a ModelDefinition) -> Self {
        Self {
            key: family.key(),
            title: model.title,
            state_vars: &model.state_vars,
            parameters: &model.parameters,
            initial_fields: &model.initial_fields,
            solver: model.solver,
            default_t_end: model.default_t_end,
            default_resolution: model.default_resolution,
        }
    }
}

#[derive(Serialize)]
struct PresetSummary {
    key: &'static str,
    label: &'static str,
    dx: &'static str,
    dy: &'static str,
}

#[wasm_bindgen]
pub struct WasmDashboard {
    dashboard: Dashboard,
    transport: Arc<HostTransport>,
}

#[wasm_bindgen]
impl WasmDashboard {
    /// `config` may be `undefined` for the built-in defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmDashboard, JsValue> {
        console_error_panic_hook::set_once();

        let config: DashboardConfig =
            deserialize_or_default(config, "dashboard config").map_err(js_error)?;
        let transport = Arc::new(HostTransport::default());
        let dashboard = Dashboard::new(config, transport.clone())
            .context("dashboard startup failed")
            .map_err(js_error)?;
        Ok(WasmDashboard {
            dashboard,
            transport,
        })
    }

    pub fn models(&self) -> Result<JsValue, JsValue> {
        let catalog = self.dashboard.catalog();
        let models: Vec<_> = catalog
            .families()
            .map(|family| (family, catalog.get(family)))
            .collect();
        let summaries: Vec<ModelSummary<'_>> = models
            .iter()
            .map(|(family, model)| ModelSummary::new(*family, model))
            .collect();
        serialize(&summaries)
    }

    /// Validates and integrates, returning `{ chart, message }`. Bad input
    /// comes back as a message, never as a thrown error.
    pub fn simulate(&self, family_name: &str, form: JsValue) -> Result<JsValue, JsValue> {
        let family = family(family_name).map_err(js_error)?;
        let form: SimulationForm = deserialize_or_default(form, "simulation form").map_err(js_error)?;
        serialize(&self.dashboard.simulate(family, &form))
    }

    /// Raw trajectories for callers that draw their own charts. Throws on
    /// invalid input.
    pub fn trajectories(&self, family_name: &str, form: JsValue) -> Result<JsValue, JsValue> {
        let family = family(family_name).map_err(js_error)?;
        let form: SimulationForm = deserialize_or_default(form, "simulation form").map_err(js_error)?;
        let (result, _) = self
            .dashboard
            .run_simulation(family, &form)
            .map_err(|e| js_error(e.into()))?;
        serialize(&result)
    }

    pub fn vector_field(&self, request: JsValue, previous: JsValue) -> Result<JsValue, JsValue> {
        let request: VectorFieldRequest =
            deserialize_or_default(request, "vector field request").map_err(js_error)?;
        let previous: Option<ChartSpec> = if previous.is_undefined() || previous.is_null() {
            None
        } else {
            let chart = from_value(previous)
                .map_err(|e| JsValue::from_str(&format!("Invalid previous chart: {}", e)))?;
            Some(chart)
        };
        serialize(&self.dashboard.vector_field(&request, previous.as_ref()))
    }

    pub fn vector_field_presets(&self) -> Result<JsValue, JsValue> {
        let presets: Vec<PresetSummary> = FieldPreset::ALL
            .into_iter()
            .map(|preset| {
                let (dx, dy) = preset.expressions();
                PresetSummary {
                    key: preset.key(),
                    label: preset.label(),
                    dx,
                    dy,
                }
            })
            .collect();
        serialize(&presets)
    }

    pub fn default_figures(&self) -> Result<JsValue, JsValue> {
        serialize(self.dashboard.default_figures())
    }

    pub fn covid_history_url(&self, country: &str) -> String {
        self.dashboard.covid_feed().history_url(country)
    }

    pub fn covid_countries_url(&self) -> String {
        self.dashboard.covid_feed().countries_url()
    }

    pub fn weather_countries_url(&self) -> String {
        self.dashboard.config().feeds.countries_url.clone()
    }

    pub fn forecast_url(&self, latitude: f64, longitude: f64) -> String {
        self.dashboard.weather_feed().forecast_url(latitude, longitude)
    }

    /// Hands a fetched body to the feeds. The next lookup of `url` consumes
    /// it, so provide it again before each uncached request.
    pub fn provide_response(&self, url: String, status: u16, body: String) {
        self.transport.provide(url, HttpResponse { status, body });
    }

    pub fn forget_response(&self, url: &str) {
        self.transport.forget(url);
    }

    /// Provided bodies still waiting to be read.
    pub fn pending_responses(&self) -> usize {
        self.transport.len()
    }

    pub fn covid(&self, country: Option<String>, last_days: Option<usize>) -> Result<JsValue, JsValue> {
        serialize(&self.dashboard.covid(country.as_deref(), last_days))
    }

    pub fn covid_countries(&self) -> Result<JsValue, JsValue> {
        serialize(&self.dashboard.covid_countries())
    }

    pub fn weather(&self, country: &str) -> Result<JsValue, JsValue> {
        serialize(&self.dashboard.weather(country))
    }

    pub fn weather_countries(&self) -> Result<JsValue, JsValue> {
        serialize(&self.dashboard.weather_countries())
    }

    pub fn weather_cache_len(&self) -> usize {
        self.dashboard.weather_feed().cache().len()
    }
}

#[cfg(test)]
mod tests {
    use super::WasmDashboard;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn dashboard() -> WasmDashboard {
        WasmDashboard::new(JsValue::UNDEFINED)
            .unwrap_or_else(|_| panic!("dashboard should start with default config"))
    }

    #[wasm_bindgen_test]
    fn unknown_family_is_rejected() {
        let result = dashboard().simulate("zombie", JsValue::UNDEFINED);
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("unknown model family 'zombie'"), "{message}");
    }

    #[wasm_bindgen_test]
    fn default_form_simulates() {
        let outcome = dashboard().simulate("sir", JsValue::UNDEFINED);
        assert!(outcome.is_ok(), "empty form falls back to a message, not a throw");
    }

    #[wasm_bindgen_test]
    fn provided_feed_bodies_drive_the_covid_panel() {
        let dashboard = dashboard();
        let url = dashboard.covid_history_url("Peru");
        dashboard.provide_response(
            url,
            200,
            r#"{"timeline":{"cases":{"1/1/21":5,"1/2/21":9},"deaths":{"1/1/21":0,"1/2/21":1}}}"#
                .to_string(),
        );
        assert_eq!(dashboard.pending_responses(), 1);
        assert!(dashboard.covid(Some("Peru".to_string()), None).is_ok());
        assert_eq!(dashboard.pending_responses(), 0);
        assert!(dashboard.covid_countries().is_ok());
    }
}
