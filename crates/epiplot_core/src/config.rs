use crate::error::EpiplotError;
use crate::feeds::FeedSettings;
use crate::integrator::IntegratorSettings;
use serde::{Deserialize, Serialize};

/// Everything the dashboard reads at startup. Missing sections fall back to
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub integrator: IntegratorSettings,
    pub feeds: FeedSettings,
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EpiplotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, EpiplotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config = DashboardConfig::from_json_str(
            r#"{"integrator": {"rtol": 1e-8}, "feeds": {"timeout_secs": 3}}"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.integrator.rtol, 1e-8);
        assert_eq!(config.integrator.atol, IntegratorSettings::default().atol);
        assert_eq!(config.feeds.timeout_secs, 3);
        assert_eq!(config.feeds.weather_cache_capacity, 300);
    }

    #[test]
    fn empty_object_is_the_default_config() {
        let config = DashboardConfig::from_json_str("{}").expect("empty config");
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = DashboardConfig::from_json_str("{").expect_err("truncated JSON");
        assert!(matches!(err, EpiplotError::Config(_)));
    }
}
