//! Hourly temperature forecasts from an open-meteo-style feed, memoized per
//! coordinate pair.

use super::transport::{FeedSettings, HttpGet};
use crate::cache::{BoundedCache, CoordinateKey};
use crate::error::FeedError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Country {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTemperature {
    pub times: Vec<NaiveDateTime>,
    /// Degrees Celsius; `None` where the feed reported null.
    pub temperatures: Vec<Option<f64>>,
}

impl HourlyTemperature {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[derive(Deserialize)]
struct ForecastPayload {
    hourly: Option<Hourly>,
}

#[derive(Deserialize)]
struct Hourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct CountryPayload {
    name: CountryName,
    #[serde(default)]
    latlng: Vec<f64>,
}

#[derive(Deserialize)]
struct CountryName {
    common: String,
}

fn parse_hour(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

pub fn parse_forecast(body: &str) -> Result<HourlyTemperature, FeedError> {
    let payload: ForecastPayload = serde_json::from_str(body)?;
    let hourly = payload
        .hourly
        .ok_or_else(|| FeedError::Shape("forecast has no hourly block".to_string()))?;
    if hourly.time.len() != hourly.temperature_2m.len() {
        return Err(FeedError::Shape(format!(
            "{} timestamps but {} temperatures",
            hourly.time.len(),
            hourly.temperature_2m.len()
        )));
    }
    let times = hourly
        .time
        .iter()
        .map(|raw| {
            parse_hour(raw).ok_or_else(|| FeedError::Shape(format!("bad timestamp '{raw}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HourlyTemperature {
        times,
        temperatures: hourly.temperature_2m,
    })
}

/// Countries with usable coordinates, sorted by name.
pub fn parse_countries(body: &str) -> Result<Vec<Country>, FeedError> {
    let entries: Vec<CountryPayload> = serde_json::from_str(body)?;
    let mut countries: Vec<Country> = entries
        .into_iter()
        .filter(|entry| entry.latlng.len() >= 2)
        .map(|entry| Country {
            name: entry.name.common,
            latitude: entry.latlng[0],
            longitude: entry.latlng[1],
        })
        .collect();
    countries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(countries)
}

pub struct WeatherFeed {
    transport: Arc<dyn HttpGet>,
    settings: FeedSettings,
    cache: BoundedCache<CoordinateKey, Arc<HourlyTemperature>>,
    countries: Mutex<Option<Arc<Vec<Country>>>>,
}

impl WeatherFeed {
    pub fn new(transport: Arc<dyn HttpGet>, settings: FeedSettings) -> Self {
        let cache = BoundedCache::new(settings.weather_cache_capacity);
        Self {
            transport,
            settings,
            cache,
            countries: Mutex::new(None),
        }
    }

    pub fn forecast_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}?latitude={latitude}&longitude={longitude}&hourly=temperature_2m",
            self.settings.weather_base_url
        )
    }

    /// Hourly temperatures at a coordinate pair. Successful lookups are
    /// cached for the life of the feed.
    pub fn hourly_temperature(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Arc<HourlyTemperature>, FeedError> {
        self.cache
            .get_or_compute(CoordinateKey::new(latitude, longitude), || {
                let url = self.forecast_url(latitude, longitude);
                debug!(latitude, longitude, "fetching forecast");
                let response = self.transport.get(&url, self.settings.timeout())?;
                if !response.is_success() {
                    return Err(FeedError::Status {
                        status: response.status,
                        url,
                    });
                }
                parse_forecast(&response.body).map(Arc::new)
            })
    }

    /// The country list, fetched on first success and kept afterwards.
    pub fn countries(&self) -> Result<Arc<Vec<Country>>, FeedError> {
        if let Some(countries) = self.loaded_countries() {
            return Ok(countries);
        }
        let url = &self.settings.countries_url;
        let response = self.transport.get(url, self.settings.timeout())?;
        if !response.is_success() {
            return Err(FeedError::Status {
                status: response.status,
                url: url.clone(),
            });
        }
        let countries = Arc::new(parse_countries(&response.body)?);
        if let Ok(mut slot) = self.countries.lock() {
            *slot = Some(Arc::clone(&countries));
        }
        Ok(countries)
    }

    pub fn find_country(&self, name: &str) -> Result<Country, FeedError> {
        self.countries()?
            .iter()
            .find(|country| country.name == name)
            .cloned()
            .ok_or_else(|| FeedError::UnknownCountry(name.to_string()))
    }

    fn loaded_countries(&self) -> Option<Arc<Vec<Country>>> {
        self.countries.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn cache(&self) -> &BoundedCache<CoordinateKey, Arc<HourlyTemperature>> {
        &self.cache
    }
}
