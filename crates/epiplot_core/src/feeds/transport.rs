use crate::error::FeedError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_WEATHER_CACHE_CAPACITY: usize = 300;
pub const DEFAULT_COVID_BASE_URL: &str = "https://disease.sh/v3/covid-19";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_COUNTRIES_URL: &str = "https://restcountries.com/v3.1/all?fields=name,latlng";

/// Endpoints and limits shared by the feed adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub timeout_secs: u64,
    pub weather_cache_capacity: usize,
    pub covid_base_url: String,
    pub weather_base_url: String,
    pub countries_url: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            weather_cache_capacity: DEFAULT_WEATHER_CACHE_CAPACITY,
            covid_base_url: DEFAULT_COVID_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            countries_url: DEFAULT_COUNTRIES_URL.to_string(),
        }
    }
}

impl FeedSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body, treating any non-success status as a failure.
    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        if !self.is_success() {
            return Err(FeedError::Status {
                status: self.status,
                url: url.to_string(),
            });
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Blocking HTTP GET. Non-success statuses come back as responses, not errors.
pub trait HttpGet: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FeedError>;
}

#[cfg(feature = "http")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "http")]
mod ureq_transport {
    use super::{HttpGet, HttpResponse};
    use crate::error::FeedError;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self {
                agent: ureq::AgentBuilder::new().build(),
            }
        }
    }

    impl HttpGet for UreqTransport {
        fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FeedError> {
            match self.agent.get(url).timeout(timeout).call() {
                Ok(response) => read(response),
                Err(ureq::Error::Status(_, response)) => read(response),
                Err(ureq::Error::Transport(transport)) => {
                    if is_timeout(&transport) {
                        Err(FeedError::Timeout {
                            url: url.to_string(),
                        })
                    } else {
                        Err(FeedError::Transport(transport.to_string()))
                    }
                }
            }
        }
    }

    fn read(response: ureq::Response) -> Result<HttpResponse, FeedError> {
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|err| FeedError::Transport(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }

    fn is_timeout(transport: &ureq::Transport) -> bool {
        std::error::Error::source(transport)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .map(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{HttpGet, HttpResponse};
    use crate::error::FeedError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned responses and records every requested URL.
    #[derive(Default)]
    pub struct FakeTransport {
        routes: HashMap<String, HttpResponse>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub fn route(mut self, url: &str, response: HttpResponse) -> Self {
            self.routes.insert(url.to_string(), response);
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    impl HttpGet for FakeTransport {
        fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, FeedError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(url.to_string());
            }
            match self.routes.get(url) {
                Some(response) => Ok(response.clone()),
                None => Err(FeedError::Timeout {
                    url: url.to_string(),
                }),
            }
        }
    }
}
