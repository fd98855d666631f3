//! Thin adapters over the two external data feeds.

pub mod covid;
pub mod transport;
pub mod weather;

pub use covid::{CountryHistory, CovidFeed, CovidRow, SummaryCards};
pub use transport::{FeedSettings, HttpGet, HttpResponse};
pub use weather::{Country, HourlyTemperature, WeatherFeed};

#[cfg(feature = "http")]
pub use transport::UreqTransport;
