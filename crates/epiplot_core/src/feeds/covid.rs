//! Historical COVID-19 counts from a disease.sh-style feed.

use super::transport::{FeedSettings, HttpGet};
use crate::error::FeedError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One day of cumulative counts plus the daily deltas derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CovidRow {
    pub date: NaiveDate,
    pub cases: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub new_cases: i64,
    pub new_deaths: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryHistory {
    pub country: String,
    /// Sorted by date, oldest first.
    pub rows: Vec<CovidRow>,
}

impl CountryHistory {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keeps only the most recent `days` rows.
    pub fn last_days(mut self, days: usize) -> Self {
        let skip = self.rows.len().saturating_sub(days);
        self.rows.drain(..skip);
        self
    }

    pub fn summary(&self) -> Option<SummaryCards> {
        self.rows.last().map(|row| SummaryCards {
            total_cases: group_thousands(row.cases),
            new_cases: group_thousands(row.new_cases),
            total_deaths: group_thousands(row.deaths),
            recovered: group_thousands(row.recovered),
        })
    }
}

/// Headline numbers shown next to the chart, formatted with thousands separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryCards {
    pub total_cases: String,
    pub new_cases: String,
    pub total_deaths: String,
    pub recovered: String,
}

impl SummaryCards {
    /// Placeholder shown when no data could be loaded.
    pub fn unknown() -> Self {
        let unknown = || "?".to_string();
        Self {
            total_cases: unknown(),
            new_cases: unknown(),
            total_deaths: unknown(),
            recovered: unknown(),
        }
    }
}

pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[derive(Deserialize)]
struct HistoricalPayload {
    timeline: Option<Timeline>,
}

#[derive(Deserialize)]
struct Timeline {
    cases: BTreeMap<String, i64>,
    #[serde(default)]
    deaths: BTreeMap<String, i64>,
    #[serde(default)]
    recovered: Option<BTreeMap<String, i64>>,
}

#[derive(Deserialize)]
struct CountryEntry {
    #[serde(default)]
    country: Option<String>,
}

/// Parses `M/D/YY` first, then ISO `YYYY-MM-DD`.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%m/%d/%y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Builds the sorted history from a `historical/{country}` body.
pub fn parse_history(country: &str, body: &str) -> Result<CountryHistory, FeedError> {
    let payload: HistoricalPayload = serde_json::from_str(body)?;
    let timeline = payload
        .timeline
        .ok_or_else(|| FeedError::Shape(format!("no timeline for {country}")))?;

    let mut dated: Vec<(NaiveDate, i64, i64, i64)> = timeline
        .cases
        .iter()
        .filter_map(|(raw, &cases)| {
            let date = parse_feed_date(raw)?;
            let deaths = timeline.deaths.get(raw).copied().unwrap_or(0);
            let recovered = timeline
                .recovered
                .as_ref()
                .and_then(|series| series.get(raw).copied())
                .unwrap_or(0);
            Some((date, cases, deaths, recovered))
        })
        .collect();
    dated.sort_by_key(|&(date, ..)| date);

    let dropped = timeline.cases.len() - dated.len();
    if dropped > 0 {
        debug!(country, dropped, "skipped rows with unparseable dates");
    }

    let mut previous: Option<(i64, i64)> = None;
    let rows = dated
        .into_iter()
        .map(|(date, cases, deaths, recovered)| {
            let (new_cases, new_deaths) = match previous {
                Some((prev_cases, prev_deaths)) => (cases - prev_cases, deaths - prev_deaths),
                None => (0, 0),
            };
            previous = Some((cases, deaths));
            CovidRow {
                date,
                cases,
                deaths,
                recovered,
                new_cases,
                new_deaths,
            }
        })
        .collect();

    Ok(CountryHistory {
        country: country.to_string(),
        rows,
    })
}

pub struct CovidFeed {
    transport: Arc<dyn HttpGet>,
    settings: FeedSettings,
}

impl CovidFeed {
    pub fn new(transport: Arc<dyn HttpGet>, settings: FeedSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn history_url(&self, country: &str) -> String {
        format!(
            "{}/historical/{}?lastdays=all",
            self.settings.covid_base_url.trim_end_matches('/'),
            encode_path_segment(country)
        )
    }

    pub fn countries_url(&self) -> String {
        format!("{}/countries", self.settings.covid_base_url.trim_end_matches('/'))
    }

    /// Full history for `country`, optionally cut to the last `last_days` rows.
    pub fn historical(
        &self,
        country: &str,
        last_days: Option<usize>,
    ) -> Result<CountryHistory, FeedError> {
        let url = self.history_url(country);
        let response = self.transport.get(&url, self.settings.timeout())?;
        if !response.is_success() {
            return Err(FeedError::Status {
                status: response.status,
                url,
            });
        }
        let history = parse_history(country, &response.body)?;
        Ok(match last_days {
            Some(days) => history.last_days(days),
            None => history,
        })
    }

    /// Sorted names of every country the feed knows about.
    pub fn countries(&self) -> Result<Vec<String>, FeedError> {
        let url = self.countries_url();
        let entries: Vec<CountryEntry> = self
            .transport
            .get(&url, self.settings.timeout())?
            .json(&url)?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| entry.country)
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        Ok(names)
    }
}

fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::transport::fake::FakeTransport;
    use crate::feeds::transport::HttpResponse;

    const PERU: &str = r#"{
        "country": "Peru",
        "timeline": {
            "cases": {"1/3/21": 1015137, "1/1/21": 1008908, "1/2/21": 1011871, "garbage": 5},
            "deaths": {"1/1/21": 37724, "1/2/21": 37830, "1/3/21": 37925}
        }
    }"#;

    fn feed(transport: FakeTransport) -> CovidFeed {
        CovidFeed::new(Arc::new(transport), FeedSettings::default())
    }

    #[test]
    fn parses_sorts_and_diffs_cumulative_counts() {
        let history = parse_history("Peru", PERU).expect("payload should parse");
        assert_eq!(history.rows.len(), 3, "unparseable date is dropped");
        let dates: Vec<String> = history.rows.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2021-01-01", "2021-01-02", "2021-01-03"]);

        assert_eq!(history.rows[0].new_cases, 0);
        assert_eq!(history.rows[0].new_deaths, 0);
        assert_eq!(history.rows[1].new_cases, 1011871 - 1008908);
        assert_eq!(history.rows[2].new_deaths, 37925 - 37830);
        assert!(history.rows.iter().all(|r| r.recovered == 0), "missing recovered is zero");
    }

    #[test]
    fn iso_dates_are_accepted() {
        let body = r#"{"timeline": {"cases": {"2020-03-02": 3, "2020-03-01": 1}, "deaths": {}}}"#;
        let history = parse_history("X", body).expect("iso payload");
        assert_eq!(history.rows[0].date, NaiveDate::from_ymd_opt(2020, 3, 1).expect("date"));
        assert_eq!(history.rows[1].new_cases, 2);
    }

    #[test]
    fn missing_timeline_is_a_shape_error() {
        let err = parse_history("Atlantis", r#"{"message": "not found"}"#)
            .expect_err("no timeline");
        assert!(matches!(err, FeedError::Shape(_)));
    }

    #[test]
    fn non_success_status_fails_the_request() {
        let feed = feed(FakeTransport::default().route(
            "https://disease.sh/v3/covid-19/historical/Atlantis?lastdays=all",
            HttpResponse {
                status: 404,
                body: "{}".into(),
            },
        ));
        let err = feed.historical("Atlantis", None).expect_err("404");
        assert!(matches!(err, FeedError::Status { status: 404, .. }));
    }

    #[test]
    fn last_days_keeps_the_tail_and_summary_uses_last_row() {
        let feed = feed(FakeTransport::default().route(
            "https://disease.sh/v3/covid-19/historical/Peru?lastdays=all",
            HttpResponse::ok(PERU),
        ));
        let history = feed.historical("Peru", Some(2)).expect("history");
        assert_eq!(history.rows.len(), 2);
        let cards = history.summary().expect("non-empty history");
        assert_eq!(cards.total_cases, "1,015,137");
        assert_eq!(cards.new_cases, "3,266");
        assert_eq!(cards.total_deaths, "37,925");
        assert_eq!(cards.recovered, "0");
    }

    #[test]
    fn countries_are_sorted_and_blank_names_skipped() {
        let feed = feed(FakeTransport::default().route(
            "https://disease.sh/v3/covid-19/countries",
            HttpResponse::ok(r#"[{"country":"Peru"},{"country":""},{"cases":3},{"country":"Chile"}]"#),
        ));
        assert_eq!(feed.countries().expect("countries"), vec!["Chile", "Peru"]);
    }

    #[test]
    fn country_names_are_percent_encoded() {
        let feed = feed(FakeTransport::default());
        assert_eq!(
            feed.history_url("United Kingdom"),
            "https://disease.sh/v3/covid-19/historical/United%20Kingdom?lastdays=all"
        );
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(-1234567), "-1,234,567");
    }
}
