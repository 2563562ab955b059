//! HTTP client for the upstream telemetry API.
//!
//! One method per consumed endpoint, one expected schema per response.
//! A body that does not match its schema is a parse failure; there is no
//! probing of alternate field names or shapes.
//!
//! # Example
//!
//! ```no_run
//! use gymwatch_core::HttpTelemetryClient;
//! use gymwatch_core::TelemetryApi;
//! use gymwatch_types::Variable;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpTelemetryClient::new("https://telemetry.example.app/api")?;
//! let thing_id = uuid::Uuid::new_v4();
//!
//! let token = client.fetch_variable(thing_id, Variable::State).await?;
//! println!("state = {token}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use gymwatch_types::{
    AvailabilityState, ConnectivityStatus, DayPercentage, HourPercentage, TimeseriesPoint,
    Variable,
};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::TelemetryApi;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the upstream telemetry API.
#[derive(Debug, Clone)]
pub struct HttpTelemetryClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpTelemetryClient {
    /// Create a client with default timeout and retry settings.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the telemetry API
    ///   (e.g. "https://telemetry.example.app/api")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, RetryConfig::default())
    }

    /// Create a client with explicit timeout and retry settings.
    pub fn with_config(base_url: &str, timeout: Duration, retry: RetryConfig) -> Result<Self> {
        // Normalize URL (remove trailing slash)
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a URL, retrying rate-limit and timeout failures, and return
    /// the raw body of a successful response.
    async fn get_text(&self, operation: &str, url: &str) -> Result<String> {
        with_retry(&self.retry, operation, || async {
            let response = self.http.get(url).send().await.map_err(Error::Network)?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::status(operation, status.as_u16()));
            }
            response.text().await.map_err(Error::Network)
        })
        .await
    }
}

#[async_trait]
impl TelemetryApi for HttpTelemetryClient {
    async fn fetch_variable(&self, thing_id: Uuid, variable: Variable) -> Result<String> {
        let url = format!(
            "{}/getDeviceState?thing_id={}&variable={}",
            self.base_url,
            thing_id,
            variable.wire_name()
        );
        let body = self.get_text("getDeviceState", &url).await?;
        parse_variable_rows(&body, variable)
    }

    async fn fetch_last_used(&self, thing_id: Uuid) -> Result<Option<OffsetDateTime>> {
        let url = format!("{}/getLastUsedTime?thing_id={}", self.base_url, thing_id);
        let body = self.get_text("getLastUsedTime", &url).await?;
        parse_last_used(&body)
    }

    async fn fetch_peak_hours(
        &self,
        thing_id: Uuid,
        date: Date,
        want_peak: bool,
    ) -> Result<Vec<OffsetDateTime>> {
        let (start, end) = day_bounds(date)?;
        let url = format!(
            "{}/getPeakHours?thing_id={}&date={}&start_time={}&end_time={}&peak={}",
            self.base_url,
            thing_id,
            format_date(date)?,
            start,
            end,
            want_peak
        );
        let body = self.get_text("getPeakHours", &url).await?;
        parse_peak_hours(&body)
    }

    async fn fetch_state_timeseries(
        &self,
        thing_id: Uuid,
        start: OffsetDateTime,
        variable: Variable,
    ) -> Result<Vec<TimeseriesPoint>> {
        let start = start
            .format(&Rfc3339)
            .map_err(|e| Error::parse(format!("unformattable start time: {e}")))?;
        let url = format!(
            "{}/getStateTimeseries?thing_id={}&start_time={}&variable={}",
            self.base_url,
            thing_id,
            start,
            variable.wire_name()
        );
        let body = self.get_text("getStateTimeseries", &url).await?;
        parse_timeseries(&body)
    }

    async fn fetch_total_usage(&self, thing_id: Uuid) -> Result<f64> {
        let url = format!("{}/getTotalUsage?thing_id={}", self.base_url, thing_id);
        let body = self.get_text("getTotalUsage", &url).await?;
        parse_scalar(&body)
    }

    async fn fetch_daily_usage(&self, thing_id: Uuid, date: Date) -> Result<f64> {
        let url = format!(
            "{}/getDailyUsage?thing_id={}&date={}",
            self.base_url,
            thing_id,
            format_date(date)?
        );
        let body = self.get_text("getDailyUsage", &url).await?;
        parse_scalar(&body)
    }

    async fn fetch_daily_percentages(&self, thing_id: Uuid) -> Result<Vec<DayPercentage>> {
        let url = format!("{}/getDailyPercentages?thing_id={}", self.base_url, thing_id);
        let body = self.get_text("getDailyPercentages", &url).await?;
        parse_day_percentages(&body)
    }

    async fn fetch_hourly_percentages(&self, thing_id: Uuid) -> Result<Vec<HourPercentage>> {
        let url = format!(
            "{}/getHourlyPercentages?thing_id={}",
            self.base_url, thing_id
        );
        let body = self.get_text("getHourlyPercentages", &url).await?;
        parse_hour_percentages(&body)
    }
}

// ==========================================================================
// Response parsing: one schema per endpoint, failing closed
// ==========================================================================

/// `getDeviceState` returns an array of rows; `row[0][variable]` is the
/// value, as a string token.
fn parse_variable_rows(body: &str, variable: Variable) -> Result<String> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("getDeviceState body is not a row array: {e}")))?;

    let row = rows
        .first()
        .ok_or_else(|| Error::parse("getDeviceState returned no rows"))?;

    match row.get(variable.wire_name()) {
        Some(serde_json::Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(Error::parse(format!(
            "row[0].{} is not a string: {other}",
            variable.wire_name()
        ))),
        None => Err(Error::parse(format!(
            "row[0] missing key '{}'",
            variable.wire_name()
        ))),
    }
}

/// `getLastUsedTime` returns a scalar RFC 3339 timestamp, or `null` for a
/// machine that has never been used.
fn parse_last_used(body: &str) -> Result<Option<OffsetDateTime>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("getLastUsedTime body is not JSON: {e}")))?;

    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => OffsetDateTime::parse(&s, &Rfc3339)
            .map(Some)
            .map_err(|e| Error::parse(format!("getLastUsedTime timestamp '{s}': {e}"))),
        other => Err(Error::parse(format!(
            "getLastUsedTime is neither timestamp nor null: {other}"
        ))),
    }
}

/// `getPeakHours` returns an ordered array of RFC 3339 timestamps.
fn parse_peak_hours(body: &str) -> Result<Vec<OffsetDateTime>> {
    let labels: Vec<String> = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("getPeakHours body is not a string array: {e}")))?;

    labels
        .iter()
        .map(|label| {
            OffsetDateTime::parse(label, &Rfc3339)
                .map_err(|e| Error::parse(format!("getPeakHours label '{label}': {e}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TimeseriesRow {
    timestamp: String,
    state: String,
    status: String,
}

/// `getStateTimeseries` returns an array of timestamped points.
fn parse_timeseries(body: &str) -> Result<Vec<TimeseriesPoint>> {
    let rows: Vec<TimeseriesRow> = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("getStateTimeseries body: {e}")))?;

    rows.into_iter()
        .map(|row| {
            let timestamp = OffsetDateTime::parse(&row.timestamp, &Rfc3339).map_err(|e| {
                Error::parse(format!("timeseries timestamp '{}': {e}", row.timestamp))
            })?;
            Ok(TimeseriesPoint {
                timestamp,
                state: AvailabilityState::from_wire(&row.state)?,
                status: ConnectivityStatus::from_wire(&row.status)?,
            })
        })
        .collect()
}

/// Usage scalars arrive as a bare number or a JSON number; both parse as a
/// float in one step. Anything else (quoted strings, objects) fails closed.
fn parse_scalar(body: &str) -> Result<f64> {
    body.trim()
        .parse::<f64>()
        .map_err(|_| Error::parse(format!("expected a numeric body, got '{}'", body.trim())))
}

fn parse_day_percentages(body: &str) -> Result<Vec<DayPercentage>> {
    serde_json::from_str(body).map_err(|e| Error::parse(format!("getDailyPercentages body: {e}")))
}

fn parse_hour_percentages(body: &str) -> Result<Vec<HourPercentage>> {
    serde_json::from_str(body).map_err(|e| Error::parse(format!("getHourlyPercentages body: {e}")))
}

// ==========================================================================
// Query formatting helpers
// ==========================================================================

fn format_date(date: Date) -> Result<String> {
    date.format(format_description!("[year]-[month]-[day]"))
        .map_err(|e| Error::parse(format!("unformattable date: {e}")))
}

/// The peak-hours window spans the whole requested day, in UTC.
fn day_bounds(date: Date) -> Result<(String, String)> {
    let start = date.with_time(Time::MIDNIGHT).assume_utc();
    let end = date.with_time(time!(23:59:59)).assume_utc();
    let format = |dt: OffsetDateTime| {
        dt.format(&Rfc3339)
            .map_err(|e| Error::parse(format!("unformattable day bound: {e}")))
    };
    Ok((format(start)?, format(end)?))
}
