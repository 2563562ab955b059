//! Trait abstraction over the upstream telemetry API.
//!
//! This module provides the [`TelemetryApi`] trait that abstracts over
//! the real HTTP client and mock clients for testing.

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use gymwatch_types::{DayPercentage, HourPercentage, TimeseriesPoint, Variable};

use crate::error::Result;

/// Operations the upstream telemetry API exposes per device.
///
/// Every call may fail with a timeout, a non-success status, or a body that
/// does not match the single expected schema; all three surface as `Err`,
/// never as a panic, and nothing is thrown past this boundary. The
/// reconciler and derived-data cache consume the trait, so tests swap in
/// [`crate::MockTelemetry`].
///
/// # Example
///
/// ```ignore
/// use gymwatch_core::{TelemetryApi, Result};
/// use gymwatch_types::Variable;
///
/// async fn print_state<T: TelemetryApi>(api: &T, thing_id: uuid::Uuid) -> Result<()> {
///     let token = api.fetch_variable(thing_id, Variable::State).await?;
///     println!("state = {token}");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    // --- Live state ---

    /// Fetch the current wire token of one variable for one device.
    async fn fetch_variable(&self, thing_id: Uuid, variable: Variable) -> Result<String>;

    /// Fetch when the device was last in use. `Ok(None)` means never.
    async fn fetch_last_used(&self, thing_id: Uuid) -> Result<Option<OffsetDateTime>>;

    // --- Predictions ---

    /// Fetch the predicted peak (`want_peak`) or ideal (`!want_peak`) usage
    /// intervals for a device on a given date, in chronological order.
    async fn fetch_peak_hours(
        &self,
        thing_id: Uuid,
        date: Date,
        want_peak: bool,
    ) -> Result<Vec<OffsetDateTime>>;

    // --- Charting / analytics ---

    /// Fetch the state timeseries for a device from `start` onward.
    async fn fetch_state_timeseries(
        &self,
        thing_id: Uuid,
        start: OffsetDateTime,
        variable: Variable,
    ) -> Result<Vec<TimeseriesPoint>>;

    /// Total usage hours over the trailing window.
    async fn fetch_total_usage(&self, thing_id: Uuid) -> Result<f64>;

    /// Usage hours for one day.
    async fn fetch_daily_usage(&self, thing_id: Uuid, date: Date) -> Result<f64>;

    /// In-use percentage per weekday.
    async fn fetch_daily_percentages(&self, thing_id: Uuid) -> Result<Vec<DayPercentage>>;

    /// In-use percentage per hour of day.
    async fn fetch_hourly_percentages(&self, thing_id: Uuid) -> Result<Vec<HourPercentage>>;
}
