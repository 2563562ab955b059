//! Mock telemetry implementation for testing.
//!
//! This module provides a mock upstream that can be used for unit testing
//! without a network. The [`MockTelemetry`] implements the
//! [`TelemetryApi`] trait, allowing it to be used interchangeably with the
//! real HTTP client in generic code.
//!
//! # Features
//!
//! - **Scripted values**: set per-device variables, last-used times, and
//!   peak hours up front
//! - **Failure injection**: fail everything, or a single
//!   `(thing_id, variable)` pair, to exercise fallback paths
//! - **Latency simulation**: add artificial delay to every call
//! - **Call log**: ordered record of operations for sequencing assertions

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use gymwatch_types::{DayPercentage, HourPercentage, TimeseriesPoint, Variable};

use crate::error::{Error, Result};
use crate::traits::TelemetryApi;

/// A mock upstream telemetry API for testing.
///
/// # Example
///
/// ```
/// use gymwatch_core::{MockTelemetry, TelemetryApi};
/// use gymwatch_types::Variable;
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockTelemetry::new();
///     let thing_id = uuid::Uuid::new_v4();
///     mock.set_variable(thing_id, Variable::State, "off");
///
///     let token = mock.fetch_variable(thing_id, Variable::State).await.unwrap();
///     assert_eq!(token, "off");
/// }
/// ```
#[derive(Default)]
pub struct MockTelemetry {
    variables: Mutex<HashMap<(Uuid, Variable), String>>,
    last_used: Mutex<HashMap<Uuid, Option<OffsetDateTime>>>,
    peak_hours: Mutex<HashMap<Uuid, Vec<OffsetDateTime>>>,
    timeseries: Mutex<HashMap<Uuid, Vec<TimeseriesPoint>>>,
    fail_all: AtomicBool,
    failing_variables: Mutex<HashSet<(Uuid, Variable)>>,
    fail_last_used: Mutex<HashSet<Uuid>>,
    latency_ms: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl std::fmt::Debug for MockTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTelemetry")
            .field("fail_all", &self.fail_all.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTelemetry {
    /// Create a mock with nothing scripted; every fetch fails until values
    /// are set.
    pub fn new() -> Self {
        Self::default()
    }

    // --- Scripting ---

    /// Script the wire token one variable fetch returns.
    pub fn set_variable(&self, thing_id: Uuid, variable: Variable, token: &str) {
        self.variables
            .lock()
            .expect("mock state poisoned")
            .insert((thing_id, variable), token.to_string());
    }

    /// Script the last-used time for a device (`None` = never used).
    pub fn set_last_used(&self, thing_id: Uuid, at: Option<OffsetDateTime>) {
        self.last_used
            .lock()
            .expect("mock state poisoned")
            .insert(thing_id, at);
    }

    /// Script the peak-hours response for a device.
    pub fn set_peak_hours(&self, thing_id: Uuid, hours: Vec<OffsetDateTime>) {
        self.peak_hours
            .lock()
            .expect("mock state poisoned")
            .insert(thing_id, hours);
    }

    /// Script the timeseries response for a device.
    pub fn set_timeseries(&self, thing_id: Uuid, points: Vec<TimeseriesPoint>) {
        self.timeseries
            .lock()
            .expect("mock state poisoned")
            .insert(thing_id, points);
    }

    // --- Failure injection ---

    /// Fail every operation until cleared.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Fail fetches of a single `(thing_id, variable)` pair.
    pub fn fail_variable(&self, thing_id: Uuid, variable: Variable) {
        self.failing_variables
            .lock()
            .expect("mock state poisoned")
            .insert((thing_id, variable));
    }

    /// Fail last-used fetches for one device.
    pub fn fail_last_used(&self, thing_id: Uuid) {
        self.fail_last_used
            .lock()
            .expect("mock state poisoned")
            .insert(thing_id);
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        self.fail_all.store(false, Ordering::SeqCst);
        self.failing_variables
            .lock()
            .expect("mock state poisoned")
            .clear();
        self.fail_last_used
            .lock()
            .expect("mock state poisoned")
            .clear();
    }

    /// Delay every operation by `latency` (simulates a slow upstream).
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    // --- Introspection ---

    /// Ordered log of operations performed so far, as
    /// `"<operation>:<thing_id>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock state poisoned").clone()
    }

    /// Total number of operations performed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock state poisoned").len()
    }

    async fn enter(&self, operation: &str, thing_id: Uuid) {
        self.calls
            .lock()
            .expect("mock state poisoned")
            .push(format!("{operation}:{thing_id}"));
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    fn check_fail_all(&self, operation: &str) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(Error::timeout(operation))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TelemetryApi for MockTelemetry {
    async fn fetch_variable(&self, thing_id: Uuid, variable: Variable) -> Result<String> {
        self.enter(variable.wire_name(), thing_id).await;
        self.check_fail_all("getDeviceState")?;

        if self
            .failing_variables
            .lock()
            .expect("mock state poisoned")
            .contains(&(thing_id, variable))
        {
            return Err(Error::timeout("getDeviceState"));
        }

        self.variables
            .lock()
            .expect("mock state poisoned")
            .get(&(thing_id, variable))
            .cloned()
            .ok_or_else(|| Error::status("getDeviceState", 404))
    }

    async fn fetch_last_used(&self, thing_id: Uuid) -> Result<Option<OffsetDateTime>> {
        self.enter("last_used", thing_id).await;
        self.check_fail_all("getLastUsedTime")?;

        if self
            .fail_last_used
            .lock()
            .expect("mock state poisoned")
            .contains(&thing_id)
        {
            return Err(Error::timeout("getLastUsedTime"));
        }

        self.last_used
            .lock()
            .expect("mock state poisoned")
            .get(&thing_id)
            .copied()
            .ok_or_else(|| Error::status("getLastUsedTime", 404))
    }

    async fn fetch_peak_hours(
        &self,
        thing_id: Uuid,
        _date: Date,
        _want_peak: bool,
    ) -> Result<Vec<OffsetDateTime>> {
        self.enter("peak_hours", thing_id).await;
        self.check_fail_all("getPeakHours")?;

        self.peak_hours
            .lock()
            .expect("mock state poisoned")
            .get(&thing_id)
            .cloned()
            .ok_or_else(|| Error::status("getPeakHours", 404))
    }

    async fn fetch_state_timeseries(
        &self,
        thing_id: Uuid,
        _start: OffsetDateTime,
        _variable: Variable,
    ) -> Result<Vec<TimeseriesPoint>> {
        self.enter("timeseries", thing_id).await;
        self.check_fail_all("getStateTimeseries")?;

        self.timeseries
            .lock()
            .expect("mock state poisoned")
            .get(&thing_id)
            .cloned()
            .ok_or_else(|| Error::status("getStateTimeseries", 404))
    }

    async fn fetch_total_usage(&self, thing_id: Uuid) -> Result<f64> {
        self.enter("total_usage", thing_id).await;
        self.check_fail_all("getTotalUsage")?;
        Ok(0.0)
    }

    async fn fetch_daily_usage(&self, thing_id: Uuid, _date: Date) -> Result<f64> {
        self.enter("daily_usage", thing_id).await;
        self.check_fail_all("getDailyUsage")?;
        Ok(0.0)
    }

    async fn fetch_daily_percentages(&self, thing_id: Uuid) -> Result<Vec<DayPercentage>> {
        self.enter("daily_percentages", thing_id).await;
        self.check_fail_all("getDailyPercentages")?;
        Ok(Vec::new())
    }

    async fn fetch_hourly_percentages(&self, thing_id: Uuid) -> Result<Vec<HourPercentage>> {
        self.enter("hourly_percentages", thing_id).await;
        self.check_fail_all("getHourlyPercentages")?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_variable_fetch() {
        let mock = MockTelemetry::new();
        let id = Uuid::new_v4();
        mock.set_variable(id, Variable::State, "on");

        assert_eq!(mock.fetch_variable(id, Variable::State).await.unwrap(), "on");
        // The other variable is unscripted and fails
        assert!(mock.fetch_variable(id, Variable::Status).await.is_err());
    }

    #[tokio::test]
    async fn targeted_failure_injection() {
        let mock = MockTelemetry::new();
        let id = Uuid::new_v4();
        mock.set_variable(id, Variable::State, "off");
        mock.set_variable(id, Variable::Status, "ONLINE");
        mock.fail_variable(id, Variable::State);

        assert!(matches!(
            mock.fetch_variable(id, Variable::State).await,
            Err(Error::Timeout { .. })
        ));
        assert_eq!(
            mock.fetch_variable(id, Variable::Status).await.unwrap(),
            "ONLINE"
        );

        mock.clear_failures();
        assert_eq!(mock.fetch_variable(id, Variable::State).await.unwrap(), "off");
    }

    #[tokio::test]
    async fn call_log_records_order() {
        let mock = MockTelemetry::new();
        let id = Uuid::new_v4();
        mock.set_variable(id, Variable::State, "off");
        mock.set_last_used(id, None);

        let _ = mock.fetch_variable(id, Variable::State).await;
        let _ = mock.fetch_last_used(id).await;

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("state:"));
        assert!(calls[1].starts_with("last_used:"));
    }

    #[tokio::test]
    async fn fail_all_blocks_everything() {
        let mock = MockTelemetry::new();
        let id = Uuid::new_v4();
        mock.set_variable(id, Variable::State, "off");
        mock.set_fail_all(true);

        assert!(mock.fetch_variable(id, Variable::State).await.is_err());
        assert!(mock.fetch_last_used(id).await.is_err());
        assert!(mock.fetch_total_usage(id).await.is_err());
    }
}
