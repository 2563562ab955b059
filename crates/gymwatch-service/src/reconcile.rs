//! State reconciliation: one fetch attempt folded into the previous known
//! value.
//!
//! Reconciliation never fails. Every outcome resolves to a value: a fresh
//! fetch on success, the previous value on any failure, and the
//! `Unknown`/"loading" sentinel when there is no previous value yet.
//! Failures are visible only through tracing and the per-machine counters
//! the poller keeps.

use time::OffsetDateTime;
use tracing::warn;

use gymwatch_core::{Error, TelemetryApi};
use gymwatch_types::{AvailabilityState, ConnectivityStatus, DeviceRecord, Variable};

use crate::config::MachineConfig;

/// The result of reconciling one machine for one tick.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// The record to publish; always present.
    pub record: DeviceRecord,
    /// Fetches that succeeded this tick (0-3).
    pub successes: u32,
    /// Fetches that failed this tick (0-3).
    pub failures: u32,
    /// Message of the last failure, for the observability side channel.
    pub last_error: Option<String>,
}

/// Success/failure bookkeeping for one machine's tick.
#[derive(Debug, Default)]
struct Tally {
    successes: u32,
    failures: u32,
    last_error: Option<String>,
}

impl Tally {
    fn fold<T>(&mut self, machine_id: &str, what: &str, result: Result<T, Error>) -> Option<T> {
        match result {
            Ok(value) => {
                self.successes += 1;
                Some(value)
            }
            Err(e) => {
                self.failures += 1;
                warn!("Machine {}: {} fetch failed: {}", machine_id, what, e);
                self.last_error = Some(e.to_string());
                None
            }
        }
    }
}

/// Folds fetch attempts into previous known values.
pub struct Reconciler<'a> {
    telemetry: &'a dyn TelemetryApi,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over a telemetry accessor.
    pub fn new(telemetry: &'a dyn TelemetryApi) -> Self {
        Self { telemetry }
    }

    /// Reconcile one machine against its previous record.
    ///
    /// Availability and connectivity are fetched concurrently and reconciled
    /// independently; the last-used time is fetched only after availability
    /// resolves (success or fallback). Partial failure of any one of the
    /// three never blanks the other two.
    pub async fn reconcile(
        &self,
        machine: &MachineConfig,
        previous: Option<&DeviceRecord>,
        now: OffsetDateTime,
    ) -> ReconcileOutcome {
        let Some(thing_id) = machine.thing_id else {
            let err = Error::MissingIdentity(machine.id.clone());
            warn!("Machine {}: {}", machine.id, err);
            return ReconcileOutcome {
                record: self.fallback_record(machine, previous),
                successes: 0,
                failures: 3,
                last_error: Some(err.to_string()),
            };
        };

        // The last-used fetch is chained strictly after availability;
        // connectivity runs concurrently with that chain.
        let ((availability_res, last_used_res), connectivity_res) = tokio::join!(
            async {
                let availability = self.telemetry.fetch_variable(thing_id, Variable::State).await;
                let last_used = self.telemetry.fetch_last_used(thing_id).await;
                (availability, last_used)
            },
            self.telemetry.fetch_variable(thing_id, Variable::Status),
        );

        let mut tally = Tally::default();

        let availability = tally
            .fold(
                &machine.id,
                "availability",
                availability_res
                    .and_then(|token| AvailabilityState::from_wire(&token).map_err(Error::from)),
            )
            .unwrap_or_else(|| {
                previous
                    .map(|p| p.availability)
                    .unwrap_or(AvailabilityState::Unknown)
            });

        let connectivity = tally
            .fold(
                &machine.id,
                "connectivity",
                connectivity_res
                    .and_then(|token| ConnectivityStatus::from_wire(&token).map_err(Error::from)),
            )
            .unwrap_or_else(|| {
                previous
                    .map(|p| p.connectivity)
                    .unwrap_or(ConnectivityStatus::Unknown)
            });

        let last_used_at = match tally.fold(&machine.id, "last-used", last_used_res) {
            Some(at) => at,
            None => previous.and_then(|p| p.last_used_at),
        };

        let Tally {
            successes,
            failures,
            last_error,
        } = tally;

        // updated_at advances only when something was actually fetched;
        // an unreachable machine keeps its old timestamp, which is the
        // staleness signal consumers rely on.
        let updated_at = if successes > 0 {
            Some(now)
        } else {
            previous.and_then(|p| p.updated_at)
        };

        ReconcileOutcome {
            record: DeviceRecord {
                id: machine.id.clone(),
                thing_id: Some(thing_id),
                gym: machine.gym.clone(),
                machine_type: machine.machine_type.clone(),
                floor: machine.floor,
                availability,
                connectivity,
                last_used_at,
                updated_at,
            },
            successes,
            failures,
            last_error,
        }
    }

    /// The record produced when no fetch can even be attempted.
    fn fallback_record(
        &self,
        machine: &MachineConfig,
        previous: Option<&DeviceRecord>,
    ) -> DeviceRecord {
        let mut record = previous.cloned().unwrap_or_else(|| {
            DeviceRecord::loading(machine.id.clone(), machine.gym.clone(), None)
        });
        record.machine_type = machine.machine_type.clone();
        record.floor = machine.floor;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymwatch_core::MockTelemetry;
    use uuid::Uuid;

    fn machine(id: &str, thing_id: Option<Uuid>) -> MachineConfig {
        MachineConfig {
            id: id.to_string(),
            gym: "rec".to_string(),
            thing_id,
            machine_type: Some("treadmill".to_string()),
            floor: Some(1),
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn healthy_mock(thing_id: Uuid) -> MockTelemetry {
        let mock = MockTelemetry::new();
        mock.set_variable(thing_id, Variable::State, "off");
        mock.set_variable(thing_id, Variable::Status, "ONLINE");
        mock.set_last_used(thing_id, Some(OffsetDateTime::UNIX_EPOCH));
        mock
    }

    #[tokio::test]
    async fn all_fetches_succeed() {
        let thing_id = Uuid::new_v4();
        let mock = healthy_mock(thing_id);
        let reconciler = Reconciler::new(&mock);

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), None, now())
            .await;

        assert_eq!(outcome.record.availability, AvailabilityState::Available);
        assert_eq!(outcome.record.connectivity, ConnectivityStatus::Online);
        assert_eq!(outcome.record.last_used_at, Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(outcome.record.updated_at, Some(now()));
        assert_eq!(outcome.successes, 3);
        assert_eq!(outcome.failures, 0);
    }

    #[tokio::test]
    async fn cold_start_failure_yields_loading_sentinels() {
        // Fallback invariant with no previous value: the result is the
        // Unknown/loading sentinel, never an absent record.
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_fail_all(true);
        let reconciler = Reconciler::new(&mock);

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), None, now())
            .await;

        assert_eq!(outcome.record.availability, AvailabilityState::Unknown);
        assert_eq!(outcome.record.connectivity, ConnectivityStatus::Unknown);
        assert_eq!(outcome.record.last_used_at, None);
        assert_eq!(outcome.record.updated_at, None);
        assert_eq!(outcome.failures, 3);
        assert!(outcome.last_error.is_some());
    }

    #[tokio::test]
    async fn failure_retains_previous_values_unchanged() {
        // Fallback invariant: reconcile(.., previous) == previous on failure.
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_fail_all(true);
        let reconciler = Reconciler::new(&mock);

        let previous = DeviceRecord {
            id: "treadmill-1".to_string(),
            thing_id: Some(thing_id),
            gym: "rec".to_string(),
            machine_type: Some("treadmill".to_string()),
            floor: Some(1),
            availability: AvailabilityState::InUse,
            connectivity: ConnectivityStatus::Online,
            last_used_at: Some(OffsetDateTime::UNIX_EPOCH),
            updated_at: Some(OffsetDateTime::UNIX_EPOCH),
        };

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), Some(&previous), now())
            .await;

        assert_eq!(outcome.record, previous);
    }

    #[tokio::test]
    async fn scenario_availability_timeout_connectivity_offline() {
        // Previous: AVAILABLE/ONLINE. Availability times out, connectivity
        // returns OFFLINE. Expected: availability stays AVAILABLE,
        // connectivity becomes OFFLINE, last-used unchanged.
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_variable(thing_id, Variable::Status, "OFFLINE");
        mock.fail_variable(thing_id, Variable::State);
        mock.fail_last_used(thing_id);
        let reconciler = Reconciler::new(&mock);

        let previous = DeviceRecord {
            availability: AvailabilityState::Available,
            connectivity: ConnectivityStatus::Online,
            last_used_at: Some(OffsetDateTime::UNIX_EPOCH),
            updated_at: Some(OffsetDateTime::UNIX_EPOCH),
            ..DeviceRecord::loading("treadmill-1", "rec", Some(thing_id))
        };

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), Some(&previous), now())
            .await;

        assert_eq!(outcome.record.availability, AvailabilityState::Available);
        assert_eq!(outcome.record.connectivity, ConnectivityStatus::Offline);
        assert_eq!(outcome.record.last_used_at, Some(OffsetDateTime::UNIX_EPOCH));
        assert_eq!(outcome.successes, 1);
        assert_eq!(outcome.failures, 2);
    }

    #[tokio::test]
    async fn variables_fall_back_independently() {
        // The inverse of the scenario above: connectivity fails while
        // availability succeeds. Neither influences the other's fallback.
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_variable(thing_id, Variable::State, "on");
        mock.fail_variable(thing_id, Variable::Status);
        mock.set_last_used(thing_id, None);
        let reconciler = Reconciler::new(&mock);

        let previous = DeviceRecord {
            availability: AvailabilityState::Available,
            connectivity: ConnectivityStatus::Offline,
            ..DeviceRecord::loading("bike-2", "rec", Some(thing_id))
        };

        let outcome = reconciler
            .reconcile(&machine("bike-2", Some(thing_id)), Some(&previous), now())
            .await;

        assert_eq!(outcome.record.availability, AvailabilityState::InUse);
        assert_eq!(outcome.record.connectivity, ConnectivityStatus::Offline);
    }

    #[tokio::test]
    async fn unparseable_token_is_a_failure_not_a_value() {
        let thing_id = Uuid::new_v4();
        let mock = healthy_mock(thing_id);
        mock.set_variable(thing_id, Variable::State, "maybe");
        let reconciler = Reconciler::new(&mock);

        let previous = DeviceRecord {
            availability: AvailabilityState::InUse,
            ..DeviceRecord::loading("treadmill-1", "rec", Some(thing_id))
        };

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), Some(&previous), now())
            .await;

        // The bad token falls back instead of poisoning the record
        assert_eq!(outcome.record.availability, AvailabilityState::InUse);
        assert_eq!(outcome.failures, 1);
    }

    #[tokio::test]
    async fn failed_fetch_holds_state_not_reverts_to_loading() {
        // State machine self-loop: Unknown -> InUse -> (failure) InUse.
        let thing_id = Uuid::new_v4();
        let mock = healthy_mock(thing_id);
        mock.set_variable(thing_id, Variable::State, "on");
        let reconciler = Reconciler::new(&mock);

        let m = machine("treadmill-1", Some(thing_id));
        let first = reconciler.reconcile(&m, None, now()).await;
        assert_eq!(first.record.availability, AvailabilityState::InUse);

        mock.set_fail_all(true);
        let second = reconciler.reconcile(&m, Some(&first.record), now()).await;
        assert_eq!(second.record.availability, AvailabilityState::InUse);
    }

    #[tokio::test]
    async fn last_used_is_fetched_after_availability_resolves() {
        let thing_id = Uuid::new_v4();
        let mock = healthy_mock(thing_id);
        let reconciler = Reconciler::new(&mock);

        reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), None, now())
            .await;

        let calls = mock.calls();
        let state_pos = calls.iter().position(|c| c.starts_with("state:")).unwrap();
        let last_used_pos = calls
            .iter()
            .position(|c| c.starts_with("last_used:"))
            .unwrap();
        assert!(
            state_pos < last_used_pos,
            "last-used must not start before availability resolves: {calls:?}"
        );
    }

    #[tokio::test]
    async fn last_used_still_fetched_when_availability_fails() {
        // "Success or fallback": an availability failure must not cancel
        // the last-used fetch.
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.fail_variable(thing_id, Variable::State);
        mock.set_variable(thing_id, Variable::Status, "ONLINE");
        mock.set_last_used(thing_id, Some(OffsetDateTime::UNIX_EPOCH));
        let reconciler = Reconciler::new(&mock);

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), None, now())
            .await;

        assert_eq!(outcome.record.last_used_at, Some(OffsetDateTime::UNIX_EPOCH));
        assert!(mock.calls().iter().any(|c| c.starts_with("last_used:")));
    }

    #[tokio::test]
    async fn missing_identity_falls_back_without_fetching() {
        let mock = MockTelemetry::new();
        let reconciler = Reconciler::new(&mock);

        let previous = DeviceRecord {
            availability: AvailabilityState::InUse,
            connectivity: ConnectivityStatus::Online,
            ..DeviceRecord::loading("ghost-1", "rec", None)
        };

        let outcome = reconciler
            .reconcile(&machine("ghost-1", None), Some(&previous), now())
            .await;

        assert_eq!(outcome.record.availability, AvailabilityState::InUse);
        assert_eq!(outcome.failures, 3);
        assert!(outcome.last_error.unwrap().contains("ghost-1"));
        assert_eq!(mock.call_count(), 0, "no upstream call without a mapping");
    }

    #[tokio::test]
    async fn updated_at_does_not_advance_on_total_failure() {
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_fail_all(true);
        let reconciler = Reconciler::new(&mock);

        let stamped = OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap();
        let previous = DeviceRecord {
            updated_at: Some(stamped),
            ..DeviceRecord::loading("treadmill-1", "rec", Some(thing_id))
        };

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), Some(&previous), now())
            .await;

        assert_eq!(outcome.record.updated_at, Some(stamped));
    }

    #[tokio::test]
    async fn partial_success_advances_updated_at() {
        let thing_id = Uuid::new_v4();
        let mock = MockTelemetry::new();
        mock.set_variable(thing_id, Variable::Status, "ONLINE");
        mock.fail_variable(thing_id, Variable::State);
        mock.fail_last_used(thing_id);
        let reconciler = Reconciler::new(&mock);

        let outcome = reconciler
            .reconcile(&machine("treadmill-1", Some(thing_id)), None, now())
            .await;

        assert_eq!(outcome.record.updated_at, Some(now()));
    }
}
