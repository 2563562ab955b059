//! Background poll loop.
//!
//! On each tick the poller fans reconciliation out across every tracked
//! machine, waits for the full batch to resolve (fallback counts as
//! resolved), and publishes the resulting record set as one atomic
//! snapshot. Until the new snapshot is ready, the previous one remains the
//! visible state, and doubles as the "previous known value" input for the
//! next cycle.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gymwatch_store::SNAPSHOT_TTL;
use gymwatch_types::DeviceRecord;

use crate::config::{MachineConfig, OverlapPolicy};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::state::{AppState, DeviceStats};

/// Background poller that drives periodic reconciliation ticks.
pub struct Poller {
    state: Arc<AppState>,
}

impl Poller {
    /// Create a new poller.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the repeating tick loop.
    ///
    /// Returns immediately; polling happens in the background. Starting an
    /// already-running poller is a no-op.
    pub async fn start(&self) {
        let Some(cancel) = self.state.poller.begin() else {
            debug!("Poller already running");
            return;
        };

        let machines = {
            let config = self.state.config.read().await;
            config.machines.clone()
        };

        if machines.is_empty() {
            info!("No machines configured for polling");
        } else {
            info!("Starting poller for {} machine(s)", machines.len());
        }

        // Warm start: a cached snapshot from a previous run seeds the
        // previous known values, as long as it is still within its TTL.
        self.seed_from_cache(&machines).await;

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_loop(state, cancel).await;
        });
    }

    /// Stop the loop; idempotent. In-flight batches are discarded at the
    /// publish step.
    pub fn stop(&self) {
        self.state.poller.signal_stop();
    }

    /// Publish cached per-gym record lists as the initial snapshot.
    async fn seed_from_cache(&self, machines: &[MachineConfig]) {
        if !self.state.snapshot().is_empty() {
            return;
        }

        let mut seeded: Vec<DeviceRecord> = Vec::new();
        let mut gyms: Vec<&str> = machines.iter().map(|m| m.gym.as_str()).collect();
        gyms.sort_unstable();
        gyms.dedup();

        for gym in gyms {
            let key = snapshot_key(gym);
            if let Some(mut records) = self
                .state
                .cache
                .get::<Vec<DeviceRecord>>(&key, SNAPSHOT_TTL)
            {
                // Records for machines that left the tracked set are
                // discarded, not archived.
                records.retain(|r| machines.iter().any(|m| m.id == r.id));
                seeded.extend(records);
            }
        }

        if !seeded.is_empty() {
            info!("Seeded {} machine record(s) from cache", seeded.len());
            self.state.publish(seeded);
        }
    }
}

/// Cache key for one gym's published records.
pub fn snapshot_key(gym: &str) -> String {
    format!("machines_{gym}")
}

async fn run_loop(state: Arc<AppState>, cancel: CancellationToken) {
    let (interval, overlap) = {
        let config = state.config.read().await;
        (config.poller.interval(), config.poller.overlap)
    };

    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; later ones keep the configured
    // cadence even if a batch ran long.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Poller stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match overlap {
            OverlapPolicy::Skip => {
                // One in-flight cycle bounds upstream load; a tick that
                // fires while the previous batch is still running is
                // observably skipped.
                if !state.poller.try_begin_batch() {
                    debug!("Tick skipped: previous batch still in flight");
                    state.poller.count_skipped();
                    continue;
                }
                state.poller.count_tick();
                let state = Arc::clone(&state);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_tick(Arc::clone(&state), cancel).await;
                    state.poller.end_batch();
                });
            }
            OverlapPolicy::Concurrent => {
                // Reference behavior: batches may overlap and the
                // most-recently-completed one wins the publish.
                state.poller.count_tick();
                let state = Arc::clone(&state);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_tick(state, cancel).await;
                });
            }
        }
    }
}

/// Run one reconciliation batch and publish it atomically.
async fn run_tick(state: Arc<AppState>, cancel: CancellationToken) {
    let machines = {
        let config = state.config.read().await;
        config.machines.clone()
    };
    if machines.is_empty() {
        return;
    }

    // Previous known values come from the currently visible snapshot.
    let previous: HashMap<String, DeviceRecord> = state
        .snapshot()
        .iter()
        .map(|record| (record.id.clone(), record.clone()))
        .collect();

    let reconciler = Reconciler::new(state.telemetry.as_ref());
    let now = OffsetDateTime::now_utc();

    let outcomes = futures::future::join_all(
        machines
            .iter()
            .map(|machine| reconciler.reconcile(machine, previous.get(&machine.id), now)),
    )
    .await;

    // A batch that outlived stop() is discarded, not published.
    if cancel.is_cancelled() {
        debug!("Discarding batch from stopped poller");
        return;
    }

    record_stats(&state, &outcomes, now).await;

    let records: Vec<DeviceRecord> = outcomes.into_iter().map(|o| o.record).collect();

    // Cache each gym's slice for warm starts and the consuming layer.
    let mut gyms: Vec<&str> = records.iter().map(|r| r.gym.as_str()).collect();
    gyms.sort_unstable();
    gyms.dedup();
    for gym in gyms {
        let slice: Vec<&DeviceRecord> = records.iter().filter(|r| r.gym == gym).collect();
        state.cache.set(&snapshot_key(gym), &slice);
    }

    state.publish(records);
}

async fn record_stats(state: &AppState, outcomes: &[ReconcileOutcome], now: OffsetDateTime) {
    let mut stats = state.poller.device_stats.write().await;
    for outcome in outcomes {
        let entry = match stats.iter_mut().find(|s| s.machine_id == outcome.record.id) {
            Some(entry) => entry,
            None => {
                stats.push(DeviceStats::new(outcome.record.id.clone()));
                stats.last_mut().expect("just pushed")
            }
        };
        entry.success_count += u64::from(outcome.successes);
        entry.failure_count += u64::from(outcome.failures);
        if outcome.successes > 0 {
            entry.last_poll_at = Some(now);
        }
        if let Some(error) = &outcome.last_error {
            entry.last_error_at = Some(now);
            entry.last_error = Some(error.clone());
        }
    }
    // Drop stats for machines that left the tracked set
    stats.retain(|s| outcomes.iter().any(|o| o.record.id == s.machine_id));
}
