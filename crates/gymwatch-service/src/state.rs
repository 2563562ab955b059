//! Application state shared across the poller and HTTP handlers.
//!
//! # Snapshot Channel Behavior
//!
//! The device snapshot is published through a `tokio::sync::watch` channel
//! holding an `Arc<Vec<DeviceRecord>>`:
//!
//! - **Atomicity**: a publish is one `send_replace`; readers see either the
//!   whole previous batch or the whole next one, never a half-updated list.
//! - **Bootstrap**: the channel starts with an empty list, which consumers
//!   must treat as "data not yet available", not as a fault.
//! - **No backpressure**: `watch` keeps only the latest value; a slow reader
//!   skips intermediate snapshots rather than lagging the poller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use gymwatch_core::{GeocodeApi, TelemetryApi};
use gymwatch_store::CacheStore;
use gymwatch_types::DeviceRecord;

use crate::config::Config;
use crate::derived::DerivedCache;

/// One atomically-published, internally consistent batch of device records.
pub type Snapshot = Arc<Vec<DeviceRecord>>;

/// Shared application state.
pub struct AppState {
    /// The TTL cache store.
    pub cache: CacheStore,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Upstream telemetry accessor.
    pub telemetry: Arc<dyn TelemetryApi>,
    /// Derived-data cache over the same store.
    pub derived: DerivedCache,
    /// Poller control state.
    pub poller: PollerState,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        cache: CacheStore,
        config: Config,
        telemetry: Arc<dyn TelemetryApi>,
        geocoder: Option<Arc<dyn GeocodeApi>>,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(Arc::new(Vec::new()));
        let derived = DerivedCache::new(cache.clone(), Arc::clone(&telemetry), geocoder);
        Arc::new(Self {
            cache,
            config: RwLock::new(config),
            telemetry,
            derived,
            poller: PollerState::new(),
            snapshot_tx,
        })
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot publishes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Replace the visible snapshot in one atomic swap.
    pub fn publish(&self, records: Vec<DeviceRecord>) {
        self.snapshot_tx.send_replace(Arc::new(records));
    }
}

/// State for tracking and controlling the poller.
pub struct PollerState {
    /// Whether the poller loop is currently running.
    running: AtomicBool,
    /// When the poller was started (Unix timestamp).
    started_at: AtomicU64,
    /// Ticks that ran a reconciliation batch.
    ticks: AtomicU64,
    /// Ticks suppressed by the skip re-entrancy policy.
    ticks_skipped: AtomicU64,
    /// Whether a reconciliation batch is currently in flight.
    in_flight: AtomicBool,
    /// Token cancelling the current loop; replaced on each start.
    cancel: std::sync::Mutex<CancellationToken>,
    /// Per-machine poll statistics.
    pub device_stats: RwLock<Vec<DeviceStats>>,
}

impl PollerState {
    /// Create a new poller state.
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
            device_stats: RwLock::new(Vec::new()),
        }
    }

    /// Check if the poller is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the poller started and hand out a fresh cancellation token.
    ///
    /// Returns `None` when a loop is already running.
    pub fn begin(&self) -> Option<CancellationToken> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
        self.started_at.store(now, Ordering::SeqCst);

        let token = CancellationToken::new();
        *self.cancel.lock().expect("cancel token poisoned") = token.clone();
        Some(token)
    }

    /// Signal the loop to stop; idempotent.
    ///
    /// In-flight fetches from the last fired tick may finish, but their
    /// batch is discarded by the publish step checking this token.
    pub fn signal_stop(&self) {
        self.cancel.lock().expect("cancel token poisoned").cancel();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the poller start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Ticks that ran a batch.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Ticks suppressed by the skip policy.
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::SeqCst)
    }

    pub(crate) fn count_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Try to claim the single in-flight batch slot.
    pub(crate) fn try_begin_batch(&self) -> bool {
        !self.in_flight.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn end_batch(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Default for PollerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll statistics for a single machine.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceStats {
    /// Machine id.
    pub machine_id: String,
    /// Time of last tick in which any fetch for this machine succeeded.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_poll_at: Option<OffsetDateTime>,
    /// Time of last fetch failure.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful fetches.
    pub success_count: u64,
    /// Total failed fetches.
    pub failure_count: u64,
}

impl DeviceStats {
    /// Fresh statistics for a machine.
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            last_poll_at: None,
            last_error_at: None,
            last_error: None,
            success_count: 0,
            failure_count: 0,
        }
    }
}
