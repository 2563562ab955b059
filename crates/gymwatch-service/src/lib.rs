//! Background poller and HTTP surface for gym machine fleet state.
//!
//! This crate ties the subsystem together: the poller drives periodic
//! reconciliation ticks across every tracked machine, publishes the results
//! as atomic snapshots, and the derived-data cache serves geometry and
//! usage predictions through the same TTL cache store. A small read-only
//! REST surface exposes all of it to the consuming layer.
//!
//! # Architecture
//!
//! ```text
//! Poller ── tick ──> Reconciler ──> TelemetryApi (gymwatch-core)
//!   │                    │
//!   │                    └──> previous snapshot (watch channel)
//!   └── publish ──> Snapshot ──> REST surface / subscribers
//!
//! DerivedCache ──> CacheStore (gymwatch-store) <── Poller snapshot writes
//! ```

pub mod api;
pub mod config;
pub mod derived;
pub mod poller;
pub mod reconcile;
pub mod state;

pub use config::{Config, ConfigError, GymConfig, MachineConfig, OverlapPolicy, PollerConfig};
pub use derived::{BuildingGeometry, DerivedCache};
pub use poller::Poller;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use state::{AppState, DeviceStats, PollerState, Snapshot};
