//! Platform-agnostic types for gym machine fleet monitoring.
//!
//! This crate provides the shared data model used by the telemetry client
//! (gymwatch-core), the cache store (gymwatch-store), and the polling
//! service (gymwatch-service).
//!
//! # Features
//!
//! - Availability and connectivity enums with strict wire parsing
//! - The reconciled [`DeviceRecord`] snapshot element
//! - Timeseries and usage-statistics rows consumed by charting
//! - Error types for wire-value parsing
//!
//! # Example
//!
//! ```
//! use gymwatch_types::{AvailabilityState, DeviceRecord};
//!
//! let record = DeviceRecord::loading("treadmill-1", "rec", None);
//! assert_eq!(record.availability, AvailabilityState::Unknown);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    AvailabilityState, ConnectivityStatus, DayPercentage, DeviceRecord, HourPercentage, LatLng,
    TimeseriesPoint, Variable,
};
