//! Upstream accessors for gym machine fleet monitoring.
//!
//! This crate owns every conversation with the outside world: the
//! rate-limited telemetry API that exposes per-device variables, last-used
//! timestamps, and usage predictions, and the geocoding collaborator that
//! resolves gyms to coordinates and building outlines.
//!
//! # Features
//!
//! - [`TelemetryApi`] trait with an HTTP implementation and a scriptable
//!   mock for tests
//! - Single-schema response parsing that fails closed into parse errors
//! - Bounded, jittered retry for rate-limit (429) and timeout failures
//! - [`GeocodeApi`] trait with the place-id geocoding client
//!
//! # Example
//!
//! ```no_run
//! use gymwatch_core::{HttpTelemetryClient, TelemetryApi};
//! use gymwatch_types::Variable;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpTelemetryClient::new("https://telemetry.example.app/api")?;
//! let token = client.fetch_variable(uuid::Uuid::new_v4(), Variable::State).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod geocode;
pub mod mock;
pub mod retry;
pub mod traits;

pub use client::{DEFAULT_TIMEOUT, HttpTelemetryClient};
pub use error::{Error, Result};
pub use geocode::{GeocodeApi, GeocodeClient};
pub use mock::MockTelemetry;
pub use retry::{RetryConfig, with_retry};
pub use traits::TelemetryApi;
