//! Read-through cache for expensive, slowly-changing computations.
//!
//! Building geometry and usage predictions cost an upstream round trip that
//! is orders of magnitude slower than their rate of change, so they sit
//! behind the TTL cache store: a valid entry short-circuits the
//! computation, a miss computes, stores, and returns.
//!
//! There is deliberately no single-flight deduplication: concurrent callers
//! racing on the same cold key may each invoke the computation. The results
//! are idempotent and the store's last writer wins, which is cheaper than
//! coordinating the callers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use gymwatch_core::{Error, GeocodeApi, Result, TelemetryApi};
use gymwatch_store::{CacheStore, GEOMETRY_TTL, PREDICTION_TTL};
use gymwatch_types::LatLng;

/// A gym building's cached geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingGeometry {
    /// Centroid coordinates.
    pub coords: LatLng,
    /// Outline polygon (outer ring).
    pub outline: Vec<LatLng>,
}

/// Read-through cache over the TTL cache store.
#[derive(Clone)]
pub struct DerivedCache {
    cache: CacheStore,
    telemetry: Arc<dyn TelemetryApi>,
    geocoder: Option<Arc<dyn GeocodeApi>>,
}

impl DerivedCache {
    /// Create a derived-data cache over the given store and collaborators.
    pub fn new(
        cache: CacheStore,
        telemetry: Arc<dyn TelemetryApi>,
        geocoder: Option<Arc<dyn GeocodeApi>>,
    ) -> Self {
        Self {
            cache,
            telemetry,
            geocoder,
        }
    }

    /// Return the cached value for `key` if valid, otherwise invoke
    /// `compute`, store its result under `ttl`, and return it.
    ///
    /// A compute failure on a cold key propagates to the caller; the
    /// consuming layer treats it as "no derived data yet".
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get::<T>(key, ttl) {
            debug!("Derived cache hit for '{}'", key);
            return Ok(value);
        }

        let value = compute().await?;
        self.cache.set(key, &value);
        Ok(value)
    }

    /// Predicted peak (`want_peak`) or ideal usage intervals for one
    /// machine on one date, refreshed at most every fifteen minutes.
    ///
    /// Keys are scoped by gym so that retracking a differently-scoped set
    /// that happens to reuse device identifiers cannot serve predictions
    /// computed for the old scope.
    pub async fn peak_hours(
        &self,
        gym: &str,
        thing_id: Uuid,
        date: Date,
        want_peak: bool,
    ) -> Result<Vec<OffsetDateTime>> {
        let kind = if want_peak { "peak" } else { "ideal" };
        let key = format!("peak_times_{gym}_{thing_id}_{date}_{kind}");
        self.get_or_compute(&key, PREDICTION_TTL, || async {
            self.telemetry
                .fetch_peak_hours(thing_id, date, want_peak)
                .await
        })
        .await
    }

    /// A gym building's coordinates and outline, cached effectively
    /// forever.
    pub async fn building_geometry(&self, place_id: &str) -> Result<BuildingGeometry> {
        let Some(geocoder) = &self.geocoder else {
            return Err(Error::InvalidConfig(
                "geocoding collaborator is not configured".to_string(),
            ));
        };

        let key = format!("geo_{place_id}");
        self.get_or_compute(&key, GEOMETRY_TTL, || async {
            let coords = geocoder.coords(place_id).await?;
            let outline = geocoder.building_outline(place_id).await?;
            Ok(BuildingGeometry { coords, outline })
        })
        .await
    }
}

impl std::fmt::Debug for DerivedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCache")
            .field("geocoding", &self.geocoder.is_some())
            .finish()
    }
}
