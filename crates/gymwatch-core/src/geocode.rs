//! Geocoding collaborator: place identifier to coordinates and building
//! outline.
//!
//! Building geometry changes on the timescale of construction projects, so
//! callers cache these results behind an effectively unbounded TTL; this
//! client stays cache-oblivious.

use async_trait::async_trait;
use serde::Deserialize;

use gymwatch_types::LatLng;

use crate::error::{Error, Result};

/// Extra-computations flag requesting building polygons alongside the
/// geocode result.
const BUILDING_COMPUTATIONS: &str = "BUILDING_AND_ENTRANCES";

/// Operations the geocoding collaborator exposes.
#[async_trait]
pub trait GeocodeApi: Send + Sync {
    /// Resolve a place identifier to its coordinates.
    async fn coords(&self, place_id: &str) -> Result<LatLng>;

    /// Resolve a place identifier to its building outline polygon
    /// (outer ring, `lat`/`lng` pairs).
    async fn building_outline(&self, place_id: &str) -> Result<Vec<LatLng>>;
}

/// HTTP client for the geocoding API.
#[derive(Debug, Clone)]
pub struct GeocodeClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeocodeClient {
    /// Create a new geocoding client.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "URL must start with http:// or https://, got: {}",
                endpoint
            )));
        }
        if api_key.is_empty() {
            return Err(Error::InvalidConfig(
                "geocoding API key cannot be empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    async fn get_body(&self, operation: &str, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await.map_err(Error::Network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::status(operation, status.as_u16()));
        }
        response.text().await.map_err(Error::Network)
    }
}

#[async_trait]
impl GeocodeApi for GeocodeClient {
    async fn coords(&self, place_id: &str) -> Result<LatLng> {
        let url = format!(
            "{}?place_id={}&key={}",
            self.endpoint, place_id, self.api_key
        );
        let body = self.get_body("geocode", &url).await?;
        parse_coords(&body)
    }

    async fn building_outline(&self, place_id: &str) -> Result<Vec<LatLng>> {
        let url = format!(
            "{}?place_id={}&key={}&extra_computations={}",
            self.endpoint, place_id, self.api_key, BUILDING_COMPUTATIONS
        );
        let body = self.get_body("geocode", &url).await?;
        parse_building_outline(&body)
    }
}

// ==========================================================================
// Response parsing
// ==========================================================================

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
    #[serde(default)]
    buildings: Vec<Building>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct Building {
    #[serde(default)]
    building_outlines: Vec<BuildingOutline>,
}

#[derive(Debug, Deserialize)]
struct BuildingOutline {
    display_polygon: DisplayPolygon,
}

/// GeoJSON polygon: rings of `[lng, lat]` positions.
#[derive(Debug, Deserialize)]
struct DisplayPolygon {
    coordinates: Vec<Vec<[f64; 2]>>,
}

fn parse_response(body: &str) -> Result<GeocodeResult> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|e| Error::parse(format!("geocode body: {e}")))?;

    if response.status != "OK" {
        return Err(Error::parse(format!(
            "geocode status '{}'",
            response.status
        )));
    }

    response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse("geocode returned no results"))
}

fn parse_coords(body: &str) -> Result<LatLng> {
    Ok(parse_response(body)?.geometry.location)
}

fn parse_building_outline(body: &str) -> Result<Vec<LatLng>> {
    let result = parse_response(body)?;

    let polygon = result
        .buildings
        .first()
        .and_then(|b| b.building_outlines.first())
        .ok_or_else(|| Error::parse("geocode result has no building outline"))?;

    let ring = polygon
        .display_polygon
        .coordinates
        .first()
        .ok_or_else(|| Error::parse("building polygon has no rings"))?;

    // GeoJSON positions are [lng, lat]
    Ok(ring
        .iter()
        .map(|&[lng, lat]| LatLng { lat, lng })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COORDS_BODY: &str = r#"{
        "status": "OK",
        "results": [{
            "formatted_address": "123 Gym Way",
            "geometry": {"location": {"lat": 41.6611, "lng": -91.5302}}
        }]
    }"#;

    const OUTLINE_BODY: &str = r#"{
        "status": "OK",
        "results": [{
            "geometry": {"location": {"lat": 41.6611, "lng": -91.5302}},
            "buildings": [{
                "place_id": "abc",
                "building_outlines": [{
                    "display_polygon": {
                        "type": "Polygon",
                        "coordinates": [[[-91.53, 41.66], [-91.52, 41.66], [-91.52, 41.67]]]
                    }
                }]
            }]
        }]
    }"#;

    #[test]
    fn client_validates_config() {
        assert!(GeocodeClient::new("https://maps.example.com/geocode", "key").is_ok());
        assert!(matches!(
            GeocodeClient::new("maps.example.com", "key"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            GeocodeClient::new("https://maps.example.com", ""),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn coords_happy_path() {
        let coords = parse_coords(COORDS_BODY).unwrap();
        assert_eq!(coords.lat, 41.6611);
        assert_eq!(coords.lng, -91.5302);
    }

    #[test]
    fn non_ok_status_fails_closed() {
        let body = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        let err = parse_coords(body).unwrap_err();
        assert!(err.to_string().contains("ZERO_RESULTS"));
    }

    #[test]
    fn outline_converts_geojson_order() {
        let ring = parse_building_outline(OUTLINE_BODY).unwrap();
        assert_eq!(ring.len(), 3);
        // [lng, lat] on the wire becomes lat/lng here
        assert_eq!(ring[0].lat, 41.66);
        assert_eq!(ring[0].lng, -91.53);
    }

    #[test]
    fn outline_missing_buildings_fails_closed() {
        let err = parse_building_outline(COORDS_BODY).unwrap_err();
        assert!(err.to_string().contains("no building outline"));
    }
}
