//! Core types for gym machine fleet state.

use core::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ParseError;

/// Whether a machine is currently occupied.
///
/// Independent of [`ConnectivityStatus`]: losing contact with a device says
/// nothing about whether someone is on the machine, so the two are never
/// merged into one flag.
///
/// `Unknown` doubles as the "loading" sentinel produced before the first
/// successful fetch. A later failed fetch holds the current value rather
/// than reverting to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityState {
    /// Someone is using the machine.
    InUse,
    /// The machine is free.
    Available,
    /// No value has been observed yet.
    Unknown,
}

impl AvailabilityState {
    /// Parse the upstream wire token.
    ///
    /// The upstream reports `"on"` (in use), `"off"` (available), or
    /// `"unknown"` (device has never published the property). Any other
    /// token fails closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use gymwatch_types::AvailabilityState;
    ///
    /// assert_eq!(AvailabilityState::from_wire("on").unwrap(), AvailabilityState::InUse);
    /// assert_eq!(AvailabilityState::from_wire("off").unwrap(), AvailabilityState::Available);
    /// assert!(AvailabilityState::from_wire("busy").is_err());
    /// ```
    pub fn from_wire(token: &str) -> Result<Self, ParseError> {
        match token {
            "on" => Ok(Self::InUse),
            "off" => Ok(Self::Available),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseError::unexpected("state", other)),
        }
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUse => write!(f, "In Use"),
            Self::Available => write!(f, "Available"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Whether the device publishing a machine's state is reachable upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityStatus {
    /// The device is reporting to the upstream cloud.
    Online,
    /// The upstream cloud has lost contact with the device.
    Offline,
    /// No value has been observed yet.
    Unknown,
}

impl ConnectivityStatus {
    /// Parse the upstream wire token (`"ONLINE"`, `"OFFLINE"`, `"UNKNOWN"`).
    /// Any other token fails closed.
    pub fn from_wire(token: &str) -> Result<Self, ParseError> {
        match token {
            "ONLINE" => Ok(Self::Online),
            "OFFLINE" => Ok(Self::Offline),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(ParseError::unexpected("status", other)),
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A per-device variable exposed by the upstream telemetry API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    /// The in-use flag (`"state"`).
    State,
    /// The device connectivity flag (`"status"`).
    Status,
}

impl Variable {
    /// The query-parameter name the upstream expects.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One tracked machine's reconciled state.
///
/// Records are created when a machine enters the tracked set and discarded
/// when the set changes. They are replaced wholesale by the poller's
/// per-tick batch, never field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable catalog identifier (e.g. `"treadmill-1"`).
    pub id: String,
    /// Upstream identifier mapping; `None` when the directory has no entry
    /// for this machine.
    pub thing_id: Option<Uuid>,
    /// Gym the machine belongs to.
    pub gym: String,
    /// Machine category from the catalog (e.g. `"treadmill"`).
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Floor the machine sits on.
    #[serde(default)]
    pub floor: Option<u32>,
    /// Whether the machine is occupied.
    pub availability: AvailabilityState,
    /// Whether the device is reachable upstream.
    pub connectivity: ConnectivityStatus,
    /// When the machine was last used; `None` = never.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
    /// Time of the last reconciliation in which at least one fetch
    /// succeeded. An unchanged value is the only staleness signal a
    /// consumer gets for an unreachable device.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl DeviceRecord {
    /// A record in the loading state, before any fetch has resolved.
    pub fn loading(id: impl Into<String>, gym: impl Into<String>, thing_id: Option<Uuid>) -> Self {
        Self {
            id: id.into(),
            thing_id,
            gym: gym.into(),
            machine_type: None,
            floor: None,
            availability: AvailabilityState::Unknown,
            connectivity: ConnectivityStatus::Unknown,
            last_used_at: None,
            updated_at: None,
        }
    }

    /// True once any fetch for this record has succeeded.
    pub fn has_data(&self) -> bool {
        self.updated_at.is_some()
    }
}

/// One point of a state timeseries, consumed by charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    /// Sample time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The in-use flag at that time.
    pub state: AvailabilityState,
    /// Device connectivity at that time.
    pub status: ConnectivityStatus,
}

/// Usage share for one weekday, as a percentage of observed samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPercentage {
    /// Weekday name (`"Monday"` .. `"Sunday"`).
    pub day: String,
    /// Share of samples in use, 0-100.
    pub percentage: f64,
}

/// Usage share for one hour of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourPercentage {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Share of samples in use, 0-100.
    pub percentage: f64,
}

/// A geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_wire_roundtrip() {
        assert_eq!(
            AvailabilityState::from_wire("on").unwrap(),
            AvailabilityState::InUse
        );
        assert_eq!(
            AvailabilityState::from_wire("off").unwrap(),
            AvailabilityState::Available
        );
        assert_eq!(
            AvailabilityState::from_wire("unknown").unwrap(),
            AvailabilityState::Unknown
        );
    }

    #[test]
    fn availability_fails_closed() {
        let err = AvailabilityState::from_wire("ON").unwrap_err();
        assert!(err.to_string().contains("'ON'"));
        assert!(AvailabilityState::from_wire("").is_err());
        assert!(AvailabilityState::from_wire("busy").is_err());
    }

    #[test]
    fn connectivity_wire_roundtrip() {
        assert_eq!(
            ConnectivityStatus::from_wire("ONLINE").unwrap(),
            ConnectivityStatus::Online
        );
        assert_eq!(
            ConnectivityStatus::from_wire("OFFLINE").unwrap(),
            ConnectivityStatus::Offline
        );
        assert_eq!(
            ConnectivityStatus::from_wire("UNKNOWN").unwrap(),
            ConnectivityStatus::Unknown
        );
        assert!(ConnectivityStatus::from_wire("online").is_err());
    }

    #[test]
    fn variable_wire_names() {
        assert_eq!(Variable::State.wire_name(), "state");
        assert_eq!(Variable::Status.wire_name(), "status");
        assert_eq!(Variable::Status.to_string(), "status");
    }

    #[test]
    fn loading_record_has_no_data() {
        let record = DeviceRecord::loading("treadmill-1", "rec", None);
        assert_eq!(record.availability, AvailabilityState::Unknown);
        assert_eq!(record.connectivity, ConnectivityStatus::Unknown);
        assert!(record.last_used_at.is_none());
        assert!(!record.has_data());
    }

    #[test]
    fn device_record_serde_roundtrip() {
        let record = DeviceRecord {
            id: "bike-2".to_string(),
            thing_id: Some(Uuid::nil()),
            gym: "fitness_east".to_string(),
            machine_type: Some("bike".to_string()),
            floor: Some(2),
            availability: AvailabilityState::InUse,
            connectivity: ConnectivityStatus::Online,
            last_used_at: Some(OffsetDateTime::UNIX_EPOCH),
            updated_at: Some(OffsetDateTime::UNIX_EPOCH),
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"IN_USE\""));
        assert!(json.contains("\"ONLINE\""));
        assert!(json.contains("1970-01-01T00:00:00Z"));

        let back: DeviceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn device_record_null_timestamps() {
        let json = r#"{
            "id": "row-3",
            "thing_id": null,
            "gym": "rec",
            "availability": "UNKNOWN",
            "connectivity": "UNKNOWN",
            "last_used_at": null,
            "updated_at": null
        }"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert!(record.last_used_at.is_none());
        assert!(record.machine_type.is_none());
        assert!(!record.has_data());
    }

    #[test]
    fn display_strings() {
        assert_eq!(AvailabilityState::InUse.to_string(), "In Use");
        assert_eq!(AvailabilityState::Available.to_string(), "Available");
        assert_eq!(ConnectivityStatus::Offline.to_string(), "OFFLINE");
    }
}
