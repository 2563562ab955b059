//! Service configuration.
//!
//! All collaborators are constructed from this one object and passed by
//! reference into the poller, reconciler, and derived-data cache; there are
//! no process-wide singleton clients.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Cache storage settings.
    pub storage: StorageConfig,
    /// Upstream telemetry API settings.
    pub telemetry: TelemetryConfig,
    /// Geocoding collaborator settings.
    pub geocode: GeocodeConfig,
    /// Poll loop settings.
    pub poller: PollerConfig,
    /// Gym directory (read-only).
    #[serde(default)]
    pub gyms: Vec<GymConfig>,
    /// Machine directory (read-only).
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Storage path is not empty
    /// - Telemetry base URL carries an http(s) scheme
    /// - Poll interval is within reasonable bounds
    /// - Gym and machine ids are unique; machines reference known gyms
    ///
    /// # Example
    ///
    /// ```
    /// use gymwatch_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.telemetry.validate());
        errors.extend(self.poller.validate());

        let mut gym_ids = std::collections::HashSet::new();
        for (i, gym) in self.gyms.iter().enumerate() {
            let prefix = format!("gyms[{}]", i);
            errors.extend(gym.validate(&prefix));
            if !gym_ids.insert(gym.id.clone()) {
                errors.push(ValidationError {
                    field: format!("{}.id", prefix),
                    message: format!("duplicate gym id '{}'", gym.id),
                });
            }
        }

        let mut machine_ids = std::collections::HashSet::new();
        for (i, machine) in self.machines.iter().enumerate() {
            let prefix = format!("machines[{}]", i);
            errors.extend(machine.validate(&prefix));
            if !machine_ids.insert(machine.id.clone()) {
                errors.push(ValidationError {
                    field: format!("{}.id", prefix),
                    message: format!("duplicate machine id '{}'", machine.id),
                });
            }
            if !gym_ids.contains(&machine.gym) {
                errors.push(ValidationError {
                    field: format!("{}.gym", prefix),
                    message: format!("machine references unknown gym '{}'", machine.gym),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else {
                match parts[0].parse::<u16>() {
                    Ok(0) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: "port cannot be 0".to_string(),
                        });
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: format!(
                                "invalid port '{}': must be a number 1-65535",
                                parts[0]
                            ),
                        });
                    }
                    Ok(_) => {}
                }
            }
        }

        errors
    }
}

/// Cache storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cache database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: gymwatch_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "cache database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Upstream telemetry API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base URL of the telemetry API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for rate-limit and timeout failures.
    pub max_retries: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090/api".to_string(),
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl TelemetryConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate telemetry configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "telemetry.base_url".to_string(),
                message: format!(
                    "base URL must start with http:// or https://, got '{}'",
                    self.base_url
                ),
            });
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "telemetry.timeout_secs".to_string(),
                message: "timeout cannot be 0".to_string(),
            });
        }

        errors
    }
}

/// Geocoding collaborator configuration.
///
/// An empty API key disables geocoding; gyms are then served without
/// coordinates or outlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Geocoding endpoint.
    pub endpoint: String,
    /// API key; empty disables the collaborator.
    pub api_key: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            api_key: String::new(),
        }
    }
}

/// Minimum poll interval in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 250;
/// Maximum poll interval in milliseconds (1 hour).
pub const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

/// What happens when a tick fires while the previous batch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Skip the tick entirely, bounding concurrent upstream load to one
    /// in-flight cycle per device.
    #[default]
    Skip,
    /// Let both batches run; the most-recently-completed batch wins.
    Concurrent,
}

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Tick interval in milliseconds.
    pub interval_ms: u64,
    /// Re-entrancy policy for overlapping ticks.
    pub overlap: OverlapPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            overlap: OverlapPolicy::Skip,
        }
    }
}

impl PollerConfig {
    /// Tick interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate poller configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(ValidationError {
                field: "poller.interval_ms".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} ms)",
                    self.interval_ms, MIN_POLL_INTERVAL_MS
                ),
            });
        } else if self.interval_ms > MAX_POLL_INTERVAL_MS {
            errors.push(ValidationError {
                field: "poller.interval_ms".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} ms / 1 hour)",
                    self.interval_ms, MAX_POLL_INTERVAL_MS
                ),
            });
        }

        errors
    }
}

/// One gym in the read-only directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GymConfig {
    /// Stable gym identifier (e.g. `"rec"`).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Place identifier for the geocoding collaborator.
    #[serde(default)]
    pub place_id: Option<String>,
    /// Floors machines can sit on.
    #[serde(default)]
    pub floors: Vec<u32>,
}

impl GymConfig {
    /// Validate gym configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.id", prefix),
                message: "gym id cannot be empty".to_string(),
            });
        }
        if self.label.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.label", prefix),
                message: "gym label cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// One tracked machine in the read-only directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Stable machine identifier (e.g. `"treadmill-1"`).
    pub id: String,
    /// Gym the machine belongs to.
    pub gym: String,
    /// Upstream identifier; absent when no mapping exists yet.
    #[serde(default)]
    pub thing_id: Option<Uuid>,
    /// Machine category (e.g. `"treadmill"`).
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Floor the machine sits on.
    #[serde(default)]
    pub floor: Option<u32>,
}

impl MachineConfig {
    /// Validate machine configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.id", prefix),
                message: "machine id cannot be empty".to_string(),
            });
        }
        if self.gym.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.gym", prefix),
                message: "machine gym cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `machines[0].id`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gymwatch")
        .join("service.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gym(id: &str) -> GymConfig {
        GymConfig {
            id: id.to_string(),
            label: format!("Gym {id}"),
            place_id: None,
            floors: vec![1],
        }
    }

    fn machine(id: &str, gym: &str) -> MachineConfig {
        MachineConfig {
            id: id.to_string(),
            gym: gym.to_string(),
            thing_id: Some(Uuid::new_v4()),
            machine_type: Some("treadmill".to_string()),
            floor: Some(1),
        }
    }

    #[test]
    fn config_default_validates() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.machines.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_toml_roundtrip() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9090"

            [storage]
            path = "/data/gymwatch/cache.db"

            [telemetry]
            base_url = "https://telemetry.example.app/api"
            timeout_secs = 5
            max_retries = 1

            [poller]
            interval_ms = 2000
            overlap = "concurrent"

            [[gyms]]
            id = "rec"
            label = "Campus Recreation and Wellness Center"
            place_id = "ChIJp6ru8-xB5IcRntwQ-Z4Qgj8"
            floors = [1, 2, 3]

            [[machines]]
            id = "treadmill-1"
            gym = "rec"
            thing_id = "6ad4d9f7-8444-4595-bf0b-5fb62c36430c"
            machine_type = "treadmill"
            floor = 2

            [[machines]]
            id = "row-9"
            gym = "rec"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.poller.overlap, OverlapPolicy::Concurrent);
        assert_eq!(config.poller.interval(), Duration::from_millis(2000));
        assert_eq!(config.machines.len(), 2);
        assert_eq!(
            config.machines[0].thing_id.unwrap().to_string(),
            "6ad4d9f7-8444-4595-bf0b-5fb62c36430c"
        );
        // A machine without an upstream mapping is representable
        assert!(config.machines[1].thing_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");

        let mut config = Config::default();
        config.gyms.push(gym("rec"));
        config.machines.push(machine("treadmill-1", "rec"));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.machines.len(), 1);
        assert_eq!(loaded.machines[0].id, "treadmill-1");
    }

    #[test]
    fn load_nonexistent() {
        let result = Config::load("/nonexistent/path/service.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid { toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn bind_validation() {
        let valid = ServerConfig {
            bind: "127.0.0.1:8080".to_string(),
        };
        assert!(valid.validate().is_empty());

        let no_port = ServerConfig {
            bind: "127.0.0.1".to_string(),
        };
        assert_eq!(no_port.validate().len(), 1);

        let port_zero = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        };
        assert!(port_zero.validate()[0].message.contains("cannot be 0"));

        let bad_port = ServerConfig {
            bind: "127.0.0.1:abc".to_string(),
        };
        assert!(bad_port.validate()[0].message.contains("must be a number"));
    }

    #[test]
    fn poll_interval_bounds() {
        let too_fast = PollerConfig {
            interval_ms: 50,
            overlap: OverlapPolicy::Skip,
        };
        assert!(too_fast.validate()[0].message.contains("too short"));

        let too_slow = PollerConfig {
            interval_ms: 7_200_000,
            overlap: OverlapPolicy::Skip,
        };
        assert!(too_slow.validate()[0].message.contains("too long"));

        assert!(PollerConfig::default().validate().is_empty());
    }

    #[test]
    fn telemetry_url_scheme_required() {
        let config = TelemetryConfig {
            base_url: "telemetry.example.app".to_string(),
            ..Default::default()
        };
        assert!(config.validate()[0].message.contains("http"));
    }

    #[test]
    fn duplicate_machine_ids_rejected() {
        let mut config = Config::default();
        config.gyms.push(gym("rec"));
        config.machines.push(machine("treadmill-1", "rec"));
        config.machines.push(machine("treadmill-1", "rec"));

        let result = config.validate();
        assert!(result.is_err());
        if let Err(ConfigError::Validation(errors)) = result {
            assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        }
    }

    #[test]
    fn machine_must_reference_known_gym() {
        let mut config = Config::default();
        config.gyms.push(gym("rec"));
        config.machines.push(machine("bike-1", "fitness_east"));

        let result = config.validate();
        assert!(result.is_err());
        if let Err(ConfigError::Validation(errors)) = result {
            assert!(errors.iter().any(|e| e.message.contains("unknown gym")));
        }
    }

    #[test]
    fn validation_error_display() {
        let error = ValidationError {
            field: "poller.interval_ms".to_string(),
            message: "too short".to_string(),
        };
        assert_eq!(format!("{}", error), "poller.interval_ms: too short");
    }

    #[test]
    fn default_config_path_shape() {
        let path = default_config_path();
        assert!(path.ends_with("gymwatch/service.toml"));
    }
}
