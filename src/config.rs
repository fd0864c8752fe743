use crate::models::{AlertMessage, BrokerEndpoint, NetworkCredentials};
use crate::network::JoinPolicy;
use crate::publisher::ConnectFailurePolicy;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_SENSOR_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_voltage0_raw";

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkCredentials,
    pub wifi_interface: String,
    pub wifi_poll_interval_ms: u64,
    pub wifi_join_max_attempts: i32,

    pub broker: BrokerEndpoint,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_keep_alive_secs: u64,
    pub mqtt_connect_timeout_ms: u64,
    pub mqtt_connect_retries: u32,
    pub mqtt_retry_interval_ms: u64,

    pub alert: AlertMessage,
    pub alert_threshold: u16,
    pub sample_interval_ms: u64,

    pub sensor_path: PathBuf,
    pub sensor_max: u16,

    pub max_iterations: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

impl Config {
    /// Validate timeout values and other critical configurations.
    fn validate(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 1_000_000;
        const MIN_KEEP_ALIVE_SECS: u64 = 5;

        let timeouts = [
            ("WIFI_POLL_INTERVAL_MS", self.wifi_poll_interval_ms),
            ("MQTT_CONNECT_TIMEOUT_MS", self.mqtt_connect_timeout_ms),
            ("MQTT_RETRY_INTERVAL_MS", self.mqtt_retry_interval_ms),
            ("SAMPLE_INTERVAL_MS", self.sample_interval_ms),
        ];
        for (name, value) in timeouts {
            if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&value) {
                return Err(ConfigError::ParsingError(format!(
                    "{} must be between {} and {} ms",
                    name, MIN_TIMEOUT, MAX_TIMEOUT
                )));
            }
        }

        if self.mqtt_keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::ParsingError(format!(
                "MQTT_KEEP_ALIVE_SECS must be at least {}",
                MIN_KEEP_ALIVE_SECS
            )));
        }

        if self.alert_threshold > self.sensor_max {
            return Err(ConfigError::ParsingError(format!(
                "ALERT_THRESHOLD ({}) must not exceed SENSOR_MAX ({})",
                self.alert_threshold, self.sensor_max
            )));
        }

        if self.max_iterations == Some(0) {
            return Err(ConfigError::ParsingError(
                "MONITOR_MAX_ITERATIONS must be a positive integer".to_string(),
            ));
        }

        if self.network.ssid.is_empty() {
            return Err(ConfigError::MissingOrInvalid("WIFI_SSID".to_string()));
        }
        if self.alert.topic.is_empty() {
            return Err(ConfigError::MissingOrInvalid("ALERT_TOPIC".to_string()));
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        fn parse<T: std::str::FromStr>(key: &str, raw: String, what: &str) -> Result<T, ConfigError> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::ParsingError(format!("{} must be {}", key, what)))
        }

        let client_id = lookup("MQTT_CLIENT_ID")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("sensor-flux-{}", Uuid::new_v4()));

        let max_iterations = match lookup("MONITOR_MAX_ITERATIONS") {
            Some(raw) => Some(parse::<u64>("MONITOR_MAX_ITERATIONS", raw, "a positive integer")?),
            None => None,
        };

        let config = Self {
            // Network
            network: NetworkCredentials::new(
                lookup("WIFI_SSID").ok_or_else(|| ConfigError::MissingOrInvalid("WIFI_SSID".to_string()))?,
                var_or("WIFI_PASSWORD", ""),
            ),
            wifi_interface: var_or("WIFI_INTERFACE", "wlan0"),
            wifi_poll_interval_ms: parse("WIFI_POLL_INTERVAL_MS", var_or("WIFI_POLL_INTERVAL_MS", "1000"), "a valid number")?,
            wifi_join_max_attempts: parse("WIFI_JOIN_MAX_ATTEMPTS", var_or("WIFI_JOIN_MAX_ATTEMPTS", "-1"), "an integer")?,

            // MQTT
            broker: BrokerEndpoint {
                host: var_or("MQTT_HOST", "test.mosquitto.org"),
                port: parse("MQTT_PORT", var_or("MQTT_PORT", "1883"), "a valid number")?,
                client_id,
            },
            mqtt_username: var_or("MQTT_USERNAME", ""), // Default to empty
            mqtt_password: var_or("MQTT_PASSWORD", ""), // Default to empty
            mqtt_keep_alive_secs: parse("MQTT_KEEP_ALIVE_SECS", var_or("MQTT_KEEP_ALIVE_SECS", "60"), "a valid number")?,
            mqtt_connect_timeout_ms: parse("MQTT_CONNECT_TIMEOUT_MS", var_or("MQTT_CONNECT_TIMEOUT_MS", "30000"), "a valid number")?,
            mqtt_connect_retries: parse("MQTT_CONNECT_RETRIES", var_or("MQTT_CONNECT_RETRIES", "0"), "a non-negative integer")?,
            mqtt_retry_interval_ms: parse("MQTT_RETRY_INTERVAL_MS", var_or("MQTT_RETRY_INTERVAL_MS", "1000"), "a valid number")?,

            // Alert
            alert: AlertMessage::new(var_or("ALERT_TOPIC", "alerta/sensor"), var_or("ALERT_PAYLOAD", "true")),
            alert_threshold: parse("ALERT_THRESHOLD", var_or("ALERT_THRESHOLD", "2000"), "an integer in the sensor range")?,
            sample_interval_ms: parse("SAMPLE_INTERVAL_MS", var_or("SAMPLE_INTERVAL_MS", "1000"), "a valid number")?,

            // Sensor
            sensor_path: PathBuf::from(var_or("SENSOR_PATH", DEFAULT_SENSOR_PATH)),
            sensor_max: parse("SENSOR_MAX", var_or("SENSOR_MAX", "4095"), "a valid number")?,

            max_iterations,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn join_policy(&self) -> JoinPolicy {
        JoinPolicy {
            poll_interval: Duration::from_millis(self.wifi_poll_interval_ms),
            // Any non-positive value means "keep polling forever".
            max_failed_polls: u32::try_from(self.wifi_join_max_attempts).ok().filter(|n| *n > 0),
        }
    }

    pub fn connect_failure_policy(&self) -> ConnectFailurePolicy {
        match self.mqtt_connect_retries {
            0 => ConnectFailurePolicy::Skip,
            retries => ConnectFailurePolicy::Retry {
                retries,
                interval: Duration::from_millis(self.mqtt_retry_interval_ms),
            },
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn mqtt_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mqtt_connect_timeout_ms)
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }
}
