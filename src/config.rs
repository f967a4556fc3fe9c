//! Configuration module for the analytics pipeline.
//!
//! This module provides environment-based configuration: collector URL,
//! store capacity and location, delivery cadence, and which device events
//! are captured automatically.

use std::collections::HashSet;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::event::{AppIdentity, DeviceEventKind};
use crate::facade::InitOptions;

/// Default API URL for the collector backend
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Path of the ingest endpoint under the API URL
const INGEST_PATH: &str = "/api/v1/ingest/events";

/// Default store capacity (1 MiB)
const DEFAULT_CAPACITY_BYTES: usize = 1024 * 1024;

/// Maximum allowed store capacity (64 MiB)
const MAX_CAPACITY_BYTES: usize = 64 * 1024 * 1024;

/// Default delivery interval in seconds
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Minimum delivery interval to avoid hammering the collector
const MIN_FLUSH_INTERVAL_SECS: u64 = 1;

/// Maximum delivery interval to keep data reasonably fresh
const MAX_FLUSH_INTERVAL_SECS: u64 = 3600;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of transport retries
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default file holding buffered events
const DEFAULT_STORE_PATH: &str = "edge-analytics-events.json";

/// Default device events captured automatically
const DEFAULT_DEVICE_EVENTS: &str = "lifecycle";

/// Default application name reported to the collector
const DEFAULT_APP_NAME: &str = "edge-analytics";

/// Configuration for the analytics pipeline.
///
/// All settings can be configured via environment variables:
/// - `EDGE_ANALYTICS_API_URL`: collector URL (default: http://localhost:8000)
/// - `EDGE_ANALYTICS_ENABLED`: capture switch (default: true)
/// - `EDGE_ANALYTICS_CAPACITY_BYTES`: store cap in bytes (default: 1 MiB)
/// - `EDGE_ANALYTICS_FLUSH_INTERVAL_SECS`: seconds between deliveries (default: 30)
/// - `EDGE_ANALYTICS_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `EDGE_ANALYTICS_MAX_RETRIES`: transport retry attempts (default: 3)
/// - `EDGE_ANALYTICS_STORE_PATH`: buffered events file
/// - `EDGE_ANALYTICS_DEVICE_EVENTS`: comma separated device events (default: lifecycle)
/// - `EDGE_ANALYTICS_APP_NAME` / `EDGE_ANALYTICS_APP_VERSION`: reporting application
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the collector API
    pub api_url: String,

    /// Full URL for the event ingestion endpoint
    pub ingest_url: String,

    /// Whether events are captured at all
    pub enabled: bool,

    /// Maximum aggregate size of buffered events
    pub capacity_bytes: usize,

    /// Duration between scheduled deliveries
    pub flush_interval: Duration,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Maximum number of retry attempts for failed requests
    pub max_retries: u32,

    /// File where buffered events are persisted
    pub store_path: PathBuf,

    /// Device events captured without caller involvement
    pub device_event_kinds: HashSet<DeviceEventKind>,

    /// Application name reported to the collector
    pub app_name: String,

    /// Application version reported to the collector
    pub app_version: String,
}

/// Error type for configuration loading failures
#[derive(Debug, Error)]
#[error(
    "Configuration error{}: {message}",
    .env_var.as_ref().map(|var| format!(" for {}", var)).unwrap_or_default()
)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a bounded setting is not a valid number or is
    /// out of range, if `EDGE_ANALYTICS_ENABLED` is not a boolean, or if
    /// `EDGE_ANALYTICS_DEVICE_EVENTS` names an unknown event kind.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use edge_analytics::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Collector: {}", config.ingest_url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("EDGE_ANALYTICS_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let ingest_url = format!("{}{}", api_url, INGEST_PATH);

        let enabled = Self::parse_enabled()?;

        let capacity_bytes = Self::parse_bounded(
            "EDGE_ANALYTICS_CAPACITY_BYTES",
            DEFAULT_CAPACITY_BYTES,
            1,
            MAX_CAPACITY_BYTES,
        )?;

        let flush_interval = Duration::from_secs(Self::parse_bounded(
            "EDGE_ANALYTICS_FLUSH_INTERVAL_SECS",
            DEFAULT_FLUSH_INTERVAL_SECS,
            MIN_FLUSH_INTERVAL_SECS,
            MAX_FLUSH_INTERVAL_SECS,
        )?);

        // Optional, falls back to defaults on parse failure
        let request_timeout_secs: u64 = env::var("EDGE_ANALYTICS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_retries: u32 = env::var("EDGE_ANALYTICS_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let store_path = env::var("EDGE_ANALYTICS_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_PATH));

        let device_event_kinds = Self::parse_device_events()?;

        let app_name =
            env::var("EDGE_ANALYTICS_APP_NAME").unwrap_or_else(|_| DEFAULT_APP_NAME.to_string());
        let app_version = env::var("EDGE_ANALYTICS_APP_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        Ok(Self {
            api_url,
            ingest_url,
            enabled,
            capacity_bytes,
            flush_interval,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_retries,
            store_path,
            device_event_kinds,
            app_name,
            app_version,
        })
    }

    /// Parse a numeric setting and check it against inclusive bounds.
    fn parse_bounded<T>(env_var: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Display + Copy,
    {
        let Ok(value) = env::var(env_var) else {
            return Ok(default);
        };

        let parsed: T = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value)))?;

        if parsed < min {
            return Err(ConfigError::for_var(
                env_var,
                format!("value {} is below minimum ({})", parsed, min),
            ));
        }

        if parsed > max {
            return Err(ConfigError::for_var(
                env_var,
                format!("value {} exceeds maximum ({})", parsed, max),
            ));
        }

        Ok(parsed)
    }

    fn parse_enabled() -> Result<bool, ConfigError> {
        let env_var = "EDGE_ANALYTICS_ENABLED";

        match env::var(env_var) {
            Ok(value) => match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                other => Err(ConfigError::for_var(
                    env_var,
                    format!("'{}' is not a valid boolean", other),
                )),
            },
            Err(_) => Ok(true),
        }
    }

    fn parse_device_events() -> Result<HashSet<DeviceEventKind>, ConfigError> {
        let env_var = "EDGE_ANALYTICS_DEVICE_EVENTS";
        let value = env::var(env_var).unwrap_or_else(|_| DEFAULT_DEVICE_EVENTS.to_string());

        DeviceEventKind::parse_list(&value).map_err(|e| ConfigError::for_var(env_var, e.to_string()))
    }

    /// Options passed to `AnalyticsFacade::initialize`.
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            enabled: self.enabled,
            capacity_bytes: self.capacity_bytes,
            device_event_kinds: self.device_event_kinds.clone(),
        }
    }

    /// Identity of the reporting application.
    pub fn app_identity(&self) -> AppIdentity {
        AppIdentity::new(&self.app_name, &self.app_version)
    }
}

impl Default for Config {
    /// Create a configuration from the defaults without reading the environment.
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ingest_url: format!("{}{}", DEFAULT_API_URL, INGEST_PATH),
            enabled: true,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            device_event_kinds: HashSet::from([DeviceEventKind::Lifecycle]),
            app_name: DEFAULT_APP_NAME.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
