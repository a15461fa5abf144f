//! Configuration management for the tracking service.
//!
//! Loads configuration from environment variables with sensible defaults. Unset or empty
//! variables fall back to the default; a value that is present but unparsable is an error.

use crate::error::ConfigError;
use deploy_framework::TrustSettings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Backing store (Redis protocol) connection
    pub redis: RedisConfig,
    /// In-process tracking cache
    pub cache: CacheConfig,
    /// HTTP front end
    pub http: HttpConfig,
    /// Event stream connector
    pub stream: StreamConfig,
    /// Trust store and trust anchors locations
    pub trust: TrustSettings,
    /// Upper bound on the whole startup, in seconds. Unbounded when unset.
    pub startup_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// `host:port` of the backing store
    pub addr: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of tracking records held in memory
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    /// Port shared by every instance. `0` lets each instance pick its own.
    pub port: u16,
    pub instances: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// `host:port` of the stream endpoint
    pub addr: String,
    /// Stream subscribed to by every instance
    pub name: String,
    pub instances: usize,
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout_ms: 2000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            instances: 5,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9000".to_string(),
            name: "tracking-events".to_string(),
            instances: 5,
            connect_timeout_ms: 2000,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            stream: StreamConfig::default(),
            trust: TrustSettings::default(),
            startup_timeout_secs: None,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value of the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value of the wrong type.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(default)
        };

        Ok(Self {
            redis: RedisConfig {
                addr: text("REDIS_ADDR", defaults.redis.addr),
                connect_timeout_ms: parse(
                    &lookup,
                    "REDIS_CONNECT_TIMEOUT_MS",
                    defaults.redis.connect_timeout_ms,
                )?,
            },
            cache: CacheConfig {
                capacity: parse(&lookup, "CACHE_CAPACITY", defaults.cache.capacity)?,
            },
            http: HttpConfig {
                host: text("HTTP_HOST", defaults.http.host),
                port: parse(&lookup, "HTTP_PORT", defaults.http.port)?,
                instances: parse(&lookup, "HTTP_INSTANCES", defaults.http.instances)?,
            },
            stream: StreamConfig {
                addr: text("STREAM_ADDR", defaults.stream.addr),
                name: text("STREAM_NAME", defaults.stream.name),
                instances: parse(&lookup, "STREAM_INSTANCES", defaults.stream.instances)?,
                connect_timeout_ms: parse(
                    &lookup,
                    "STREAM_CONNECT_TIMEOUT_MS",
                    defaults.stream.connect_timeout_ms,
                )?,
            },
            trust: TrustSettings::from_lookup(&lookup),
            startup_timeout_secs: parse_optional(&lookup, "STARTUP_TIMEOUT_SECS")?,
        })
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(None),
    }
}
