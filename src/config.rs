//! Application configuration loaded from environment variables.
//!
//! [`AppConfig::from_env`] reads the process environment (after `.env` has
//! been loaded by `dotenvy`). All parsing goes through
//! [`AppConfig::from_lookup`], which takes any `name -> value` function, so
//! tests can supply a map instead of touching the real environment.
//!
//! # Environment Variables
//!
//! | Variable                      | Default         |
//! |-------------------------------|-----------------|
//! | `APP_NAME`                    | `greenlight`    |
//! | `APP_ENV`                     | `development`   |
//! | `APP_VERSION`                 | crate version   |
//! | `HOST` / `PORT`               | `0.0.0.0:4000`  |
//! | `HTTP_ALLOWED_ORIGINS`        | any origin      |
//! | `HTTP_REQUEST_TIMEOUT_MS`     | `10000`         |
//! | `STORAGE_MODE`                | `in_memory`     |
//! | `DATABASE_URL`                | required for postgres |
//! | `DB_MAX_CONNECTIONS`          | `25`            |
//! | `DB_MAX_IDLE_TIME_SECS`       | `900`           |
//! | `DB_MAX_LIFETIME_SECS`        | `5400`          |
//! | `DB_ACQUIRE_TIMEOUT_SECS`     | `5`             |
//! | `LIMITER_ENABLED`             | `true`          |
//! | `LIMITER_RPS`                 | `2`             |
//! | `LIMITER_BURST`               | `4`             |
//! | `LIMITER_SWEEP_INTERVAL_SECS` | `60`            |
//! | `LIMITER_IDLE_THRESHOLD_SECS` | `180`           |
//! | `SHUTDOWN_DRAIN_TIMEOUT_SECS` | `10`            |
//! | `MAILER_URL`                  | unset, log only |
//! | `MAILER_SENDER`               | `Greenlight <no-reply@greenlight.local>` |
//! | `MAILER_TIMEOUT_MS`           | `5000`          |
//! | `LOG_FORMAT`                  | `pretty`        |
//! | `WORKER_THREADS`              | one per core    |
//! | `PASSWORD_HASH_COST`          | `12`            |

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::admission::{AdmissionConfig, AdmissionError};
use crate::domain::{DEFAULT_PASSWORD_COST, MAX_PASSWORD_COST, MIN_PASSWORD_COST};
use crate::infrastructure::{ConfigurationError, PoolSettings, StorageConfig, StorageMode};

// =============================================================================
// Errors
// =============================================================================

/// A variable is set but cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvParseError {
    #[error("Invalid f64 value for {name}: {message} (got '{value}')")]
    InvalidF64 {
        name: String,
        message: String,
        value: String,
    },

    #[error("Invalid u64 value for {name}: {message} (got '{value}')")]
    InvalidU64 {
        name: String,
        message: String,
        value: String,
    },

    #[error("Invalid boolean for {name}: expected true or false (got '{value}')")]
    InvalidBool { name: String, value: String },

    #[error("Invalid address for {name}: {message} (got '{value}')")]
    InvalidAddress {
        name: String,
        message: String,
        value: String,
    },
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvParse(#[from] EnvParseError),

    #[error("Storage configuration error: {0}")]
    Storage(#[from] ConfigurationError),

    #[error("Admission configuration error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Invalid LOG_FORMAT: '{0}'. Expected 'pretty' or 'json'")]
    InvalidLogFormat(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("PASSWORD_HASH_COST must be between 4 and 31, got {0}")]
    PasswordCost(u32),
}

// =============================================================================
// Sections
// =============================================================================

/// Identification reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub environment: String,
    pub version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "greenlight".to_string(),
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Listener and HTTP layer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub address: SocketAddr,
    /// Empty means any origin is allowed.
    pub allowed_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 4000)),
            allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Outbound mail settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    /// Relay endpoint. `None` selects the log-only mailer.
    pub url: Option<String>,
    pub sender: String,
    pub timeout: Duration,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            url: None,
            sender: "Greenlight <no-reply@greenlight.local>".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Shutdown sequence settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Upper bound on waiting for background tasks.
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Process runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Requested Tokio worker threads. `None` keeps one per core.
    pub worker_threads: Option<usize>,
}

impl RuntimeConfig {
    /// Requested worker threads, capped at four per available core.
    ///
    /// Returns the thread count to use and whether the request was capped.
    #[must_use]
    pub fn worker_threads_for(&self, available_cores: usize) -> Option<(usize, bool)> {
        let requested = self.worker_threads?;
        let limit = available_cores.saturating_mul(4).max(1);
        Some((requested.min(limit), requested > limit))
    }
}

/// Password storage settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    /// bcrypt work factor.
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub app: AppInfo,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub admission: AdmissionConfig,
    pub shutdown: ShutdownConfig,
    pub mailer: MailerConfig,
    pub runtime: RuntimeConfig,
    pub auth: AuthConfig,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the resulting
    /// configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Variables that are unset or blank take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the resulting
    /// configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let app = AppInfo {
            name: env.string("APP_NAME").unwrap_or(defaults.app.name),
            environment: env.string("APP_ENV").unwrap_or(defaults.app.environment),
            version: env.string("APP_VERSION").unwrap_or(defaults.app.version),
        };

        let host = match env.string("HOST") {
            Some(value) => value.parse::<IpAddr>().map_err(|error| EnvParseError::InvalidAddress {
                name: "HOST".to_string(),
                message: error.to_string(),
                value,
            })?,
            None => defaults.http.address.ip(),
        };
        let port = env.narrow("PORT", defaults.http.address.port())?;
        let http = HttpConfig {
            address: SocketAddr::new(host, port),
            allowed_origins: env
                .string("HTTP_ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            request_timeout: env.millis("HTTP_REQUEST_TIMEOUT_MS", defaults.http.request_timeout)?,
        };
        if http.request_timeout.is_zero() {
            return Err(ConfigError::Zero("HTTP_REQUEST_TIMEOUT_MS"));
        }

        let mode = match env.string("STORAGE_MODE") {
            Some(value) => value.parse::<StorageMode>()?,
            None => StorageMode::default(),
        };
        let database = match env.string("DATABASE_URL") {
            Some(url) => Some(PoolSettings {
                url,
                max_connections: env.narrow("DB_MAX_CONNECTIONS", 25)?,
                max_idle_time: env.secs("DB_MAX_IDLE_TIME_SECS", Duration::from_secs(900))?,
                max_lifetime: env.secs("DB_MAX_LIFETIME_SECS", Duration::from_secs(5400))?,
                acquire_timeout: env.secs("DB_ACQUIRE_TIMEOUT_SECS", Duration::from_secs(5))?,
            }),
            None => None,
        };
        let storage = StorageConfig { mode, database };
        storage.validate()?;

        let admission = AdmissionConfig {
            enabled: env.bool("LIMITER_ENABLED", defaults.admission.enabled)?,
            rate: env.f64("LIMITER_RPS", defaults.admission.rate)?,
            burst: env.narrow("LIMITER_BURST", defaults.admission.burst)?,
            sweep_interval: env.secs(
                "LIMITER_SWEEP_INTERVAL_SECS",
                defaults.admission.sweep_interval,
            )?,
            idle_threshold: env.secs(
                "LIMITER_IDLE_THRESHOLD_SECS",
                defaults.admission.idle_threshold,
            )?,
        };
        admission.validate()?;

        let shutdown = ShutdownConfig {
            drain_timeout: env.secs(
                "SHUTDOWN_DRAIN_TIMEOUT_SECS",
                defaults.shutdown.drain_timeout,
            )?,
        };

        let mailer = MailerConfig {
            url: env.string("MAILER_URL"),
            sender: env.string("MAILER_SENDER").unwrap_or(defaults.mailer.sender),
            timeout: env.millis("MAILER_TIMEOUT_MS", defaults.mailer.timeout)?,
        };

        let runtime = RuntimeConfig {
            worker_threads: match env.optional_u64("WORKER_THREADS")? {
                Some(0) => return Err(ConfigError::Zero("WORKER_THREADS")),
                Some(threads) => Some(usize::try_from(threads).map_err(|error| {
                    EnvParseError::InvalidU64 {
                        name: "WORKER_THREADS".to_string(),
                        message: error.to_string(),
                        value: threads.to_string(),
                    }
                })?),
                None => None,
            },
        };

        let auth = AuthConfig {
            password_cost: env.narrow("PASSWORD_HASH_COST", defaults.auth.password_cost)?,
        };
        if !(MIN_PASSWORD_COST..=MAX_PASSWORD_COST).contains(&auth.password_cost) {
            return Err(ConfigError::PasswordCost(auth.password_cost));
        }

        let log_format = match env.string("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            app,
            http,
            storage,
            admission,
            shutdown,
            mailer,
            runtime,
            auth,
            log_format,
        })
    }
}

// =============================================================================
// Lookup helpers
// =============================================================================

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, `None` when unset or blank.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn optional_u64(&self, name: &str) -> Result<Option<u64>, EnvParseError> {
        self.string(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|error: std::num::ParseIntError| EnvParseError::InvalidU64 {
                        name: name.to_string(),
                        message: error.to_string(),
                        value,
                    })
            })
            .transpose()
    }

    fn u64(&self, name: &str, default: u64) -> Result<u64, EnvParseError> {
        Ok(self.optional_u64(name)?.unwrap_or(default))
    }

    /// Parses an unsigned value that must fit in `T`.
    fn narrow<T>(&self, name: &str, default: T) -> Result<T, EnvParseError>
    where
        T: TryFrom<u64> + Into<u64>,
        T::Error: Display,
    {
        let value = self.u64(name, default.into())?;
        T::try_from(value).map_err(|error| EnvParseError::InvalidU64 {
            name: name.to_string(),
            message: error.to_string(),
            value: value.to_string(),
        })
    }

    fn f64(&self, name: &str, default: f64) -> Result<f64, EnvParseError> {
        match self.string(name) {
            Some(value) => value
                .parse()
                .map_err(|error: std::num::ParseFloatError| EnvParseError::InvalidF64 {
                    name: name.to_string(),
                    message: error.to_string(),
                    value,
                }),
            None => Ok(default),
        }
    }

    fn bool(&self, name: &str, default: bool) -> Result<bool, EnvParseError> {
        match self.string(name) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(EnvParseError::InvalidBool {
                    name: name.to_string(),
                    value,
                }),
            },
            None => Ok(default),
        }
    }

    fn secs(&self, name: &str, default: Duration) -> Result<Duration, EnvParseError> {
        self.u64(name, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, name: &str, default: Duration) -> Result<Duration, EnvParseError> {
        let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.u64(name, default).map(Duration::from_millis)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[rstest]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.app.environment, "development");
        assert_eq!(config.http.address, SocketAddr::from(([0, 0, 0, 0], 4000)));
        assert!(config.http.allowed_origins.is_empty());
        assert_eq!(config.storage.mode, StorageMode::InMemory);
        assert!(config.storage.database.is_none());
        assert_eq!(config.admission, AdmissionConfig::default());
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(10));
        assert_eq!(config.mailer.url, None);
        assert_eq!(config.runtime.worker_threads, None);
        assert_eq!(config.auth.password_cost, 12);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[rstest]
    fn test_overrides() {
        let config = load(&[
            ("APP_ENV", "production"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("HTTP_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("STORAGE_MODE", "postgres"),
            ("DATABASE_URL", "postgres://greenlight@localhost/greenlight"),
            ("DB_MAX_CONNECTIONS", "10"),
            ("LIMITER_RPS", "5.5"),
            ("LIMITER_BURST", "11"),
            ("LIMITER_SWEEP_INTERVAL_SECS", "30"),
            ("LIMITER_IDLE_THRESHOLD_SECS", "90"),
            ("SHUTDOWN_DRAIN_TIMEOUT_SECS", "3"),
            ("MAILER_URL", "http://relay.local/send"),
            ("WORKER_THREADS", "6"),
            ("PASSWORD_HASH_COST", "10"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();

        assert_eq!(config.app.environment, "production");
        assert_eq!(config.http.address, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(
            config.http.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.storage.mode, StorageMode::Postgres);
        assert_eq!(config.storage.database.unwrap().max_connections, 10);
        assert!((config.admission.rate - 5.5).abs() < f64::EPSILON);
        assert_eq!(config.admission.burst, 11);
        assert_eq!(config.admission.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.admission.idle_threshold, Duration::from_secs(90));
        assert_eq!(config.shutdown.drain_timeout, Duration::from_secs(3));
        assert_eq!(config.mailer.url.as_deref(), Some("http://relay.local/send"));
        assert_eq!(config.runtime.worker_threads, Some(6));
        assert_eq!(config.auth.password_cost, 10);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case("LIMITER_RPS", "fast")]
    #[case("LIMITER_BURST", "-1")]
    #[case("PORT", "70000")]
    #[case("HOST", "localhost:80")]
    #[case("LIMITER_ENABLED", "maybe")]
    #[case("WORKER_THREADS", "many")]
    #[case("PASSWORD_HASH_COST", "-4")]
    fn test_malformed_values(#[case] name: &str, #[case] value: &str) {
        assert!(matches!(load(&[(name, value)]), Err(ConfigError::EnvParse(_))));
    }

    #[rstest]
    #[case("LIMITER_BURST", "4294967296")]
    #[case("LIMITER_BURST", "18446744073709551615")]
    #[case("DB_MAX_CONNECTIONS", "4294967296")]
    fn test_values_beyond_u32_are_rejected(#[case] name: &str, #[case] value: &str) {
        let result = load(&[
            ("DATABASE_URL", "postgres://greenlight@localhost/greenlight"),
            (name, value),
        ]);

        match result {
            Err(ConfigError::EnvParse(EnvParseError::InvalidU64 {
                name: reported,
                value: echoed,
                ..
            })) => {
                assert_eq!(reported, name);
                assert_eq!(echoed, value);
            }
            other => panic!("expected InvalidU64 for {name}, got {other:?}"),
        }
    }

    #[rstest]
    fn test_burst_at_u32_max_is_accepted() {
        let config = load(&[("LIMITER_ENABLED", "false"), ("LIMITER_BURST", "4294967295")]).unwrap();
        assert_eq!(config.admission.burst, u32::MAX);
    }

    #[rstest]
    fn test_zero_worker_threads_rejected() {
        assert!(matches!(
            load(&[("WORKER_THREADS", "0")]),
            Err(ConfigError::Zero("WORKER_THREADS"))
        ));
    }

    #[rstest]
    #[case(None, 8, None)]
    #[case(Some(4), 8, Some((4, false)))]
    #[case(Some(32), 8, Some((32, false)))]
    #[case(Some(33), 8, Some((32, true)))]
    #[case(Some(2), 0, Some((1, true)))]
    fn test_worker_threads_are_capped(
        #[case] requested: Option<usize>,
        #[case] cores: usize,
        #[case] expected: Option<(usize, bool)>,
    ) {
        let runtime = RuntimeConfig {
            worker_threads: requested,
        };
        assert_eq!(runtime.worker_threads_for(cores), expected);
    }

    #[rstest]
    #[case("3")]
    #[case("32")]
    fn test_password_cost_out_of_range(#[case] value: &str) {
        assert!(matches!(
            load(&[("PASSWORD_HASH_COST", value)]),
            Err(ConfigError::PasswordCost(_))
        ));
    }

    #[rstest]
    fn test_postgres_requires_database_url() {
        assert!(matches!(
            load(&[("STORAGE_MODE", "postgres")]),
            Err(ConfigError::Storage(ConfigurationError::MissingDatabaseUrl))
        ));
    }

    #[rstest]
    #[case(&[("LIMITER_RPS", "0")])]
    #[case(&[("LIMITER_BURST", "0")])]
    #[case(&[("LIMITER_SWEEP_INTERVAL_SECS", "0")])]
    #[case(&[("LIMITER_RPS", "0.01"), ("LIMITER_IDLE_THRESHOLD_SECS", "180")])]
    fn test_invalid_admission(#[case] vars: &[(&str, &str)]) {
        assert!(matches!(load(vars), Err(ConfigError::Admission(_))));
    }

    #[rstest]
    fn test_disabled_limiter_skips_validation() {
        let config = load(&[("LIMITER_ENABLED", "false"), ("LIMITER_RPS", "0")]).unwrap();
        assert!(!config.admission.enabled);
    }

    #[rstest]
    fn test_blank_values_use_defaults() {
        let config = load(&[("PORT", "  "), ("STORAGE_MODE", "")]).unwrap();
        assert_eq!(config.http.address.port(), 4000);
        assert_eq!(config.storage.mode, StorageMode::InMemory);
    }

    #[rstest]
    fn test_zero_request_timeout_rejected() {
        assert!(matches!(
            load(&[("HTTP_REQUEST_TIMEOUT_MS", "0")]),
            Err(ConfigError::Zero("HTTP_REQUEST_TIMEOUT_MS"))
        ));
    }
}
