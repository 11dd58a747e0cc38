use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::approval::{DecisionPolicy, Fee, PipelineConfig, RetryPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: load_pipeline()?,
        })
    }
}

fn load_pipeline() -> Result<PipelineConfig, ConfigError> {
    let defaults = PipelineConfig::default();

    let threshold = parse_var("PLAN_SCORE_THRESHOLD", defaults.decision.score_threshold)?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::InvalidThreshold);
    }

    let amount_minor = parse_var("PLAN_APPROVAL_FEE", defaults.fee.amount_minor)?;
    let currency = env::var("PLAN_FEE_CURRENCY")
        .map(|value| value.trim().to_ascii_uppercase())
        .unwrap_or_else(|_| defaults.fee.currency.clone());
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfigError::InvalidCurrency { value: currency });
    }

    let verification_host =
        env::var("PLAN_VERIFY_HOST").unwrap_or_else(|_| defaults.verification_host.clone());
    if verification_host.trim().is_empty() {
        return Err(ConfigError::MissingVerifyHost);
    }

    let max_attempts = parse_var("PLAN_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?;
    if max_attempts == 0 {
        return Err(ConfigError::InvalidNumber {
            key: "PLAN_RETRY_MAX_ATTEMPTS",
        });
    }
    let backoff_ms = parse_var(
        "PLAN_RETRY_BACKOFF_MS",
        millis(defaults.retry.initial_backoff),
    )?;
    let timeout_ms = parse_var(
        "PLAN_CALL_TIMEOUT_MS",
        millis(defaults.retry.call_timeout),
    )?;
    let allow_revisions = parse_flag("PLAN_ALLOW_REVISIONS", defaults.allow_revisions)?;

    Ok(PipelineConfig {
        decision: DecisionPolicy {
            score_threshold: threshold,
            ..defaults.decision
        },
        retry: RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(backoff_ms),
            call_timeout: Duration::from_millis(timeout_ms),
            ..defaults.retry
        },
        fee: Fee {
            amount_minor,
            currency,
        },
        verification_host,
        allow_revisions,
        ..defaults
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidThreshold,
    InvalidNumber { key: &'static str },
    InvalidFlag { key: &'static str },
    InvalidCurrency { value: String },
    MissingVerifyHost,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidThreshold => {
                write!(f, "PLAN_SCORE_THRESHOLD must be a number between 0 and 1")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a positive integer"),
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
            ConfigError::InvalidCurrency { value } => {
                write!(f, "PLAN_FEE_CURRENCY '{value}' is not a three-letter code")
            }
            ConfigError::MissingVerifyHost => write!(f, "PLAN_VERIFY_HOST must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const KEYS: &[&str] = &[
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "PLAN_SCORE_THRESHOLD",
        "PLAN_APPROVAL_FEE",
        "PLAN_FEE_CURRENCY",
        "PLAN_VERIFY_HOST",
        "PLAN_RETRY_MAX_ATTEMPTS",
        "PLAN_RETRY_BACKOFF_MS",
        "PLAN_CALL_TIMEOUT_MS",
        "PLAN_ALLOW_REVISIONS",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().unwrap_or_else(|err| err.into_inner());
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().unwrap_or_else(|err| err.into_inner());
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn pipeline_overrides_are_applied() {
        let _lock = env_guard().lock().unwrap_or_else(|err| err.into_inner());
        reset_env();
        env::set_var("PLAN_SCORE_THRESHOLD", "0.6");
        env::set_var("PLAN_APPROVAL_FEE", "125000");
        env::set_var("PLAN_FEE_CURRENCY", "ugx");
        env::set_var("PLAN_VERIFY_HOST", "plans.nairobi.go.ke");
        env::set_var("PLAN_RETRY_MAX_ATTEMPTS", "5");
        env::set_var("PLAN_CALL_TIMEOUT_MS", "750");
        env::set_var("PLAN_ALLOW_REVISIONS", "off");

        let pipeline = AppConfig::load().expect("config loads").pipeline;
        reset_env();

        assert_eq!(pipeline.decision.score_threshold, 0.6);
        assert_eq!(pipeline.fee.amount_minor, 125_000);
        assert_eq!(pipeline.fee.currency, "UGX");
        assert_eq!(pipeline.verification_host, "plans.nairobi.go.ke");
        assert_eq!(pipeline.retry.max_attempts, 5);
        assert_eq!(pipeline.retry.call_timeout, Duration::from_millis(750));
        assert!(!pipeline.allow_revisions);
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let _lock = env_guard().lock().unwrap_or_else(|err| err.into_inner());
        reset_env();
        env::set_var("PLAN_SCORE_THRESHOLD", "1.5");
        let result = AppConfig::load();
        reset_env();
        assert!(matches!(result, Err(ConfigError::InvalidThreshold)));
    }

    #[test]
    fn malformed_numbers_name_their_key() {
        let _lock = env_guard().lock().unwrap_or_else(|err| err.into_inner());
        reset_env();
        env::set_var("PLAN_RETRY_BACKOFF_MS", "soon");
        let result = AppConfig::load();
        reset_env();
        match result {
            Err(ConfigError::InvalidNumber { key }) => assert_eq!(key, "PLAN_RETRY_BACKOFF_MS"),
            other => panic!("expected invalid number, got {other:?}"),
        }
    }

    #[test]
    fn oversized_durations_saturate_to_u64_millis() {
        assert_eq!(millis(Duration::from_millis(200)), 200);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
