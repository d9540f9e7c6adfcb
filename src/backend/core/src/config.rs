//! Configuration management.
//!
//! Sources, later ones overriding earlier ones:
//! 1. serde defaults per section
//! 2. an optional config file (TOML, YAML or JSON by extension)
//! 3. `COVENANT__<SECTION>__<KEY>` environment variables

use serde::Deserialize;
use std::time::Duration;

use crate::middleware::auth::AuthSettings;
use crate::rbac::guard::GuardSettings;

const ENV_PREFIX: &str = "COVENANT";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Access guard configuration
    #[serde(default)]
    pub guard: GuardSettings,

    /// Token authentication
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply embedded migrations at startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Service name reported to the collector
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_run_migrations() -> bool { true }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_service_name() -> String { "covenant-gateway".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from environment variables only.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(environment())
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::policy::{AuditFailureMode, UndeclaredPolicy};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://localhost/covenant"
            "#,
        );

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.guard.rate_limit.requests_per_window, 100);
        assert_eq!(config.guard.rate_limit.window_secs, 60);
        assert_eq!(config.guard.store_timeout, Duration::from_secs(5));
        assert_eq!(config.guard.undeclared, UndeclaredPolicy::Deny);
        assert_eq!(config.guard.audit_failure, AuditFailureMode::FailClosed);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_guard_section_overrides() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://localhost/covenant"
            acquire_timeout = "10s"

            [guard]
            undeclared = "allow"
            audit_failure = "log_and_continue"
            store_timeout = "250ms"

            [guard.rate_limit]
            requests_per_window = 5
            window_secs = 10

            [auth]
            jwt_secret = "s3cret"
            issuer = "covenant"
            "#,
        );

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.database.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.guard.undeclared, UndeclaredPolicy::Allow);
        assert_eq!(config.guard.audit_failure, AuditFailureMode::LogAndContinue);
        assert_eq!(config.guard.store_timeout, Duration::from_millis(250));
        assert_eq!(config.guard.rate_limit.requests_per_window, 5);
        assert!(config.guard.rate_limit.enabled);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.issuer.as_deref(), Some("covenant"));
    }

    #[test]
    fn test_missing_database_url_fails() {
        let file = write_config("[server]\nport = 9000\n");
        assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
    }
}
