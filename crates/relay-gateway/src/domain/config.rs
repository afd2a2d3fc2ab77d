//! Gateway configuration, loaded from the environment and validated before
//! the service is allowed to bind.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub auth: AuthConfig,
    pub server: ServerConfig,
    /// RocksDB path (or `rocksdb://`-prefixed path) backing the store.
    pub database_url: String,
}

/// Authenticator tuning, per the nonce-challenge / bearer-token protocol.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub challenge_secret_key: String,
    pub bearer_secret_key: String,
    pub nonce_len: usize,
    pub challenge_ttl: Duration,
    pub bearer_ttl: Duration,
}

/// HTTP/WS server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tls_enabled: bool,
    /// Used only when `tls_enabled` is false.
    pub bind_addr: SocketAddr,
    /// Host TLS certificates are acquired for, when `tls_enabled` is true.
    pub tls_host: Option<String>,
    pub shutdown_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tls_enabled: true,
            bind_addr: "127.0.0.1:8080".parse().expect("valid default bind addr"),
            tls_host: None,
            shutdown_grace_period: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment, per §6:
    /// `AUTH_CHALLENGE_SECRET_KEY`, `AUTH_TOKEN_SECRET_KEY`, `DATABASE_URL`,
    /// `TLS` (default true), `BIND_ADDR` (default `127.0.0.1:8080`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let challenge_secret_key = required_env("AUTH_CHALLENGE_SECRET_KEY")?;
        let bearer_secret_key = required_env("AUTH_TOKEN_SECRET_KEY")?;
        let database_url = required_env("DATABASE_URL")?;

        let tls_enabled = match env::var("TLS") {
            Ok(v) => parse_bool(&v).ok_or_else(|| ConfigError::Invalid(format!("TLS: not a boolean: {v}")))?,
            Err(_) => true,
        };

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("BIND_ADDR: invalid socket address: {v}")))?,
            Err(_) => ServerConfig::default().bind_addr,
        };

        let config = Self {
            auth: AuthConfig {
                challenge_secret_key,
                bearer_secret_key,
                nonce_len: 64,
                challenge_ttl: Duration::from_secs(5 * 60),
                bearer_ttl: Duration::from_secs(60 * 60),
            },
            server: ServerConfig {
                tls_enabled,
                bind_addr,
                tls_host: env::var("TLS_HOST").ok(),
                ..ServerConfig::default()
            },
            database_url,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.challenge_secret_key.is_empty() {
            return Err(ConfigError::Invalid("AUTH_CHALLENGE_SECRET_KEY must not be empty".into()));
        }
        if self.auth.bearer_secret_key.is_empty() {
            return Err(ConfigError::Invalid("AUTH_TOKEN_SECRET_KEY must not be empty".into()));
        }
        if self.auth.challenge_secret_key == self.auth.bearer_secret_key {
            return Err(ConfigError::Invalid(
                "challenge and bearer secrets must differ".into(),
            ));
        }
        if self.auth.nonce_len == 0 {
            return Err(ConfigError::InvalidLimit("nonce_len cannot be 0".into()));
        }
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid("DATABASE_URL must not be empty".into()));
        }
        if self.server.tls_enabled && self.server.tls_host.is_none() {
            return Err(ConfigError::Invalid(
                "TLS_HOST is required when TLS is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors, surfaced as a fatal non-zero exit per §6.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "AUTH_CHALLENGE_SECRET_KEY",
            "AUTH_TOKEN_SECRET_KEY",
            "DATABASE_URL",
            "TLS",
            "TLS_HOST",
            "BIND_ADDR",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_var_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = RelayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(v) if v == "AUTH_CHALLENGE_SECRET_KEY"));
    }

    #[test]
    fn tls_disabled_does_not_require_host() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("AUTH_CHALLENGE_SECRET_KEY", "challenge-secret");
        env::set_var("AUTH_TOKEN_SECRET_KEY", "bearer-secret");
        env::set_var("DATABASE_URL", "/tmp/relay-data");
        env::set_var("TLS", "false");
        let config = RelayConfig::from_env().unwrap();
        assert!(!config.server.tls_enabled);
        assert_eq!(config.server.bind_addr.port(), 8080);
        clear_env();
    }

    #[test]
    fn identical_secrets_are_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("AUTH_CHALLENGE_SECRET_KEY", "same");
        env::set_var("AUTH_TOKEN_SECRET_KEY", "same");
        env::set_var("DATABASE_URL", "/tmp/relay-data");
        env::set_var("TLS", "false");
        let err = RelayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        clear_env();
    }
}
