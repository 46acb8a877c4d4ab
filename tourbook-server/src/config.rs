//! Runtime configuration read from the environment
//!
//! `config.env` and `.env` are loaded first (variables already set in the
//! process win), then [`AppConfig::from_env`] reads the values below.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::db::PoolConfig;
use crate::http::rate_limit::RateLimitConfig;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_JWT_DAYS: i64 = 30;
const DEFAULT_EMAIL_FROM: &str = "tourbook <noreply@tourbook.local>";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Deployment mode. Development relaxes the cookie `Secure` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

/// SMTP relay settings. Absent when `EMAIL_HOST` is unset.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    /// Token and cookie lifetime in days
    pub jwt_expires_in_days: i64,
    pub smtp: Option<SmtpConfig>,
    pub email_from: String,
    pub public_base_url: String,
    pub data_folder: PathBuf,
    pub public_dir: PathBuf,
    pub rate_limit: RateLimitConfig,
    pub pool: PoolConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expires_in_days", &self.jwt_expires_in_days)
            .field("smtp", &self.smtp)
            .field("email_from", &self.email_from)
            .field("public_base_url", &self.public_base_url)
            .field("data_folder", &self.data_folder)
            .field("public_dir", &self.public_dir)
            .field("rate_limit", &self.rate_limit)
            .field("pool", &self.pool)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the process environment
    /// in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("ENVIRONMENT")
            .map(|v| Environment::parse(&v))
            .unwrap_or_default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = get("DATABASE_URL")
            .or_else(|| get("DATABASE_CONNECTION_STRING"))
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expires_in_days = parse_or("JWT_COOKIE_EXPIRES_IN", get("JWT_COOKIE_EXPIRES_IN"), DEFAULT_JWT_DAYS)?;
        if jwt_expires_in_days <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_COOKIE_EXPIRES_IN",
                value: jwt_expires_in_days.to_string(),
            });
        }

        let smtp = match get("EMAIL_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("EMAIL_PORT", get("EMAIL_PORT"), 587)?,
                username: get("EMAIL_USERNAME").unwrap_or_default(),
                password: get("EMAIL_PASSWORD").unwrap_or_default(),
            }),
            None => None,
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: parse_or("RATE_LIMIT_MAX", get("RATE_LIMIT_MAX"), defaults.max_requests)?,
            window_secs: parse_or(
                "RATE_LIMIT_WINDOW_SECS",
                get("RATE_LIMIT_WINDOW_SECS"),
                defaults.window_secs,
            )?,
        };

        let pool_defaults = PoolConfig::default();
        let max_connections = parse_or(
            "DB_MAX_CONNECTIONS",
            get("DB_MAX_CONNECTIONS"),
            pool_defaults.max_connections,
        )?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS",
                value: max_connections.to_string(),
            });
        }
        let pool = PoolConfig {
            max_connections,
            acquire_timeout: parse_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                get("DB_ACQUIRE_TIMEOUT_SECS"),
                pool_defaults.acquire_timeout.as_secs(),
            )
            .map(std::time::Duration::from_secs)?,
        };

        Ok(Self {
            environment,
            bind_addr,
            database_url,
            jwt_secret,
            jwt_expires_in_days,
            smtp,
            email_from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_owned()),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_owned(),
            data_folder: get("DATA_FOLDER")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("dev-data/data")),
            public_dir: get("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            rate_limit,
            pool,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Load `config.env` and `.env` from the working directory.
///
/// dotenvy never overwrites variables that are already set, so the process
/// environment keeps priority over both files.
pub fn load_dotenv() {
    let mut loaded_from = Vec::new();

    for file in ["config.env", ".env"] {
        match dotenvy::from_filename(file) {
            Ok(path) => loaded_from.push(path.display().to_string()),
            Err(e) if e.not_found() => {}
            Err(e) => debug!("Failed to load {}: {}", file, e),
        }
    }

    if loaded_from.is_empty() {
        debug!("No config.env or .env found, using the process environment only");
    } else {
        info!("Loaded configuration from: {}", loaded_from.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/tourbook"),
        ("JWT_SECRET", "my-ultra-secure-and-ultra-long-secret"),
    ];

    #[test]
    fn defaults() {
        let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.jwt_expires_in_days, 30);
        assert!(config.smtp.is_none());
        assert_eq!(config.public_base_url, "http://localhost:8080");
        assert_eq!(config.data_folder, PathBuf::from("dev-data/data"));
        assert_eq!(config.rate_limit.max_requests, 1000);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.pool, PoolConfig::default());
    }

    #[test]
    fn pool_sizing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("DB_MAX_CONNECTIONS", "25"), ("DB_ACQUIRE_TIMEOUT_SECS", "2")]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.pool.max_connections, 25);
        assert_eq!(config.pool.acquire_timeout, std::time::Duration::from_secs(2));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DB_MAX_CONNECTIONS", "0"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DB_MAX_CONNECTIONS", .. }));
    }

    #[test]
    fn missing_secret() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn connection_string_alias() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_CONNECTION_STRING", "postgres://alias"),
            ("JWT_SECRET", "s"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://alias");
    }

    #[test]
    fn overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("ENVIRONMENT", "development"),
            ("PORT", "3000"),
            ("JWT_COOKIE_EXPIRES_IN", "7"),
            ("EMAIL_HOST", "smtp.mailtrap.io"),
            ("EMAIL_PORT", "2525"),
            ("EMAIL_PASSWORD", "hunter2"),
            ("PUBLIC_BASE_URL", "https://tours.example.com/"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.environment.is_development());
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.jwt_expires_in_days, 7);
        assert_eq!(config.smtp.as_ref().map(|s| s.port), Some(2525));
        assert_eq!(config.public_base_url, "https://tours.example.com");
    }

    #[test]
    fn invalid_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PORT", "eighty"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("EMAIL_HOST", "smtp.example.com"), ("EMAIL_PASSWORD", "hunter2")]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("my-ultra-secure"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("postgres://localhost"));
    }
}
