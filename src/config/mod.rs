use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL used in mailed links; falls back to the request Host header.
    pub public_url: Option<String>,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_expires_in: Duration,
    pub jwt_cookie_expires_in_days: i64,
    pub password_reset_ttl_minutes: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_limit: u64,
    /// Unset means requested limits are honoured as-is.
    pub max_limit: Option<u64>,
    /// Parameters allowed to repeat in a query string.
    pub whitelist: Vec<String>,
}

const DEV_JWT_SECRET: &str = "natours-development-secret-do-not-use-in-production";

/// Work factors the bcrypt algorithm defines.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV").or_else(|_| env::var("NODE_ENV")).as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let config = match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()?;

        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Ok(v) = env::var("PUBLIC_URL") {
            self.server.public_url = Some(v.trim_end_matches('/').to_string());
        }
        if let Ok(v) = env::var("MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = parse_var("MAX_REQUEST_SIZE_BYTES", &v)?;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = parse_var("DATABASE_CONNECTION_TIMEOUT", &v)?;
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRES_IN") {
            self.security.jwt_expires_in = parse_duration(&v).ok_or(ConfigError::Invalid {
                key: "JWT_EXPIRES_IN",
                value: v.clone(),
            })?;
        }
        if let Ok(v) = env::var("JWT_COOKIE_EXPIRES_IN") {
            self.security.jwt_cookie_expires_in_days = parse_var("JWT_COOKIE_EXPIRES_IN", &v)?;
        }
        if let Ok(v) = env::var("PASSWORD_RESET_TTL_MINUTES") {
            self.security.password_reset_ttl_minutes = parse_var("PASSWORD_RESET_TTL_MINUTES", &v)?;
        }
        if let Ok(v) = env::var("BCRYPT_COST") {
            self.security.bcrypt_cost = parse_var("BCRYPT_COST", &v)?;
        }

        // Query overrides
        if let Ok(v) = env::var("QUERY_DEFAULT_LIMIT") {
            self.query.default_limit = parse_var("QUERY_DEFAULT_LIMIT", &v)?;
        }
        if let Ok(v) = env::var("QUERY_MAX_LIMIT") {
            self.query.max_limit = Some(parse_var("QUERY_MAX_LIMIT", &v)?);
        }
        if let Ok(v) = env::var("QUERY_WHITELIST") {
            self.query.whitelist = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.is_production() && self.security.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: self.security.bcrypt_cost.to_string(),
            });
        }
        if self.query.default_limit == 0 {
            return Err(ConfigError::Invalid { key: "QUERY_DEFAULT_LIMIT", value: "0".to_string() });
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                public_url: None,
                max_request_size_bytes: 10 * 1024, // 10kb
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_expires_in: Duration::from_secs(90 * 24 * 60 * 60),
                jwt_cookie_expires_in_days: 90,
                password_reset_ttl_minutes: 10,
                bcrypt_cost: 12,
            },
            query: QueryConfig::default(),
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                public_url: None,
                max_request_size_bytes: 10 * 1024,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expires_in: Duration::from_secs(90 * 24 * 60 * 60),
                jwt_cookie_expires_in_days: 90,
                password_reset_ttl_minutes: 10,
                bcrypt_cost: 12,
            },
            query: QueryConfig::default(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: None,
            whitelist: [
                "duration",
                "ratingsQuantity",
                "ratingsAverage",
                "maxGroupSize",
                "difficulty",
                "price",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Parses durations written as `90d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    let seconds = match unit.trim() {
        "" | "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(60 * 60)?,
        "d" => amount.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}
