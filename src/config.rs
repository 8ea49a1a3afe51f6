use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub recurrence: RecurrenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for /api/setup and /api/auth/login
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurrenceConfig {
    /// Upper bound on candidate dates visited while expanding one series.
    pub expansion_max_steps: usize,
    /// How many days the streak walk looks back.
    pub streak_lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

/// Shortest accepted JWT signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let secret =
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "JWT_SECRET (must be at least {} bytes)",
                MIN_JWT_SECRET_LEN
            )));
        }

        let bcrypt_cost: u32 = env::var("BCRYPT_COST")
            .unwrap_or_else(|_| "12".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("BCRYPT_COST".to_string()))?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue(
                "BCRYPT_COST (must be between 4 and 31)".to_string(),
            ));
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/life.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            security: SecurityConfig { bcrypt_cost },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            recurrence: RecurrenceConfig {
                expansion_max_steps: env::var("EXPANSION_MAX_STEPS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .unwrap_or(1000),
                streak_lookback_days: env::var("STREAK_LOOKBACK_DAYS")
                    .unwrap_or_else(|_| "365".to_string())
                    .parse()
                    .unwrap_or(365),
            },
            logging: LoggingConfig {
                json: matches!(
                    env::var("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref(),
                    Ok("json")
                ),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/life.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            security: SecurityConfig { bcrypt_cost: 12 },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            recurrence: RecurrenceConfig {
                expansion_max_steps: 1000,
                streak_lookback_days: 365,
            },
            logging: LoggingConfig { json: false },
        }
    }
}
