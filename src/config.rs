use chrono::Duration;
use log::LevelFilter;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::auth::AttemptPolicy;

const DEFAULT_TOKEN_VALIDITY_SECS: i64 = 5 * 24 * 60 * 60;
const MAX_TOKEN_VALIDITY_SECS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_PUBLIC_URLS: &str = "/user/login,/user/register,/user/image/**";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// 令牌签发相关配置，启动后只读
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub validity: Duration,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtSettings,
    pub public_base_url: String,
    pub public_urls: Vec<String>,
    pub user_image_root: PathBuf,
    pub bcrypt_cost: u32,
    pub login_attempts: AttemptPolicy,
    pub log_file: Option<PathBuf>,
    pub log_level: LevelFilter,
}

impl AppConfig {
    /// 从环境变量读取配置（调用方负责先加载 .env）
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = required("JWT_SECRET")?;
        if secret.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                value: "<empty>".to_string(),
            });
        }

        let bcrypt_cost = parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let defaults = AttemptPolicy::default();
        let login_attempts = AttemptPolicy {
            max_attempts: at_least_one("LOGIN_MAX_ATTEMPTS", defaults.max_attempts)?,
            ttl: std::time::Duration::from_secs(at_least_one(
                "LOGIN_ATTEMPT_TTL_SECS",
                defaults.ttl.as_secs(),
            )?),
            capacity: at_least_one("LOGIN_ATTEMPT_CAPACITY", defaults.capacity)?,
        };

        let public_urls = optional("PUBLIC_URLS")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URLS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("SERVER_PORT", 8080)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            jwt: JwtSettings {
                secret,
                validity: token_validity()?,
                issuer: optional("JWT_ISSUER").unwrap_or_else(|| "Get Arrays, LLC".to_string()),
                audience: optional("JWT_AUDIENCE")
                    .unwrap_or_else(|| "User Management Portal".to_string()),
            },
            public_base_url: optional("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            public_urls,
            user_image_root: optional("USER_IMAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/user")),
            bcrypt_cost,
            login_attempts,
            log_file: optional("LOG_FILE").map(PathBuf::from),
            log_level: parsed("LOG_LEVEL", LevelFilter::Debug)?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// 令牌有效期必须为正，且不超过一年
fn token_validity() -> Result<Duration, ConfigError> {
    let secs = parsed("JWT_VALIDITY_SECS", DEFAULT_TOKEN_VALIDITY_SECS)?;
    if !(1..=MAX_TOKEN_VALIDITY_SECS).contains(&secs) {
        return Err(ConfigError::Invalid {
            key: "JWT_VALIDITY_SECS",
            value: secs.to_string(),
        });
    }
    Ok(Duration::seconds(secs))
}

fn at_least_one<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8> + ToString,
{
    let value = parsed(key, default)?;
    if value < T::from(1) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}
