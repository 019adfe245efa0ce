use std::{env, str::FromStr};

use thiserror::Error;

/// Local-only fallback secrets. Production refuses to start without real ones.
const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const LOCAL_JWT_REFRESH_SECRET: &str = "super-secure-refresh-secret-value-local";

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// immutable afterwards, it is pulled into handlers and extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the dev bypass and fallback services.
    pub env: Env,
    // Postgres connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,

    // Token signing and lifetimes.
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub password_reset_ttl_secs: i64,

    // Unverified account sweep.
    pub unverified_user_ttl_hours: i64,
    pub cleanup_interval_secs: u64,

    // Sales and receipts.
    pub tax_rate_bps: i64,
    pub business: BusinessInfo,

    // Used to build links inside outgoing emails.
    pub frontend_url: String,
    pub mail: MailConfig,
    pub s3: S3Config,

    // Optional first administrator, created at boot when no admin exists.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Env
///
/// Defines the runtime context, used to switch between development conveniences
/// (header bypass, in-memory store, log mailer) and production infrastructure.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Business identity printed on every receipt.
#[derive(Clone, Debug)]
pub struct BusinessInfo {
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub phone: String,
}

/// Outgoing mail API. When `api_url` is `None` messages are only logged.
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

/// S3-compatible storage used for product images (MinIO locally).
#[derive(Clone, Debug)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Upper bound for every configured lifetime or interval: ten years.
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 3600;

/// ConfigError
///
/// Raised by `AppConfig::load` when the environment is incomplete or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingVar(&'static str),
    #[error("{var} has an invalid value: {value}")]
    InvalidVar { var: &'static str, value: String },
}

impl Default for BusinessInfo {
    fn default() -> Self {
        Self {
            name: "Tecnicentro JR".to_string(),
            tax_id: "NIT 900.000.000-0".to_string(),
            address: "Calle 10 # 20-30".to_string(),
            phone: "+57 300 000 0000".to_string(),
        }
    }
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a safe, non-panicking AppConfig instance used for test setup, so tests
    /// can build an `AppState` without touching process environment variables.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            db_max_connections: 5,
            bind_addr: "0.0.0.0:3000".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_refresh_secret: LOCAL_JWT_REFRESH_SECRET.to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
            password_reset_ttl_secs: 3600,
            unverified_user_ttl_hours: 24,
            cleanup_interval_secs: 3600,
            tax_rate_bps: 1900,
            business: BusinessInfo::default(),
            frontend_url: "http://localhost:5173".to_string(),
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@tecnicentrojr.local".to_string(),
            },
            s3: S3Config {
                endpoint: "http://localhost:9000".to_string(),
                region: "us-east-1".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password".to_string(),
                bucket: "tecnicentro-test".to_string(),
            },
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables. Local runs fall back to
    /// development defaults; production requires its secrets explicitly.
    ///
    /// # Errors
    /// Returns `ConfigError` if a variable required for the current environment is
    /// missing or a numeric variable cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let db_url = match env {
            Env::Production => Some(required("DATABASE_URL")?),
            Env::Local => optional("DATABASE_URL"),
        };

        let (jwt_secret, jwt_refresh_secret) = match env {
            Env::Production => (required("JWT_SECRET")?, required("JWT_REFRESH_SECRET")?),
            Env::Local => (
                optional("JWT_SECRET").unwrap_or(defaults.jwt_secret),
                optional("JWT_REFRESH_SECRET").unwrap_or(defaults.jwt_refresh_secret),
            ),
        };

        let mail = match env {
            Env::Production => MailConfig {
                api_url: Some(required("MAIL_API_URL")?),
                api_key: Some(required("MAIL_API_KEY")?),
                from: required("MAIL_FROM")?,
            },
            Env::Local => MailConfig {
                api_url: optional("MAIL_API_URL"),
                api_key: optional("MAIL_API_KEY"),
                from: optional("MAIL_FROM").unwrap_or(defaults.mail.from),
            },
        };

        let s3 = match env {
            Env::Production => S3Config {
                endpoint: required("S3_ENDPOINT")?,
                region: optional("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
                bucket: optional("S3_BUCKET_NAME").unwrap_or_else(|| "tecnicentro-uploads".to_string()),
            },
            // Local storage (MinIO) uses the docker-compose credentials.
            Env::Local => S3Config {
                bucket: "tecnicentro-uploads".to_string(),
                ..defaults.s3
            },
        };

        let bootstrap_admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        let business = BusinessInfo {
            name: optional("BUSINESS_NAME").unwrap_or(defaults.business.name),
            tax_id: optional("BUSINESS_TAX_ID").unwrap_or(defaults.business.tax_id),
            address: optional("BUSINESS_ADDRESS").unwrap_or(defaults.business.address),
            phone: optional("BUSINESS_PHONE").unwrap_or(defaults.business.phone),
        };

        Ok(Self {
            env,
            db_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            bind_addr: optional("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl_secs: bounded("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl_secs, 1, MAX_TTL_SECS)?,
            refresh_token_ttl_secs: bounded(
                "REFRESH_TOKEN_TTL_SECS",
                defaults.refresh_token_ttl_secs,
                1,
                MAX_TTL_SECS,
            )?,
            password_reset_ttl_secs: bounded(
                "PASSWORD_RESET_TTL_SECS",
                defaults.password_reset_ttl_secs,
                1,
                MAX_TTL_SECS,
            )?,
            unverified_user_ttl_hours: bounded(
                "UNVERIFIED_USER_TTL_HOURS",
                defaults.unverified_user_ttl_hours,
                1,
                MAX_TTL_SECS / 3600,
            )?,
            cleanup_interval_secs: bounded(
                "CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
                1,
                MAX_TTL_SECS as u64,
            )?,
            tax_rate_bps: bounded("TAX_RATE_BPS", defaults.tax_rate_bps, 0, 10_000)?,
            business,
            frontend_url: optional("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            mail,
            s3,
            bootstrap_admin,
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::MissingVar(var))
}

fn parsed<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
        None => Ok(default),
    }
}

// Durations feed chrono, which panics outside its range; rates are capped at 100%.
fn bounded<T>(var: &'static str, default: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
{
    let value = parsed(var, default)?;
    if value < min || value > max {
        return Err(ConfigError::InvalidVar {
            var,
            value: value.to_string(),
        });
    }
    Ok(value)
}
