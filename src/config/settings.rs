//! Application settings and configuration
//!
//! `Configuration` is resolved once from environment variables and then
//! shared read-only (`Arc<Configuration>`) by every client. Required
//! variables fail fast with a `ConfigError` naming the variable; everything
//! else falls back to the lakehouse defaults.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::services::traits::Backend;

/// A credential that never shows up in logs or `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for handing to a driver.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err("expected development, staging or production".to_string()),
        }
    }
}

/// Trino coordinator settings
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub catalog: String,
    pub schema: String,
    pub secure: bool,
    /// Upper bound for a single HTTP round trip to the coordinator
    pub request_timeout: Duration,
}

impl QuerySettings {
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// PostgreSQL settings
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Secret,
}

impl DatabaseSettings {
    /// Connection string without the password, for display.
    pub fn display_url(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Redis settings
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<Secret>,
}

/// MinIO / S3 settings
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreSettings {
    pub endpoint: Url,
    pub access_key: String,
    pub secret_key: Secret,
    pub bucket: String,
    pub region: String,
    pub secure: bool,
}

/// SMTP settings for pipeline alert mails
#[derive(Debug, Clone, PartialEq)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: Option<Secret>,
    pub from: String,
    /// Comma-separated, as given in `EMAIL_RECIPIENTS`
    pub recipients: String,
}

impl EmailSettings {
    /// Recipient addresses with blanks dropped.
    pub fn recipients_list(&self) -> Vec<&str> {
        self.recipients
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect()
    }
}

/// Feature flags consumed by pipeline code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub send_email_alerts: bool,
    pub enable_data_validation: bool,
    pub dry_run_mode: bool,
    pub auto_create_tables: bool,
    pub enable_cache: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            send_email_alerts: false,
            enable_data_validation: true,
            dry_run_mode: false,
            auto_create_tables: true,
            enable_cache: true,
        }
    }
}

/// Batch processing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingSettings {
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout: Duration,
    pub parallel_workers: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_retries: 3,
            timeout: Duration::from_secs(300),
            parallel_workers: 4,
        }
    }
}

/// Bounded retry applied by clients when a connect attempt fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff: Duration,
    /// Growth factor applied to the delay for each further retry
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Fail on the first connect error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let nanos = self.backoff.as_nanos() as f64 * factor;
        Duration::from_nanos(nanos.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

/// All settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub app_name: String,
    pub environment: Environment,
    pub log_level: String,

    pub query: QuerySettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub object_store: ObjectStoreSettings,
    pub email: EmailSettings,

    pub flags: FeatureFlags,
    pub processing: ProcessingSettings,

    /// Timeout for establishing a backend connection
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Configuration {
    /// Resolve settings from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let processing = ProcessingSettings {
            batch_size: env.positive("BATCH_SIZE", 1000)?,
            max_retries: env.parse_or("MAX_RETRIES", 3)?,
            timeout: Duration::from_secs(env.positive("TIMEOUT_SECONDS", 300)?),
            parallel_workers: env.positive("PARALLEL_WORKERS", 4)?,
        };

        let query = QuerySettings {
            host: env.required("TRINO_HOST")?,
            port: env.port("TRINO_PORT", 8080)?,
            user: env.string_or("TRINO_USER", "default"),
            catalog: env.string_or("TRINO_CATALOG", "iceberg"),
            schema: env.string_or("TRINO_SCHEMA", "default"),
            secure: env.flag_or("TRINO_SECURE", false)?,
            request_timeout: processing.timeout,
        };

        let database = DatabaseSettings {
            host: env.required("POSTGRES_HOST")?,
            port: env.port("POSTGRES_PORT", 5433)?,
            database: env.string_or("POSTGRES_DB", "metastore"),
            user: env.required("POSTGRES_USER")?,
            password: Secret::new(env.required("POSTGRES_PASSWORD")?),
        };

        let cache = CacheSettings {
            host: env.required("REDIS_HOST")?,
            port: env.port("REDIS_PORT", 6379)?,
            db: env.parse_or("REDIS_DB", 0)?,
            password: env.get("REDIS_PASSWORD").map(Secret::new),
        };

        let minio_secure = env.flag_or("MINIO_SECURE", false)?;
        let object_store = ObjectStoreSettings {
            endpoint: parse_endpoint(
                "MINIO_ENDPOINT",
                &env.required("MINIO_ENDPOINT")?,
                minio_secure,
            )?,
            access_key: env.required("MINIO_ACCESS_KEY")?,
            secret_key: Secret::new(env.required("MINIO_SECRET_KEY")?),
            bucket: env.string_or("MINIO_BUCKET", "warehouse"),
            region: env.string_or("MINIO_REGION", "us-east-1"),
            secure: minio_secure,
        };

        let email = EmailSettings {
            smtp_host: env.string_or("EMAIL_SMTP_HOST", "smtp.gmail.com"),
            smtp_port: env.port("EMAIL_SMTP_PORT", 587)?,
            username: env.string_or("EMAIL_USERNAME", ""),
            password: env.get("EMAIL_PASSWORD").map(Secret::new),
            from: env.string_or("EMAIL_FROM", "noreply@company.com"),
            recipients: env.string_or("EMAIL_RECIPIENTS", ""),
        };

        let flags = FeatureFlags {
            send_email_alerts: env.flag_or("SEND_EMAIL_ALERTS", false)?,
            enable_data_validation: env.flag_or("ENABLE_DATA_VALIDATION", true)?,
            dry_run_mode: env.flag_or("DRY_RUN_MODE", false)?,
            auto_create_tables: env.flag_or("AUTO_CREATE_TABLES", true)?,
            enable_cache: env.flag_or("ENABLE_CACHE", true)?,
        };

        let multiplier: f64 = env.parse_or("CONNECT_RETRY_MULTIPLIER", 2.0)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(invalid(
                "CONNECT_RETRY_MULTIPLIER",
                &multiplier.to_string(),
                "must be a finite number >= 1",
            ));
        }
        let retry = RetryPolicy {
            max_retries: env.parse_or("CONNECT_RETRIES", 1)?,
            backoff: Duration::from_millis(env.parse_or("CONNECT_RETRY_BACKOFF_MS", 500)?),
            multiplier,
        };

        Ok(Self {
            app_name: env.string_or("APP_NAME", "Data Lakehouse Pipeline"),
            environment: env.parse_or("ENVIRONMENT", Environment::Development)?,
            log_level: env.string_or("LOG_LEVEL", "info").to_lowercase(),
            query,
            database,
            cache,
            object_store,
            email,
            flags,
            processing,
            connect_timeout: Duration::from_secs(env.positive("CONNECT_TIMEOUT_SECONDS", 5)?),
            retry,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// PostgreSQL connection string without the password.
    pub fn postgres_url(&self) -> String {
        self.database.display_url()
    }

    /// Human-readable endpoint of a backend, credentials excluded.
    pub fn endpoint(&self, backend: Backend) -> String {
        match backend {
            Backend::Query => self.query.base_url(),
            Backend::Database => self.database.display_url(),
            Backend::Cache => format!(
                "redis://{}:{}/{}",
                self.cache.host, self.cache.port, self.cache.db
            ),
            Backend::ObjectStore => format!(
                "{}{}",
                self.object_store.endpoint.as_str(),
                self.object_store.bucket
            ),
        }
    }
}

/// Typed accessors over a variable lookup.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::Missing {
            name: name.to_string(),
        })
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| invalid(name, &raw, &e.to_string())),
            None => Ok(default),
        }
    }

    fn positive<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + fmt::Display,
        T::Err: fmt::Display,
    {
        let value = self.parse_or(name, default)?;
        if value <= T::default() {
            return Err(invalid(name, &value.to_string(), "must be greater than zero"));
        }
        Ok(value)
    }

    fn port(&self, name: &str, default: u16) -> Result<u16, ConfigError> {
        self.positive(name, default)
    }

    fn flag_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name) {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                invalid(name, &raw, "expected true/false, 1/0, yes/no or on/off")
            }),
            None => Ok(default),
        }
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accepts `host:port` as well as full URLs; the scheme follows `secure`
/// when omitted.
fn parse_endpoint(name: &str, raw: &str, secure: bool) -> Result<Url, ConfigError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        let scheme = if secure { "https" } else { "http" };
        format!("{}://{}", scheme, raw)
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(name, raw, &e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(name, raw, "scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid(name, raw, "missing host"));
    }
    Ok(url)
}
