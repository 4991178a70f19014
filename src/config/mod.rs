//! Configuration management
//!
//! Configuration for Folio is loaded from:
//! - a `config.yml` file
//! - `FOLIO_*` environment variables (override file settings)
//!
//! Every section is optional; missing values are filled with defaults so an
//! empty or absent file yields a runnable development setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the frontend, for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public URL of the site, used for links in emails and the feed
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/folio.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Default TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    3600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Media upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/svg+xml".to_string(),
        "application/pdf".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Canonical file extension for a MIME type
    pub fn extension_for(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// A fixed window: at most `max_requests` per `window_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_seconds: u64,
    pub max_requests: u32,
}

/// Request protection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// CSRF token lifetime in seconds
    #[serde(default = "default_csrf_ttl")]
    pub csrf_ttl_seconds: u64,
    /// Limit applied to every public API request, per client IP
    #[serde(default = "default_rate_limit")]
    pub rate_limit: RateLimitConfig,
    /// Limit applied to contact and subscribe submissions, per client IP
    #[serde(default = "default_contact_rate_limit")]
    pub contact_rate_limit: RateLimitConfig,
    /// How often expired limiter windows and CSRF tokens are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            csrf_ttl_seconds: default_csrf_ttl(),
            rate_limit: default_rate_limit(),
            contact_rate_limit: default_contact_rate_limit(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_csrf_ttl() -> u64 {
    7200
}

fn default_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        window_seconds: 60,
        max_requests: 120,
    }
}

fn default_contact_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        window_seconds: 3600,
        max_requests: 5,
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Email delivery provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    /// Log messages and keep them in memory (development)
    #[default]
    Log,
    /// Deliver through an SMTP relay
    Smtp,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: EmailProvider,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Receives contact form notifications
    #[serde(default)]
    pub admin_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProvider::default(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            admin_address: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "noreply@localhost".to_string()
}

fn default_from_name() -> String {
    "Folio".to_string()
}

/// First-party analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Key for hashing visitor identity; raw IPs are never stored
    #[serde(default = "default_analytics_salt")]
    pub salt: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            salt: default_analytics_salt(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_analytics_salt() -> String {
    "folio-analytics".to_string()
}

fn default_retention_days() -> i64 {
    365
}

/// GitHub import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            api_base: default_github_api(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration; invalid
    /// YAML is an error carrying the line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply `FOLIO_*` overrides
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the system cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, limit) in [
            ("security.rate_limit", &self.security.rate_limit),
            ("security.contact_rate_limit", &self.security.contact_rate_limit),
        ] {
            if limit.window_seconds == 0 || limit.max_requests == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must have a non-zero window and request count",
                    name
                )));
            }
        }
        if self.security.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "security.session_days must be positive".to_string(),
            ));
        }
        if self.analytics.salt.is_empty() {
            return Err(ConfigError::ValidationError(
                "analytics.salt must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("FOLIO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("FOLIO_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("FOLIO_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("FOLIO_SERVER_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        if let Ok(driver) = std::env::var("FOLIO_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("FOLIO_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("FOLIO_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("FOLIO_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = std::env::var("FOLIO_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(path) = std::env::var("FOLIO_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }

        if let Ok(provider) = std::env::var("FOLIO_EMAIL_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "log" => self.email.provider = EmailProvider::Log,
                "smtp" => self.email.provider = EmailProvider::Smtp,
                _ => {}
            }
        }
        if let Ok(host) = std::env::var("FOLIO_SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
        if let Ok(port) = std::env::var("FOLIO_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.email.smtp_port = port;
            }
        }
        if let Ok(username) = std::env::var("FOLIO_SMTP_USERNAME") {
            self.email.smtp_username = Some(username);
        }
        if let Ok(password) = std::env::var("FOLIO_SMTP_PASSWORD") {
            self.email.smtp_password = Some(password);
        }
        if let Ok(from) = std::env::var("FOLIO_EMAIL_FROM") {
            self.email.from_address = from;
        }
        if let Ok(admin) = std::env::var("FOLIO_EMAIL_ADMIN") {
            self.email.admin_address = Some(admin);
        }

        if let Ok(enabled) = std::env::var("FOLIO_ANALYTICS_ENABLED") {
            if let Ok(enabled) = enabled.parse::<bool>() {
                self.analytics.enabled = enabled;
            }
        }
        if let Ok(salt) = std::env::var("FOLIO_ANALYTICS_SALT") {
            self.analytics.salt = salt;
        }

        if let Ok(username) = std::env::var("FOLIO_GITHUB_USERNAME") {
            self.github.username = Some(username);
        }
        if let Ok(token) = std::env::var("FOLIO_GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test module that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "FOLIO_SERVER_HOST",
    "FOLIO_SERVER_PORT",
    "FOLIO_SERVER_CORS_ORIGIN",
    "FOLIO_SERVER_PUBLIC_URL",
    "FOLIO_DATABASE_DRIVER",
    "FOLIO_DATABASE_URL",
    "FOLIO_CACHE_DRIVER",
    "FOLIO_CACHE_REDIS_URL",
    "FOLIO_CACHE_TTL_SECONDS",
    "FOLIO_UPLOAD_PATH",
    "FOLIO_EMAIL_PROVIDER",
    "FOLIO_SMTP_HOST",
    "FOLIO_SMTP_PORT",
    "FOLIO_SMTP_USERNAME",
    "FOLIO_SMTP_PASSWORD",
    "FOLIO_EMAIL_FROM",
    "FOLIO_EMAIL_ADMIN",
    "FOLIO_ANALYTICS_ENABLED",
    "FOLIO_ANALYTICS_SALT",
    "FOLIO_GITHUB_USERNAME",
    "FOLIO_GITHUB_TOKEN",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rate_limit_strategy() -> impl Strategy<Value = RateLimitConfig> {
        (1u64..=86_400, 1u32..=10_000).prop_map(|(window_seconds, max_requests)| RateLimitConfig {
            window_seconds,
            max_requests,
        })
    }

    fn config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z][a-z0-9]{0,10}",
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            rate_limit_strategy(),
            rate_limit_strategy(),
            prop_oneof![Just(EmailProvider::Log), Just(EmailProvider::Smtp)],
            "[a-zA-Z0-9]{1,32}",
        )
            .prop_map(|(host, port, driver, rate, contact, provider, salt)| {
                let mut config = Config::default();
                config.server.host = host;
                config.server.port = port;
                config.database.driver = driver;
                config.security.rate_limit = rate;
                config.security.contact_rate_limit = contact;
                config.email.provider = provider;
                config.analytics.salt = salt;
                config
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn config_yaml_roundtrip(config in config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.security.rate_limit, parsed.security.rate_limit);
            prop_assert_eq!(config.security.contact_rate_limit, parsed.security.contact_rate_limit);
            prop_assert_eq!(config.email.provider, parsed.email.provider);
            prop_assert_eq!(config.analytics.salt, parsed.analytics.salt);
        }

        #[test]
        fn env_port_overrides_file(file_port in 1u16..=65535, env_port in 1u16..=65535) {
            let _guard = lock_env();
            super::clear_env();

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("Failed to write config");
            std::env::set_var("FOLIO_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path());
            super::clear_env();

            prop_assert_eq!(config.expect("Failed to load config").server.port, env_port);
        }
    }
}
