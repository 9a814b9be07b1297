use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str = "storefront_development_only_jwt_secret_0123456789";

/// Session lifetimes are kept apart on purpose: local logins have always
/// expired after 30 minutes while Google and admin sessions last an hour.
pub const DEFAULT_LOCAL_SESSION_MINUTES: i64 = 30;
pub const DEFAULT_GOOGLE_SESSION_MINUTES: i64 = 60;
pub const DEFAULT_ADMIN_SESSION_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// HS256 signing key for session tokens
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment; `development` exposes internal error details
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Emit JSON structured logs
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    // Sessions
    #[serde(default = "default_session_cookie_name")]
    #[validate(length(min = 1))]
    pub session_cookie_name: String,

    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(default = "default_local_session_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub local_session_minutes: i64,

    #[serde(default = "default_google_session_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub google_session_minutes: i64,

    #[serde(default = "default_admin_session_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub admin_session_minutes: i64,

    // OTP
    #[serde(default = "default_signup_otp_seconds")]
    #[validate(range(min = 30))]
    pub signup_otp_seconds: i64,

    #[serde(default = "default_resend_otp_seconds")]
    #[validate(range(min = 30))]
    pub resend_otp_seconds: i64,

    #[serde(default = "default_otp_record_seconds")]
    #[validate(range(min = 60))]
    pub otp_record_seconds: i64,

    #[serde(default = "default_otp_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub otp_max_attempts: i32,

    // Razorpay
    #[serde(default)]
    pub razorpay_key_id: String,

    #[serde(default)]
    pub razorpay_key_secret: String,

    #[serde(default = "default_razorpay_api_base")]
    pub razorpay_api_base: String,

    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    // SMTP
    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    // Cloudinary
    #[serde(default)]
    pub cloudinary_cloud_name: String,

    #[serde(default)]
    pub cloudinary_api_key: String,

    #[serde(default)]
    pub cloudinary_api_secret: String,

    #[serde(default = "default_cloudinary_folder")]
    pub cloudinary_folder: String,

    /// Audience expected on Google ID tokens
    #[serde(default)]
    pub google_client_id: String,

    /// Optional bootstrap admin, created at startup when absent
    #[serde(default)]
    pub admin_email: Option<String>,

    #[serde(default)]
    pub admin_password: Option<String>,

    /// Per-file upload cap in bytes
    #[serde(default = "default_max_upload_bytes")]
    #[validate(range(min = 1024))]
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            cors_allowed_origins: None,
            session_cookie_name: default_session_cookie_name(),
            cookie_secure: false,
            local_session_minutes: DEFAULT_LOCAL_SESSION_MINUTES,
            google_session_minutes: DEFAULT_GOOGLE_SESSION_MINUTES,
            admin_session_minutes: DEFAULT_ADMIN_SESSION_MINUTES,
            signup_otp_seconds: default_signup_otp_seconds(),
            resend_otp_seconds: default_resend_otp_seconds(),
            otp_record_seconds: default_otp_record_seconds(),
            otp_max_attempts: default_otp_max_attempts(),
            razorpay_key_id: String::new(),
            razorpay_key_secret: String::new(),
            razorpay_api_base: default_razorpay_api_base(),
            currency: default_currency(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            mail_from: default_mail_from(),
            cloudinary_cloud_name: String::new(),
            cloudinary_api_key: String::new(),
            cloudinary_api_secret: String::new(),
            cloudinary_folder: default_cloudinary_folder(),
            google_client_id: String::new(),
            admin_email: None,
            admin_password: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.is_production() {
            for (field, value) in [
                ("razorpay_key_id", &self.razorpay_key_id),
                ("razorpay_key_secret", &self.razorpay_key_secret),
                ("smtp_host", &self.smtp_host),
                ("cloudinary_cloud_name", &self.cloudinary_cloud_name),
            ] {
                if value.trim().is_empty() {
                    let mut err = ValidationError::new("required_in_production");
                    err.message = Some(format!("{} must be set in production", field).into());
                    errors.add(field, err);
                }
            }
        }

        if self.admin_email.is_some() != self.admin_password.is_some() {
            let mut err = ValidationError::new("admin_bootstrap_incomplete");
            err.message = Some("admin_email and admin_password must be set together".into());
            errors.add("admin_email", err);
        }

        if self.resend_otp_seconds > self.otp_record_seconds
            || self.signup_otp_seconds > self.otp_record_seconds
        {
            let mut err = ValidationError::new("otp_record_too_short");
            err.message = Some("otp_record_seconds must outlive every OTP validity window".into());
            errors.add("otp_record_seconds", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_session_cookie_name() -> String {
    "access_token".to_string()
}

fn default_local_session_minutes() -> i64 {
    DEFAULT_LOCAL_SESSION_MINUTES
}

fn default_google_session_minutes() -> i64 {
    DEFAULT_GOOGLE_SESSION_MINUTES
}

fn default_admin_session_minutes() -> i64 {
    DEFAULT_ADMIN_SESSION_MINUTES
}

fn default_signup_otp_seconds() -> i64 {
    300
}

fn default_resend_otp_seconds() -> i64 {
    120
}

fn default_otp_record_seconds() -> i64 {
    360
}

fn default_otp_max_attempts() -> i32 {
    3
}

fn default_razorpay_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Storefront <no-reply@localhost>".to_string()
}

fn default_cloudinary_folder() -> String {
    "storefront".to_string()
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    if ["changeme", "your-secret-key", "default-secret"]
        .iter()
        .any(|pattern| lower.contains(pattern))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads configuration from defaults, `config/` files and `APP__*` variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(CONFIG_DIR, &run_env)
}

fn load_config_from(config_dir: &str, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(config_dir).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a random string of at least 32 characters.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET.".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "a_sufficiently_long_and_random_test_secret_9f3k2".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    fn write_config(dir: &TempDir, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.path().join(format!("{}.toml", name))).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn session_lifetimes_default_to_distinct_values() {
        let cfg = base_config();
        assert_eq!(cfg.local_session_minutes, 30);
        assert_eq!(cfg.google_session_minutes, 60);
        assert_eq!(cfg.admin_session_minutes, 60);
    }

    #[test]
    fn production_requires_gateway_credentials() {
        let cfg = base_config();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("razorpay_key_secret"));
        assert!(errors.field_errors().contains_key("smtp_host"));
    }

    #[test]
    fn development_skips_production_requirements() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn admin_bootstrap_needs_both_fields() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.admin_email = Some("admin@example.com".into());
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.admin_password = Some("Adm1n!pass".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn cors_origins_are_trimmed() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some(" https://a.example , ,https://b.example".into());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("jwt_secret"));
    }

    #[test]
    fn loads_layered_files() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default",
            r#"
            jwt_secret = "layered_config_secret_value_for_tests_01"
            port = 9000
            "#,
        );
        write_config(&dir, "staging", r#"log_level = "debug""#);

        let cfg = load_config_from(dir.path().to_str().unwrap(), "staging").unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.currency, "INR");
    }

    #[test]
    fn missing_jwt_secret_is_reported() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "default", "port = 9001");
        let result = load_config_from(dir.path().to_str().unwrap(), "qa-no-secret");
        assert!(matches!(result, Err(AppConfigError::Load(_))));
    }
}
