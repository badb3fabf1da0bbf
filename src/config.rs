use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::experiments::{validate_experiments, ExperimentConfig};
use crate::provider::StripeClientConfig;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STRIPE_API_VERSION: &str = "2025-07-30.basil";
const DEFAULT_CART_COOKIE_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;
const DEFAULT_ENTITLEMENT_TTL_SECS: u64 = 15 * 60;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Origin used to build provider success/cancel URLs
    #[validate(custom = "validate_base_url")]
    pub public_base_url: String,

    /// Stripe secret key
    #[validate(length(min = 1))]
    pub stripe_secret_key: String,

    /// Stripe API base (overridden in tests)
    #[serde(default = "default_stripe_api_base")]
    #[validate(custom = "validate_base_url")]
    pub stripe_api_base: String,

    /// Pinned Stripe API version
    #[serde(default = "default_stripe_api_version")]
    pub stripe_api_version: String,

    /// Per-request timeout for provider calls
    #[serde(default = "default_stripe_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub stripe_timeout_secs: u64,

    /// Comma-separated price ids that may be charged or fulfilled
    #[serde(default)]
    pub allowed_price_ids: String,

    /// Page size for the active price listing
    #[serde(default = "default_catalog_page_limit")]
    #[validate(range(min = 1, max = 100))]
    pub catalog_page_limit: u32,

    /// Default currency code for empty carts
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Maximum distinct price ids in one cart
    #[serde(default = "default_max_cart_lines")]
    #[validate(range(min = 1, max = 100))]
    pub max_cart_lines: usize,

    /// HMAC key for entitlement credentials
    #[validate(custom = "validate_entitlement_secret")]
    pub entitlement_secret: String,

    /// Entitlement credential lifetime in seconds
    #[serde(default = "default_entitlement_ttl_secs")]
    #[validate(range(min = 60, max = 86400))]
    pub entitlement_ttl_secs: u64,

    /// Cart mirror cookie lifetime in seconds
    #[serde(default = "default_cart_cookie_max_age_secs")]
    #[validate(range(min = 60))]
    pub cart_cookie_max_age_secs: i64,

    /// Mark the entitlement cookie `Secure`
    #[serde(default = "default_true_bool")]
    pub cookie_secure: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Static experiment table consumed by the assignment engine
    #[serde(default)]
    #[validate(custom = "validate_experiments")]
    pub experiments: HashMap<String, ExperimentConfig>,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the secrets
    pub fn new(
        public_base_url: String,
        stripe_secret_key: String,
        entitlement_secret: String,
        allowed_price_ids: String,
        environment: String,
    ) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            public_base_url,
            stripe_secret_key,
            stripe_api_base: default_stripe_api_base(),
            stripe_api_version: default_stripe_api_version(),
            stripe_timeout_secs: default_stripe_timeout_secs(),
            allowed_price_ids,
            catalog_page_limit: default_catalog_page_limit(),
            default_currency: default_currency(),
            max_cart_lines: default_max_cart_lines(),
            entitlement_secret,
            entitlement_ttl_secs: default_entitlement_ttl_secs(),
            cart_cookie_max_age_secs: default_cart_cookie_max_age_secs(),
            cookie_secure: default_true_bool(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            max_body_size: default_max_body_size(),
            experiments: HashMap::new(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Public origin without a trailing slash
    pub fn origin(&self) -> &str {
        self.public_base_url.trim_end_matches('/')
    }

    pub fn stripe_client_config(&self) -> StripeClientConfig {
        StripeClientConfig {
            secret_key: self.stripe_secret_key.clone(),
            api_base: self.stripe_api_base.clone(),
            api_version: self.stripe_api_version.clone(),
            timeout: Duration::from_secs(self.stripe_timeout_secs),
        }
    }

    pub fn entitlement_ttl(&self) -> Duration {
        Duration::from_secs(self.entitlement_ttl_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && !self.cookie_secure {
            let mut err = ValidationError::new("cookie_secure_required");
            err.message =
                Some("Entitlement cookies must be Secure outside development".into());
            errors.add("cookie_secure", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_stripe_api_base() -> String {
    crate::provider::stripe::DEFAULT_API_BASE.to_string()
}

fn default_stripe_api_version() -> String {
    DEFAULT_STRIPE_API_VERSION.to_string()
}

fn default_stripe_timeout_secs() -> u64 {
    10
}

fn default_catalog_page_limit() -> u32 {
    100
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_max_cart_lines() -> usize {
    50
}

fn default_entitlement_ttl_secs() -> u64 {
    DEFAULT_ENTITLEMENT_TTL_SECS
}

fn default_cart_cookie_max_age_secs() -> i64 {
    DEFAULT_CART_COOKIE_MAX_AGE_SECS
}

fn default_max_body_size() -> usize {
    64 * 1024 // carts are small
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(invalid("log_level", "Must be one of: trace, debug, info, warn, error")),
    }
}

fn validate_base_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(invalid("base_url", "Must be an absolute http(s) URL"))
    }
}

/// At least 32 characters, 10 distinct ones, and no stock fragments.
fn validate_entitlement_secret(secret: &str) -> Result<(), ValidationError> {
    let secret = secret.trim();
    let lower = secret.to_ascii_lowercase();
    let distinct = secret.chars().collect::<HashSet<_>>().len();

    if secret.len() < 32 {
        Err(invalid("entitlement_secret", "Entitlement secret must be at least 32 characters"))
    } else if ["changeme", "password", "12345", "secret"]
        .iter()
        .any(|fragment| lower.contains(fragment))
    {
        Err(invalid("entitlement_secret", "Entitlement secret looks like a placeholder"))
    } else if distinct < 10 {
        Err(invalid(
            "entitlement_secret",
            "Entitlement secret must have at least 10 distinct characters",
        ))
    } else {
        Ok(())
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Docker config (config/docker.toml) if DOCKER env var is set
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let dir = config_dir.display();
    let mut builder = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("public_base_url", format!("http://localhost:{}", DEFAULT_PORT))?
        .add_source(File::with_name(&format!("{}/default", dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", dir, run_env)).required(false));

    if env::var("DOCKER").is_ok() {
        info!("Docker environment detected");
        builder = builder.add_source(File::with_name(&format!("{}/docker", dir)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // The secrets have no defaults and must come from the environment or a profile
    for (key, var) in [
        ("entitlement_secret", "APP__ENTITLEMENT_SECRET"),
        ("stripe_secret_key", "APP__STRIPE_SECRET_KEY"),
    ] {
        if config.get_string(key).is_err() {
            error!("{} is not configured. Set the {} environment variable.", key, var);
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{key} is required but not configured. Set {var}."
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
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

    const SECRET: &str = "q8Vn2LrX7tKz4PwM9bYc3HdJ6sFg1AeU";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "https://shop.example.com".into(),
            "sk_test_abc".into(),
            SECRET.into(),
            "price_a,price_b".into(),
            "production".into(),
        )
    }

    #[test]
    fn base_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_requires_secure_cookies() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.cookie_secure = false;
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn weak_entitlement_secrets_are_rejected() {
        for secret in ["short", "password-password-password-123456", "my-long-entitlement-secret-value-xyz", "abababababababababababababababab"] {
            assert!(validate_entitlement_secret(secret).is_err(), "{secret}");
        }
        assert!(validate_entitlement_secret(SECRET).is_ok());
    }

    #[test]
    fn catalog_page_limit_is_bounded() {
        let mut cfg = base_config();
        cfg.catalog_page_limit = 101;
        assert!(cfg.validate().is_err());
        cfg.catalog_page_limit = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn origin_strips_trailing_slash() {
        let mut cfg = base_config();
        cfg.public_base_url = "https://shop.example.com/".into();
        assert_eq!(cfg.origin(), "https://shop.example.com");
    }

    #[test]
    fn loads_layered_file_with_experiments() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            environment = "development"
            public_base_url = "https://shop.example.com"
            stripe_secret_key = "sk_test_abc"
            entitlement_secret = "{SECRET}"
            allowed_price_ids = "price_a"

            [experiments.ect_hero]
            variants = ["control", "Hero", "HeroAlt"]
            bot_variant = "control"
            enabled = true
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.allowed_price_ids, "price_a");
        assert_eq!(cfg.entitlement_ttl_secs, 900);
        let hero = &cfg.experiments["ect_hero"];
        assert_eq!(hero.variants, vec!["control", "Hero", "HeroAlt"]);
        assert_eq!(hero.bot_variant.as_deref(), Some("control"));
    }

    #[test]
    fn camel_case_bot_variant_key_loads() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            environment = "development"
            stripe_secret_key = "sk_test_abc"
            entitlement_secret = "{SECRET}"

            [experiments.ect_hero]
            variants = ["control", "Hero"]
            botVariant = "control"
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(
            cfg.experiments["ect_hero"].bot_variant.as_deref(),
            Some("control")
        );
    }

    #[test]
    fn invalid_experiment_fails_validation() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            environment = "development"
            stripe_secret_key = "sk_test_abc"
            entitlement_secret = "{SECRET}"

            [experiments.ect_hero]
            variants = ["control"]
            bot_variant = "robot"
            "#
        )
        .unwrap();

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
