use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const SANDBOX_BASE_URL: &str = "https://uat.herepay.org";
const PRODUCTION_BASE_URL: &str = "https://app.herepay.org";

/// Herepay environment the credentials belong to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HerepayEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl HerepayEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

/// Herepay API credentials and endpoint selection
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct HerepayConfig {
    /// XApiKey header value
    #[serde(default)]
    pub api_key: String,

    /// SecretKey header value
    #[serde(default)]
    pub secret_key: String,

    /// HMAC key for request/event checksums. Leaving this empty runs the
    /// gateway in degraded mode: inbound events without a checksum are
    /// accepted and flagged in the audit trail.
    #[serde(default)]
    pub private_key: String,

    #[serde(default)]
    pub environment: HerepayEnvironment,

    /// Override for the processor base URL (tests point this at a mock)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Publicly reachable URL of this service's shopper redirect endpoint,
    /// echoed to the processor in the initiation request
    #[serde(default = "default_redirect_url")]
    pub public_redirect_url: String,
}

impl HerepayConfig {
    pub fn credentials(&self) -> HerepayCredentials {
        HerepayCredentials {
            api_key: self.api_key.clone(),
            secret_key: self.secret_key.clone(),
            private_key: self.private_key.clone(),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| self.environment.base_url().to_string()),
        }
    }
}

/// Read-only credential value passed explicitly into every component that
/// talks to the processor. No component reads ambient configuration.
#[derive(Clone, Debug)]
pub struct HerepayCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub private_key: String,
    pub base_url: String,
}

impl HerepayCredentials {
    /// All three keys are required for initiation
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty() && !self.private_key.is_empty()
    }

    /// Channel listing and status queries only need the header pair
    pub fn has_api_keys(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    /// None when running without a signing key (degraded mode)
    pub fn private_key(&self) -> Option<&str> {
        if self.private_key.is_empty() {
            None
        } else {
            Some(&self.private_key)
        }
    }
}

/// Shopper-facing destinations for the redirect leg
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PageConfig {
    /// Thank-you page shown after a successful (or still processing) payment
    #[serde(default = "default_order_received_url")]
    pub order_received_url: String,

    /// Retry-payment page for failed or unauthorized outcomes
    #[serde(default = "default_payment_retry_url")]
    pub payment_retry_url: String,

    /// Cart page, used when the payment code cannot be resolved
    #[serde(default = "default_cart_url")]
    pub cart_url: String,

    /// Generic order view, used for unrecognized status vocabularies
    #[serde(default = "default_order_view_url")]
    pub order_view_url: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            order_received_url: default_order_received_url(),
            payment_retry_url: default_payment_retry_url(),
            cart_url: default_cart_url(),
            order_view_url: default_order_view_url(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Store name used in payment descriptions sent to the processor
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Timeout for outbound processor calls (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_herepay_config")]
    #[validate]
    pub herepay: HerepayConfig,

    #[serde(default)]
    #[validate]
    pub pages: PageConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_store_name() -> String {
    "Storefront".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_redirect_url() -> String {
    "http://localhost:8080/payments/redirect".to_string()
}

fn default_order_received_url() -> String {
    "http://localhost:3000/checkout/order-received".to_string()
}

fn default_payment_retry_url() -> String {
    "http://localhost:3000/checkout/payment".to_string()
}

fn default_cart_url() -> String {
    "http://localhost:3000/cart".to_string()
}

fn default_order_view_url() -> String {
    "http://localhost:3000/my-account/orders".to_string()
}

fn default_herepay_config() -> HerepayConfig {
    HerepayConfig {
        api_key: String::new(),
        secret_key: String::new(),
        private_key: String::new(),
        environment: HerepayEnvironment::default(),
        base_url: None,
        public_redirect_url: default_redirect_url(),
    }
}

/// Loads configuration from layered sources: `config/default.toml`, an
/// environment-specific file, then `APP__`-prefixed environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;

    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(
        environment = %app_config.environment,
        herepay_env = ?app_config.herepay.environment,
        "Configuration loaded"
    );

    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("herepay_gateway={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
