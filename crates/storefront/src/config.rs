//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required when `LOSIA_BACKEND=http` (the default)
//! - `LOSIA_BACKEND_URL` - Base URL of the commerce backend
//! - `LOSIA_BACKEND_TOKEN` - Bearer token for the backend (high entropy)
//!
//! ## Optional
//! - `LOSIA_HOST` - Bind address (default: 127.0.0.1)
//! - `LOSIA_PORT` - Listen port (default: 3000)
//! - `LOSIA_BACKEND` - `http` or `memory` (default: http)
//! - `LOSIA_BACKEND_TIMEOUT_MS` - Backend request timeout (default: 8000)
//! - `LOSIA_NOTIFY_WEBHOOK_URL` - Order notification webhook (default: log only)
//! - `LOSIA_NOTIFY_QUEUE_CAPACITY` - Notification queue size (default: 256)
//! - `LOSIA_FREE_SHIPPING_THRESHOLD` - Subtotal that ships free (default: 500000)
//! - `LOSIA_SHIPPING_FEE` - Flat shipping fee (default: 30000)
//! - `LOSIA_ORDER_CODE_PREFIX` - Order code prefix (default: LOSIA)
//! - `LOSIA_RETRY_BASE_MS` - Checkout retry base delay (default: 200)
//! - `LOSIA_RETRY_JITTER_MS` - Checkout retry jitter (default: 300)
//! - `LOSIA_ECO_IMPACT_TABLE` - Path to a JSON eco-impact table
//! - `LOSIA_ECO_IMPACT_SOURCE` - `table` or `backend` (default: table)
//! - `LOSIA_DEMO_IMAGE_POOL` - Comma-separated demo image paths
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use losia_core::demo_image::default_pool;
use losia_core::order_code::DEFAULT_PREFIX;
use losia_core::{EcoImpactTable, Money, PricingPolicy};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Commerce backend connection
    pub backend: BackendConfig,
    /// Shipping rules fed to the pricing engine
    pub pricing: PricingPolicy,
    /// Order code and submission retry settings
    pub checkout: CheckoutConfig,
    /// Post-order notification settings
    pub notifications: NotificationConfig,
    /// Where eco-impact profiles come from
    pub eco_impact: EcoImpactConfig,
    /// Fallback image paths
    pub demo_image_pool: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Which backend implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    #[default]
    Http,
    /// Everything in-process; for local development and tests.
    Memory,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'http' or 'memory', got '{other}'")),
        }
    }
}

/// Commerce backend connection.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Base URL; set whenever `mode` is `Http`
    pub base_url: Option<Url>,
    /// Bearer token (server-side only)
    pub token: Option<SecretString>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Checkout settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub order_code_prefix: String,
    /// Minimum wait before the single transport retry
    pub retry_base: Duration,
    /// Upper bound of the random extra wait
    pub retry_jitter: Duration,
}

/// Notification settings.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Webhook to POST order notifications to; `None` logs them instead
    pub webhook_url: Option<Url>,
    pub queue_capacity: usize,
}

/// Where eco-impact profiles are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EcoImpactSourceKind {
    /// The configured table (file or built-in)
    #[default]
    Table,
    /// The backend's eco-impact endpoint
    Backend,
}

impl FromStr for EcoImpactSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "backend" => Ok(Self::Backend),
            other => Err(format!("expected 'table' or 'backend', got '{other}'")),
        }
    }
}

/// Eco-impact settings.
#[derive(Debug, Clone)]
pub struct EcoImpactConfig {
    pub source: EcoImpactSourceKind,
    pub table: EcoImpactTable,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(env: &EnvLookup) -> Result<Self, ConfigError> {
        let host = parse_env(env, "LOSIA_HOST", "127.0.0.1")?;
        let port = parse_env(env, "LOSIA_PORT", "3000")?;

        let backend = BackendConfig::from_lookup(env)?;
        let pricing = PricingPolicy {
            free_shipping_threshold: get_money(env, "LOSIA_FREE_SHIPPING_THRESHOLD", "500000")?,
            shipping_fee: get_money(env, "LOSIA_SHIPPING_FEE", "30000")?,
        };
        let checkout = CheckoutConfig {
            order_code_prefix: get_env_or_default(env, "LOSIA_ORDER_CODE_PREFIX", DEFAULT_PREFIX),
            retry_base: Duration::from_millis(parse_env(env, "LOSIA_RETRY_BASE_MS", "200")?),
            retry_jitter: Duration::from_millis(parse_env(env, "LOSIA_RETRY_JITTER_MS", "300")?),
        };
        let notifications = NotificationConfig {
            webhook_url: get_optional_url(env, "LOSIA_NOTIFY_WEBHOOK_URL")?,
            queue_capacity: parse_env(env, "LOSIA_NOTIFY_QUEUE_CAPACITY", "256")?,
        };
        if notifications.queue_capacity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "LOSIA_NOTIFY_QUEUE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let eco_impact = EcoImpactConfig {
            source: parse_env(env, "LOSIA_ECO_IMPACT_SOURCE", "table")?,
            table: load_eco_impact_table(env)?,
        };
        let demo_image_pool = get_demo_image_pool(env)?;

        Ok(Self {
            host,
            port,
            backend,
            pricing,
            checkout,
            notifications,
            eco_impact,
            demo_image_pool,
            sentry_dsn: get_optional_env(env, "SENTRY_DSN"),
            sentry_environment: get_optional_env(env, "SENTRY_ENVIRONMENT"),
        })
    }

    /// Defaults with the in-memory backend and no retry delay.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            backend: BackendConfig {
                mode: BackendMode::Memory,
                base_url: None,
                token: None,
                timeout: Duration::from_secs(8),
            },
            pricing: PricingPolicy::default(),
            checkout: CheckoutConfig {
                order_code_prefix: DEFAULT_PREFIX.to_string(),
                retry_base: Duration::ZERO,
                retry_jitter: Duration::ZERO,
            },
            notifications: NotificationConfig {
                webhook_url: None,
                queue_capacity: 256,
            },
            eco_impact: EcoImpactConfig {
                source: EcoImpactSourceKind::Table,
                table: EcoImpactTable::builtin(),
            },
            demo_image_pool: default_pool(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BackendConfig {
    fn from_lookup(env: &EnvLookup) -> Result<Self, ConfigError> {
        let mode: BackendMode = parse_env(env, "LOSIA_BACKEND", "http")?;
        let timeout = Duration::from_millis(parse_env(env, "LOSIA_BACKEND_TIMEOUT_MS", "8000")?);

        let (base_url, token) = match mode {
            BackendMode::Http => (
                Some(parse_url("LOSIA_BACKEND_URL", &get_required_env(env, "LOSIA_BACKEND_URL")?)?),
                Some(get_validated_secret(env, "LOSIA_BACKEND_TOKEN")?),
            ),
            BackendMode::Memory => (None, None),
        };

        Ok(Self {
            mode,
            base_url,
            token,
            timeout,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Source of raw variable values: the process environment, or a map in tests.
type EnvLookup = dyn Fn(&str) -> Option<String>;

/// Get a required environment variable.
fn get_required_env(env: &EnvLookup, key: &str) -> Result<String, ConfigError> {
    get_optional_env(env, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(env: &EnvLookup, key: &str) -> Option<String> {
    env(key).filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(env: &EnvLookup, key: &str, default: &str) -> String {
    get_optional_env(env, key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(env: &EnvLookup, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(env, key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a non-negative money amount.
fn get_money(env: &EnvLookup, key: &str, default: &str) -> Result<Money, ConfigError> {
    let amount: Decimal = parse_env(env, key, default)?;
    if amount.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(Money::new(amount))
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn get_optional_url(env: &EnvLookup, key: &str) -> Result<Option<Url>, ConfigError> {
    get_optional_env(env, key)
        .map(|value| parse_url(key, &value))
        .transpose()
}

/// Read the eco-impact table file, or use the built-in table.
fn load_eco_impact_table(env: &EnvLookup) -> Result<EcoImpactTable, ConfigError> {
    const KEY: &str = "LOSIA_ECO_IMPACT_TABLE";

    let Some(path) = get_optional_env(env, KEY) else {
        return Ok(EcoImpactTable::builtin());
    };
    let json = std::fs::read_to_string(&path)
        .map_err(|e| ConfigError::InvalidEnvVar(KEY.to_string(), format!("{path}: {e}")))?;
    EcoImpactTable::from_json(&json)
        .map_err(|e| ConfigError::InvalidEnvVar(KEY.to_string(), format!("{path}: {e}")))
}

fn get_demo_image_pool(env: &EnvLookup) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = get_optional_env(env, "LOSIA_DEMO_IMAGE_POOL") else {
        return Ok(default_pool());
    };
    let pool: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();
    if pool.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            "LOSIA_DEMO_IMAGE_POOL".to_string(),
            "must list at least one image".to_string(),
        ));
    }
    Ok(pool)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= \
                 {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated token."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(env: &EnvLookup, key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(env, key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
