//! Configuration management for reqlimit.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::{ReqlimitError, Result};

/// Body sent with a 429 response unless overridden.
pub const DEFAULT_REJECTION_MESSAGE: &str = "request limit exceeded";

/// Prefix for environment variable overrides, e.g. `REQLIMIT__RATE_LIMITING__LIMIT`.
const ENV_PREFIX: &str = "REQLIMIT";

/// Immutable quota settings for one limiter instance.
///
/// Both values are validated on construction, so a `LimiterConfig` that
/// exists is always usable on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    limit: u64,
    window: Duration,
}

impl LimiterConfig {
    /// Create a limiter configuration allowing `limit` requests per `window`.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(ReqlimitError::Config(
                "limit must be a positive integer".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(ReqlimitError::Config(
                "window must be a positive duration".to_string(),
            ));
        }
        Ok(Self { limit, window })
    }

    /// Maximum accepted requests per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Which request attributes may be used to identify a client.
///
/// `X-Real-Ip` and `X-Forwarded-For` are set by whoever sends the request.
/// Only enable [`IdentityPolicy::TrustProxyHeaders`] when every request
/// reaches this service through a reverse proxy that overwrites them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// Key on the transport peer address only.
    #[default]
    TransportOnly,
    /// Prefer proxy headers, falling back to the transport peer address.
    TrustProxyHeaders,
}

/// Main configuration for the reqlimit service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReqlimitConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per client within one window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Honour `X-Real-Ip` / `X-Forwarded-For` (trusted proxy deployments only)
    #[serde(default)]
    pub trust_proxy_headers: bool,

    /// Response body for rejected requests
    #[serde(default = "default_rejection_message")]
    pub rejection_message: String,

    /// Interval between sweeps of expired clients, 0 disables sweeping
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            trust_proxy_headers: false,
            rejection_message: default_rejection_message(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_limit() -> u64 {
    10
}

fn default_window_ms() -> u64 {
    5000
}

fn default_rejection_message() -> String {
    DEFAULT_REJECTION_MESSAGE.to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Build the validated limiter settings.
    pub fn limiter_config(&self) -> Result<LimiterConfig> {
        LimiterConfig::new(self.limit, Duration::from_millis(self.window_ms))
    }

    /// Identity policy selected by `trust_proxy_headers`.
    pub fn identity_policy(&self) -> IdentityPolicy {
        if self.trust_proxy_headers {
            IdentityPolicy::TrustProxyHeaders
        } else {
            IdentityPolicy::TransportOnly
        }
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl ReqlimitConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReqlimitConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ReqlimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional YAML file, and
    /// `REQLIMIT__*` environment variables, in increasing precedence.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path, "Loading config file");
            builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: ReqlimitConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ReqlimitError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later on the request path.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limiter_config().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_limiter_config_rejects_zero_limit() {
        let result = LimiterConfig::new(0, Duration::from_secs(1));
        assert!(matches!(result, Err(ReqlimitError::Config(_))));
    }

    #[test]
    fn test_limiter_config_rejects_zero_window() {
        let result = LimiterConfig::new(5, Duration::ZERO);
        assert!(matches!(result, Err(ReqlimitError::Config(_))));
    }

    #[test]
    fn test_limiter_config_accessors() {
        let config = assert_ok!(LimiterConfig::new(10, Duration::from_secs(5)));
        assert_eq!(config.limit(), 10);
        assert_eq!(config.window(), Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let config = ReqlimitConfig::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.limit, 10);
        assert_eq!(config.rate_limiting.window_ms, 5000);
        assert_eq!(config.rate_limiting.rejection_message, DEFAULT_REJECTION_MESSAGE);
        assert_eq!(config.rate_limiting.identity_policy(), IdentityPolicy::TransportOnly);
        assert_eq!(config.rate_limiting.sweep_interval(), Some(Duration::from_secs(60)));
        assert_ok!(config.validate());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
rate_limiting:
  limit: 3
  window_ms: 250
  trust_proxy_headers: true
  sweep_interval_secs: 0
"#;
        let config = assert_ok!(ReqlimitConfig::from_yaml(yaml));
        let limiter = assert_ok!(config.rate_limiting.limiter_config());

        assert_eq!(limiter.limit(), 3);
        assert_eq!(limiter.window(), Duration::from_millis(250));
        assert_eq!(
            config.rate_limiting.identity_policy(),
            IdentityPolicy::TrustProxyHeaders
        );
        assert_eq!(config.rate_limiting.sweep_interval(), None);
        assert_eq!(config.rate_limiting.rejection_message, DEFAULT_REJECTION_MESSAGE);
    }

    #[test]
    fn test_from_yaml_rejects_zero_limit() {
        let yaml = "rate_limiting:\n  limit: 0\n";
        assert_err!(ReqlimitConfig::from_yaml(yaml));
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert_err!(ReqlimitConfig::from_yaml("rate_limiting: [1, 2"));
    }

    #[test]
    fn test_load_layers_file_and_environment() {
        let path = std::env::temp_dir().join(format!("reqlimit-test-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "server:\n  bind_addr: \"0.0.0.0:9000\"\nrate_limiting:\n  limit: 4\n",
        )
        .unwrap();

        std::env::set_var("REQLIMIT__RATE_LIMITING__WINDOW_MS", "1500");
        let result = ReqlimitConfig::load(path.to_str());
        std::env::remove_var("REQLIMIT__RATE_LIMITING__WINDOW_MS");
        std::fs::remove_file(&path).unwrap();

        let config = assert_ok!(result);
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.rate_limiting.limit, 4);
        assert_eq!(config.rate_limiting.window_ms, 1500);
    }
}
