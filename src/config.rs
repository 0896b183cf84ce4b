//! Configuration for the gateway and the upload orchestrator.
//!
//! All gateway behaviour is controlled through [`GatewayConfig`], built via
//! its [`GatewayConfigBuilder`]; the client side uses [`OrchestratorConfig`].
//! The binary maps its clap flags (each with an environment fallback) onto
//! these builders, so the library itself never reads the environment.

use crate::error::Error;
use std::fmt;
use std::time::Duration;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_485_760;

/// Production CloudConvert API root.
pub const CLOUDCONVERT_API_URL: &str = "https://api.cloudconvert.com/v2";

/// Sandbox CloudConvert API root (free, watermark-free test conversions).
pub const CLOUDCONVERT_SANDBOX_URL: &str = "https://api.sandbox.cloudconvert.com/v2";

/// Configuration for the conversion gateway.
///
/// # Example
/// ```rust
/// use petite_souris::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .api_key("cc-test-key")
///     .max_file_size(5 * 1024 * 1024)
///     .wait_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_file_size, 5_242_880);
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    /// Largest accepted upload in bytes. Default: 10 485 760.
    pub max_file_size: u64,

    /// Bearer token for the remote conversion API.
    pub api_key: String,

    /// Root URL of the remote conversion API. Default: production CloudConvert.
    pub api_base_url: String,

    /// Upper bound on waiting for a remote job to finish. Default: 300.
    ///
    /// The remote service gives no completion guarantee; without this bound a
    /// stuck job would hold the HTTP request open indefinitely.
    pub wait_timeout_secs: u64,

    /// Delay between job status polls in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,

    /// Timeout for each individual remote HTTP call in seconds. Default: 120.
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            api_key: String::new(),
            api_base_url: CLOUDCONVERT_API_URL.to_string(),
            wait_timeout_secs: 300,
            poll_interval_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("max_file_size", &self.max_file_size)
            .field(
                "api_key",
                &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" },
            )
            .field("api_base_url", &self.api_base_url)
            .field("wait_timeout_secs", &self.wait_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point the client at the CloudConvert sandbox.
    pub fn sandbox(self, enabled: bool) -> Self {
        if enabled {
            self.api_base_url(CLOUDCONVERT_SANDBOX_URL)
        } else {
            self
        }
    }

    pub fn wait_timeout_secs(mut self, secs: u64) -> Self {
        self.config.wait_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, Error> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(Error::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.wait_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Wait timeout must be ≥ 1 second".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "API URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        Ok(self.config)
    }
}

/// Configuration for the client-side upload queue.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of a running gateway, e.g. `http://localhost:3000`.
    pub server_url: String,

    /// Largest file accepted into the queue. Should match the server's limit.
    pub max_file_size: u64,

    /// Timeout for one conversion request in seconds. Default: 600.
    ///
    /// Covers upload, the server's remote wait and the download, so it
    /// must be longer than the server's own wait timeout.
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            request_timeout_secs: 600,
        }
    }
}

impl OrchestratorConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs.max(1);
        self
    }

    /// URL of the gateway's conversion endpoint.
    pub fn convert_url(&self) -> String {
        format!("{}/convert", self.server_url)
    }
}
