//! Configuration for the inventory cache
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/vsphere-cache/config.toml)
//! - User configuration (~/.config/vsphere-cache/config.toml)
//! - Project configuration (./vsphere-cache.toml)
//! - Environment variables (`VSPHERE_CACHE_*`)
//!
//! Files are merged key by key, so a project file only needs to mention the
//! settings it changes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::inventory::NodeKind;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// vCenter connection settings
    pub vsphere: VsphereConfig,

    /// Resource fetcher settings
    pub fetch: FetchConfig,

    /// Cache tier settings
    pub cache: CacheConfig,

    /// Hierarchical loader settings
    pub loader: LoaderConfig,

    /// Background scheduler settings
    pub scheduler: SchedulerConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// HTTP API settings
    pub api: ApiSettings,
}

/// vCenter connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VsphereConfig {
    /// Logical server name used as the root of every cache scope
    pub server: String,

    /// Base URL of the vCenter, e.g. `https://vcenter.example.com`
    pub url: Option<String>,

    /// API user
    pub username: Option<String>,

    /// API password
    pub password: Option<String>,

    /// Accept self-signed certificates
    pub insecure: bool,

    /// VMs whose name contains this pattern are treated as templates
    pub template_pattern: String,
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            server: "vcenter".to_string(),
            url: None,
            username: None,
            password: None,
            insecure: false,
            template_pattern: "template".to_string(),
        }
    }
}

/// Resource fetcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hard timeout for a single inventory call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Maximum number of nodes kept per fetch
    pub caps: FetchCaps,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            caps: FetchCaps::default(),
        }
    }
}

/// Per-kind result caps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchCaps {
    pub datacenters: usize,
    pub clusters: usize,
    pub resource_pools: usize,
    pub datastores: usize,
    pub networks: usize,
    pub templates: usize,
}

impl Default for FetchCaps {
    fn default() -> Self {
        Self {
            datacenters: 100,
            clusters: 200,
            resource_pools: 200,
            datastores: 200,
            networks: 300,
            templates: 50,
        }
    }
}

impl FetchCaps {
    /// Cap for a node kind
    pub fn for_kind(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Datacenter => self.datacenters,
            NodeKind::Cluster => self.clusters,
            NodeKind::ResourcePool => self.resource_pools,
            NodeKind::Datastore => self.datastores,
            NodeKind::Network => self.networks,
            NodeKind::Template => self.templates,
        }
    }

    /// Same cap for every kind
    pub fn uniform(cap: usize) -> Self {
        Self {
            datacenters: cap,
            clusters: cap,
            resource_pools: cap,
            datastores: cap,
            networks: cap,
            templates: cap,
        }
    }
}

/// Cache tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep an in-process tier in front of the persistent tiers
    pub memory_enabled: bool,

    /// Directory for the disk tier (disabled when unset)
    pub disk_path: Option<PathBuf>,

    /// Redis URL for the shared tier (disabled when unset)
    pub redis_url: Option<String>,

    /// Key prefix in the shared tier
    pub key_prefix: String,

    /// gzip level (0-9) for shared tier payloads
    pub compression_level: u32,

    /// How long the shared tier keeps entries past their TTL
    #[serde(with = "humantime_serde")]
    pub retention: Duration,

    /// Timeout for a single shared tier call
    #[serde(with = "humantime_serde")]
    pub shared_timeout: Duration,

    /// Per-kind freshness
    pub ttl: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            disk_path: dirs::cache_dir().map(|dir| dir.join("vsphere-cache")),
            redis_url: None,
            key_prefix: "vsphere-cache".to_string(),
            compression_level: 6,
            retention: Duration::from_secs(24 * 3600),
            shared_timeout: Duration::from_millis(250),
            ttl: CacheTtls::default(),
        }
    }
}

/// Per-kind TTLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    #[serde(with = "humantime_serde")]
    pub datacenters: Duration,
    #[serde(with = "humantime_serde")]
    pub clusters: Duration,
    #[serde(with = "humantime_serde")]
    pub resource_pools: Duration,
    #[serde(with = "humantime_serde")]
    pub datastores: Duration,
    #[serde(with = "humantime_serde")]
    pub networks: Duration,
    #[serde(with = "humantime_serde")]
    pub templates: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            datacenters: Duration::from_secs(3600),
            clusters: Duration::from_secs(1800),
            resource_pools: Duration::from_secs(600),
            datastores: Duration::from_secs(600),
            networks: Duration::from_secs(600),
            templates: Duration::from_secs(3600),
        }
    }
}

impl CacheTtls {
    /// TTL for a node kind
    pub fn for_kind(&self, kind: NodeKind) -> Duration {
        match kind {
            NodeKind::Datacenter => self.datacenters,
            NodeKind::Cluster => self.clusters,
            NodeKind::ResourcePool => self.resource_pools,
            NodeKind::Datastore => self.datastores,
            NodeKind::Network => self.networks,
            NodeKind::Template => self.templates,
        }
    }

    /// Same TTL for every kind
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            datacenters: ttl,
            clusters: ttl,
            resource_pools: ttl,
            datastores: ttl,
            networks: ttl,
            templates: ttl,
        }
    }
}

/// Hierarchical loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How long a request waits for a fetch on a cache miss
    #[serde(with = "humantime_serde")]
    pub sync_wait: Duration,

    /// Number of children whose next tier is pre-fetched
    pub prefetch_fanout: usize,

    /// Retry hint sent with `loading` responses
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sync_wait: Duration::from_secs(3),
            prefetch_fanout: 2,
            retry_after: Duration::from_secs(5),
        }
    }
}

/// Background scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum refresh tasks in flight
    pub max_concurrency: usize,

    /// Interval of the periodic essential sync (zero disables it)
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            sync_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Address to bind
    pub bind_address: String,

    /// Allow cross-origin requests
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            enable_cors: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load from a specific file on top of the defaults
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Config::default().merge_from_file(path.as_ref())
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = vec![PathBuf::from("/etc/vsphere-cache/config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vsphere-cache/config.toml"));
        }

        paths.push(PathBuf::from("vsphere-cache.toml"));

        if let Ok(env_config) = std::env::var("VSPHERE_CACHE_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let overlay: JsonValue = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            _ => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        };

        self.merge(overlay).map_err(parse_error)
    }

    /// Merge a partial document into this configuration
    fn merge(&self, overlay: JsonValue) -> Result<Config, String> {
        let mut base = serde_json::to_value(self).map_err(|e| e.to_string())?;
        merge_values(&mut base, overlay);
        serde_json::from_value(base).map_err(|e| e.to_string())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(server) = std::env::var("VSPHERE_CACHE_SERVER") {
            self.vsphere.server = server;
        }

        if let Ok(url) = std::env::var("VSPHERE_CACHE_URL") {
            self.vsphere.url = Some(url);
        }

        if let Ok(user) = std::env::var("VSPHERE_CACHE_USERNAME") {
            self.vsphere.username = Some(user);
        }

        if let Ok(password) = std::env::var("VSPHERE_CACHE_PASSWORD") {
            self.vsphere.password = Some(password);
        }

        if std::env::var("VSPHERE_CACHE_INSECURE").is_ok() {
            self.vsphere.insecure = true;
        }

        if let Ok(secs) = std::env::var("VSPHERE_CACHE_FETCH_TIMEOUT_SECS") {
            if let Ok(n) = secs.parse() {
                self.fetch.timeout = Duration::from_secs(n);
            }
        }

        if let Ok(url) = std::env::var("VSPHERE_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(url);
        }

        if let Ok(path) = std::env::var("VSPHERE_CACHE_DISK_PATH") {
            self.cache.disk_path = Some(PathBuf::from(path));
        }

        if let Ok(n) = std::env::var("VSPHERE_CACHE_MAX_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                self.scheduler.max_concurrency = n;
            }
        }

        if let Ok(level) = std::env::var("VSPHERE_CACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = std::env::var("VSPHERE_CACHE_LOG_FORMAT") {
            if format.eq_ignore_ascii_case("json") {
                self.logging.format = LogFormat::Json;
            }
        }

        if let Ok(bind) = std::env::var("VSPHERE_CACHE_BIND") {
            self.api.bind_address = bind;
        }
    }

    /// Check invariants between settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.max_concurrency == 0 {
            return Err(invalid("scheduler.max_concurrency", "must be at least 1"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(invalid("fetch.timeout", "must be greater than zero"));
        }
        if self.loader.sync_wait > self.fetch.timeout {
            return Err(invalid(
                "loader.sync_wait",
                "must not exceed fetch.timeout",
            ));
        }
        if self.cache.compression_level > 9 {
            return Err(invalid("cache.compression_level", "must be between 0 and 9"));
        }
        if self.vsphere.server.is_empty() || self.vsphere.server.contains('/') {
            return Err(invalid("vsphere.server", "must be a non-empty name without '/'"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Recursively merge `overlay` into `base`; objects merge, everything else replaces
fn merge_values(base: &mut JsonValue, overlay: JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
