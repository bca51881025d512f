use crate::error::{GuardError, Result};
use crate::rate_limit::types::LimiterConfig;
use crate::resource::signature::FileKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Application that receives admitted guarded requests
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// Private file storage
    pub storage: StorageConfig,
    /// Bearer token verification
    pub auth: JwtConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directives (overridden by `RUST_LOG`)
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Seconds between sweeps of expired entries
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Named limiters
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
    /// Routes admitted through a limiter and forwarded upstream
    #[serde(default)]
    pub routes: Vec<GuardedRouteConfig>,
}

/// A rate limited route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardedRouteConfig {
    /// Route path (e.g., "/api/auth/login")
    pub path: String,
    /// Name of the limiter guarding this route
    pub limiter: String,
    /// Route description
    #[serde(default)]
    pub description: String,
}

/// Upstream application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL (e.g., "http://localhost:3000")
    pub url: String,
}

/// Private file storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the private files
    pub root: PathBuf,
    /// Public URL prefix the files are served under
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    /// Extensions this guard will serve
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// First path segments whose files require an ownership match
    #[serde(default = "default_protected_categories")]
    pub protected_categories: Vec<String>,
    /// Seed ownership records (resource URL -> owning scope)
    #[serde(default)]
    pub owners: HashMap<String, String>,
}

/// JWT verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for HS256/HS384/HS512
    pub secret: Option<String>,
    /// Public key (PEM) for RS256/RS384/RS512
    pub public_key: Option<String>,
    /// Algorithm to use
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    /// Issuer to validate
    pub issuer: Option<String>,
    /// Audience to validate
    pub audience: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_log_filter() -> String {
    "campus_guard=info,tower_http=info".to_string()
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_url_prefix() -> String {
    "/uploads".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_protected_categories() -> Vec<String> {
    vec!["students".to_string()]
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            limiters: vec![],
            routes: vec![],
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `root` with the default serving policy
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_prefix: default_url_prefix(),
            allowed_extensions: default_allowed_extensions(),
            protected_categories: default_protected_categories(),
            owners: HashMap::new(),
        }
    }
}

impl JwtConfig {
    /// HS256 verification with a shared secret
    pub fn hs256(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            public_key: None,
            algorithm: default_jwt_algorithm(),
            issuer: None,
            audience: None,
        }
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_rate_limiting()?;
        self.validate_storage()?;
        Ok(())
    }

    fn validate_rate_limiting(&self) -> Result<()> {
        let rate_limiting = &self.rate_limiting;
        let mut names = HashSet::new();

        if rate_limiting.cleanup_interval_secs == 0 {
            return Err(GuardError::Config(
                "Rate limiting cleanup_interval_secs must be > 0".to_string(),
            ));
        }

        for limiter in &rate_limiting.limiters {
            limiter.validate()?;
            if !names.insert(limiter.name.as_str()) {
                return Err(GuardError::Config(format!(
                    "Duplicate rate limiter name: {}",
                    limiter.name
                )));
            }
        }

        for route in &rate_limiting.routes {
            if !route.path.starts_with('/') {
                return Err(GuardError::Config(format!(
                    "Route path must start with '/': {}",
                    route.path
                )));
            }

            if !names.contains(route.limiter.as_str()) {
                return Err(GuardError::Config(format!(
                    "Route {} references unknown limiter: {}",
                    route.path, route.limiter
                )));
            }
        }

        if !rate_limiting.routes.is_empty() {
            let upstream = self.upstream.as_ref().ok_or_else(|| {
                GuardError::Config("Rate limited routes require an upstream".to_string())
            })?;

            if !upstream.url.starts_with("http://") && !upstream.url.starts_with("https://") {
                return Err(GuardError::Config(format!(
                    "Upstream URL must start with http:// or https://: {}",
                    upstream.url
                )));
            }
        }

        Ok(())
    }

    fn validate_storage(&self) -> Result<()> {
        let storage = &self.storage;

        if !storage.url_prefix.starts_with('/')
            || storage.url_prefix.len() < 2
            || storage.url_prefix.ends_with('/')
        {
            return Err(GuardError::Config(format!(
                "Storage url_prefix must look like '/uploads': {}",
                storage.url_prefix
            )));
        }

        if storage.allowed_extensions.is_empty() {
            return Err(GuardError::Config(
                "Storage allowed_extensions cannot be empty".to_string(),
            ));
        }

        for ext in &storage.allowed_extensions {
            if FileKind::from_extension(ext).is_none() {
                return Err(GuardError::Config(format!(
                    "Unsupported storage extension: {}",
                    ext
                )));
            }
        }

        Ok(())
    }
}
