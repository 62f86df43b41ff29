//! Configuration management for webproxy.
//!
//! Configuration is read from `~/.config/webproxy/config.toml` unless a path
//! is given explicitly. Every section is optional; missing keys fall back to
//! their defaults.

pub mod auth;
pub mod cache;

pub use auth::{AuthConfig, AuthKind};
pub use cache::{CacheConfig, CacheScope};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    pub auth: AuthConfig,
    pub cache: CacheConfig,
    pub content: ContentConfig,
    pub static_html: StaticHtmlConfig,
    pub interceptors: InterceptorConfig,
    pub rewrite: RewriteConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Initial URL rendered when neither the caller nor the session names one
    pub base_url: Option<String>,

    /// Service URL the CAS ticket is attached to (falls back to `base_url`)
    pub cas_service_url: Option<String>,
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum fetches per request, redirect hops included (default: 5)
    pub max_redirects: usize,

    /// Transport timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent string to use
    pub user_agent: Option<String>,

    /// Extra request header names; paired by index with `header_values`
    pub header_names: Vec<String>,

    /// Extra request header values
    pub header_values: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            timeout_secs: 30,
            user_agent: Some(concat!("webproxy/", env!("CARGO_PKG_VERSION")).to_string()),
            header_names: Vec::new(),
            header_values: Vec::new(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pair up the configured extra headers.
    ///
    /// Returns `None` when the name and value arrays differ in length; the
    /// caller must then send no extra headers at all.
    pub fn extra_headers(&self) -> Option<Vec<(String, String)>> {
        if self.header_names.len() != self.header_values.len() {
            return None;
        }
        Some(
            self.header_names
                .iter()
                .cloned()
                .zip(self.header_values.iter().cloned())
                .collect(),
        )
    }
}

/// Content types rendered through the rewrite pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Case-insensitive regular expressions, each matched against the whole
    /// normalized content type, in order
    pub accepted_types: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            accepted_types: vec!["text/html".to_string(), "application/xhtml.*".to_string()],
        }
    }
}

/// Static markup written around rewritten content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticHtmlConfig {
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl StaticHtmlConfig {
    pub fn header(&self) -> Option<&str> {
        non_empty(self.header.as_deref())
    }

    pub fn footer(&self) -> Option<&str> {
        non_empty(self.footer.as_deref())
    }
}

/// Names of pluggable request/response interceptors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub pre: Option<String>,
    pub post: Option<String>,
}

impl InterceptorConfig {
    pub fn pre(&self) -> Option<&str> {
        non_empty(self.pre.as_deref())
    }

    pub fn post(&self) -> Option<&str> {
        non_empty(self.post.as_deref())
    }
}

/// Markup filter chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Filter names. The first entry sits closest to the output; the parser
    /// feeds the last one.
    pub filters: Vec<String>,

    /// Elements removed, with their content, by the `strip-elements` filter
    pub strip_elements: Vec<String>,

    /// Element id kept by the `clip` filter
    pub clip_id: Option<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            filters: vec!["absolute-urls".to_string()],
            strip_elements: vec!["script".to_string(), "noscript".to_string()],
            clip_id: None,
        }
    }
}

/// Treat empty strings as unset.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file yields the default configuration; an invalid one is an
    /// error.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })
    }

    /// Write the configuration back, e.g. after remembering credentials.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/webproxy/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("webproxy").join("config.toml"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
