use serde::{Deserialize, Deserializer};
use std::convert::TryFrom;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Environment prefix used when none is given.
pub const DEFAULT_ENV_PREFIX: &str = "QUAY";

/// Configuration for the HTTP server that hosts the asset engine.
///
/// Initialized from environment variables with the "QUAY_" prefix, an
/// optional `quay` config file, or [`Default`].
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Ceiling for blocking worker threads. Defaults to CPU count * 15.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Idle seconds before a blocking worker exits. Defaults to 6 seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub worker_keep_alive_secs: u64,
    /// Server host address. Defaults to "127.0.0.1".
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port number. Defaults to 3000.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait for in-flight requests after a shutdown signal.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub http1_keep_alive: bool,
    #[serde(default)]
    pub http1_half_close: bool,
    /// Maximum buffer size for HTTP/1.x requests. Defaults to 512kb (524,288 bytes).
    #[serde(default = "default_max_buf_size")]
    pub http1_max_buf_size: usize,
    #[serde(default)]
    pub http1_title_case_headers: bool,
    #[serde(default)]
    pub http1_preserve_header_case: bool,
    #[serde(default)]
    pub http1_only: bool,
    #[cfg(feature = "http2")]
    #[serde(default)]
    pub http2_only: bool,
}

/// Implements conversion from the config crate's Config type to ServerConfig.
impl TryFrom<config::Config> for ServerConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> std::result::Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

impl ServerConfig {
    /// Converts the worker_keep_alive_secs value into a Duration.
    pub fn worker_keep_alive(&self) -> Duration {
        Duration::from_secs(self.worker_keep_alive_secs)
    }

    /// Converts the shutdown_timeout_secs value into a Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// The `host:port` pair the server binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_max_workers() -> usize {
    num_cpus::get() * 15
}

fn default_keep_alive_secs() -> u64 {
    6
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_max_buf_size() -> usize {
    524_288
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            worker_keep_alive_secs: default_keep_alive_secs(),
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            http1_keep_alive: true,
            http1_half_close: false,
            http1_max_buf_size: default_max_buf_size(),
            http1_title_case_headers: false,
            http1_preserve_header_case: false,
            http1_only: false,
            #[cfg(feature = "http2")]
            http2_only: false,
        }
    }
}

/// Where unresolved requests go in single-page-app mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpaFallback {
    /// No fallback; unresolved requests are not found.
    #[default]
    Disabled,
    /// Serve this public path (always `/`-prefixed) instead.
    Path(String),
}

impl SpaFallback {
    /// The fallback used when the option is simply switched on.
    pub fn index() -> Self {
        Self::Path("/index.html".to_string())
    }

    /// An explicit fallback path; a missing leading `/` is added.
    pub fn path(path: &str) -> Self {
        let trimmed = path.trim_start_matches('/');
        Self::Path(format!("/{trimmed}"))
    }

    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Disabled => None,
            Self::Path(path) => Some(path),
        }
    }
}

/// Accepts `true`/`false` (as booleans or strings) or a path string.
impl<'de> Deserialize<'de> for SpaFallback {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Path(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Self::Disabled,
            Raw::Flag(true) => Self::index(),
            Raw::Path(path) => match path.trim() {
                "" | "false" => Self::Disabled,
                "true" => Self::index(),
                other => Self::path(other),
            },
        })
    }
}

/// Options for the asset delivery engine.
///
/// Callbacks (the header customization hook and the not-found handler) are
/// attached on [`AssetsBuilder`](crate::AssetsBuilder), not here.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Directory that bounds all file access. Defaults to the current directory.
    #[serde(default = "default_served_root")]
    pub served_root: PathBuf,
    /// Probe the filesystem per request instead of building an index, and
    /// mark every response non-cacheable.
    #[serde(default)]
    pub development_mode: bool,
    /// Extensions tried after the bare path, in order. Defaults to `html`, `htm`.
    #[serde(default = "default_fallback_extensions")]
    pub fallback_extensions: Vec<String>,
    #[serde(default)]
    pub enable_gzip: bool,
    #[serde(default)]
    pub enable_brotli: bool,
    #[serde(default)]
    pub enable_etag: bool,
    #[serde(default)]
    pub single_page_app_fallback: SpaFallback,
    /// `max-age` for the Cache-Control header; no header when absent.
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
    /// Append `immutable` to Cache-Control when a max-age is set.
    #[serde(default)]
    pub immutable: bool,
    /// Case-insensitive regular expressions matched against public paths.
    ///
    /// A list in a config file, or one whitespace-separated string in the
    /// environment (commas are left alone, they are regex syntax).
    #[serde(default, deserialize_with = "deserialize_patterns")]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub allow_dotfiles: bool,
}

fn deserialize_patterns<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(patterns) => patterns,
        Raw::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
    })
}

fn default_served_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_fallback_extensions() -> Vec<String> {
    vec!["html".to_string(), "htm".to_string()]
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            served_root: default_served_root(),
            development_mode: false,
            fallback_extensions: default_fallback_extensions(),
            enable_gzip: false,
            enable_brotli: false,
            enable_etag: false,
            single_page_app_fallback: SpaFallback::Disabled,
            max_age_seconds: None,
            immutable: false,
            ignore_patterns: Vec::new(),
            allow_dotfiles: false,
        }
    }
}

impl AssetConfig {
    /// Default options rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            served_root: root.into(),
            ..Self::default()
        }
    }
}

impl TryFrom<config::Config> for AssetConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> std::result::Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

/// Server and asset configuration loaded together.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub assets: AssetConfig,
}

impl Settings {
    /// Loads settings from the environment with the "QUAY_" prefix.
    ///
    /// This method will:
    /// 1. Load environment variables from a .env file if present
    /// 2. Load configuration from a "quay" file (if it exists)
    /// 3. Override with environment variables prefixed with "QUAY_"
    ///
    /// `fallback_extensions` is read from the environment as comma-separated
    /// values, `ignore_patterns` as whitespace-separated ones.
    ///
    /// # Errors
    /// Returns an error if configuration loading or parsing fails.
    pub fn new() -> Result<Self> {
        Self::with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Same as [`Settings::new`] with a custom environment prefix.
    pub fn with_prefix(prefix: &str) -> Result<Self> {
        dotenv::dotenv().ok();

        let source = config::Config::builder()
            .add_source(config::File::with_name("quay").required(false))
            .add_source(
                config::Environment::with_prefix(prefix)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("fallback_extensions"),
            )
            .build()?;

        let server = ServerConfig::try_from(source.clone())?;
        let assets = AssetConfig::try_from(source)?;
        log::debug!("loaded settings with prefix {prefix}");

        Ok(Self { server, assets })
    }
}
