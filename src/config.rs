//! Configuration files under `~/.config/rivulet/`.
//!
//! - `config.toml` holds application settings. It is optional; a missing or
//!   empty file yields `Config::default()` and unknown keys are logged, not
//!   rejected.
//! - `urls.toml` holds subscriptions as a table of category label to an array
//!   of feed URLs. An empty file means no feeds.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

/// Maximum size of either configuration file (1 MB).
const MAX_FILE_SIZE: u64 = 1_048_576;

/// Reads a config file, treating a missing file as empty.
fn read_optional(path: &Path) -> Result<String, ConfigError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_FILE_SIZE => {
            return Err(ConfigError::TooLarge(format!(
                "{} is {} bytes (max {} bytes)",
                path.display(),
                meta.len(),
                MAX_FILE_SIZE
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(String::new());
        }
        Err(e) => return Err(ConfigError::Io(e)),
        Ok(_) => {}
    }

    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(ConfigError::Io(e)),
    }
}

// ============================================================================
// Directories
// ============================================================================

/// Where configuration and the persisted snapshot live.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    /// `~/.config/rivulet` and `~/.cache/rivulet`.
    pub fn from_home() -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        let home = PathBuf::from(home);
        Ok(Self {
            config_dir: home.join(".config").join("rivulet"),
            cache_dir: home.join(".cache").join("rivulet"),
        })
    }

    /// Keeps everything, snapshot included, under one directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config_dir: dir.clone(),
            cache_dir: dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn subscriptions_file(&self) -> PathBuf {
        self.config_dir.join("urls.toml")
    }

    /// Snapshot location, honouring a `data_file` override from `config`.
    pub fn data_file(&self, config: &Config) -> PathBuf {
        config
            .data_file
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("data.json"))
    }
}

// ============================================================================
// Application settings
// ============================================================================

/// Top-level application configuration.
///
/// Custom Debug impl masks `sync_key`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the sync relay; `/sync` is appended. Sync is disabled when unset.
    pub sync_endpoint: Option<String>,

    /// Opaque key carried in every state document sent to the relay.
    #[serde(deserialize_with = "secret")]
    pub sync_key: Option<SecretString>,

    /// Override for the snapshot path.
    pub data_file: Option<PathBuf>,

    /// Per-request timeout for feed fetches and sync, in seconds.
    pub fetch_timeout_secs: u64,
}

fn secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_endpoint: None,
            sync_key: None,
            data_file: None,
            fetch_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("sync_endpoint", &self.sync_endpoint)
            .field("sync_key", &self.sync_key.as_ref().map(|_| "[REDACTED]"))
            .field("data_file", &self.data_file)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .finish()
    }
}

impl Config {
    const KNOWN_KEYS: [&'static str; 4] = [
        "sync_endpoint",
        "sync_key",
        "data_file",
        "fetch_timeout_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_optional(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(sync = config.sync_endpoint.is_some(), "Loaded configuration");
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Category label → feed URLs, as read from `urls.toml`.
///
/// ```toml
/// golang = ["https://go.dev/blog/feed.atom", "https://golang.cafe/rss"]
/// "" = ["https://uncategorized.example.com/rss"]
/// ```
///
/// Feeds under the empty label are fetched but appear in no category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Subscriptions {
    pub categories: BTreeMap<String, Vec<String>>,
}

impl Subscriptions {
    /// Parses a subscriptions document. Blank input is an empty set.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(content)
    }

    /// Reads `path`; a missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_optional(path)?;
        Ok(Self::parse(&content)?)
    }

    /// `(category, url)` pairs, category by category, URLs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categories
            .iter()
            .flat_map(|(cat, urls)| urls.iter().map(move |u| (cat.as_str(), u.trim())))
    }

    pub fn contains(&self, category: &str, url: &str) -> bool {
        self.categories
            .get(category)
            .is_some_and(|urls| urls.iter().any(|u| u.trim() == url))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
