use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default max age of a cached lookup in milliseconds (5 minutes)
pub const DEFAULT_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Timeout for a single fetch attempt in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Retries after the first attempt when a response body is not valid JSON
pub const FETCH_MAX_RETRIES: usize = 2;

/// Tags requested per page from the GitHub API
pub const GITHUB_PAGE_SIZE: usize = 100;

/// Default interval between GitHub rate limit polls in milliseconds (1 minute)
pub const DEFAULT_RATE_LIMIT_POLL_MS: u64 = 60 * 1000;

pub const DEFAULT_NPM_SOURCE: &str = "https://registry.npmjs.org";
pub const DEFAULT_GITHUB_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_FILES_SOURCE: &str = "https://data.jsdelivr.com";
pub const DEFAULT_LISTING_PATH: &str = "flat";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub cache: CacheConfig,
    pub npm: NpmConfig,
    pub github: GitHubConfig,
    pub files: FilesConfig,
}

impl Config {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Fills in values that may come from the environment.
    pub fn with_env(mut self) -> Self {
        if self.github.token.is_none() {
            self.github.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Max age of a successful lookup in milliseconds
    pub max_age_ms: u64,
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
        }
    }
}

/// npm registry configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NpmConfig {
    /// Registry base URLs, queried concurrently; order decides which failure is reported
    pub sources: Vec<String>,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            sources: vec![DEFAULT_NPM_SOURCE.to_string()],
        }
    }
}

/// GitHub API configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GitHubConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Rate limit poll interval in milliseconds, 0 disables polling
    pub rate_limit_poll_ms: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GITHUB_BASE_URL.to_string(),
            token: None,
            rate_limit_poll_ms: DEFAULT_RATE_LIMIT_POLL_MS,
        }
    }
}

/// File listing endpoint configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FilesConfig {
    pub source: String,
    pub listing_path: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_FILES_SOURCE.to_string(),
            listing_path: DEFAULT_LISTING_PATH.to_string(),
        }
    }
}

/// Returns the path to the data directory for pkgmeta.
/// Uses $XDG_DATA_HOME/pkgmeta if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/pkgmeta,
/// or ./pkgmeta if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the file listing database.
pub fn db_path() -> PathBuf {
    data_dir().join("listings.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("pkgmeta.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("pkgmeta")
}
