use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have defaults, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to index (used when `save` has no CLI args).
    pub music_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel indexing workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Scoring and lookup settings.
    pub matcher: MatcherConfig,
    /// Query result cache settings.
    pub cache: CacheConfig,
}

/// Scoring and lookup tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Width of a delta-histogram bucket in milliseconds.
    pub bucket_ms: u32,
    /// Maximum number of matches returned.
    pub max_results: usize,
    /// Distinct addresses per index lookup call.
    pub lookup_batch_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            bucket_ms: 100,
            max_results: 20,
            lookup_batch_size: 500,
        }
    }
}

impl MatcherConfig {
    /// Copy with `max_results` replaced by `limit` (at least 1) when given.
    pub fn with_limit(&self, limit: Option<usize>) -> Self {
        let mut config = self.clone();
        if let Some(limit) = limit {
            config.max_results = limit.max(1);
        }
        config
    }
}

/// Query result cache. Entries expire after `ttl_secs`; at most `capacity`
/// entries are kept (oldest evicted first). `capacity = 0` disables caching.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    /// Load config from `~/.config/trackprint/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<AppConfig>(contents)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("trackprint.db")
    } else {
        // Fallback: current directory
        PathBuf::from("trackprint.db")
    }
}
