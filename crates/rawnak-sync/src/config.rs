//! # Sync Configuration
//!
//! Configuration management for the sync layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     RAWNAK_STORE_MODE=offline                                          │
//! │     RAWNAK_DEFAULT_BRANCH=main                                         │
//! │     RAWNAK_CACHE_BACKEND=memory                                        │
//! │     RAWNAK_CACHE_PATH=/var/lib/rawnak/cache.db                         │
//! │     RAWNAK_TX_MAX_ATTEMPTS=8                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/sales/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.rawnak.sales/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     StoreMode::Remote, branch "main", SQLite cache, 5 attempts         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [store]
//! mode = "remote"  # remote | offline
//!
//! [branch]
//! default_id = "main"
//!
//! [cache]
//! backend = "sqlite"  # sqlite | memory
//! path = "./rawnak_cache.db"
//!
//! [transaction]
//! max_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use rawnak_core::DEFAULT_BRANCH_ID;

use crate::error::{SyncError, SyncResult};

/// Upper bound accepted for `[transaction] max_attempts`.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 100;

// =============================================================================
// Store Mode
// =============================================================================

/// Whether a remote store is configured.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Store Mode Behavior                              │
/// │                                                                         │
/// │  REMOTE (Default)                                                      │
/// │  ────────────────                                                      │
/// │  • Collections mirror the authoritative store                          │
/// │  • Writes go straight to the store                                     │
/// │  • Sales run inside optimistic transactions                            │
/// │  • from_config: in-process MemoryStore, gone when the process exits   │
/// │                                                                         │
/// │  OFFLINE                                                               │
/// │  ───────                                                               │
/// │  • Remote store never contacted                                        │
/// │  • Collections come from the seed dataset                              │
/// │  • Edits are in-memory only                                            │
/// │  • record_sale fails with StoreUnavailable                             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    #[default]
    Remote,
    Offline,
}

impl StoreMode {
    pub fn is_remote(&self) -> bool {
        matches!(self, StoreMode::Remote)
    }
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreMode::Remote => write!(f, "remote"),
            StoreMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for StoreMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "online" => Ok(StoreMode::Remote),
            "offline" | "disabled" | "local" => Ok(StoreMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown store mode: '{}'. Valid options: remote, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Cache Backend
// =============================================================================

/// Which [`LocalCache`](rawnak_db::LocalCache) implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Memory,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Sqlite => write!(f, "sqlite"),
            CacheBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" | "mem" => Ok(CacheBackend::Memory),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown cache backend: '{}'. Valid options: sqlite, memory",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub mode: StoreMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDefaults {
    /// Branch used when nothing valid is persisted.
    #[serde(default = "default_branch_id")]
    pub default_id: String,
}

fn default_branch_id() -> String {
    DEFAULT_BRANCH_ID.to_string()
}

impl Default for BranchDefaults {
    fn default() -> Self {
        BranchDefaults {
            default_id: default_branch_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    /// SQLite file. Ignored by the memory backend.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("com", "rawnak", "sales")
        .map(|dirs| dirs.data_dir().join("cache.db"))
        .unwrap_or_else(|| PathBuf::from("./rawnak_cache.db"))
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            backend: CacheBackend::default(),
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSettings {
    /// Attempts before an optimistic transaction gives up with `Contention`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for TransactionSettings {
    fn default() -> Self {
        TransactionSettings {
            max_attempts: default_max_attempts(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub branch: BranchDefaults,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub transaction: TransactionSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for tests and demos: offline, memory cache.
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.store.mode = StoreMode::Offline;
        config.cache.backend = CacheBackend::Memory;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.branch.default_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "branch.default_id must not be empty".into(),
            ));
        }

        if self.transaction.max_attempts == 0
            || self.transaction.max_attempts > MAX_TRANSACTION_ATTEMPTS
        {
            return Err(SyncError::InvalidConfig(format!(
                "transaction.max_attempts must be between 1 and {}",
                MAX_TRANSACTION_ATTEMPTS
            )));
        }

        if self.cache.backend == CacheBackend::Sqlite
            && self.cache.path.as_os_str().is_empty()
        {
            return Err(SyncError::InvalidConfig(
                "cache.path is required for the sqlite backend".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("RAWNAK_STORE_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding store mode from environment");
                    self.store.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown store mode in environment"),
            }
        }

        if let Ok(id) = std::env::var("RAWNAK_DEFAULT_BRANCH") {
            self.branch.default_id = id;
        }

        if let Ok(backend) = std::env::var("RAWNAK_CACHE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => self.cache.backend = parsed,
                Err(_) => warn!(backend = %backend, "Unknown cache backend in environment"),
            }
        }

        if let Ok(path) = std::env::var("RAWNAK_CACHE_PATH") {
            debug!(path = %path, "Overriding cache path from environment");
            self.cache.path = PathBuf::from(path);
        }

        if let Ok(attempts) = std::env::var("RAWNAK_TX_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.transaction.max_attempts = n;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "rawnak", "sales")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn mode(&self) -> StoreMode {
        self.store.mode
    }

    pub fn default_branch_id(&self) -> &str {
        &self.branch.default_id
    }

    pub fn max_attempts(&self) -> u32 {
        self.transaction.max_attempts
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.mode(), StoreMode::Remote);
        assert_eq!(config.default_branch_id(), "main");
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.max_attempts(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("remote".parse::<StoreMode>().unwrap(), StoreMode::Remote);
        assert_eq!("OFFLINE".parse::<StoreMode>().unwrap(), StoreMode::Offline);
        assert!("cloud".parse::<StoreMode>().is_err());
        assert_eq!("memory".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [store]
            mode = "offline"

            [transaction]
            max_attempts = 9
            "#,
        )
        .unwrap();

        assert_eq!(config.mode(), StoreMode::Offline);
        assert_eq!(config.max_attempts(), 9);
        assert_eq!(config.default_branch_id(), "main");
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::offline();
        assert!(config.validate().is_ok());

        config.transaction.max_attempts = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.transaction.max_attempts = 5;
        config.branch.default_id = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("rawnak-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("sync.toml");

        let mut config = SyncConfig::offline();
        config.transaction.max_attempts = 7;
        config.save(Some(path.clone())).unwrap();

        let loaded = SyncConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.max_attempts(), 7);
        assert_eq!(loaded.cache.backend, CacheBackend::Memory);

        std::fs::remove_dir_all(dir).ok();
    }
}
