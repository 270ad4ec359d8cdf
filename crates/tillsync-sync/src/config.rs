//! # Sync Configuration
//!
//! Configuration management for the offline sale sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILLSYNC_API_URL=https://pos.example.com/api                       │
//! │     TILLSYNC_SYNC_INTERVAL_SECS=30                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tillsync/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.tillsync.agent/sync.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [api]
//! base_url = "https://pos.example.com/api"
//! request_timeout_secs = 30
//!
//! [sync]
//! interval_secs = 30
//!
//! [storage]
//! database_path = "/var/lib/tillsync/tillsync.db"
//! legacy_queue_path = "/var/lib/tillsync/offline-sales-queue.json"
//!
//! [device]
//! tenant_id = "acme"
//! branch_id = "downtown"
//! terminal_id = "till-3"
//! actor_id = "kiosk"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

/// File name of the legacy unscoped queue inside the data directory.
pub const LEGACY_QUEUE_FILE: &str = "offline-sales-queue.json";

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "tillsync.db";

// =============================================================================
// API Settings
// =============================================================================

/// Where the sales endpoints live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL; `/sales` and `/sales/sync` are appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds). A hung batch keeps the in-flight
    /// guard set until this expires.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Static bearer token for headless terminals without a login session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval of the periodic sync timer (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where local state lives. Unset paths resolve into the platform data dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// The old unscoped queue file, absorbed on first sync then deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_queue_path: Option<PathBuf>,
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Fixed identity of a headless terminal.
///
/// Tenant and actor are required for a scope; without them every sync
/// attempt is a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_id: Option<String>,

    /// User the queued sales are attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl SyncConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
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

        config.apply_overrides(|key| std::env::var(key).ok());

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

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TILLSYNC_*` overrides from `lookup` (the process environment
    /// in [`SyncConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TILLSYNC_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(token) = lookup("TILLSYNC_API_TOKEN") {
            self.api.token = Some(token);
        }

        if let Some(secs) = lookup("TILLSYNC_REQUEST_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.api.request_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TILLSYNC_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(secs) = lookup("TILLSYNC_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => {
                    debug!(interval_secs = s, "Overriding sync interval from environment");
                    self.sync.interval_secs = s;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid TILLSYNC_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(path) = lookup("TILLSYNC_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("TILLSYNC_LEGACY_QUEUE_PATH") {
            self.storage.legacy_queue_path = Some(PathBuf::from(path));
        }

        if let Some(id) = lookup("TILLSYNC_TENANT_ID") {
            self.device.tenant_id = Some(id);
        }

        if let Some(id) = lookup("TILLSYNC_BRANCH_ID") {
            self.device.branch_id = Some(id);
        }

        if let Some(id) = lookup("TILLSYNC_TERMINAL_ID") {
            self.device.terminal_id = Some(id);
        }

        if let Some(id) = lookup("TILLSYNC_ACTOR_ID") {
            self.device.actor_id = Some(id);
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "tillsync", "agent")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database file: configured path, else the platform data dir, else cwd.
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .or_else(|| Self::project_dirs().map(|d| d.data_dir().join(DATABASE_FILE)))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
    }

    /// Legacy queue file, resolved like [`SyncConfig::database_path`].
    pub fn legacy_queue_path(&self) -> PathBuf {
        self.storage
            .legacy_queue_path
            .clone()
            .or_else(|| Self::project_dirs().map(|d| d.data_dir().join(LEGACY_QUEUE_FILE)))
            .unwrap_or_else(|| PathBuf::from(LEGACY_QUEUE_FILE))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}
