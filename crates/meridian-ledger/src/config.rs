//! # Ledger Configuration
//!
//! Configuration management for the ledger service.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MERIDIAN_DATABASE_PATH=/var/lib/meridian/ledger.db                 │
//! │     MERIDIAN_STORE_TIMEOUT_MS=2000                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/meridian-ledger/ledger.toml (Linux)                      │
//! │     ~/Library/Application Support/com.meridian.ledger/ (macOS)         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [database]
//! path = "meridian.db"
//! max_connections = 5
//!
//! [store]
//! timeout_ms = 5000
//!
//! [numbering]
//! order_prefix = "ORD"
//! transfer_prefix = "TRF"
//! width = 6
//!
//! [promotions]
//! tie_break = "earliest_created"  # earliest_created | latest_created
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use meridian_core::numbering::NumberFormat;
use meridian_core::promotion::TieBreak;
use meridian_db::DbConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file shared by every ledger process.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a locked database before failing a statement.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("meridian.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Limits applied to every store call made by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Upper bound for a single store call (milliseconds). A call that
    /// exceeds it fails as `StorageUnavailable`.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_store_timeout() -> u64 {
    5000
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            timeout_ms: default_store_timeout(),
        }
    }
}

// =============================================================================
// Numbering Settings
// =============================================================================

/// Display format of allocated document numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default = "default_order_prefix")]
    pub order_prefix: String,

    #[serde(default = "default_transfer_prefix")]
    pub transfer_prefix: String,

    /// Zero-padding of the numeric part.
    #[serde(default = "default_width")]
    pub width: usize,
}

fn default_order_prefix() -> String {
    "ORD".to_string()
}

fn default_transfer_prefix() -> String {
    "TRF".to_string()
}

fn default_width() -> usize {
    6
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            order_prefix: default_order_prefix(),
            transfer_prefix: default_transfer_prefix(),
            width: default_width(),
        }
    }
}

// =============================================================================
// Promotion + Logging Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionSettings {
    /// Which promotion wins when two give the same discount.
    #[serde(default)]
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

// =============================================================================
// Main Ledger Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub promotions: PromotionSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
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

    /// Parses a TOML document and validates it. Environment is not consulted.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.timeout_ms must be greater than 0".into(),
            ));
        }

        for (field, prefix) in [
            ("numbering.order_prefix", &self.numbering.order_prefix),
            ("numbering.transfer_prefix", &self.numbering.transfer_prefix),
        ] {
            if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be non-empty and alphanumeric, got '{prefix}'"
                )));
            }
        }

        if self.numbering.order_prefix == self.numbering.transfer_prefix {
            return Err(ConfigError::Invalid(
                "numbering.order_prefix and numbering.transfer_prefix must differ".into(),
            ));
        }

        if !(1..=18).contains(&self.numbering.width) {
            return Err(ConfigError::Invalid(format!(
                "numbering.width must be between 1 and 18, got {}",
                self.numbering.width
            )));
        }

        Ok(())
    }

    /// Applies `MERIDIAN_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("MERIDIAN_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(timeout) = lookup("MERIDIAN_STORE_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.store.timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid MERIDIAN_STORE_TIMEOUT_MS"),
            }
        }

        if let Some(level) = lookup("MERIDIAN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(json) = lookup("MERIDIAN_LOG_JSON") {
            match json.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.logging.json = true,
                "0" | "false" | "no" => self.logging.json = false,
                _ => warn!(value = %json, "Ignoring invalid MERIDIAN_LOG_JSON"),
            }
        }

        if let Some(policy) = lookup("MERIDIAN_TIE_BREAK") {
            match policy.to_lowercase().as_str() {
                "earliest_created" | "earliest" => {
                    self.promotions.tie_break = TieBreak::EarliestCreated
                }
                "latest_created" | "latest" => self.promotions.tie_break = TieBreak::LatestCreated,
                _ => warn!(value = %policy, "Unknown tie-break policy in environment"),
            }
        }

        if let Some(prefix) = lookup("MERIDIAN_ORDER_PREFIX") {
            self.numbering.order_prefix = prefix;
        }

        if let Some(prefix) = lookup("MERIDIAN_TRANSFER_PREFIX") {
            self.numbering.transfer_prefix = prefix;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "meridian", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings for the configured database file.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn order_format(&self) -> NumberFormat {
        NumberFormat::new(self.numbering.order_prefix.clone(), self.numbering.width)
    }

    pub fn transfer_format(&self) -> NumberFormat {
        NumberFormat::new(self.numbering.transfer_prefix.clone(), self.numbering.width)
    }
}
