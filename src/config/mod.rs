//! Configuration for shoplist
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/shoplist/config.toml)
//! 3. Built-in defaults (lowest priority)

use serde::Deserialize;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod logging;
mod serialization;
mod share;
mod store;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use logging::{FileLogging, LogRotation, LoggingConfig};
pub use share::FileShare;
pub use store::{FileLive, FileStore, LiveSettings, StoreSettings};

use crate::live::SharingPolicy;
use crate::share::ShareFormat;
use crate::store::StoreConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "SHOPLIST_DB";

/// Default database location: `<data_dir>/shoplist/shopping.db`
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("shoplist").join("shopping.db"))
        .unwrap_or_else(|| PathBuf::from("./data/shopping.db"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// Item store tuning
    pub store: StoreSettings,

    /// Live sequence sharing policy
    pub live: LiveSettings,

    /// Labels for the share export
    pub share: ShareFormat,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            store: StoreSettings::default(),
            live: LiveSettings::default(),
            share: ShareFormat::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Settings for [`ItemStore::open`](crate::store::ItemStore::open)
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            db_path: self.db_path.clone(),
            reader_pool_size: self.store.reader_pool_size,
            busy_timeout_ms: self.store.busy_timeout_ms,
            channel_buffer: self.store.channel_buffer,
        }
    }

    pub fn sharing_policy(&self) -> SharingPolicy {
        self.live.policy()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub db_path: Option<String>,

    /// Optional [store] section
    pub store: Option<FileStore>,

    /// Optional [live] section
    pub live: Option<FileLive>,

    /// Optional [share] section
    pub share: Option<FileShare>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/shoplist/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("shoplist").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A config file that exists but cannot be read or parsed ends the
    /// process with an error box on stderr.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                    eprintln!("║  CONFIG ERROR - Failed to parse configuration file          ║");
                    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                    eprintln!("  File: {}\n", path.display());
                    eprintln!("  Error: {}\n", e);
                    eprintln!("  Tip: Check for:\n");
                    eprintln!("    - Missing quotes around string values");
                    eprintln!("    - Invalid boolean values (use true/false)");
                    eprintln!("    - Typos in section names\n");
                    eprintln!("  To reset, run `shoplist config --reset`.\n");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Cannot read configuration file              ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  File: {}\n", path.display());
                eprintln!("  Error: {}\n", e);
                std::process::exit(1);
            }
        }
    }

    pub(crate) fn parse(contents: &str) -> Result<FileConfig, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Self {
        let file = Self::load_file_config();
        let db_path_env = std::env::var(DB_PATH_ENV).ok();
        Self::from_file(file, db_path_env)
    }

    /// Merge a parsed file (and the optional env override) over defaults
    pub(crate) fn from_file(file: FileConfig, db_path_env: Option<String>) -> Self {
        // Database path: env > file > default
        let db_path = db_path_env
            .filter(|p| !p.trim().is_empty())
            .or(file.db_path)
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        Self {
            db_path,
            store: StoreSettings::from_file(file.store),
            live: LiveSettings::from_file(file.live),
            share: ShareFormat::from_file(file.share),
            logging: LoggingConfig::from_file(file.logging),
        }
    }
}
