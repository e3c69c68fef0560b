//! Item store and live sequence settings

use crate::live::SharingPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Item store tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Maximum pooled reader connections
    pub reader_pool_size: u32,
    /// How long a connection waits on a locked database (ms)
    pub busy_timeout_ms: u64,
    /// Writes that may queue up before submitting blocks
    pub channel_buffer: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            reader_pool_size: 4,
            busy_timeout_ms: 5000,
            channel_buffer: 1024,
        }
    }
}

/// Store settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileStore {
    pub reader_pool_size: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
    pub channel_buffer: Option<usize>,
}

impl StoreSettings {
    pub fn from_file(file: Option<FileStore>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            reader_pool_size: file
                .reader_pool_size
                .unwrap_or(defaults.reader_pool_size)
                .max(1),
            busy_timeout_ms: file.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
            channel_buffer: file
                .channel_buffer
                .unwrap_or(defaults.channel_buffer)
                .max(1),
        }
    }
}

/// How long live sequences keep their queries after the last observer leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSettings {
    /// Grace period in ms; 0 stops immediately
    pub stop_timeout_ms: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLive {
    pub stop_timeout_ms: Option<u64>,
}

impl LiveSettings {
    pub fn from_file(file: Option<FileLive>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            stop_timeout_ms: file
                .stop_timeout_ms
                .unwrap_or(Self::default().stop_timeout_ms),
        }
    }

    pub fn policy(&self) -> SharingPolicy {
        SharingPolicy::while_subscribed(Duration::from_millis(self.stop_timeout_ms))
    }
}
