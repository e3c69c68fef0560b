//! Share export labels

use crate::share::ShareFormat;
use serde::Deserialize;

/// Share labels as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileShare {
    pub header: Option<String>,
    pub checked_marker: Option<String>,
    pub unchecked_marker: Option<String>,
}

impl ShareFormat {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileShare>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            header: file.header.unwrap_or(defaults.header),
            checked_marker: file.checked_marker.unwrap_or(defaults.checked_marker),
            unchecked_marker: file.unchecked_marker.unwrap_or(defaults.unchecked_marker),
        }
    }
}
