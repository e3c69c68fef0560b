//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

/// Render a string as a TOML basic string, escaping as needed
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

impl Config {
    /// Serialize the full configuration as a commented config file
    pub fn to_toml(&self) -> String {
        format!(
            r#"# shoplist configuration

# SQLite database file (SHOPLIST_DB env var overrides)
db_path = {db_path}

# Item store tuning
[store]
reader_pool_size = {reader_pool_size}
busy_timeout_ms = {busy_timeout_ms}
# Pending writes before callers wait for the writer
channel_buffer = {channel_buffer}

# Live lists keep querying this long after the last viewer leaves
[live]
stop_timeout_ms = {stop_timeout_ms}

# Text used by `shoplist share`
[share]
header = {header}
checked_marker = {checked_marker}
unchecked_marker = {unchecked_marker}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# JSON file logging in addition to stderr
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = {log_file_rotation}  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            db_path = quoted(&self.db_path.to_string_lossy()),
            reader_pool_size = self.store.reader_pool_size,
            busy_timeout_ms = self.store.busy_timeout_ms,
            channel_buffer = self.store.channel_buffer,
            stop_timeout_ms = self.live.stop_timeout_ms,
            header = quoted(&self.share.header),
            checked_marker = quoted(&self.share.checked_marker),
            unchecked_marker = quoted(&self.share.unchecked_marker),
            log_level = quoted(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = quoted(&self.logging.file_dir.to_string_lossy()),
            log_file_rotation = quoted(self.logging.file_rotation.as_str()),
            log_file_prefix = quoted(&self.logging.file_prefix),
        )
    }
}
