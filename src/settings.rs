//! Key-value settings store shared with the host environment
//!
//! The core never reaches into ambient global state: durable values (the
//! shared access token, consumption report watermarks) live behind the
//! [`SettingsStore`] trait and are re-read lazily, since they can be rotated
//! externally.

use crate::error::Result;
use crate::logging::get_logger;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Settings key under which the shared access token is stored
pub const TOKEN_KEY: &str = "token";

/// Settings key prefix for per-home daily consumption watermarks
pub const DAILY_CONSUMPTION_WATERMARK_PREFIX: &str = "last_logged_daily_consumption";

/// Opaque key-value store provided by the host environment
pub trait SettingsStore: Send + Sync {
    /// Read a value; `None` when the key was never set
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value durably
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Convenience accessors over any settings store
pub trait SettingsExt: SettingsStore {
    /// Read the shared access token, if present and non-empty
    fn access_token(&self) -> Option<String> {
        self.get(TOKEN_KEY)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|t| !t.trim().is_empty())
    }

    /// Store the shared access token
    fn set_access_token(&self, token: &str) -> Result<()> {
        self.set(TOKEN_KEY, Value::String(token.to_string()))
    }

    /// Read the daily consumption watermark for a home
    fn daily_consumption_watermark(&self, home_id: &str) -> Option<String> {
        self.get(&format!("{}_{}", DAILY_CONSUMPTION_WATERMARK_PREFIX, home_id))
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Store the daily consumption watermark for a home
    fn set_daily_consumption_watermark(&self, home_id: &str, date: &str) -> Result<()> {
        self.set(
            &format!("{}_{}", DAILY_CONSUMPTION_WATERMARK_PREFIX, home_id),
            Value::String(date.to_string()),
        )
    }
}

impl<T: SettingsStore + ?Sized> SettingsExt for T {}

/// File-backed settings store persisting to a JSON document
pub struct FileSettings {
    file_path: PathBuf,
    values: Mutex<HashMap<String, Value>>,
    logger: crate::logging::StructuredLogger,
}

impl FileSettings {
    /// Create a store backed by the given file, loading existing content
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let logger = get_logger("settings");
        let file_path = file_path.as_ref().to_path_buf();

        let values = if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            serde_json::from_str(&contents)?
        } else {
            logger.info("No settings file found, starting empty");
            HashMap::new()
        };

        Ok(Self {
            file_path,
            values: Mutex::new(values),
            logger,
        })
    }

    fn save_locked(&self, values: &HashMap<String, Value>) -> Result<()> {
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved settings to disk");
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.lock() {
            Ok(values) => values.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| crate::error::HeliosError::generic("settings store poisoned"))?;
        values.insert(key.to_string(), value);
        self.save_locked(&values)
    }
}

/// In-memory settings store, used in tests and as a non-durable fallback
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySettings {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with an access token
    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        let _ = store.set(TOKEN_KEY, Value::String(token.to_string()));
        store
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.lock() {
            Ok(values) => values.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| crate::error::HeliosError::generic("settings store poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_accessor_filters_blank_values() {
        let store = MemorySettings::new();
        assert_eq!(store.access_token(), None);

        store.set_access_token("  ").unwrap();
        assert_eq!(store.access_token(), None);

        store.set_access_token("abc123").unwrap();
        assert_eq!(store.access_token(), Some("abc123".to_string()));
    }

    #[test]
    fn watermark_keys_are_scoped_per_home() {
        let store = MemorySettings::new();
        store
            .set_daily_consumption_watermark("home-a", "2024-03-01")
            .unwrap();
        assert_eq!(
            store.daily_consumption_watermark("home-a"),
            Some("2024-03-01".to_string())
        );
        assert_eq!(store.daily_consumption_watermark("home-b"), None);
    }
}
