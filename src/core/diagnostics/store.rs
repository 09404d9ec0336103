//! Small key-value stores backing the crash history.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{DevbotError, Result};

const STORE_FILE_NAME: &str = "devbot_crashes.json";

/// Minimal persistent map, written in batches
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write every entry in one batch
    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| v.as_i64()))
    }
}

/// Volatile store, mainly for tests and hosts without a writable data dir
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert(key, value);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values.lock().clear();
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    /// Store at the platform data directory (`<data_local_dir>/devbot/devbot_crashes.json`)
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| DevbotError::storage("Could not determine data directory"))?;
        Ok(data_dir.join("devbot").join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_slice::<Value>(&data)? {
            Value::Object(map) => Ok(map),
            _ => Err(DevbotError::storage(format!(
                "Store file is not a JSON object: {:?}",
                self.path
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(map)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.io_lock.lock();
        Ok(self.read_map()?.get(key).cloned())
    }

    fn put_all(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let _guard = self.io_lock.lock();
        // A corrupted file is replaced rather than blocking new writes
        let mut map = self.read_map().unwrap_or_else(|e| {
            log::warn!("Discarding unreadable store {:?}: {}", self.path, e);
            Map::new()
        });
        for (key, value) in entries {
            map.insert(key, value);
        }
        self.write_map(&map)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.io_lock.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
