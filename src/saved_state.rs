// taskdeck/src/saved_state.rs

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, fs, io, path::Path, sync::Arc};
use tracing::warn;

use crate::error::{Error, Result};

pub const KEY_SEARCH_QUERY: &str = "search_query";
pub const KEY_TASK: &str = "task";
pub const KEY_TASK_NAME: &str = "task_name";
pub const KEY_TASK_IMPORTANCE: &str = "task_importance";

/// Restart-durable per-screen state: an opaque key/value bag the host saves and restores.
#[derive(Clone, Debug, Default)]
pub struct SavedState {
    values: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl SavedState {
    pub fn new() -> Self { Self::default() }

    /// A value that no longer decodes as `T` reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let v = self.values.read().get(key).cloned()?;
        match serde_json::from_value(v) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(key, error = %e, "discarding saved value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => { self.values.write().insert(key.to_string(), v); }
            Err(e) => warn!(key, error = %e, "value not saved"),
        }
    }

    pub fn remove(&self, key: &str) -> bool { self.values.write().remove(key).is_some() }
    pub fn contains(&self, key: &str) -> bool { self.values.read().contains_key(key) }
    pub fn keys(&self) -> Vec<String> { self.values.read().keys().cloned().collect() }

    pub fn load(path: &Path) -> Result<Self> {
        let map = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| Error::corrupt("saved state", e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { values: Arc::new(RwLock::new(map)) })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
        let text = serde_json::to_string_pretty(&*self.values.read()).map_err(|e| Error::corrupt("saved state", e))?;
        fs::write(path, text)?;
        Ok(())
    }
}
