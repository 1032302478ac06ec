use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ConnError, Result};

/// A stored property value.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Per-connection key/value attribute bag.
///
/// Readers proceed concurrently and exclude writers. Distinct keys carry no
/// ordering guarantee beyond last-write-wins. The map is allocated on the
/// first write.
#[derive(Default)]
pub struct PropertyStore {
    map: RwLock<Option<HashMap<String, PropertyValue>>>,
}

impl PropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<V>(&self, key: impl Into<String>, value: V)
    where
        V: Any + Send + Sync,
    {
        self.map
            .write()
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Arc::new(value));
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<PropertyValue> {
        self.map
            .read()
            .as_ref()
            .and_then(|map| map.get(key))
            .cloned()
            .ok_or_else(|| ConnError::PropertyNotFound(key.to_string()))
    }

    /// Fetch the value stored under `key` as a concrete type.
    pub fn get_as<T>(&self, key: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get(key)?
            .downcast::<T>()
            .map_err(|_| ConnError::PropertyTypeMismatch(key.to_string()))
    }

    /// Remove `key`, returning the previous value if there was one.
    pub fn remove(&self, key: &str) -> Option<PropertyValue> {
        self.map.write().as_mut().and_then(|map| map.remove(key))
    }

    /// Whether a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.map
            .read()
            .as_ref()
            .is_some_and(|map| map.contains_key(key))
    }

    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.map.read().as_ref().map_or(0, HashMap::len)
    }

    /// Whether no property is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.map.read();
        let mut keys: Vec<&str> = guard
            .as_ref()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        keys.sort_unstable();
        f.debug_struct("PropertyStore").field("keys", &keys).finish()
    }
}
