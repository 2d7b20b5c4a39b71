//! Persisted key/value profile store.
//!
//! Values are opaque strings. The core writes the last stage and reads the
//! guardian phone; everything else in the profile belongs to the UI.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CoreError, CoreResult};

/// Key holding the most recent stage name
pub const KEY_LAST_STAGE: &str = "sos_last_stage";
/// Key holding the guardian contact number
pub const KEY_GUARDIAN_PHONE: &str = "sos_guardian_phone";
/// Key holding the guardian contact name
pub const KEY_GUARDIAN_NAME: &str = "sos_guardian_name";
/// Key holding the UI theme
pub const KEY_THEME: &str = "theme";

/// Profile persistence capability
pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> CoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> CoreResult<()>;
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// Non-persistent store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| CoreError::Profile("profile lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::Profile("profile lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::Profile("profile lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryProfileStore::with_values([(KEY_THEME, "dark")]);
        assert_eq!(store.get(KEY_THEME).unwrap().as_deref(), Some("dark"));
        assert!(store.get(KEY_GUARDIAN_PHONE).unwrap().is_none());

        store.set(KEY_LAST_STAGE, "RISK").unwrap();
        assert_eq!(store.get(KEY_LAST_STAGE).unwrap().as_deref(), Some("RISK"));

        store.remove(KEY_LAST_STAGE).unwrap();
        assert!(store.get(KEY_LAST_STAGE).unwrap().is_none());
    }
}
