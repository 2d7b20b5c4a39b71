//! JSON-file profile store.
//!
//! The whole profile is one flat string map. Changes apply in memory at once
//! and the file is rewritten on the blocking pool, so callers on the runtime
//! never wait on disk. Outside a runtime the file is written inline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use sos_core::{CoreError, CoreResult, ProfileStore};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{DeviceError, DeviceResult};

/// Profile persisted to a JSON file
#[derive(Debug)]
pub struct FileProfileStore {
    values: RwLock<Versioned>,
    writer: Arc<ProfileWriter>,
}

#[derive(Debug, Default)]
struct Versioned {
    version: u64,
    map: BTreeMap<String, String>,
}

/// Serialises file writes; an older snapshot never replaces a newer one
#[derive(Debug)]
struct ProfileWriter {
    path: PathBuf,
    written: Mutex<u64>,
}

impl ProfileWriter {
    fn write(&self, version: u64, values: &BTreeMap<String, String>) -> CoreResult<()> {
        let mut written = self
            .written
            .lock()
            .map_err(|_| CoreError::Profile("profile writer poisoned".to_string()))?;
        if *written >= version {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(values)
            .map_err(|e| CoreError::Profile(e.to_string()))?;
        std::fs::write(&self.path, text)
            .map_err(|e| CoreError::Profile(format!("{}: {}", self.path.display(), e)))?;
        *written = version;
        Ok(())
    }
}

impl FileProfileStore {
    /// Open the store at `path`; a missing file is an empty profile
    pub fn open(path: impl AsRef<Path>) -> DeviceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                DeviceError::Profile(format!("{} is not a profile: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = map.len(), "Profile loaded");
        Ok(Self {
            values: RwLock::new(Versioned { version: 0, map }),
            writer: Arc::new(ProfileWriter {
                path,
                written: Mutex::new(0),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    /// Wait until the file holds every change made so far
    pub async fn flush(&self) -> DeviceResult<()> {
        let (version, map) = self.snapshot()?;
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || writer.write(version, &map))
            .await
            .map_err(|e| DeviceError::Profile(format!("profile writer failed: {}", e)))??;
        Ok(())
    }

    fn snapshot(&self) -> CoreResult<(u64, BTreeMap<String, String>)> {
        let values = self.read()?;
        Ok((values.version, values.map.clone()))
    }

    fn read(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, Versioned>> {
        self.values
            .read()
            .map_err(|_| CoreError::Profile("profile lock poisoned".to_string()))
    }

    /// Apply `change` in memory; persist when it reports a modification
    fn update<F>(&self, change: F) -> CoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let (version, map) = {
            let mut values = self
                .values
                .write()
                .map_err(|_| CoreError::Profile("profile lock poisoned".to_string()))?;
            if !change(&mut values.map) {
                return Ok(());
            }
            values.version += 1;
            (values.version, values.map.clone())
        };

        match Handle::try_current() {
            Ok(runtime) => {
                let writer = self.writer.clone();
                runtime.spawn_blocking(move || {
                    if let Err(e) = writer.write(version, &map) {
                        warn!(error = %e, "Could not save profile");
                    }
                });
                Ok(())
            }
            Err(_) => self.writer.write(version, &map),
        }
    }
}

impl ProfileStore for FileProfileStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.read()?.map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.update(|map| {
            if map.get(key).map(String::as_str) == Some(value) {
                return false;
            }
            map.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.update(|map| map.remove(key).is_some())
    }
}
