//! Durable storage for the session.
//!
//! The session lives in three independent string entries of a key-value store:
//! `bearer` (raw token), `profile` and `reputation` (both JSON). Reads never fail;
//! anything missing or unparsable is treated as absent.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use tracing::warn;

use crate::errors::StoreError;
use crate::user::{Profile, Reputation};

pub const BEARER_KEY: &str = "bearer";
pub const PROFILE_KEY: &str = "profile";
pub const REPUTATION_KEY: &str = "reputation";

/// A string key-value store that can be read and replaced as a whole
pub trait KeyValueStore: Send + Sync {
    fn read(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Replace the full contents in one step
    fn write(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        (**self).read()
    }

    fn write(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        (**self).write(entries)
    }
}

/// Store kept in process memory, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single raw entry, bypassing the session encoding
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    /// Remove a single raw entry
    pub fn remove_raw(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.lock().clone())
    }

    fn write(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        *self.lock() = entries;
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed over
/// the target, so readers see either the old or the new contents.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&serde_json::to_vec_pretty(&entries)?)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;

        Ok(())
    }
}

/// The three session fields as found in storage, each independently optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSession {
    pub bearer: Option<String>,
    pub profile: Option<Profile>,
    pub reputation: Option<Reputation>,
}

impl StoredSession {
    pub fn is_empty(&self) -> bool {
        self.bearer.is_none() && self.profile.is_none() && self.reputation.is_none()
    }
}

/// Typed view over a [`KeyValueStore`] holding the session entries
pub struct SessionStore {
    backend: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Read the session fields. Missing or malformed entries come back as `None`.
    pub fn load(&self) -> StoredSession {
        let entries = match self.backend.read() {
            Ok(entries) => entries,
            Err(err) => {
                warn!("Failed to read session storage, treating it as empty: {}", err);
                return StoredSession::default();
            }
        };

        StoredSession {
            bearer: entries
                .get(BEARER_KEY)
                .filter(|token| !token.is_empty())
                .cloned(),
            profile: decode_entry(&entries, PROFILE_KEY),
            reputation: decode_entry(&entries, REPUTATION_KEY),
        }
    }

    /// Write all three fields in a single store write
    pub fn save(
        &self,
        bearer: &str,
        profile: &Profile,
        reputation: &Reputation,
    ) -> Result<(), StoreError> {
        let mut entries = self.existing_entries();
        entries.insert(BEARER_KEY.to_string(), bearer.to_string());
        entries.insert(PROFILE_KEY.to_string(), serde_json::to_string(profile)?);
        entries.insert(REPUTATION_KEY.to_string(), serde_json::to_string(reputation)?);

        self.backend.write(entries)
    }

    /// Remove the three session fields, leaving any other entries in place
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.existing_entries();
        for key in [BEARER_KEY, PROFILE_KEY, REPUTATION_KEY] {
            entries.remove(key);
        }

        self.backend.write(entries)
    }

    fn existing_entries(&self) -> BTreeMap<String, String> {
        self.backend.read().unwrap_or_else(|err| {
            warn!("Session storage unreadable, overwriting it: {}", err);
            BTreeMap::new()
        })
    }
}

fn decode_entry<T: serde::de::DeserializeOwned>(
    entries: &BTreeMap<String, String>,
    key: &str,
) -> Option<T> {
    let raw = entries.get(key)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, "Ignoring malformed session entry: {}", err);
            None
        }
    }
}
