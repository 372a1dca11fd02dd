//! Persisted JSON document holding both settings and cached resources
//!
//! Provides a `ConfigStore` that reads and writes a single `config.json` file.
//! Every access goes through one lock so a load and the write that follows it
//! can never interleave with another request's read-modify-write.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// File name of the persisted document inside the application root
pub const CONFIG_FILENAME: &str = "config.json";

/// Top-level section holding Firefly III connection settings
pub const SETTINGS_SECTION: &str = "firefly";

/// Top-level section holding cached resource entries
pub const CACHE_SECTION: &str = "resource_cache";

/// The whole persisted document
pub type Document = Map<String, Value>;

/// Errors that can occur when persisting the document
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing or replacing the file failed
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document could not be serialized
    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads and writes the persisted document
///
/// The file is loaded on every operation and rewritten on every mutation, so
/// it stays the single source of truth across restarts. Missing or corrupted
/// files are treated as an empty document.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    /// Creates a store backed by the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store backed by `config.json` inside the application root
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(CONFIG_FILENAME))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, returning an empty one if the file is absent or unreadable
    pub fn load(&self) -> Document {
        let _guard = self.guard();
        self.load_unlocked()
    }

    /// Replaces the whole document on disk
    pub fn write(&self, document: &Document) -> Result<(), StoreError> {
        let _guard = self.guard();
        self.write_unlocked(document)
    }

    /// Runs a read-only closure over a freshly loaded document
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        let document = self.load();
        f(&document)
    }

    /// Runs a read-modify-write cycle under the lock
    ///
    /// The closure returns whether it changed the document; nothing is written
    /// otherwise. Errors from the write are returned to the caller.
    pub fn try_modify(&self, f: impl FnOnce(&mut Document) -> bool) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut document = self.load_unlocked();
        if !f(&mut document) {
            return Ok(false);
        }
        self.write_unlocked(&document)?;
        Ok(true)
    }

    /// Like `try_modify`, but a failed write is logged and discarded
    ///
    /// Returns whether the change reached the disk.
    pub fn modify(&self, f: impl FnOnce(&mut Document) -> bool) -> bool {
        match self.try_modify(f) {
            Ok(written) => written,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "cache document not persisted");
                false
            }
        }
    }

    /// Applies updates to the `firefly` settings section and persists them
    pub fn update_settings(
        &self,
        updater: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<(), StoreError> {
        self.try_modify(|document| {
            updater(section_mut(document, SETTINGS_SECTION));
            true
        })
        .map(|_| ())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_unlocked(&self) -> Document {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Document::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable config document");
                return Document::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(document)) => document,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "config document is not a JSON object, ignoring it");
                Document::new()
            }
        }
    }

    /// Writes to a sibling temp file and renames it over the target
    fn write_unlocked(&self, document: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(document)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(err) = fs::write(&tmp_path, json).and_then(|_| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(err));
        }
        Ok(())
    }
}

/// Returns the named top-level section, replacing it with an empty object if
/// it is missing or not an object
pub(crate) fn section_mut<'a>(document: &'a mut Document, name: &str) -> &'a mut Map<String, Value> {
    let slot = document
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut().expect("section was just made an object")
}
