/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Pin store access.
//!
//! The durable store is an external key-value service with `get`/`set`
//! only: no transactions, no locking, possibly mutated by another process.
//! Readers therefore always read fresh, and every structural write of the
//! desired set goes through the single [`writer::PinSetWriter`] queue.

pub mod types;
pub mod writer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

pub use types::DesiredPinSet;
pub use writer::{MutationOutcome, PinSetMutation, PinSetWriter};

pub const DESIRED_SET_KEY: &str = "desiredPins";
pub const AUTO_TRACK_KEY: &str = "autoTrackPinned";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store IO error: {0}")]
    Io(String),
    #[error("malformed store payload: {0}")]
    Malformed(String),
    #[error("desired set writer has shut down")]
    WriterClosed,
}

/// Durable key-value store shared with other instances of the process.
#[async_trait]
pub trait PinStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Fresh read of the desired set. Read failures degrade to the empty set.
pub async fn load_desired_set(store: &dyn PinStore) -> DesiredPinSet {
    match store.get(DESIRED_SET_KEY).await {
        Ok(value) => DesiredPinSet::from_value(value.as_ref()),
        Err(e) => {
            log::warn!("persistence: failed to read desired set ({e}), treating as empty");
            DesiredPinSet::default()
        },
    }
}

/// User-facing settings kept in the pin store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Manual pin/unpin on any entity updates the desired set.
    pub auto_track_pinned: bool,
}

impl Settings {
    /// Fresh read; absent, non-boolean or unreadable values mean `false`.
    pub async fn load(store: &dyn PinStore) -> Self {
        let auto_track_pinned = match store.get(AUTO_TRACK_KEY).await {
            Ok(Some(Value::Bool(enabled))) => enabled,
            Ok(Some(other)) => {
                log::warn!("persistence: ignoring non-boolean {AUTO_TRACK_KEY} value {other}");
                false
            },
            Ok(None) => false,
            Err(e) => {
                log::warn!("persistence: failed to read {AUTO_TRACK_KEY} ({e})");
                false
            },
        };
        Self { auto_track_pinned }
    }

    pub async fn save_auto_track(store: &dyn PinStore, enabled: bool) -> Result<(), StoreError> {
        store.set(AUTO_TRACK_KEY, Value::Bool(enabled)).await
    }
}

/// Process-local store. Used by tests and by embedders that persist
/// elsewhere.
#[derive(Debug, Default)]
pub struct MemoryPinStore {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<u64>,
    fail_next_get: Mutex<bool>,
    fail_next_set: Mutex<bool>,
}

impl MemoryPinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_desired_set(set: &DesiredPinSet) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .insert(DESIRED_SET_KEY.to_string(), set.to_value());
        store
    }

    /// Write bypassing the failure switches, as another process would.
    pub fn put(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn desired_set(&self) -> DesiredPinSet {
        DesiredPinSet::from_value(self.peek(DESIRED_SET_KEY).as_ref())
    }

    pub fn write_count(&self) -> u64 {
        *self.writes.lock()
    }

    pub fn fail_next_get(&self) {
        *self.fail_next_get.lock() = true;
    }

    pub fn fail_next_set(&self) {
        *self.fail_next_set.lock() = true;
    }
}

#[async_trait]
impl PinStore for MemoryPinStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if std::mem::take(&mut *self.fail_next_get.lock()) {
            return Err(StoreError::Unavailable("injected get failure".to_string()));
        }
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if std::mem::take(&mut *self.fail_next_set.lock()) {
            return Err(StoreError::Unavailable("injected set failure".to_string()));
        }
        self.values.lock().insert(key.to_string(), value);
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Store backed by a single JSON document on disk.
///
/// Writes go to a sibling temp file and are renamed into place so a crash
/// never leaves a truncated document behind.
#[derive(Debug)]
pub struct FilePinStore {
    path: PathBuf,
    io: tokio::sync::Mutex<()>,
}

impl FilePinStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            },
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(StoreError::Malformed(format!(
                "{} is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StoreError::Malformed(format!("{}: {e}", self.path.display()))),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("failed to create {}: {e}", parent.display())))?;
        }
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(format!("failed to replace {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl PinStore for FilePinStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _io = self.io.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _io = self.io.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.to_string(), value);
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_desired_set_degrades_to_empty_on_read_failure() {
        let store = MemoryPinStore::with_desired_set(&DesiredPinSet::from_urls(["https://a"]));
        store.fail_next_get();

        assert!(load_desired_set(&store).await.is_empty());
        assert_eq!(load_desired_set(&store).await.urls(), ["https://a"]);
    }

    #[tokio::test]
    async fn settings_default_to_auto_track_off() {
        let store = MemoryPinStore::new();
        assert!(!Settings::load(&store).await.auto_track_pinned);

        store.put(AUTO_TRACK_KEY, json!("yes"));
        assert!(!Settings::load(&store).await.auto_track_pinned);

        Settings::save_auto_track(&store, true)
            .await
            .expect("setting should be saved");
        assert!(Settings::load(&store).await.auto_track_pinned);
    }

    #[tokio::test]
    async fn file_store_persists_keys_across_instances() {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = dir.path().join("nested").join("store.json");

        let store = FilePinStore::new(&path);
        assert_eq!(store.get(DESIRED_SET_KEY).await, Ok(None));
        store
            .set(DESIRED_SET_KEY, json!({"https://a": 1}))
            .await
            .expect("set should succeed");
        store
            .set(AUTO_TRACK_KEY, json!(true))
            .await
            .expect("set should succeed");

        let reopened = FilePinStore::new(&path);
        assert_eq!(
            reopened.get(DESIRED_SET_KEY).await,
            Ok(Some(json!({"https://a": 1})))
        );
        assert_eq!(reopened.get(AUTO_TRACK_KEY).await, Ok(Some(json!(true))));
    }

    #[tokio::test]
    async fn file_store_rejects_non_object_document() {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[1, 2, 3]").expect("document should be written");

        let store = FilePinStore::new(&path);
        assert!(matches!(
            store.get(DESIRED_SET_KEY).await,
            Err(StoreError::Malformed(_))
        ));
    }
}
