//! Collection store — pluggable backend for durable named collections.
//!
//! The registry and the history store write whole collections by name.
//! The store maps them to physical storage: memory for tests, JSON files
//! on the local filesystem for production.

use async_trait::async_trait;
use dashmap::DashMap;
use sentinel_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable key-value collections, independent of process lifetime.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Read a whole collection. `None` when it was never written.
    async fn load(&self, collection: &str) -> Result<Option<Value>>;

    /// Replace a whole collection.
    async fn save(&self, collection: &str, value: &Value) -> Result<()>;

    /// Drop a collection. Missing collections are not an error.
    async fn remove(&self, collection: &str) -> Result<()>;

    /// Physical location of a collection (for human inspection).
    fn location(&self, collection: &str) -> String;
}

/// Load a collection as a list of records. Missing collections are empty.
pub async fn load_list<T: DeserializeOwned>(
    store: &dyn CollectionStore,
    collection: &str,
) -> Result<Vec<T>> {
    match store.load(collection).await? {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| Error::Store(format!("{}: malformed collection: {}", collection, e))),
        None => Ok(Vec::new()),
    }
}

pub async fn save_list<T: Serialize>(
    store: &dyn CollectionStore,
    collection: &str,
    records: &[T],
) -> Result<()> {
    let value = serde_json::to_value(records)?;
    store.save(collection, &value).await
}

/// In-memory store. Collections live as long as the value.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn load(&self, collection: &str) -> Result<Option<Value>> {
        Ok(self.collections.get(collection).map(|v| v.value().clone()))
    }

    async fn save(&self, collection: &str, value: &Value) -> Result<()> {
        self.collections.insert(collection.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, collection: &str) -> Result<()> {
        self.collections.remove(collection);
        Ok(())
    }

    fn location(&self, collection: &str) -> String {
        format!("memory://{}", collection)
    }
}

/// Filesystem store: one JSON file per collection under `base_dir`.
pub struct FsStore {
    base_dir: PathBuf,
    // One writer at a time across all collections.
    write_lock: Mutex<()>,
}

impl FsStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        let file: String = collection
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{}.json", file))
    }
}

#[async_trait]
impl CollectionStore for FsStore {
    async fn load(&self, collection: &str) -> Result<Option<Value>> {
        let path = self.collection_path(collection);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Store(format!("{}: unreadable collection: {}", path.display(), e))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, collection: &str, value: &Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.collection_path(collection);
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let content = serde_json::to_vec_pretty(value)?;
        // Write-then-rename so readers never observe a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    async fn remove(&self, collection: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.collection_path(collection)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, collection: &str) -> String {
        self.collection_path(collection).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load("kernels").await.unwrap().is_none());
        store.save("kernels", &json!([{"id": "a"}])).await.unwrap();
        assert_eq!(store.load("kernels").await.unwrap().unwrap()[0]["id"], "a");
        store.remove("kernels").await.unwrap();
        assert!(store.load("kernels").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_store_write_read() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path().join("data"));
        store.save("sentinel.kernels", &json!({"n": 1})).await.unwrap();

        let reopened = FsStore::new(tmp.path().join("data"));
        let value = reopened.load("sentinel.kernels").await.unwrap().unwrap();
        assert_eq!(value["n"], 1);
        assert!(store.location("sentinel.kernels").ends_with("sentinel.kernels.json"));
    }

    #[tokio::test]
    async fn fs_store_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStore::new(tmp.path());
        assert!(store.load("absent").await.unwrap().is_none());
        store.remove("absent").await.unwrap();
    }

    #[tokio::test]
    async fn fs_store_corrupt_file_is_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.json"), b"{not json").unwrap();
        let store = FsStore::new(tmp.path());
        let err = store.load("broken").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn collection_names_are_sanitised() {
        let store = FsStore::new("/data");
        assert_eq!(store.location("a/../b"), "/data/a_.._b.json");
    }
}
