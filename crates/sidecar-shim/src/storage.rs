//! Durable key/value stores substituting for the host editor's built-in
//! state APIs. Each store is one JSON document on disk fronted by an
//! in-memory cache; a missing file reads as "no data".

use crate::events::EventEmitter;
use crate::types::Disposable;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key/value store persisted as a single pretty-printed JSON document.
///
/// Reads are synchronous over the cache hydrated at `open`; every mutation
/// rewrites the full document. Two instances over the same path are
/// independent caches — callers needing cross-instance agreement must
/// reopen.
pub struct FileMemento {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl FileMemento {
    /// Hydrate from `path`. A missing file is an empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = read_document(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.lock().ok()?;
        let value = cache.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Set or delete (`None`) a key, persisting the whole document.
    pub fn update<T: Serialize>(&self, key: &str, value: Option<T>) -> Result<()> {
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| anyhow::anyhow!("memento cache poisoned"))?;
            match value {
                Some(v) => {
                    cache.insert(key.to_string(), serde_json::to_value(v)?);
                }
                None => {
                    cache.remove(key);
                }
            }
        }
        self.persist()
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache
            .lock()
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every key and persist the emptied state.
    pub fn clear(&self) -> Result<()> {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.persist()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self
            .cache
            .lock()
            .map(|cache| cache.clone())
            .unwrap_or_default();
        write_document(&self.path, &snapshot)
    }
}

/// Change notification carrying the affected key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretChangeEvent {
    pub key: String,
}

/// String-secret store persisted to its own JSON document with owner-only
/// file permissions. Every store/delete fires `on_did_change` with the
/// affected key.
pub struct FileSecretStorage {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, String>>,
    on_did_change: EventEmitter<SecretChangeEvent>,
}

impl FileSecretStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw: BTreeMap<String, Value> = read_document(&path)?;
        let cache = raw
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect();
        Ok(Self {
            path,
            cache: Mutex::new(cache),
            on_did_change: EventEmitter::new(),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    pub fn store(&self, key: &str, value: impl Into<String>) -> Result<()> {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key.to_string(), value.into());
        }
        self.persist()?;
        self.on_did_change.fire(&SecretChangeEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(key);
        }
        self.persist()?;
        self.on_did_change.fire(&SecretChangeEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.cache
            .lock()
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Wipe every secret. Does not fire per-key change events.
    pub fn clear_all(&self) -> Result<()> {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.persist()
    }

    pub fn on_did_change(
        &self,
        listener: impl Fn(&SecretChangeEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_did_change.subscribe(listener)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let snapshot: BTreeMap<String, Value> = self
            .cache
            .lock()
            .map(|cache| {
                cache
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        write_document(&self.path, &snapshot)?;
        restrict_to_owner(&self.path)?;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state document {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid state document {}", path.display()))
}

fn write_document(path: &Path, document: &BTreeMap<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(document)?)
        .with_context(|| format!("failed to write state document {}", path.display()))?;
    Ok(())
}

/// Owner-only permissions on the secrets file. A security contract on
/// POSIX systems; a no-op elsewhere.
#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sidecar-storage-{tag}-{}", uuid::Uuid::now_v7()))
            .join("state.json")
    }

    #[test]
    fn memento_round_trips_through_a_fresh_instance() {
        let path = temp_path("roundtrip");
        let store = FileMemento::open(&path).expect("open");
        store.update("greeting", Some("hello")).expect("string");
        store.update("count", Some(42_u64)).expect("number");
        store
            .update("nested", Some(json!({"a": {"b": [1, 2, 3]}})))
            .expect("nested");

        let reopened = FileMemento::open(&path).expect("reopen");
        assert_eq!(reopened.get::<String>("greeting").as_deref(), Some("hello"));
        assert_eq!(reopened.get::<u64>("count"), Some(42));
        assert_eq!(
            reopened.get::<Value>("nested"),
            Some(json!({"a": {"b": [1, 2, 3]}}))
        );
    }

    #[test]
    fn update_with_none_deletes_and_get_or_falls_back() {
        let path = temp_path("delete");
        let store = FileMemento::open(&path).expect("open");
        store.update("key", Some("value")).expect("set");
        store.update::<String>("key", None).expect("delete");

        assert_eq!(store.get::<String>("key"), None);
        assert_eq!(store.get_or("key", "fallback".to_string()), "fallback");

        let reopened = FileMemento::open(&path).expect("reopen");
        assert_eq!(reopened.get::<String>("key"), None);
    }

    #[test]
    fn missing_file_reads_as_empty_store() {
        let path = temp_path("missing");
        let store = FileMemento::open(&path).expect("open");
        assert!(store.keys().is_empty());
        assert_eq!(store.get::<String>("anything"), None);
    }

    #[test]
    fn clear_persists_the_emptied_state() {
        let path = temp_path("clear");
        let store = FileMemento::open(&path).expect("open");
        store.update("a", Some(1)).expect("a");
        store.update("b", Some(2)).expect("b");
        store.clear().expect("clear");

        assert!(store.keys().is_empty());
        let reopened = FileMemento::open(&path).expect("reopen");
        assert!(reopened.keys().is_empty());
    }

    #[test]
    fn instances_over_one_path_agree_only_after_reopen() {
        let path = temp_path("instances");
        let first = FileMemento::open(&path).expect("first");
        let second = FileMemento::open(&path).expect("second");

        first.update("k", Some("v")).expect("set");
        // Independent caches: the second instance does not see the write.
        assert_eq!(second.get::<String>("k"), None);

        let reopened = FileMemento::open(&path).expect("reopen");
        assert_eq!(reopened.get::<String>("k").as_deref(), Some("v"));
    }

    // ── Secrets ──

    #[test]
    fn secrets_round_trip_and_delete() {
        let path = temp_path("secrets");
        let store = FileSecretStorage::open(&path).expect("open");
        store.store("token", "s3cr3t").expect("store");
        assert_eq!(store.get("token").as_deref(), Some("s3cr3t"));

        store.delete("token").expect("delete");
        assert_eq!(store.get("token"), None);

        let reopened = FileSecretStorage::open(&path).expect("reopen");
        assert_eq!(reopened.get("token"), None);
    }

    #[test]
    fn change_events_arrive_in_mutation_order() {
        let path = temp_path("events");
        let store = FileSecretStorage::open(&path).expect("open");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        store.on_did_change(move |ev| {
            s.lock().expect("seen lock").push(ev.key.clone());
        });

        store.store("a", "1").expect("store a");
        store.store("b", "2").expect("store b");
        store.delete("a").expect("delete a");

        assert_eq!(*seen.lock().expect("seen lock"), vec!["a", "b", "a"]);
    }

    #[test]
    fn clear_all_wipes_without_per_key_events() {
        let path = temp_path("clearall");
        let store = FileSecretStorage::open(&path).expect("open");
        store.store("a", "1").expect("a");
        store.store("b", "2").expect("b");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        store.on_did_change(move |ev| {
            s.lock().expect("seen lock").push(ev.key.clone());
        });

        store.clear_all().expect("clear");
        assert!(store.keys().is_empty());
        assert!(seen.lock().expect("seen lock").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn secrets_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let path = temp_path("perms");
        let store = FileSecretStorage::open(&path).expect("open");
        store.store("k", "v").expect("store");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
