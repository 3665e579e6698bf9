use crate::errors::StoreError;
use crate::models::{ActiveSession, Counter, DailyStats, Session};
use crate::stats::timestamp_now;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, error};
use uuid::Uuid;

pub mod keys {
    pub const COUNTERS: &str = "tasbeeh_counters";
    pub const SESSIONS: &str = "tasbeeh_sessions";
    pub const STATS: &str = "tasbeeh_stats";
    pub const ACTIVE_SESSION: &str = "tasbeeh_active_session";
    pub const POINTS: &str = "tasbeeh_points";
    pub const ACHIEVEMENTS: &str = "tasbeeh_achievements";
    pub const DARK_MODE: &str = "tasbeeh_dark_mode";
}

/// Synchronous key-value persistence over JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// All keys live in one JSON object file that is rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let entries = load_entries(&path);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, Value> {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(err) => {
                error!("failed to parse data file: {err}");
                BTreeMap::new()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
        Err(err) => {
            error!("failed to read data file: {err}");
            BTreeMap::new()
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Typed view of the local store used by the session controller.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.backend.get(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                error!(key, "discarding malformed stored value: {err}");
                T::default()
            }),
            None => T::default(),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.backend.set(key, serde_json::to_value(value)?)
    }

    pub fn counters(&self) -> Vec<Counter> {
        self.read(keys::COUNTERS)
    }

    pub fn save_counters(&self, counters: &[Counter]) -> Result<(), StoreError> {
        self.write(keys::COUNTERS, counters)
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.read(keys::SESSIONS)
    }

    pub fn save_sessions(&self, sessions: &[Session]) -> Result<(), StoreError> {
        self.write(keys::SESSIONS, sessions)
    }

    pub fn stats(&self) -> Vec<DailyStats> {
        self.read(keys::STATS)
    }

    pub fn save_stats(&self, stats: &[DailyStats]) -> Result<(), StoreError> {
        self.write(keys::STATS, stats)
    }

    /// The persisted in-progress tally, only if it belongs to `counter_id`.
    pub fn active_session(&self, counter_id: &str) -> Option<ActiveSession> {
        let slot: Option<ActiveSession> = self.read(keys::ACTIVE_SESSION);
        slot.filter(|session| session.counter_id == counter_id)
    }

    pub fn save_active_session(
        &self,
        counter_id: &str,
        count: u64,
        goal: Option<u64>,
    ) -> Result<(), StoreError> {
        let session = ActiveSession {
            counter_id: counter_id.to_string(),
            count,
            goal,
            timestamp: timestamp_now(),
        };
        self.write(keys::ACTIVE_SESSION, &session)
    }

    pub fn clear_active_session(&self) -> Result<(), StoreError> {
        self.backend.remove(keys::ACTIVE_SESSION)
    }

    /// Writes the three built-in counters and returns them.
    pub fn seed_default_counters(&self) -> Result<Vec<Counter>, StoreError> {
        let counters = default_counters();
        self.save_counters(&counters)?;
        debug!("seeded {} default counters", counters.len());
        Ok(counters)
    }

    pub fn dark_mode(&self) -> bool {
        self.read(keys::DARK_MODE)
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), StoreError> {
        self.write(keys::DARK_MODE, &enabled)
    }
}

pub fn default_counters() -> Vec<Counter> {
    let created_at = timestamp_now();
    [
        ("سبحان الله", "green", "leaf"),
        ("الحمد لله", "teal", "heart"),
        ("الله أكبر", "gold", "star"),
    ]
    .into_iter()
    .map(|(name, color, icon)| Counter {
        id: Uuid::new_v4().to_string(),
        user_id: None,
        name: name.to_string(),
        color: color.to_string(),
        icon: icon.to_string(),
        created_at: created_at.clone(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unique_data_path() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("tasbeeh_store_{}_{}.json", std::process::id(), nanos));
        path
    }

    #[test]
    fn active_session_only_matches_its_counter() {
        let store = LocalStore::in_memory();
        store.save_active_session("a", 5, Some(10)).unwrap();

        let found = store.active_session("a").expect("slot for a");
        assert_eq!((found.count, found.goal), (5, Some(10)));
        assert!(store.active_session("b").is_none());

        store.clear_active_session().unwrap();
        assert!(store.active_session("a").is_none());
    }

    #[test]
    fn active_session_uses_camel_case_keys() {
        let backend = Arc::new(MemoryStore::new());
        let store = LocalStore::new(backend.clone());
        store.save_active_session("a", 3, None).unwrap();

        let raw = backend.get(keys::ACTIVE_SESSION).unwrap();
        assert_eq!(raw["counterId"], json!("a"));
        assert_eq!(raw["count"], json!(3));
        assert!(raw["goal"].is_null());
    }

    #[test]
    fn malformed_value_reads_as_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(keys::SESSIONS, json!({"not": "a list"}))
            .unwrap();
        let store = LocalStore::new(backend);
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn seeded_defaults_have_distinct_ids() {
        let store = LocalStore::in_memory();
        let counters = store.seed_default_counters().unwrap();
        assert_eq!(counters.len(), 3);
        assert_eq!(counters[0].name, "سبحان الله");
        assert_eq!(counters[1].color, "teal");
        assert_eq!(counters[2].icon, "star");
        assert_ne!(counters[0].id, counters[1].id);
        assert_eq!(store.counters(), counters);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = unique_data_path();
        {
            let store = LocalStore::new(Arc::new(FileStore::open(&path).unwrap()));
            store.save_active_session("a", 7, None).unwrap();
            store.set_dark_mode(true).unwrap();
        }

        let store = LocalStore::new(Arc::new(FileStore::open(&path).unwrap()));
        assert_eq!(store.active_session("a").map(|s| s.count), Some(7));
        assert!(store.dark_mode());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let path = unique_data_path();
        fs::write(&path, b"{not json").unwrap();

        let store = LocalStore::new(Arc::new(FileStore::open(&path).unwrap()));
        assert!(store.counters().is_empty());
        assert!(!store.dark_mode());
        let _ = fs::remove_file(path);
    }
}
