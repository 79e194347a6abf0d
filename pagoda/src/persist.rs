use crate::error::PagodaError;
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// The strategy's global key/value state `g`.
///
/// Values are stored as JSON documents so live-mode persistence uses an agreed-upon
/// codec; non-serialisable values are rejected at `set` time.
#[derive(Debug, Clone, Default)]
pub struct GlobalStore {
    values: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PagodaError> {
        let value = serde_json::to_value(value)
            .map_err(|error| PagodaError::Persistence(format!("unserialisable value: {error}")))?;
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.read();
        let value = values.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.read().clone()
    }

    pub fn replace(&self, values: BTreeMap<String, Value>) {
        *self.values.write() = values;
    }
}

/// Durable storage of [`GlobalStore`] under `runtime_dir/g.json`.
///
/// Writes go to a temp file in the same directory followed by an atomic rename, so a
/// crash mid-write never leaves a torn state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub const FILE_NAME: &'static str = "g.json";

    pub fn new(runtime_dir: impl Into<PathBuf>) -> Result<Self, PagodaError> {
        let runtime_dir = runtime_dir.into();
        std::fs::create_dir_all(&runtime_dir)
            .map_err(|error| PagodaError::Persistence(format!("create runtime dir: {error}")))?;
        Ok(Self {
            path: runtime_dir.join(Self::FILE_NAME),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn save(&self, store: &GlobalStore) -> Result<(), PagodaError> {
        let snapshot = store.snapshot();
        let serialised = serde_json::to_vec_pretty(&snapshot)
            .map_err(|error| PagodaError::Persistence(format!("serialise state: {error}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialised)
            .map_err(|error| PagodaError::Persistence(format!("write temp state: {error}")))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|error| PagodaError::Persistence(format!("rename state file: {error}")))?;

        debug!(path = %self.path.display(), "strategy state saved");
        Ok(())
    }

    /// Rehydrate the store if a state file exists; missing files are not an error.
    pub fn load(&self, store: &GlobalStore) -> Result<bool, PagodaError> {
        let serialised = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(error) => {
                return Err(PagodaError::Persistence(format!("read state file: {error}")));
            }
        };

        let values: BTreeMap<String, Value> = serde_json::from_slice(&serialised)
            .map_err(|error| PagodaError::Persistence(format!("parse state file: {error}")))?;
        store.replace(values);
        Ok(true)
    }
}

/// Background autosave of `g`, used by the live driver alongside per-callback saves.
#[derive(Debug)]
pub struct Autosave {
    handle: tokio::task::JoinHandle<()>,
}

impl Autosave {
    pub fn start(state_file: StateFile, store: GlobalStore, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = state_file.save(&store) {
                    warn!(%error, "autosave of strategy state failed");
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip_recovers_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path()).unwrap();

        let store = GlobalStore::new();
        store.set("foo", &123i64).unwrap();
        store.set("name", &"pingan").unwrap();
        state_file.save(&store).unwrap();

        // Mutate, then rehydrate from disk
        store.set("foo", &0i64).unwrap();
        let loaded = state_file.load(&store).unwrap();
        assert!(loaded);
        assert_eq!(store.get::<i64>("foo"), Some(123));
        assert_eq!(store.get::<String>("name"), Some("pingan".to_string()));
    }

    #[test]
    fn test_load_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path().join("rt")).unwrap();
        let store = GlobalStore::new();
        assert!(!state_file.load(&store).unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_autosave_writes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = StateFile::new(dir.path()).unwrap();
        let store = GlobalStore::new();
        store.set("bar", &456i64).unwrap();

        let autosave = Autosave::start(
            state_file.clone(),
            store.clone(),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        autosave.stop();

        assert!(state_file.path().exists());
        let fresh = GlobalStore::new();
        state_file.load(&fresh).unwrap();
        assert_eq!(fresh.get::<i64>("bar"), Some(456));
    }
}
