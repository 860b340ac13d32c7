use std::collections::HashMap;
use std::path::PathBuf;

/// Persisted selected-schedule pointer, keyed by subscription scope so a
/// reload resumes on the same schedule. Injected rather than read from any
/// ambient storage; the storage medium is an implementation detail.
pub trait SelectionStore: Send {
    fn get(&self, scope: &str) -> Option<i64>;
    fn set(&mut self, scope: &str, id: i64);
}

/// Non-persistent store for tests and throwaway sessions
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    entries: HashMap<String, i64>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStore for MemorySelectionStore {
    fn get(&self, scope: &str) -> Option<i64> {
        self.entries.get(scope).copied()
    }

    fn set(&mut self, scope: &str, id: i64) {
        self.entries.insert(scope.to_string(), id);
    }
}

/// Selection store persisted as a small JSON map on disk. Read and write
/// failures are logged and swallowed: losing the pointer only costs the
/// viewer their remembered selection.
pub struct JsonFileSelectionStore {
    path: PathBuf,
}

impl JsonFileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> HashMap<String, i64> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), "Ignoring corrupt selection file: {e}");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }
}

impl SelectionStore for JsonFileSelectionStore {
    fn get(&self, scope: &str) -> Option<i64> {
        self.load().get(scope).copied()
    }

    fn set(&mut self, scope: &str, id: i64) {
        let mut entries = self.load();
        entries.insert(scope.to_string(), id);
        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(path = %self.path.display(), "Failed to persist selection: {e}");
                }
            }
            Err(e) => tracing::warn!("Failed to serialize selection: {e}"),
        }
    }
}
