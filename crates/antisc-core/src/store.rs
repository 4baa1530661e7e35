//! Durable storage for the chat state table.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{domain::ChatMember, Error, Result};

/// The persisted part of a chat's state. Refresh timestamps are not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChatState {
    #[serde(default)]
    pub administrators: Vec<ChatMember>,
    #[serde(default)]
    pub allow_members: Vec<ChatMember>,
    #[serde(default)]
    pub allow_words: Vec<String>,
    #[serde(default)]
    pub block_words: Vec<String>,
}

/// Chat id → stored state. Keys are serialized as JSON object keys.
pub type ChatTable = BTreeMap<i64, StoredChatState>;

pub trait ChatStateStore: Send + Sync {
    fn save(&self, table: &ChatTable) -> Result<()>;

    /// Fails if nothing was saved yet or the data is malformed.
    fn load(&self) -> Result<ChatTable>;
}

/// JSON file on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChatStateStore for JsonFileStore {
    fn save(&self, table: &ChatTable) -> Result<()> {
        let txt = serde_json::to_string_pretty(table)?;
        // Write-then-rename so a crash mid-write never leaves a truncated table.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, txt)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<ChatTable> {
        let txt = std::fs::read_to_string(&self.path)?;
        let table: ChatTable = serde_json::from_str(&txt)?;
        Ok(table)
    }
}

/// In-memory store; `load` fails until the first `save`.
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Option<ChatTable>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_table(table: ChatTable) -> Self {
        Self {
            saved: Mutex::new(Some(table)),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<ChatTable> {
        self.saved.lock().ok().and_then(|g| g.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|g| *g).unwrap_or(0)
    }
}

impl ChatStateStore for MemoryStore {
    fn save(&self, table: &ChatTable) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| Error::External("memory store poisoned".to_string()))?;
        *saved = Some(table.clone());
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }

    fn load(&self) -> Result<ChatTable> {
        self.snapshot()
            .ok_or_else(|| Error::External("nothing saved yet".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    #[test]
    fn json_file_store_round_trips_table() {
        let path = tmp("antisc-store");
        let store = JsonFileStore::new(&path);

        let mut table = ChatTable::new();
        table.insert(
            -100123,
            StoredChatState {
                administrators: vec![ChatMember::new(7, "Alice")],
                allow_members: vec![],
                allow_words: vec!["发".to_string()],
                block_words: vec!["spam".to_string()],
            },
        );
        store.save(&table).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"-100123\""));
        assert!(raw.contains("allow_words"));

        assert_eq!(store.load().unwrap(), table);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn json_file_store_load_fails_when_absent_or_malformed() {
        let path = tmp("antisc-store-missing");
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Io(_))));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(store.load(), Err(Error::Json(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let path = tmp("antisc-store-partial");
        std::fs::write(&path, r#"{"5": {"administrators": []}}"#).unwrap();
        let table = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(table.get(&5), Some(&StoredChatState::default()));
        let _ = std::fs::remove_file(&path);
    }
}
