//! Per-chat moderation state with copy-out reads and locked mutation.
//!
//! Layout: a table lock guards only the key set; every chat has its own lock,
//! so mutating chat A never waits on chat B.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::{
    domain::{ChatId, ChatMember, UserId},
    store::{ChatStateStore, ChatTable, StoredChatState},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatState {
    pub administrators: Vec<ChatMember>,
    /// Not consulted by moderation yet; kept so it survives save/load.
    pub allow_members: Vec<ChatMember>,
    pub allow_words: HashSet<String>,
    pub block_words: HashSet<String>,
    pub last_refreshed_at: DateTime<Utc>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            administrators: Vec::new(),
            allow_members: Vec::new(),
            allow_words: HashSet::new(),
            block_words: HashSet::new(),
            last_refreshed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl ChatState {
    pub fn is_administrator(&self, user: UserId) -> bool {
        self.administrators.iter().any(|m| m.id == user)
    }

    /// Replace the administrator snapshot and stamp the refresh time.
    pub fn record_refresh(&mut self, administrators: Vec<ChatMember>, at: DateTime<Utc>) {
        self.administrators = administrators;
        self.last_refreshed_at = at;
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_refreshed_at) > max_age
    }

    /// Returns true if the word was not present before.
    pub fn add_allow_word(&mut self, word: &str) -> bool {
        self.allow_words.insert(word.to_string())
    }

    /// Returns true if the word was present.
    pub fn remove_allow_word(&mut self, word: &str) -> bool {
        self.allow_words.remove(word)
    }

    /// Allow words in a stable order, for display and persistence.
    pub fn allow_word_list(&self) -> Vec<String> {
        sorted(&self.allow_words)
    }

    fn to_stored(&self) -> StoredChatState {
        StoredChatState {
            administrators: self.administrators.clone(),
            allow_members: self.allow_members.clone(),
            allow_words: sorted(&self.allow_words),
            block_words: sorted(&self.block_words),
        }
    }

    fn from_stored(stored: StoredChatState) -> Self {
        Self {
            administrators: stored.administrators,
            allow_members: stored.allow_members,
            allow_words: stored.allow_words.into_iter().collect(),
            block_words: stored.block_words.into_iter().collect(),
            last_refreshed_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = set.iter().cloned().collect();
    v.sort();
    v
}

type Entry = Arc<Mutex<ChatState>>;

pub struct ChatStateCache {
    entries: RwLock<HashMap<ChatId, Entry>>,
    store: Arc<dyn ChatStateStore>,
}

impl ChatStateCache {
    pub fn new(store: Arc<dyn ChatStateStore>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Independent copy of the chat's state; a fresh empty state if unknown.
    pub async fn get(&self, chat_id: ChatId) -> ChatState {
        let entry = { self.entries.read().await.get(&chat_id).cloned() };
        match entry {
            Some(entry) => entry.lock().await.clone(),
            None => ChatState::default(),
        }
    }

    /// Run `f` on the live state under the chat's lock, creating it if absent.
    ///
    /// Changes made by `f` before it returns an error are kept.
    pub async fn mutate<T>(
        &self,
        chat_id: ChatId,
        f: impl FnOnce(&mut ChatState) -> Result<T>,
    ) -> Result<T> {
        let entry = self.entry(chat_id).await;
        let mut state = entry.lock().await;
        f(&mut state)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialize the whole table to the durable store.
    pub async fn save(&self) -> Result<()> {
        let entries: Vec<(ChatId, Entry)> = {
            let map = self.entries.read().await;
            map.iter().map(|(k, v)| (*k, v.clone())).collect()
        };

        let mut table = ChatTable::new();
        for (chat_id, entry) in entries {
            let stored = entry.lock().await.to_stored();
            table.insert(chat_id.0, stored);
        }
        self.store.save(&table)
    }

    /// Replace the in-memory table with the stored one.
    pub async fn load(&self) -> Result<()> {
        let table = self.store.load()?;
        let fresh: HashMap<ChatId, Entry> = table
            .into_iter()
            .map(|(id, stored)| {
                (
                    ChatId(id),
                    Arc::new(Mutex::new(ChatState::from_stored(stored))),
                )
            })
            .collect();
        *self.entries.write().await = fresh;
        Ok(())
    }

    async fn entry(&self, chat_id: ChatId) -> Entry {
        if let Some(entry) = self.entries.read().await.get(&chat_id) {
            return entry.clone();
        }
        self.entries
            .write()
            .await
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(ChatState::default())))
            .clone()
    }
}
