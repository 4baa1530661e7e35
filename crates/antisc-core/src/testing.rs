//! Port fakes shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatMember, MessageId, MessageRef},
    logging::{Level, Logger},
    messaging::port::PlatformPort,
    ports::ScriptConverter,
    Error, Result,
};

#[derive(Default)]
pub struct FakePlatform {
    admins: Mutex<HashMap<ChatId, Vec<ChatMember>>>,
    fetch_delay: Mutex<Duration>,
    fetch_calls: AtomicUsize,
    fail_fetch: AtomicBool,

    delete_delay: Mutex<Duration>,
    delete_script: Mutex<VecDeque<Error>>,
    delete_calls: AtomicUsize,
    deleted: Mutex<Vec<MessageRef>>,

    fail_send: AtomicBool,
    next_id: AtomicI32,
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl FakePlatform {
    pub fn set_admins(&self, chat_id: ChatId, admins: Vec<ChatMember>) {
        self.admins.lock().unwrap().insert(chat_id, admins);
    }

    pub fn set_fetch_delay(&self, d: Duration) {
        *self.fetch_delay.lock().unwrap() = d;
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn set_delete_delay(&self, d: Duration) {
        *self.delete_delay.lock().unwrap() = d;
    }

    /// Queue errors returned by the next `delete_message` calls, in order.
    pub fn script_delete_errors(&self, errs: Vec<Error>) {
        self.delete_script.lock().unwrap().extend(errs);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformPort for FakePlatform {
    async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<ChatMember>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::External("fetch admins: connection reset".to_string()));
        }
        Ok(self
            .admins
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delete_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.delete_script.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::External("send: timeout".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, html.to_string()));
        let id = 1000 + self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(id),
        })
    }
}

/// Character-mapping converter; unmapped characters pass through.
#[derive(Default)]
pub struct FakeConverter {
    map: HashMap<char, char>,
    fail: bool,
}

impl FakeConverter {
    pub fn with_pairs(pairs: &[(char, char)]) -> Self {
        Self {
            map: pairs.iter().copied().collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            map: HashMap::new(),
            fail: true,
        }
    }
}

impl ScriptConverter for FakeConverter {
    fn convert(&self, text: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Conversion("dictionary unavailable".to_string()));
        }
        Ok(text
            .chars()
            .map(|c| self.map.get(&c).copied().unwrap_or(c))
            .collect())
    }
}

/// Converter backed by a closure, for shapes a char map cannot express.
pub struct FnConverter<F>(pub F);

impl<F> ScriptConverter for FnConverter<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn convert(&self, text: &str) -> Result<String> {
        Ok((self.0)(text))
    }
}

/// Records every line so tests can assert on what was reported.
#[derive(Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(Level, String, String)>>,
}

impl MemoryLogger {
    pub fn count(&self, level: Level) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(_, _, m)| m.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, component: &str, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((level, component.to_string(), message.to_string()));
    }
}
