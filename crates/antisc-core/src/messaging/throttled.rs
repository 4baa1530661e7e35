//! Outbound call pacing for the platform port.
//!
//! Spam waves turn into bursts of deletes and notices. Telegram answers
//! those bursts with 429s, so every call is given a send slot that keeps a
//! minimum gap to the previous call overall and to the previous call in the
//! same chat.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    time::{sleep_until, Instant},
};

use crate::{
    domain::{ChatId, ChatMember, MessageRef},
    messaging::port::PlatformPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    pub global_gap: Duration,
    pub chat_gap: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_gap: Duration::from_millis(40),
            chat_gap: Duration::from_millis(1050),
        }
    }
}

/// Earliest instants at which the next call may leave.
#[derive(Default)]
struct Slots {
    global: Option<Instant>,
    chats: HashMap<ChatId, Instant>,
}

pub struct ThrottledPlatform {
    inner: Arc<dyn PlatformPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn PlatformPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Book the next free slot for `chat_id` and sleep until it.
    async fn pace(&self, chat_id: ChatId) {
        let at = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let at = [slots.global, slots.chats.get(&chat_id).copied()]
                .into_iter()
                .flatten()
                .fold(now, Instant::max);
            slots.global = Some(at + self.cfg.global_gap);
            slots.chats.insert(chat_id, at + self.cfg.chat_gap);
            at
        };
        sleep_until(at).await;
    }
}

#[async_trait::async_trait]
impl PlatformPort for ThrottledPlatform {
    async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<ChatMember>> {
        self.pace(chat_id).await;
        self.inner.fetch_admins(chat_id).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.pace(msg.chat_id).await;
        self.inner.delete_message(msg).await
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }
}
