//! Telegram adapter (teloxide).
//!
//! This crate implements the `antisc-core` PlatformPort over the Telegram Bot
//! API and routes group updates into the moderation pipeline.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, RequestError};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use antisc_core::{
    domain::{ChatId, ChatMember, MessageId, MessageRef},
    errors::Error,
    messaging::port::PlatformPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    /// API answers (including "message to delete not found") are terminal;
    /// everything else is worth retrying later.
    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::Api(api) => Error::Platform(format!("telegram api: {api}")),
            RequestError::MigrateToChatId(id) => {
                Error::Platform(format!("telegram api: chat migrated to {id}"))
            }
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

#[async_trait]
impl PlatformPort for TelegramPlatform {
    async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<ChatMember>> {
        let admins = self
            .with_retry(|| self.bot.get_chat_administrators(Self::tg_chat(chat_id)))
            .await?;

        Ok(admins
            .into_iter()
            .map(|m| ChatMember::new(m.user.id.0 as i64, m.user.full_name()))
            .collect())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}
