use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatMember, MessageRef},
    Result,
};

/// Outbound chat-platform operations the moderation core relies on.
///
/// `delete_message` must report an already-absent message as
/// [`crate::Error::Platform`] so callers can treat it as done.
#[async_trait]
pub trait PlatformPort: Send + Sync {
    async fn fetch_admins(&self, chat_id: ChatId) -> Result<Vec<ChatMember>>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
}
