use crate::domain::{ChatId, ChatMember, MessageId, MessageRef};

/// A text message received in a group chat.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct GroupMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: ChatMember,
    pub text: String,
}

impl GroupMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}

/// An admin command addressed to the bot, e.g. `/allow 发 台`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    /// Parse `/name[@bot] arg arg...`. Returns `None` for non-commands.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let head = parts.next()?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            args: parts.map(|s| s.to_string()).collect(),
        })
    }
}
