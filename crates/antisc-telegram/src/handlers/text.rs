use std::sync::Arc;

use teloxide::prelude::*;

use antisc_core::{
    domain::{ChatId, ChatMember, MessageId},
    messaging::types::GroupMessage,
    pipeline::Outcome,
};

use crate::router::AppState;

pub async fn handle_text(
    msg: &Message,
    sender: ChatMember,
    text: &str,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let group_msg = GroupMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender,
        text: text.to_string(),
    };

    match state.pipeline.handle_message(&group_msg).await {
        Outcome::Clean => {}
        Outcome::DeleteFailed(v) => tracing::warn!(
            chat_id = group_msg.chat_id.0,
            field = v.field.as_str(),
            "violation left in place: could not delete message"
        ),
        Outcome::Deleted(v) | Outcome::Notified(v) => tracing::debug!(
            chat_id = group_msg.chat_id.0,
            field = v.field.as_str(),
            rate = v.ng_rate,
            "message removed"
        ),
    }

    Ok(())
}
