use std::sync::Arc;

use teloxide::prelude::*;

use antisc_core::{
    commands::execute,
    domain::{ChatId, ChatMember},
    messaging::types::Command,
};

use crate::router::AppState;

/// Admin commands. Replies are queued for deferred deletion like any other
/// bot notice so they don't pile up in the group.
pub async fn handle_command(
    msg: &Message,
    sender: ChatMember,
    cmd: Command,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let reply = match execute(&state.pipeline, chat_id, &sender, &cmd).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, command = %cmd.name, "command failed: {e}");
            "Something went wrong, please try again later.".to_string()
        }
    };

    match state.platform.send_html(chat_id, &reply).await {
        Ok(sent) => state.deletions.push(sent),
        Err(e) => tracing::warn!(chat_id = chat_id.0, "command reply failed: {e}"),
    }
    Ok(())
}
