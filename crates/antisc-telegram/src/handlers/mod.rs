//! Telegram update handlers.
//!
//! Each handler converts the teloxide message into the core's types and hands
//! it to `antisc-core`. Failures are logged, never returned to the dispatcher,
//! so one bad message cannot stall the rest.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use antisc_core::{commands::admin_command, domain::ChatMember};

use crate::router::AppState;

mod commands;
mod text;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(sender) = sender_of(&msg) else {
        return Ok(());
    };

    if let Some(cmd) = admin_command(text) {
        return commands::handle_command(&msg, sender, cmd, state).await;
    }

    text::handle_text(&msg, sender, text, state).await
}

fn sender_of(msg: &Message) -> Option<ChatMember> {
    let user = msg.from()?;
    Some(ChatMember::new(user.id.0 as i64, user.full_name()))
}
