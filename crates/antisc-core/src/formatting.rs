//! Telegram HTML helpers.

use crate::domain::ChatMember;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Mention link that works even for users without a username.
pub fn user_link(member: &ChatMember) -> String {
    let name = if member.name.trim().is_empty() {
        format!("user {}", member.id.0)
    } else {
        member.name.clone()
    };
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        member.id.0,
        escape_html(&name)
    )
}
