//! Chat-administrator commands for the per-chat allow list.

use crate::{
    domain::{ChatId, ChatMember},
    formatting::escape_html,
    messaging::types::Command,
    pipeline::ModerationPipeline,
    Result,
};

const NOT_ADMIN: &str = "Only chat administrators can do that.";

const HANDLED: [&str; 3] = ["allow", "unallow", "allowlist"];

/// The allow-list command in `text`, if any.
///
/// Any other slash text, including commands meant for other bots, is an
/// ordinary message and must still be moderated.
pub fn admin_command(text: &str) -> Option<Command> {
    Command::parse(text).filter(|cmd| HANDLED.contains(&cmd.name.as_str()))
}

/// Execute `cmd` sent by `sender` in `chat_id`.
///
/// Returns the HTML reply, or `None` for commands this bot does not handle.
pub async fn execute(
    pipeline: &ModerationPipeline,
    chat_id: ChatId,
    sender: &ChatMember,
    cmd: &Command,
) -> Result<Option<String>> {
    if !HANDLED.contains(&cmd.name.as_str()) {
        return Ok(None);
    }

    let state = pipeline.resolve_chat_state(chat_id).await;
    if !state.is_administrator(sender.id) {
        return Ok(Some(NOT_ADMIN.to_string()));
    }

    let reply = match cmd.name.as_str() {
        "allowlist" => {
            let words = state.allow_word_list();
            if words.is_empty() {
                "The allow list is empty.".to_string()
            } else {
                format!("Allowed words: {}", escape_html(&words.join(", ")))
            }
        }
        "allow" => {
            if cmd.args.is_empty() {
                return Ok(Some("Usage: /allow &lt;word&gt; [word...]".to_string()));
            }
            let added = pipeline
                .cache()
                .mutate(chat_id, |st| {
                    Ok(cmd
                        .args
                        .iter()
                        .filter(|w| st.add_allow_word(w))
                        .cloned()
                        .collect::<Vec<_>>())
                })
                .await?;
            pipeline.cache().save().await?;
            changed("Allowed", &added)
        }
        _ => {
            if cmd.args.is_empty() {
                return Ok(Some("Usage: /unallow &lt;word&gt; [word...]".to_string()));
            }
            let removed = pipeline
                .cache()
                .mutate(chat_id, |st| {
                    Ok(cmd
                        .args
                        .iter()
                        .filter(|w| st.remove_allow_word(w))
                        .cloned()
                        .collect::<Vec<_>>())
                })
                .await?;
            pipeline.cache().save().await?;
            changed("No longer allowed", &removed)
        }
    };
    Ok(Some(reply))
}

fn changed(verb: &str, words: &[String]) -> String {
    if words.is_empty() {
        return "Nothing changed.".to_string();
    }
    format!("{verb}: {}", escape_html(&words.join(", ")))
}
