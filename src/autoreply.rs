//! Trigger based automatic replies to guild messages.

use crate::data::Data;
use crate::embeds::Placeholders;
use crate::settings::{AutoReply, Editor, MatchMode};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Minimum gap between two replies in the same channel
pub const COOLDOWN: Duration = Duration::from_millis(1500);

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Case-insensitive match of `content` against a trigger; empty sides never match
#[must_use]
pub fn matches(content: &str, trigger: &str, mode: MatchMode) -> bool {
    let content = normalize(content);
    let trigger = normalize(trigger);
    if content.is_empty() || trigger.is_empty() {
        return false;
    }
    match mode {
        MatchMode::Contains => content.contains(&trigger),
        MatchMode::Starts => content.starts_with(&trigger),
        MatchMode::Ends => content.ends_with(&trigger),
    }
}

/// The first entry whose trigger matches
#[must_use]
pub fn find_reply<'a>(entries: &'a [AutoReply], content: &str) -> Option<&'a AutoReply> {
    entries
        .iter()
        .find(|entry| matches(content, &entry.trigger, entry.match_mode))
}

/// A message as seen by the auto-reply listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// `None` for direct messages
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub from_bot: bool,
    pub system: bool,
    pub content: String,
}

/// Reply to a message when one of the guild's triggers matches
pub async fn on_message(data: &Data, message: &IncomingMessage) {
    if message.from_bot || message.system {
        return;
    }
    let Some(guild) = message.guild_id else {
        return;
    };
    if let Some(last) = data.autoreply_cooldowns.get(&message.channel_id) {
        if last.elapsed() < COOLDOWN {
            return;
        }
    }

    let settings = data.settings(guild).await;
    let Some(entry) = find_reply(&settings.auto_replies, &message.content) else {
        return;
    };
    let Some(platform) = data.platform() else {
        return;
    };

    let server = match platform.guild_summary(guild).await {
        Ok(Some(summary)) => summary.name,
        _ => String::new(),
    };
    let placeholders = Placeholders::new()
        .with("user", format!("<@{}>", message.author_id))
        .with("channel", format!("<#{}>", message.channel_id))
        .with("server", server);
    let response = placeholders.apply(&entry.response);

    match platform
        .reply(message.channel_id, message.message_id, response)
        .await
    {
        Ok(()) => {
            debug!("Auto replied to trigger {:?} in {}", entry.trigger, message.channel_id);
            data.autoreply_cooldowns
                .insert(message.channel_id, Instant::now());
        }
        Err(e) => warn!("Failed to send auto reply in {}: {e}", message.channel_id),
    }
}

impl Data {
    /// Insert or replace an entry by id; a blank id creates a new entry
    ///
    /// # Errors
    /// Returns an error when the settings cannot be persisted.
    pub async fn upsert_auto_reply(
        &self,
        guild: GuildId,
        mut entry: AutoReply,
        editor: Option<&Editor>,
    ) -> Result<Vec<AutoReply>, crate::Error> {
        if entry.id.trim().is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let settings = self
            .update_settings(guild, editor, |s| {
                match s.auto_replies.iter_mut().find(|e| e.id == entry.id) {
                    Some(existing) => *existing = entry,
                    None => s.auto_replies.push(entry),
                }
            })
            .await?;
        Ok(settings.auto_replies)
    }

    /// Remove an entry; returns whether it existed
    ///
    /// # Errors
    /// Returns an error when the settings cannot be persisted.
    pub async fn delete_auto_reply(
        &self,
        guild: GuildId,
        id: &str,
        editor: Option<&Editor>,
    ) -> Result<bool, crate::Error> {
        if !self
            .settings(guild)
            .await
            .auto_replies
            .iter()
            .any(|e| e.id == id)
        {
            return Ok(false);
        }
        self.update_settings(guild, editor, |s| s.auto_replies.retain(|e| e.id != id))
            .await?;
        Ok(true)
    }
}
