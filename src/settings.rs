//! Per-guild settings document and its accessors on [`Data`].

use crate::Data;
use crate::embeds::EmbedTemplate;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use poise::serenity_prelude::{ChannelId, GuildId, RoleId};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_TEMP_VOICE_EMOJIS: &str = "🎧,🎵";
const FALLBACK_EMOJI: &str = "🎧";

/// How an auto-reply trigger is matched against a message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Contains,
    Starts,
    Ends,
}

impl MatchMode {
    /// Unknown modes fall back to `contains`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starts" => Self::Starts,
            "ends" => Self::Ends,
            _ => Self::Contains,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReply {
    pub id: String,
    pub trigger: String,
    #[serde(default)]
    pub match_mode: MatchMode,
    pub response: String,
}

fn enabled() -> bool {
    true
}

fn default_emojis() -> String {
    DEFAULT_TEMP_VOICE_EMOJIS.to_string()
}

/// Configuration for one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,

    // Punishments
    #[serde(default)]
    pub log_channel_id: Option<ChannelId>,
    #[serde(default = "enabled")]
    pub punishments_enabled: bool,
    #[serde(default = "EmbedTemplate::moderation_dm")]
    pub dm_embed: EmbedTemplate,

    // Disputes
    #[serde(default = "enabled")]
    pub disputes_enabled: bool,
    #[serde(default)]
    pub dispute_log_channel_id: Option<ChannelId>,
    #[serde(default = "EmbedTemplate::dispute")]
    pub dispute_embed: EmbedTemplate,

    // Verification
    #[serde(default = "enabled")]
    pub verify_enabled: bool,
    #[serde(default)]
    pub verify_category_id: Option<ChannelId>,
    #[serde(default)]
    pub verify_log_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub verify_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub verify_admin_role_ids: Vec<RoleId>,
    #[serde(default)]
    pub verify_boy_role_id: Option<RoleId>,
    #[serde(default)]
    pub verify_girl_role_id: Option<RoleId>,
    #[serde(default = "EmbedTemplate::verify")]
    pub verify_embed: EmbedTemplate,

    // Temp voice
    #[serde(default)]
    pub temp_voice_enabled: bool,
    #[serde(default)]
    pub temp_voice_hub_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub temp_voice_category_id: Option<ChannelId>,
    #[serde(default)]
    pub temp_voice_log_channel_id: Option<ChannelId>,
    #[serde(default)]
    pub temp_voice_access_role_ids: Vec<RoleId>,
    #[serde(default = "default_emojis")]
    pub temp_voice_emojis: String,
    #[serde(default)]
    pub temp_voice_control_embed: EmbedTemplate,
    #[serde(default)]
    pub temp_voice_dm_embed: EmbedTemplate,

    #[serde(default)]
    pub auto_replies: Vec<AutoReply>,

    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_by_role: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GuildSettings {
    #[must_use]
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            log_channel_id: None,
            punishments_enabled: true,
            dm_embed: EmbedTemplate::moderation_dm(),
            disputes_enabled: true,
            dispute_log_channel_id: None,
            dispute_embed: EmbedTemplate::dispute(),
            verify_enabled: true,
            verify_category_id: None,
            verify_log_channel_id: None,
            verify_channel_id: None,
            verify_admin_role_ids: Vec::new(),
            verify_boy_role_id: None,
            verify_girl_role_id: None,
            verify_embed: EmbedTemplate::verify(),
            temp_voice_enabled: false,
            temp_voice_hub_channel_id: None,
            temp_voice_category_id: None,
            temp_voice_log_channel_id: None,
            temp_voice_access_role_ids: Vec::new(),
            temp_voice_emojis: default_emojis(),
            temp_voice_control_embed: EmbedTemplate::default(),
            temp_voice_dm_embed: EmbedTemplate::default(),
            auto_replies: Vec::new(),
            updated_by: None,
            updated_by_role: None,
            updated_at: None,
        }
    }

    /// Configured temp voice emojis, never empty
    #[must_use]
    pub fn temp_voice_emoji_list(&self) -> Vec<String> {
        let emojis: Vec<String> = self
            .temp_voice_emojis
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(ToString::to_string)
            .collect();
        if emojis.is_empty() {
            vec![FALLBACK_EMOJI.to_string()]
        } else {
            emojis
        }
    }

    /// Fill in the default moderation DM fields when none are configured
    ///
    /// Returns true when the document changed.
    pub fn ensure_dm_fields(&mut self) -> bool {
        if self.dm_embed.fields.is_empty() {
            self.dm_embed.fields = crate::embeds::default_dm_fields();
            true
        } else {
            false
        }
    }
}

/// Parse a single snowflake, rejecting zero and garbage
#[must_use]
pub fn parse_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id != 0)
}

#[must_use]
pub fn parse_channel_id(raw: &str) -> Option<ChannelId> {
    parse_id(raw).map(ChannelId::new)
}

#[must_use]
pub fn parse_role_id(raw: &str) -> Option<RoleId> {
    parse_id(raw).map(RoleId::new)
}

/// Parse a comma separated id list, skipping empty and invalid entries
#[must_use]
pub fn parse_role_ids(raw: &str) -> Vec<RoleId> {
    raw.split(',').filter_map(parse_role_id).collect()
}

/// Render ids back into the comma separated form the dashboard edits
#[must_use]
pub fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Who changed a settings document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    pub username: String,
    pub role: String,
}

impl Data {
    /// Get the settings for a guild, creating and persisting defaults on first access
    pub async fn settings(&self, guild_id: GuildId) -> GuildSettings {
        let (settings, changed) = match self.guild_settings.entry(guild_id) {
            Entry::Occupied(mut occupied) => {
                let filled = occupied.get_mut().ensure_dm_fields();
                (occupied.get().clone(), filled)
            }
            Entry::Vacant(vacant) => {
                let settings = GuildSettings::new(guild_id);
                vacant.insert(settings.clone());
                (settings, true)
            }
        };

        if changed {
            if let Err(e) = self.save().await {
                warn!("Failed to persist settings for guild {guild_id}: {e}");
            }
        }
        settings
    }

    /// Mutate the settings for a guild and persist them
    ///
    /// # Errors
    /// Returns an error when the data files cannot be written.
    pub async fn update_settings<F>(
        &self,
        guild_id: GuildId,
        editor: Option<&Editor>,
        f: F,
    ) -> Result<GuildSettings, crate::Error>
    where
        F: FnOnce(&mut GuildSettings),
    {
        let updated = {
            let mut entry = self
                .guild_settings
                .entry(guild_id)
                .or_insert_with(|| GuildSettings::new(guild_id));
            entry.ensure_dm_fields();
            f(&mut entry);
            if let Some(editor) = editor {
                entry.updated_by = Some(editor.username.clone());
                entry.updated_by_role = Some(editor.role.clone());
            }
            entry.updated_at = Some(Utc::now());
            entry.clone()
        };
        self.save().await?;
        Ok(updated)
    }
}
