//! Punishment log rows
//!
//! Every action the dispatcher performs is appended as a [`PunishmentLog`]. Rows
//! are never mutated or deleted; the warn counter is derived from them.

use crate::data::Data;
use crate::moderation::PunishmentKind;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_REASON: &str = "No reason provided";

/// Record of one moderation action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentLog {
    /// Unique ID of this row
    pub id: Uuid,
    pub guild_id: GuildId,
    /// The punished user
    pub target_user_id: UserId,
    pub target_tag: String,
    #[serde(rename = "action")]
    pub kind: PunishmentKind,
    pub reason: String,
    /// Zero when the action has no duration
    #[serde(default)]
    pub duration_ms: u64,
    /// Warn number for warns, zero otherwise
    #[serde(default)]
    pub warn_count: u32,
    /// Dashboard account id, `None` for automatic actions
    #[serde(default)]
    pub actor_id: Option<String>,
    pub actor_name: String,
    pub actor_role: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl PunishmentLog {
    /// Start a log row; the remaining fields are set with the builder methods
    #[must_use]
    pub fn new(guild_id: GuildId, target_user_id: UserId, kind: PunishmentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            guild_id,
            target_user_id,
            target_tag: target_user_id.to_string(),
            kind,
            reason: DEFAULT_REASON.to_string(),
            duration_ms: 0,
            warn_count: 0,
            actor_id: None,
            actor_name: "System".to_string(),
            actor_role: "system".to_string(),
            source: "dashboard".to_string(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn target_tag(mut self, tag: impl Into<String>) -> Self {
        self.target_tag = tag.into();
        self
    }

    /// Set the reason, keeping the default when blank
    #[must_use]
    pub fn reason(mut self, reason: &str) -> Self {
        if !reason.trim().is_empty() {
            self.reason = reason.trim().to_string();
        }
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub fn warn_count(mut self, warn_count: u32) -> Self {
        self.warn_count = warn_count;
        self
    }

    #[must_use]
    pub fn actor(
        mut self,
        id: Option<String>,
        name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        self.actor_id = id;
        self.actor_name = name.into();
        self.actor_role = role.into();
        self
    }
}

impl Data {
    /// Number of warns already logged for a user in a guild
    #[must_use]
    pub fn warn_count(&self, guild_id: GuildId, user_id: UserId) -> u32 {
        let count = self
            .punishment_logs
            .iter()
            .filter(|entry| {
                let log = entry.value();
                log.guild_id == guild_id
                    && log.target_user_id == user_id
                    && log.kind == PunishmentKind::Warn
            })
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Logs of a guild, newest first
    #[must_use]
    pub fn punishment_logs(&self, guild_id: GuildId, limit: usize) -> Vec<PunishmentLog> {
        let mut logs: Vec<PunishmentLog> = self
            .punishment_logs
            .iter()
            .filter(|entry| entry.value().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit);
        logs
    }

    /// Append a row and persist
    ///
    /// # Errors
    /// Returns an error when the logs cannot be written to disk.
    pub async fn append_punishment_log(&self, log: PunishmentLog) -> Result<(), crate::Error> {
        self.punishment_logs.insert(log.id, log);
        self.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let log = PunishmentLog::new(GuildId::new(1), UserId::new(2), PunishmentKind::Kick);
        assert_eq!(log.reason, DEFAULT_REASON);
        assert_eq!(log.target_tag, "2");
        assert_eq!(log.source, "dashboard");
        assert!(log.actor_id.is_none());

        let log = log.reason("   ").actor(Some("abc".into()), "alice", "owner");
        assert_eq!(log.reason, DEFAULT_REASON);
        assert_eq!(log.actor_name, "alice");
        assert_eq!(log.actor_role, "owner");
    }

    #[tokio::test]
    async fn test_warn_count_is_per_guild_and_user() {
        let data = Data::new();
        let guild = GuildId::new(1);
        let user = UserId::new(2);

        for kind in [PunishmentKind::Warn, PunishmentKind::Warn, PunishmentKind::Kick] {
            data.append_punishment_log(PunishmentLog::new(guild, user, kind))
                .await
                .unwrap();
        }
        data.append_punishment_log(PunishmentLog::new(GuildId::new(9), user, PunishmentKind::Warn))
            .await
            .unwrap();
        data.append_punishment_log(PunishmentLog::new(guild, UserId::new(3), PunishmentKind::Warn))
            .await
            .unwrap();

        assert_eq!(data.warn_count(guild, user), 2);
        assert_eq!(data.warn_count(guild, UserId::new(3)), 1);
        assert_eq!(data.punishment_logs(guild, 10).len(), 4);
        assert_eq!(data.punishment_logs(guild, 2).len(), 2);
    }

    #[test]
    fn test_log_serializes_action_name() {
        let log = PunishmentLog::new(GuildId::new(1), UserId::new(2), PunishmentKind::VoiceMute);
        let yaml = serde_yaml::to_string(&log).unwrap();
        assert!(yaml.contains("action: voice_mute"));
    }
}
