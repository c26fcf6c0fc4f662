//! Disputes between two members
//!
//! A dispute keeps two users out of the same voice channel. Whoever joins the
//! channel the other party is already in gets disconnected.

use crate::data::Data;
use crate::embeds::{self, Placeholders};
use crate::platform::{OutgoingMessage, PlatformError, VoiceUpdate};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

const DISCONNECT_REASON: &str = "Disputed users cannot be in the same voice channel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub guild_id: GuildId,
    pub user1_id: UserId,
    #[serde(default)]
    pub user1_name: String,
    pub user2_id: UserId,
    #[serde(default)]
    pub user2_name: String,
    pub created_by: String,
    #[serde(default)]
    pub created_by_role: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub disconnect_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispute {
    /// Whether the dispute pairs these two users, in either order
    #[must_use]
    pub fn pairs(&self, a: UserId, b: UserId) -> bool {
        (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
    }

    /// The other party, if `user` is part of the dispute
    #[must_use]
    pub fn other_party(&self, user: UserId) -> Option<UserId> {
        if self.user1_id == user {
            Some(self.user2_id)
        } else if self.user2_id == user {
            Some(self.user1_id)
        } else {
            None
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        format!("Dispute between {} and {}", self.user1_name, self.user2_name)
    }
}

#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("Cannot create dispute with same user")]
    SameUser,

    #[error("Bot not ready")]
    BotNotReady,

    #[error("Guild not found")]
    GuildNotFound,

    #[error("One or both users not found in server")]
    MembersNotFound,

    #[error("Dispute already exists between these users")]
    AlreadyExists,

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("Failed to save disputes: {0}")]
    Storage(String),
}

/// Input for [`Data::create_dispute`]
#[derive(Debug, Clone)]
pub struct NewDispute {
    pub guild_id: GuildId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub created_by: String,
    pub created_by_role: Option<String>,
}

impl Data {
    async fn persist_disputes(&self) -> Result<(), DisputeError> {
        self.save()
            .await
            .map_err(|e| DisputeError::Storage(e.to_string()))
    }

    /// Declare a dispute between two guild members
    ///
    /// # Errors
    /// Fails when both ids are the same user, either user is not a member, or an
    /// active dispute already pairs them.
    pub async fn create_dispute(&self, new: NewDispute) -> Result<Dispute, DisputeError> {
        if new.user1_id == new.user2_id {
            return Err(DisputeError::SameUser);
        }
        let platform = self.platform().ok_or(DisputeError::BotNotReady)?;
        platform
            .guild_summary(new.guild_id)
            .await?
            .ok_or(DisputeError::GuildNotFound)?;

        let user1 = platform.fetch_member(new.guild_id, new.user1_id).await?;
        let user2 = platform.fetch_member(new.guild_id, new.user2_id).await?;
        let (Some(user1), Some(user2)) = (user1, user2) else {
            return Err(DisputeError::MembersNotFound);
        };

        let exists = self.disputes.iter().any(|entry| {
            let dispute = entry.value();
            dispute.guild_id == new.guild_id
                && dispute.active
                && dispute.pairs(new.user1_id, new.user2_id)
        });
        if exists {
            return Err(DisputeError::AlreadyExists);
        }

        let now = Utc::now();
        let dispute = Dispute {
            id: Uuid::new_v4(),
            guild_id: new.guild_id,
            user1_id: new.user1_id,
            user1_name: user1.display_name().to_string(),
            user2_id: new.user2_id,
            user2_name: user2.display_name().to_string(),
            created_by: new.created_by,
            created_by_role: new.created_by_role,
            active: true,
            disconnect_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.disputes.insert(dispute.id, dispute.clone());
        self.persist_disputes().await?;
        info!("{}", dispute.label());
        Ok(dispute)
    }

    /// Active disputes of a guild, newest first
    #[must_use]
    pub fn active_disputes(&self, guild_id: GuildId) -> Vec<Dispute> {
        let mut disputes: Vec<Dispute> = self
            .disputes
            .iter()
            .filter(|entry| entry.guild_id == guild_id && entry.active)
            .map(|entry| entry.value().clone())
            .collect();
        disputes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        disputes
    }

    /// Delete one dispute, returning it
    ///
    /// # Errors
    /// Fails when the disputes cannot be written to disk.
    pub async fn delete_dispute(&self, id: Uuid) -> Result<Option<Dispute>, DisputeError> {
        let Some((_, dispute)) = self.disputes.remove(&id) else {
            return Ok(None);
        };
        self.persist_disputes().await?;
        Ok(Some(dispute))
    }

    /// Delete every dispute of a guild, returning how many were removed
    ///
    /// # Errors
    /// Fails when the disputes cannot be written to disk.
    pub async fn delete_all_disputes(&self, guild_id: GuildId) -> Result<usize, DisputeError> {
        let before = self.disputes.len();
        self.disputes.retain(|_, dispute| dispute.guild_id != guild_id);
        let deleted = before - self.disputes.len();
        if deleted > 0 {
            self.persist_disputes().await?;
        }
        Ok(deleted)
    }
}

/// Disconnect a member who joined the channel of someone they are in dispute with
pub async fn on_voice_update(data: &Data, update: &VoiceUpdate) {
    let Some(channel_id) = update.joined() else {
        return;
    };
    let settings = data.settings(update.guild_id).await;
    if !settings.disputes_enabled {
        return;
    }

    let disputes: Vec<Dispute> = data
        .active_disputes(update.guild_id)
        .into_iter()
        .filter(|dispute| dispute.other_party(update.user_id).is_some())
        .collect();
    if disputes.is_empty() {
        return;
    }
    let Some(platform) = data.platform() else {
        return;
    };

    for dispute in disputes {
        let Some(other) = dispute.other_party(update.user_id) else {
            continue;
        };
        if platform.voice_channel_of(update.guild_id, other) != Some(channel_id) {
            continue;
        }

        if let Err(e) = platform.disconnect_member(update.guild_id, update.user_id).await {
            error!("Failed to disconnect disputed user {}: {e}", update.user_id);
            continue;
        }
        info!(
            "Disconnected {} from {channel_id}: {DISCONNECT_REASON}",
            update.user_id
        );
        let count = match data.disputes.get_mut(&dispute.id) {
            Some(mut stored) => {
                stored.disconnect_count += 1;
                stored.updated_at = Utc::now();
                stored.disconnect_count
            }
            None => dispute.disconnect_count + 1,
        };

        let server = platform
            .guild_summary(update.guild_id)
            .await
            .ok()
            .flatten()
            .map(|guild| guild.name)
            .unwrap_or_default();
        let placeholders = Placeholders::new()
            .with("dispute", dispute.label())
            .with("user", format!("<@{}>", update.user_id))
            .with("server", server);
        if let Err(e) = platform
            .send_dm(update.user_id, embeds::dispute_dm(&settings.dispute_embed, &placeholders))
            .await
        {
            warn!("Failed to DM disputed user {}: {e}", update.user_id);
        }

        if let Some(log_channel) = settings.dispute_log_channel_id {
            let channel_name = platform
                .channel(channel_id)
                .await
                .ok()
                .flatten()
                .map(|channel| channel.name)
                .unwrap_or_else(|| channel_id.to_string());
            let embed = embeds::dispute_log(
                update.user_id.get(),
                other.get(),
                &channel_name,
                channel_id.get(),
                (&dispute.user1_name, &dispute.user2_name),
                count,
            );
            if let Err(e) = platform
                .send_message(log_channel, OutgoingMessage::embed(embed))
                .await
            {
                warn!("Failed to log dispute disconnect: {e}");
            }
        }

        if let Err(e) = data.save().await {
            error!("Failed to save dispute counter: {e}");
        }

        // The joiner is gone, other disputes no longer apply
        break;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelInfo, ChannelKind, GuildSummary, MemberInfo, MockPlatform};
    use poise::serenity_prelude::{ChannelId, MessageId};
    use std::sync::Arc;

    const GUILD: u64 = 1;

    fn platform_with_members() -> MockPlatform {
        let mut platform = MockPlatform::new();
        platform.expect_guild_summary().returning(|id| {
            Ok(Some(GuildSummary {
                id,
                name: "Guild".to_string(),
                member_count: 3,
            }))
        });
        platform.expect_fetch_member().returning(|_, user| {
            Ok((user.get() < 100).then(|| {
                let mut member = MemberInfo::plain(user.get(), &format!("user{user}"));
                member.global_name = Some(format!("User {user}"));
                member
            }))
        });
        platform
    }

    fn new_dispute(a: u64, b: u64) -> NewDispute {
        NewDispute {
            guild_id: GuildId::new(GUILD),
            user1_id: UserId::new(a),
            user2_id: UserId::new(b),
            created_by: "alice".to_string(),
            created_by_role: Some("owner".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_dispute_validation() {
        let data = Data::new();
        data.set_platform(Arc::new(platform_with_members()));

        assert!(matches!(
            data.create_dispute(new_dispute(1, 1)).await,
            Err(DisputeError::SameUser)
        ));
        assert!(matches!(
            data.create_dispute(new_dispute(1, 500)).await,
            Err(DisputeError::MembersNotFound)
        ));

        let dispute = data.create_dispute(new_dispute(1, 2)).await.unwrap();
        assert_eq!(dispute.user1_name, "User 1");
        assert_eq!(dispute.label(), "Dispute between User 1 and User 2");

        assert!(matches!(
            data.create_dispute(new_dispute(2, 1)).await,
            Err(DisputeError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_delete_disputes() {
        let data = Data::new();
        data.set_platform(Arc::new(platform_with_members()));
        let first = data.create_dispute(new_dispute(1, 2)).await.unwrap();
        data.create_dispute(new_dispute(1, 3)).await.unwrap();

        assert_eq!(data.active_disputes(GuildId::new(GUILD)).len(), 2);
        assert_eq!(data.delete_dispute(first.id).await.unwrap(), Some(first.clone()));
        assert_eq!(data.delete_dispute(first.id).await.unwrap(), None);
        assert_eq!(data.delete_all_disputes(GuildId::new(GUILD)).await.unwrap(), 1);
        assert_eq!(data.delete_all_disputes(GuildId::new(GUILD)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_joiner_is_disconnected_and_counted() {
        let data = Data::new();
        let mut platform = platform_with_members();
        platform
            .expect_voice_channel_of()
            .returning(|_, user| (user == UserId::new(2)).then(|| ChannelId::new(50)));
        platform
            .expect_disconnect_member()
            .withf(|_, user| *user == UserId::new(1))
            .times(1)
            .returning(|_, _| Ok(()));
        platform.expect_send_dm().times(1).returning(|_, _| Ok(()));
        platform.expect_channel().returning(|id| {
            Ok(Some(ChannelInfo {
                id,
                name: "General".to_string(),
                kind: ChannelKind::Voice,
                parent_id: None,
            }))
        });
        platform
            .expect_send_message()
            .withf(|channel, _| *channel == ChannelId::new(77))
            .times(1)
            .returning(|_, _| Ok(MessageId::new(1)));
        data.set_platform(Arc::new(platform));
        data.update_settings(GuildId::new(GUILD), None, |s| {
            s.dispute_log_channel_id = Some(ChannelId::new(77));
        })
        .await
        .unwrap();

        let dispute = data.create_dispute(new_dispute(1, 2)).await.unwrap();
        let update = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(1),
            old_channel: None,
            new_channel: Some(ChannelId::new(50)),
        };
        on_voice_update(&data, &update).await;

        assert_eq!(data.disputes.get(&dispute.id).unwrap().disconnect_count, 1);
    }

    #[tokio::test]
    async fn test_counter_keeps_disconnects_recorded_meanwhile() {
        let data = Data::new();
        let mut platform = platform_with_members();
        platform
            .expect_voice_channel_of()
            .returning(|_, user| (user == UserId::new(2)).then(|| ChannelId::new(50)));
        platform.expect_disconnect_member().times(2).returning(|_, _| Ok(()));
        // another event handled while the DM is in flight
        let concurrent = data.clone();
        platform.expect_send_dm().times(2).returning(move |_, _| {
            for mut dispute in concurrent.disputes.iter_mut() {
                dispute.disconnect_count += 1;
            }
            Ok(())
        });
        data.set_platform(Arc::new(platform));

        let dispute = data.create_dispute(new_dispute(1, 2)).await.unwrap();
        let update = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(1),
            old_channel: None,
            new_channel: Some(ChannelId::new(50)),
        };
        on_voice_update(&data, &update).await;
        assert_eq!(data.disputes.get(&dispute.id).unwrap().disconnect_count, 2);

        on_voice_update(&data, &update).await;
        assert_eq!(data.disputes.get(&dispute.id).unwrap().disconnect_count, 4);
    }

    #[tokio::test]
    async fn test_reactor_ignores_disabled_and_other_channels() {
        let data = Data::new();
        let mut platform = platform_with_members();
        platform
            .expect_voice_channel_of()
            .returning(|_, _| Some(ChannelId::new(60)));
        platform.expect_disconnect_member().times(0);
        data.set_platform(Arc::new(platform));
        data.create_dispute(new_dispute(1, 2)).await.unwrap();

        let update = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(1),
            old_channel: None,
            new_channel: Some(ChannelId::new(50)),
        };
        on_voice_update(&data, &update).await;

        data.update_settings(GuildId::new(GUILD), None, |s| s.disputes_enabled = false)
            .await
            .unwrap();
        let same_channel = VoiceUpdate {
            new_channel: Some(ChannelId::new(60)),
            ..update
        };
        on_voice_update(&data, &same_channel).await;
    }
}
