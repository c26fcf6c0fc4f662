//! Timed voice sanctions
//!
//! A voice mute or deafen issued with a duration is registered here. A background
//! task wakes up on a fixed interval (or on request) and reverses every sanction
//! whose expiry has passed.

use crate::data::Data;
use crate::moderation::PunishmentKind;
use crate::platform::Platform;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use poise::serenity_prelude::{GuildId, UserId};
use serde::Serialize;
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Request type for the sanction task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanctionCheckRequest {
    /// Reverse everything that has expired
    CheckAll,
    /// Only look at one member
    CheckUser { guild_id: GuildId, user_id: UserId },
    /// Stop the task
    Shutdown,
}

/// An active mute or deafen with an expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSanction {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub kind: PunishmentKind,
    pub user_tag: String,
    pub expires_at: DateTime<Utc>,
}

impl TimedSanction {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

type SanctionKey = (GuildId, UserId, PunishmentKind);

/// Active timed sanctions, at most one per member and kind
#[derive(Debug, Default)]
pub struct SanctionStore {
    records: DashMap<SanctionKey, TimedSanction>,
}

impl SanctionStore {
    /// Register a sanction, replacing an older one of the same kind
    pub fn register(&self, sanction: TimedSanction) {
        let key = (sanction.guild_id, sanction.user_id, sanction.kind);
        self.records.insert(key, sanction);
    }

    pub fn remove(&self, guild_id: GuildId, user_id: UserId, kind: PunishmentKind) -> Option<TimedSanction> {
        self.records
            .remove(&(guild_id, user_id, kind))
            .map(|(_, sanction)| sanction)
    }

    /// Active sanctions of a guild, soonest expiry first
    #[must_use]
    pub fn for_guild(&self, guild_id: GuildId) -> Vec<TimedSanction> {
        let mut sanctions: Vec<TimedSanction> = self
            .records
            .iter()
            .filter(|entry| entry.value().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        sanctions.sort_by_key(|s| s.expires_at);
        sanctions
    }

    /// Take every expired sanction out of the store
    fn take_expired(&self, now: DateTime<Utc>, only: Option<(GuildId, UserId)>) -> Vec<TimedSanction> {
        let keys: Vec<SanctionKey> = self
            .records
            .iter()
            .filter(|entry| {
                let sanction = entry.value();
                sanction.is_expired(now)
                    && only.is_none_or(|(guild, user)| {
                        sanction.guild_id == guild && sanction.user_id == user
                    })
            })
            .map(|entry| *entry.key())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.records.remove(&key).map(|(_, sanction)| sanction))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lift one sanction. Members who left the guild are skipped.
async fn reverse(platform: &dyn Platform, sanction: &TimedSanction) {
    match platform.fetch_member(sanction.guild_id, sanction.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            debug!(
                "Member {} left guild {}, dropping expired {}",
                sanction.user_id, sanction.guild_id, sanction.kind
            );
            return;
        }
        Err(e) => {
            warn!("Failed to fetch member {} for sanction reversal: {e}", sanction.user_id);
            return;
        }
    }

    let result = match sanction.kind {
        PunishmentKind::VoiceMute => {
            platform
                .set_voice_mute(sanction.guild_id, sanction.user_id, false)
                .await
        }
        PunishmentKind::VoiceDeafen => {
            platform
                .set_voice_deafen(sanction.guild_id, sanction.user_id, false)
                .await
        }
        other => {
            warn!("Ignoring non-voice timed sanction {other}");
            return;
        }
    };

    match result {
        Ok(()) => info!(
            "Lifted {} for {} in guild {}",
            sanction.kind, sanction.user_tag, sanction.guild_id
        ),
        Err(e) => error!(
            "Failed to lift {} for {}: {e}",
            sanction.kind, sanction.user_tag
        ),
    }
}

/// Reverse expired sanctions, optionally for a single member
pub async fn check_sanctions(data: &Data, only: Option<(GuildId, UserId)>) {
    let expired = data.sanctions.take_expired(Utc::now(), only);
    if expired.is_empty() {
        return;
    }
    let Some(platform) = data.platform() else {
        warn!("Bot not ready, putting back {} expired sanctions", expired.len());
        for sanction in expired {
            data.sanctions.register(sanction);
        }
        return;
    };
    for sanction in &expired {
        reverse(platform.as_ref(), sanction).await;
    }
}

/// Start the sanction task and install its sender in `data`
pub fn spawn_sanction_task(data: Data, check_interval_seconds: u64) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel::<SanctionCheckRequest>(100);
    data.set_sanction_sender(tx);
    tokio::spawn(sanction_task(data, rx, check_interval_seconds))
}

async fn sanction_task(data: Data, mut rx: Receiver<SanctionCheckRequest>, check_interval_seconds: u64) {
    info!("Starting sanction task with {check_interval_seconds}s interval");

    let mut interval = tokio::time::interval(Duration::from_secs(check_interval_seconds.max(1)));

    loop {
        tokio::select! {
            request = rx.recv() => {
                match request {
                    Some(SanctionCheckRequest::CheckAll) => {
                        debug!("Received request to check all sanctions");
                        check_sanctions(&data, None).await;
                    }
                    Some(SanctionCheckRequest::CheckUser { guild_id, user_id }) => {
                        debug!("Received request to check sanctions for user {user_id} in guild {guild_id}");
                        check_sanctions(&data, Some((guild_id, user_id))).await;
                    }
                    Some(SanctionCheckRequest::Shutdown) | None => {
                        info!("Received shutdown request for sanction task");
                        break;
                    }
                }
            }

            _ = interval.tick() => {
                check_sanctions(&data, None).await;
            }
        }
    }

    info!("Sanction task shut down");
}
