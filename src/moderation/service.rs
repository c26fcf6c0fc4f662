//! Punishment dispatcher
//!
//! Validates a dashboard request against the actor's role, the bot's permissions
//! and the role hierarchy, performs the action, then records and announces it.

use crate::accounts::AccountRole;
use crate::data::Data;
use crate::duration::format_long;
use crate::embeds::{self, ModerationLogEntry, Placeholders};
use crate::moderation::{
    DEFAULT_REASON, ModerationError, ModerationResult, PunishmentKind, PunishmentLog, TimedSanction,
    permission_names,
};
use crate::platform::{MemberInfo, OutgoingMessage, Platform};
use chrono::{Duration, Utc};
use poise::serenity_prelude::{ChannelId, GuildId, Permissions, UserId};
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT_MS: u64 = 60 * 60 * 1000;
pub const MAX_TIMEOUT_MS: u64 = 28 * 24 * 60 * 60 * 1000;
pub const WARN_LIMIT: u32 = 3;
const AUTO_TIMEOUT_REASON: &str = "Auto timeout after 3 warnings";

/// Who is issuing the punishment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Dashboard account id
    pub id: Option<String>,
    pub name: String,
    pub role: AccountRole,
}

/// One punishment, as submitted from the dashboard
#[derive(Debug, Clone)]
pub struct PunishmentRequest {
    pub guild_id: GuildId,
    pub target_user_id: UserId,
    pub kind: PunishmentKind,
    pub reason: String,
    pub duration_ms: Option<u64>,
    /// Run even when punishments are disabled
    pub force: bool,
    pub actor: Actor,
}

impl PunishmentRequest {
    fn reason(&self) -> &str {
        let reason = self.reason.trim();
        if reason.is_empty() { DEFAULT_REASON } else { reason }
    }

    /// Effective duration: timeouts default to an hour and are capped at 28 days
    fn effective_duration(&self) -> Option<u64> {
        match self.kind {
            PunishmentKind::Timeout => Some(
                self.duration_ms
                    .filter(|ms| *ms > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_MS)
                    .min(MAX_TIMEOUT_MS),
            ),
            PunishmentKind::VoiceMute | PunishmentKind::VoiceDeafen => self
                .duration_ms
                .filter(|ms| *ms > 0)
                .map(|ms| ms.min(MAX_TIMEOUT_MS)),
            _ => None,
        }
    }
}

/// Carry out a punishment and return the target's warn count (zero for non-warns)
///
/// # Errors
/// Returns a [`ModerationError`] when a precondition fails or the platform
/// rejects the action.
pub async fn perform_punishment(data: &Data, request: PunishmentRequest) -> ModerationResult<u32> {
    if !request.actor.role.allows_punishments() {
        return Err(ModerationError::InsufficientRole);
    }

    let platform = data.platform().ok_or(ModerationError::BotNotReady)?;
    let guild = platform
        .guild_summary(request.guild_id)
        .await?
        .ok_or(ModerationError::GuildNotFound)?;
    let target = platform
        .fetch_member(request.guild_id, request.target_user_id)
        .await?
        .ok_or(ModerationError::MemberNotFound)?;

    check_bot_standing(platform.as_ref(), request.guild_id, request.kind, &target).await?;

    let settings = data.settings(request.guild_id).await;
    if !settings.punishments_enabled && !request.force {
        return Err(match request.actor.role {
            AccountRole::Owner | AccountRole::CoOwner => ModerationError::PunishmentsDisabled,
            AccountRole::Admin => ModerationError::SystemOff,
        });
    }

    if request.kind.is_voice()
        && platform
            .voice_channel_of(request.guild_id, request.target_user_id)
            .is_none()
    {
        return Err(ModerationError::NotInVoiceChannel);
    }

    let reason = request.reason();
    let duration_ms = request.effective_duration();
    let placeholders = Placeholders::new()
        .with("reason", reason)
        .with("duration", duration_ms.map_or_else(|| "N/A".to_string(), format_long))
        .with("servername", guild.name.as_str())
        .with("user", format!("<@{}>", request.target_user_id))
        .with("actor", request.actor.name.as_str());

    let warn_count = if request.kind == PunishmentKind::Warn {
        data.warn_count(request.guild_id, request.target_user_id) + 1
    } else {
        0
    };

    let mut dm = embeds::moderation_dm(&settings.dm_embed, &placeholders, request.kind);
    if request.kind == PunishmentKind::Warn {
        dm = dm.footer(format!(
            "Warning {warn_count}/{WARN_LIMIT} • Moderator: {}",
            request.actor.name
        ));
    }
    if let Err(e) = platform.send_dm(request.target_user_id, dm).await {
        warn!("Failed to DM {} about {}: {e}", target.tag(), request.kind);
    }

    apply(platform.as_ref(), &request, reason, duration_ms).await?;

    if let Some(ms) = duration_ms.filter(|_| request.kind.is_voice()) {
        data.sanctions.register(TimedSanction {
            guild_id: request.guild_id,
            user_id: request.target_user_id,
            kind: request.kind,
            user_tag: target.tag(),
            expires_at: Utc::now() + millis(ms),
        });
    }

    let log = PunishmentLog::new(request.guild_id, request.target_user_id, request.kind)
        .target_tag(target.tag())
        .reason(reason)
        .duration_ms(duration_ms.unwrap_or(0))
        .warn_count(warn_count)
        .actor(
            request.actor.id.clone(),
            request.actor.name.as_str(),
            request.actor.role.as_str(),
        );
    record(data, platform.as_ref(), settings.log_channel_id, log).await?;

    info!(
        "{} applied {} to {} in guild {}",
        request.actor.name,
        request.kind,
        target.tag(),
        request.guild_id
    );

    if request.kind == PunishmentKind::Warn && warn_count >= WARN_LIMIT {
        auto_timeout(data, platform.as_ref(), &request, &target, &guild.name, warn_count).await?;
    }

    Ok(warn_count)
}

/// Bot permission and role hierarchy checks
async fn check_bot_standing(
    platform: &dyn Platform,
    guild_id: GuildId,
    kind: PunishmentKind,
    target: &MemberInfo,
) -> ModerationResult<()> {
    let standing = platform.bot_standing(guild_id).await?;
    let required = kind.required_permissions();
    if !standing.permissions.contains(Permissions::ADMINISTRATOR)
        && !standing.permissions.contains(required)
    {
        return Err(ModerationError::MissingBotPermissions(permission_names(
            required.difference(standing.permissions),
        )));
    }

    let bot_role = standing.highest_role.ok_or(ModerationError::BotHasNoRole)?;
    match &target.highest_role {
        Some(target_role) if bot_role.position <= target_role.position => {
            Err(ModerationError::RoleTooLow {
                bot: bot_role.name,
                target: target_role.name.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// The platform side of the action. Warns have none.
async fn apply(
    platform: &dyn Platform,
    request: &PunishmentRequest,
    reason: &str,
    duration_ms: Option<u64>,
) -> ModerationResult<()> {
    let guild = request.guild_id;
    let user = request.target_user_id;
    let result = match request.kind {
        PunishmentKind::Warn => return Ok(()),
        PunishmentKind::Timeout => {
            let until = Utc::now() + millis(duration_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
            platform
                .timeout_member(guild, user, until, reason.to_string())
                .await
        }
        PunishmentKind::Ban => platform.ban_member(guild, user, reason.to_string()).await,
        PunishmentKind::Kick => platform.kick_member(guild, user, reason.to_string()).await,
        PunishmentKind::VoiceMute => platform.set_voice_mute(guild, user, true).await,
        PunishmentKind::VoiceDeafen => platform.set_voice_deafen(guild, user, true).await,
    };
    result.map_err(|e| ModerationError::from_action(request.kind.verb(), e))
}

/// Third warning: one hour timeout by the system
async fn auto_timeout(
    data: &Data,
    platform: &dyn Platform,
    request: &PunishmentRequest,
    target: &MemberInfo,
    server_name: &str,
    warn_count: u32,
) -> ModerationResult<()> {
    let until = Utc::now() + millis(DEFAULT_TIMEOUT_MS);
    platform
        .timeout_member(
            request.guild_id,
            request.target_user_id,
            until,
            format!("Auto timeout: {warn_count} warnings"),
        )
        .await
        .map_err(|e| ModerationError::from_action("timeout", e))?;

    let settings = data.settings(request.guild_id).await;
    let placeholders = Placeholders::new()
        .with("reason", AUTO_TIMEOUT_REASON)
        .with("duration", format_long(DEFAULT_TIMEOUT_MS))
        .with("servername", server_name)
        .with("user", format!("<@{}>", request.target_user_id))
        .with("actor", "System");
    let dm = embeds::moderation_dm(&settings.dm_embed, &placeholders, PunishmentKind::Timeout);
    if let Err(e) = platform.send_dm(request.target_user_id, dm).await {
        warn!("Failed to DM {} about auto timeout: {e}", target.tag());
    }

    let log = PunishmentLog::new(request.guild_id, request.target_user_id, PunishmentKind::Timeout)
        .target_tag(target.tag())
        .reason(AUTO_TIMEOUT_REASON)
        .duration_ms(DEFAULT_TIMEOUT_MS)
        .warn_count(warn_count);
    record(data, platform, settings.log_channel_id, log).await?;

    info!(
        "Auto timed out {} in guild {} after {warn_count} warnings",
        target.tag(),
        request.guild_id
    );
    Ok(())
}

/// Persist the row and post it to the log channel
async fn record(
    data: &Data,
    platform: &dyn Platform,
    log_channel: Option<ChannelId>,
    log: PunishmentLog,
) -> ModerationResult<()> {
    let embed = embeds::moderation_log(&ModerationLogEntry {
        kind: log.kind,
        target_tag: &log.target_tag,
        target_id: log.target_user_id.get(),
        reason: &log.reason,
        actor_name: &log.actor_name,
        actor_role: &log.actor_role,
        duration_ms: log.duration_ms,
        warn_count: log.warn_count,
        at: log.created_at,
    });

    data.append_punishment_log(log)
        .await
        .map_err(|e| ModerationError::Storage(e.to_string()))?;

    if let Some(channel) = log_channel {
        if let Err(e) = platform.send_message(channel, OutgoingMessage::embed(embed)).await {
            warn!("Failed to post moderation log to {channel}: {e}");
        }
    }
    Ok(())
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms.min(MAX_TIMEOUT_MS)).unwrap_or_default())
}
