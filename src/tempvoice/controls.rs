use super::{
    ControlAction, MAX_BASE_NAME_LEN, MemberOp, RENAME_INPUT_ID, TempVoiceChannel,
    TempVoiceComponent, sanitize_base_name,
};
use crate::data::Data;
use crate::platform::{InteractionReply, ModalSpec, Overwrite, Platform};
use poise::serenity_prelude::{ChannelId, GuildId, Permissions, UserId};
use std::sync::Arc;
use tracing::{info, warn};

const OWNER_ONLY: &str = "Only the owner can use these controls.";

/// Resolve the channel and its state, checking that `user` owns it
async fn owned_channel(
    data: &Data,
    channel: ChannelId,
    user: UserId,
    owner_only: &str,
) -> Result<(Arc<dyn Platform>, TempVoiceChannel), InteractionReply> {
    let platform = data
        .platform()
        .ok_or_else(|| InteractionReply::ephemeral("Bot not ready"))?;
    match platform.channel(channel).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(InteractionReply::ephemeral("Channel not found.")),
        Err(e) => {
            warn!("Failed to fetch temp voice channel {channel}: {e}");
            return Err(InteractionReply::ephemeral("Channel not found."));
        }
    }
    let state = data
        .temp_voice
        .get(channel)
        .ok_or_else(|| InteractionReply::ephemeral("Not a temp voice channel."))?;
    if state.owner_id != user {
        return Err(InteractionReply::ephemeral(owner_only));
    }
    Ok((platform, state))
}

/// Control panel button
pub async fn handle_button(
    data: &Data,
    guild_id: GuildId,
    user: UserId,
    action: ControlAction,
    channel: ChannelId,
) -> InteractionReply {
    let platform = match owned_channel(data, channel, user, OWNER_ONLY).await {
        Ok((platform, _)) => platform,
        Err(reply) => return reply,
    };

    match action {
        ControlAction::Lock | ControlAction::Unlock => {
            let locked = action == ControlAction::Lock;
            data.temp_voice.update(channel, |state| state.locked = locked);

            let (allow, deny) = if locked {
                (Permissions::VIEW_CHANNEL, Permissions::CONNECT)
            } else {
                (Permissions::VIEW_CHANNEL | Permissions::CONNECT, Permissions::empty())
            };
            let settings = data.settings(guild_id).await;
            for role in &settings.temp_voice_access_role_ids {
                if let Err(e) = platform
                    .set_overwrite(channel, Overwrite::role(*role, allow, deny))
                    .await
                {
                    warn!("Failed to update access role {role} on {channel}: {e}");
                }
            }
            info!("Temp voice {channel} {}", if locked { "locked" } else { "unlocked" });
            InteractionReply::Acknowledge
        }
        ControlAction::Rename => InteractionReply::Modal(ModalSpec {
            custom_id: TempVoiceComponent::RenameModal(channel).custom_id(),
            title: "Rename Voice Channel".to_string(),
            input_id: RENAME_INPUT_ID.to_string(),
            label: "New base name (emoji is kept)".to_string(),
            max_length: MAX_BASE_NAME_LEN as u16,
        }),
        ControlAction::Member(op) => InteractionReply::UserSelect {
            custom_id: TempVoiceComponent::Select(op, channel).custom_id(),
            content: "Choose a user:".to_string(),
        },
    }
}

/// User picked from the select menu
pub async fn handle_select(
    data: &Data,
    guild_id: GuildId,
    user: UserId,
    op: MemberOp,
    channel: ChannelId,
    selected: Option<UserId>,
) -> InteractionReply {
    let platform = match owned_channel(data, channel, user, OWNER_ONLY).await {
        Ok((platform, _)) => platform,
        Err(reply) => return reply,
    };
    let Some(target) = selected else {
        return InteractionReply::ephemeral("No user selected.");
    };

    let access = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
    match op {
        MemberOp::Block => {
            data.temp_voice.update(channel, |state| state.block(target));
            if let Err(e) = platform
                .set_overwrite(channel, Overwrite::member(target, Permissions::empty(), access))
                .await
            {
                warn!("Failed to block {target} on {channel}: {e}");
            }
            InteractionReply::ephemeral("User blocked.")
        }
        MemberOp::Trust => {
            data.temp_voice.update(channel, |state| state.trust(target));
            if let Err(e) = platform
                .set_overwrite(channel, Overwrite::member(target, access, Permissions::empty()))
                .await
            {
                warn!("Failed to trust {target} on {channel}: {e}");
            }
            InteractionReply::ephemeral("User trusted.")
        }
        MemberOp::Kick => {
            if platform.voice_channel_of(guild_id, target) == Some(channel) {
                if let Err(e) = platform.disconnect_member(guild_id, target).await {
                    warn!("Failed to disconnect {target} from {channel}: {e}");
                }
            }
            InteractionReply::ephemeral("User disconnected.")
        }
    }
}

/// Rename modal submitted
pub async fn handle_rename(data: &Data, user: UserId, channel: ChannelId, raw: &str) -> InteractionReply {
    let (platform, state) = match owned_channel(data, channel, user, "Only the owner can rename.").await {
        Ok(found) => found,
        Err(reply) => return reply,
    };

    let name = format!("{}-{}", state.emoji, sanitize_base_name(raw, "voice"));
    if let Err(e) = platform.rename_channel(channel, name.clone()).await {
        warn!("Failed to rename temp voice {channel}: {e}");
    }
    data.temp_voice.update(channel, |state| state.name = name);
    InteractionReply::ephemeral("Channel renamed.")
}
