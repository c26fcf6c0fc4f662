use super::{TempVoiceChannel, control_rows, emoji_nickname, sanitize_base_name};
use crate::data::Data;
use crate::embeds;
use crate::platform::{ChannelKind, MemberInfo, OutgoingMessage, Overwrite, Platform, VoiceUpdate};
use crate::settings::GuildSettings;
use poise::serenity_prelude::{ChannelId, Permissions};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

const BLOCKED_NOTICE: &str = "You are blocked from this voice channel.";
const LOCKED_NOTICE: &str = "This voice channel is locked.";

/// React to a voice state change: leave handling first, then hub joins and
/// join enforcement for registered channels.
pub async fn on_voice_update(data: &Data, update: &VoiceUpdate) {
    let Some(platform) = data.platform() else {
        return;
    };

    if let Some(left) = update.left() {
        if data.temp_voice.contains(left) {
            handle_leave(data, platform.as_ref(), update, left).await;
        }
    }

    let Some(joined) = update.joined() else {
        return;
    };
    let settings = data.settings(update.guild_id).await;
    if !settings.temp_voice_enabled {
        return;
    }
    if data.temp_voice.contains(joined) {
        enforce_join(data, platform.as_ref(), &settings, update, joined).await;
    } else if settings.temp_voice_hub_channel_id == Some(joined) {
        create_for_owner(data, platform.as_ref(), &settings, update).await;
    }
}

async fn fetch_member(platform: &dyn Platform, update: &VoiceUpdate) -> Option<MemberInfo> {
    match platform.fetch_member(update.guild_id, update.user_id).await {
        Ok(member) => member,
        Err(e) => {
            warn!("Failed to fetch member {}: {e}", update.user_id);
            None
        }
    }
}

/// Hub join: create a channel for the member and hand them the controls
async fn create_for_owner(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    update: &VoiceUpdate,
) {
    let Some(category_id) = settings.temp_voice_category_id else {
        return;
    };
    let Some(member) = fetch_member(platform, update).await else {
        return;
    };

    let emojis = settings.temp_voice_emoji_list();
    let emoji = emojis
        .choose(&mut rand::rng())
        .cloned()
        .unwrap_or_else(|| "🎧".to_string());
    let channel_name = format!("{emoji}・{}", sanitize_base_name(&member.username, "user"));

    match platform.channel(category_id).await {
        Ok(Some(category)) if category.kind == ChannelKind::Category => {}
        Ok(_) => {
            warn!("Temp voice category {category_id} is missing or not a category");
            return;
        }
        Err(e) => {
            warn!("Failed to fetch temp voice category {category_id}: {e}");
            return;
        }
    }

    let access = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
    let mut overwrites = vec![
        Overwrite::everyone(update.guild_id, Permissions::empty(), access),
        Overwrite::member(
            member.user_id,
            access | Permissions::MANAGE_CHANNELS,
            Permissions::empty(),
        ),
    ];
    overwrites.extend(
        settings
            .temp_voice_access_role_ids
            .iter()
            .map(|role| Overwrite::role(*role, access, Permissions::empty())),
    );

    let channel = match platform
        .create_voice_channel(update.guild_id, channel_name.clone(), category_id, overwrites)
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            warn!("Failed to create temp voice channel for {}: {e}", member.tag());
            return;
        }
    };

    let mut state = TempVoiceChannel::new(member.user_id, emoji.clone(), channel.name.clone());
    state.remember_nick(member.user_id, member.nickname.clone());
    data.temp_voice.register(channel.id, state);

    // an unoccupied channel never sees a leave event
    if let Err(e) = platform
        .move_member(update.guild_id, member.user_id, channel.id)
        .await
    {
        warn!("Failed to move {} into {}: {e}", member.tag(), channel.name);
        data.temp_voice.remove(channel.id);
        if let Err(e) = platform.delete_channel(channel.id).await {
            warn!("Failed to delete orphaned temp voice {}: {e}", channel.name);
        }
        return;
    }
    info!("Created temp voice {} for {}", channel.name, member.tag());

    let nickname = emoji_nickname(&emoji, member.shown_name());
    if let Err(e) = platform
        .set_nickname(update.guild_id, member.user_id, nickname)
        .await
    {
        debug!("Could not set nickname for {}: {e}", member.tag());
    }

    let owner = format!("<@{}>", member.user_id);
    let panel = OutgoingMessage::embed(embeds::temp_voice_controls(
        &settings.temp_voice_control_embed,
        &owner,
        &channel.name,
    ))
    .with_content(owner)
    .with_rows(control_rows(channel.id));
    if let Err(e) = platform.send_message(channel.id, panel).await {
        warn!("Failed to post temp voice controls in {}: {e}", channel.name);
    }

    log_lifecycle(platform, settings, true, &channel.name, member.user_id.get()).await;
}

/// Join of a registered channel: emoji nickname, then block / lock enforcement
async fn enforce_join(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    update: &VoiceUpdate,
    channel: ChannelId,
) {
    let Some(member) = fetch_member(platform, update).await else {
        return;
    };
    let Some(state) = data.temp_voice.update(channel, |state| {
        state.remember_nick(member.user_id, member.nickname.clone());
        state.clone()
    }) else {
        return;
    };

    let base = state
        .original_nicks
        .get(&member.user_id)
        .cloned()
        .flatten()
        .unwrap_or_else(|| member.username.clone());
    let desired = emoji_nickname(&state.emoji, &base);
    if member.shown_name() != desired {
        if let Err(e) = platform
            .set_nickname(update.guild_id, member.user_id, desired)
            .await
        {
            debug!("Could not set nickname for {}: {e}", member.tag());
        }
    }

    if member.user_id == state.owner_id {
        return;
    }
    let notice = if state.blocked.contains(&member.user_id) {
        BLOCKED_NOTICE
    } else if state.locked && !state.trusted.contains(&member.user_id) {
        LOCKED_NOTICE
    } else {
        return;
    };

    if let Err(e) = platform
        .disconnect_member(update.guild_id, member.user_id)
        .await
    {
        warn!("Failed to disconnect {} from {}: {e}", member.tag(), state.name);
    }
    let embed = embeds::temp_voice_notice(&settings.temp_voice_dm_embed, notice);
    if let Err(e) = platform.send_dm(member.user_id, embed).await {
        debug!("Could not DM {}: {e}", member.tag());
    }
}

/// Leave of a registered channel: restore the nickname, delete the channel once empty
async fn handle_leave(data: &Data, platform: &dyn Platform, update: &VoiceUpdate, channel: ChannelId) {
    let original = data
        .temp_voice
        .update(channel, |state| state.original_nicks.remove(&update.user_id))
        .flatten();
    if let Some(nickname) = original {
        if let Err(e) = platform
            .set_nickname(update.guild_id, update.user_id, nickname.unwrap_or_default())
            .await
        {
            debug!("Could not restore nickname for {}: {e}", update.user_id);
        }
    }

    if platform.voice_member_count(update.guild_id, channel) > 0 {
        return;
    }
    if let Err(e) = platform.delete_channel(channel).await {
        warn!("Failed to delete empty temp voice {channel}: {e}");
    }
    if let Some(state) = data.temp_voice.remove(channel) {
        info!("Deleted temp voice {}", state.name);
        let settings = data.settings(update.guild_id).await;
        log_lifecycle(platform, &settings, false, &state.name, state.owner_id.get()).await;
    }
}

async fn log_lifecycle(
    platform: &dyn Platform,
    settings: &GuildSettings,
    created: bool,
    channel_name: &str,
    owner_id: u64,
) {
    let Some(log_channel) = settings.temp_voice_log_channel_id else {
        return;
    };
    let embed = embeds::temp_voice_log(created, channel_name, owner_id);
    if let Err(e) = platform
        .send_message(log_channel, OutgoingMessage::embed(embed))
        .await
    {
        warn!("Failed to log temp voice event: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelInfo, MockPlatform, PlatformError};
    use poise::serenity_prelude::{GuildId, MessageId, RoleId, UserId};
    use std::sync::Arc;

    const GUILD: u64 = 1;
    const HUB: u64 = 10;
    const CATEGORY: u64 = 11;
    const CREATED: u64 = 12;

    fn update(user: u64, old: Option<u64>, new: Option<u64>) -> VoiceUpdate {
        VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(user),
            old_channel: old.map(ChannelId::new),
            new_channel: new.map(ChannelId::new),
        }
    }

    async fn enabled_data(platform: MockPlatform) -> Data {
        let data = Data::new();
        data.set_platform(Arc::new(platform));
        data.update_settings(GuildId::new(GUILD), None, |s| {
            s.temp_voice_enabled = true;
            s.temp_voice_hub_channel_id = Some(ChannelId::new(HUB));
            s.temp_voice_category_id = Some(ChannelId::new(CATEGORY));
            s.temp_voice_access_role_ids = vec![RoleId::new(5)];
            s.temp_voice_emojis = "🔥".to_string();
        })
        .await
        .unwrap();
        data
    }

    #[tokio::test]
    async fn test_hub_join_creates_channel() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "Owner.Name"))));
        platform.expect_channel().returning(|id| {
            Ok(Some(ChannelInfo {
                id,
                name: "Temp".to_string(),
                kind: ChannelKind::Category,
                parent_id: None,
            }))
        });
        platform
            .expect_create_voice_channel()
            .withf(|_, name, parent, overwrites| {
                name == "🔥・OwnerName" && *parent == ChannelId::new(CATEGORY) && overwrites.len() == 3
            })
            .times(1)
            .returning(|_, name, parent, _| {
                Ok(ChannelInfo {
                    id: ChannelId::new(CREATED),
                    name,
                    kind: ChannelKind::Voice,
                    parent_id: Some(parent),
                })
            });
        platform
            .expect_set_nickname()
            .withf(|_, _, nick| nick == "🔥 Owner.Name")
            .returning(|_, _, _| Ok(()));
        platform
            .expect_move_member()
            .withf(|_, _, channel| *channel == ChannelId::new(CREATED))
            .times(1)
            .returning(|_, _, _| Ok(()));
        platform
            .expect_send_message()
            .withf(|channel, message| {
                *channel == ChannelId::new(CREATED) && message.rows.len() == 2
            })
            .times(1)
            .returning(|_, _| Ok(MessageId::new(1)));
        let data = enabled_data(platform).await;

        on_voice_update(&data, &update(2, None, Some(HUB))).await;

        let state = data.temp_voice.get(ChannelId::new(CREATED)).unwrap();
        assert_eq!(state.owner_id, UserId::new(2));
        assert_eq!(state.emoji, "🔥");
        assert!(state.trusted.contains(&UserId::new(2)));
        assert_eq!(state.original_nicks.get(&UserId::new(2)), Some(&None));
    }

    #[tokio::test]
    async fn test_failed_move_removes_new_channel() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "owner"))));
        platform.expect_channel().returning(|id| {
            Ok(Some(ChannelInfo {
                id,
                name: "Temp".to_string(),
                kind: ChannelKind::Category,
                parent_id: None,
            }))
        });
        platform
            .expect_create_voice_channel()
            .times(1)
            .returning(|_, name, parent, _| {
                Ok(ChannelInfo {
                    id: ChannelId::new(CREATED),
                    name,
                    kind: ChannelKind::Voice,
                    parent_id: Some(parent),
                })
            });
        // the member left the hub before the move
        platform
            .expect_move_member()
            .times(1)
            .returning(|_, _, _| Err(PlatformError::NotFound("voice state".to_string())));
        platform
            .expect_delete_channel()
            .withf(|channel| *channel == ChannelId::new(CREATED))
            .times(1)
            .returning(|_| Ok(()));
        platform.expect_set_nickname().times(0);
        platform.expect_send_message().times(0);
        let data = enabled_data(platform).await;

        on_voice_update(&data, &update(2, None, Some(HUB))).await;
        assert!(data.temp_voice.is_empty());
    }

    #[tokio::test]
    async fn test_hub_join_ignored_when_disabled() {
        let mut platform = MockPlatform::new();
        platform.expect_create_voice_channel().times(0);
        let data = enabled_data(platform).await;
        data.update_settings(GuildId::new(GUILD), None, |s| s.temp_voice_enabled = false)
            .await
            .unwrap();

        on_voice_update(&data, &update(2, None, Some(HUB))).await;
        assert!(data.temp_voice.is_empty());
    }

    #[tokio::test]
    async fn test_locked_channel_rejects_untrusted() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "guest"))));
        platform.expect_set_nickname().returning(|_, _, _| Ok(()));
        platform
            .expect_disconnect_member()
            .withf(|_, user| *user == UserId::new(3))
            .times(1)
            .returning(|_, _| Ok(()));
        platform
            .expect_send_dm()
            .withf(|_, embed| embed.description == LOCKED_NOTICE)
            .times(1)
            .returning(|_, _| Ok(()));
        let data = enabled_data(platform).await;

        let mut state = TempVoiceChannel::new(UserId::new(2), "🔥", "🔥・owner");
        state.locked = true;
        data.temp_voice.register(ChannelId::new(CREATED), state);

        on_voice_update(&data, &update(3, None, Some(CREATED))).await;
        let state = data.temp_voice.get(ChannelId::new(CREATED)).unwrap();
        assert!(state.original_nicks.contains_key(&UserId::new(3)));
    }

    #[tokio::test]
    async fn test_blocked_member_is_disconnected_even_when_unlocked() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "guest"))));
        platform.expect_set_nickname().returning(|_, _, _| Ok(()));
        platform.expect_disconnect_member().times(1).returning(|_, _| Ok(()));
        platform
            .expect_send_dm()
            .withf(|_, embed| embed.description == BLOCKED_NOTICE)
            .times(1)
            .returning(|_, _| Ok(()));
        let data = enabled_data(platform).await;

        let mut state = TempVoiceChannel::new(UserId::new(2), "🔥", "🔥・owner");
        state.block(UserId::new(3));
        data.temp_voice.register(ChannelId::new(CREATED), state);

        on_voice_update(&data, &update(3, Some(HUB + 100), Some(CREATED))).await;
    }

    #[tokio::test]
    async fn test_last_leave_deletes_channel_and_restores_nick() {
        let mut platform = MockPlatform::new();
        platform
            .expect_set_nickname()
            .withf(|_, user, nick| *user == UserId::new(2) && nick == "Old")
            .times(1)
            .returning(|_, _, _| Ok(()));
        platform.expect_voice_member_count().returning(|_, _| 0);
        platform
            .expect_delete_channel()
            .withf(|channel| *channel == ChannelId::new(CREATED))
            .times(1)
            .returning(|_| Ok(()));
        let data = enabled_data(platform).await;

        let mut state = TempVoiceChannel::new(UserId::new(2), "🔥", "🔥・owner");
        state.remember_nick(UserId::new(2), Some("Old".to_string()));
        data.temp_voice.register(ChannelId::new(CREATED), state);

        // moving to another, unrelated channel counts as leaving
        on_voice_update(&data, &update(2, Some(CREATED), Some(999))).await;
        assert!(data.temp_voice.is_empty());
    }

    #[tokio::test]
    async fn test_leave_keeps_occupied_channel() {
        let mut platform = MockPlatform::new();
        platform.expect_voice_member_count().returning(|_, _| 1);
        platform.expect_delete_channel().times(0);
        let data = enabled_data(platform).await;
        data.temp_voice.register(
            ChannelId::new(CREATED),
            TempVoiceChannel::new(UserId::new(2), "🔥", "🔥・owner"),
        );

        on_voice_update(&data, &update(3, Some(CREATED), None)).await;
        assert_eq!(data.temp_voice.len(), 1);
    }
}
