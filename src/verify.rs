//! Verification workflow
//!
//! Joining the verify channel posts a request in the verify log channel. An admin
//! claims it, which creates a private voice channel for the admin and the
//! requester, then picks a role with the Girl / Boy buttons. Requests are keyed by
//! the id of the posted message and live in memory only.

use crate::data::Data;
use crate::embeds::{self, EmbedSpec, Placeholders, VERIFIED_COLOR};
use crate::platform::{
    ButtonSpec, ButtonTone, ChannelKind, InteractionReply, OutgoingMessage, Overwrite, Platform,
    VoiceUpdate,
};
use crate::settings::GuildSettings;
use dashmap::{DashMap, DashSet};
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, Permissions, UserId};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Grace period before an unused verification channel is removed
pub const EMPTY_CHECK_DELAY: Duration = Duration::from_secs(5);

const EXPIRED: &str = "This verification request has expired.";
const NOT_FOUND: &str = "User not found in server.";

/// One pending or claimed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVerification {
    pub user_id: UserId,
    /// The verify channel the request came from
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub admin_id: Option<UserId>,
    pub voice_channel_id: Option<ChannelId>,
}

/// Verifications by request message id
#[derive(Debug, Default)]
pub struct VerificationRegistry {
    requests: DashMap<MessageId, ActiveVerification>,
    /// Users whose request is being posted
    posting: DashSet<UserId>,
}

impl VerificationRegistry {
    pub fn register(&self, message: MessageId, verification: ActiveVerification) {
        self.requests.insert(message, verification);
    }

    #[must_use]
    pub fn get(&self, message: MessageId) -> Option<ActiveVerification> {
        self.requests.get(&message).map(|entry| entry.value().clone())
    }

    /// Mark a request for `user` as in flight
    ///
    /// Returns `false` when the user already has an unclaimed request or
    /// another post is in progress. A successful reservation must be
    /// released with [`Self::release`].
    pub fn reserve(&self, user: UserId) -> bool {
        if !self.posting.insert(user) {
            return false;
        }
        if self.has_unclaimed(user) {
            self.posting.remove(&user);
            return false;
        }
        true
    }

    pub fn release(&self, user: UserId) {
        self.posting.remove(&user);
    }

    #[must_use]
    pub fn has_unclaimed(&self, user: UserId) -> bool {
        self.requests
            .iter()
            .any(|entry| entry.user_id == user && entry.admin_id.is_none())
    }

    #[must_use]
    pub fn find_by_voice_channel(&self, channel: ChannelId) -> Option<MessageId> {
        self.requests
            .iter()
            .find(|entry| entry.voice_channel_id == Some(channel))
            .map(|entry| *entry.key())
    }

    pub fn claim(&self, message: MessageId, admin: UserId, voice_channel: ChannelId) {
        if let Some(mut entry) = self.requests.get_mut(&message) {
            entry.admin_id = Some(admin);
            entry.voice_channel_id = Some(voice_channel);
        }
    }

    pub fn remove(&self, message: MessageId) -> Option<ActiveVerification> {
        self.requests.remove(&message).map(|(_, verification)| verification)
    }

    /// Remove the request only if it still points at `channel`
    pub fn remove_for_channel(&self, message: MessageId, channel: ChannelId) -> bool {
        self.requests
            .remove_if(&message, |_, v| v.voice_channel_id == Some(channel))
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Girl,
    Boy,
}

impl Gender {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Girl => "girl",
            Self::Boy => "boy",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Girl => "Girl",
            Self::Boy => "Boy",
        }
    }

    const fn emoji(self) -> &'static str {
        match self {
            Self::Girl => "👩",
            Self::Boy => "👨",
        }
    }
}

/// A parsed `verify_*` component id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyComponent {
    Claim(UserId),
    Assign(Gender, UserId),
}

impl VerifyComponent {
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        let rest = custom_id.strip_prefix("verify_")?;
        let (kind, user) = rest.split_once('_')?;
        let user = crate::settings::parse_id(user).map(UserId::new)?;
        match kind {
            "claim" => Some(Self::Claim(user)),
            "girl" => Some(Self::Assign(Gender::Girl, user)),
            "boy" => Some(Self::Assign(Gender::Boy, user)),
            _ => None,
        }
    }

    #[must_use]
    pub fn custom_id(&self) -> String {
        match self {
            Self::Claim(user) => format!("verify_claim_{user}"),
            Self::Assign(gender, user) => format!("verify_{}_{user}", gender.as_str()),
        }
    }
}

fn claim_row(user: UserId) -> Vec<Vec<ButtonSpec>> {
    vec![vec![
        ButtonSpec::new(VerifyComponent::Claim(user).custom_id(), "Claim", ButtonTone::Primary)
            .emoji("✅"),
    ]]
}

fn gender_row(user: UserId) -> Vec<Vec<ButtonSpec>> {
    vec![vec![
        ButtonSpec::new(
            VerifyComponent::Assign(Gender::Girl, user).custom_id(),
            "Girl",
            ButtonTone::Success,
        )
        .emoji(Gender::Girl.emoji()),
        ButtonSpec::new(
            VerifyComponent::Assign(Gender::Boy, user).custom_id(),
            "Boy",
            ButtonTone::Primary,
        )
        .emoji(Gender::Boy.emoji()),
    ]]
}

fn request_embed(
    settings: &GuildSettings,
    user: UserId,
    channel_name: &str,
    admin: Option<UserId>,
) -> EmbedSpec {
    let placeholders = Placeholders::new()
        .with("user", format!("<@{user}>"))
        .with("channel", channel_name)
        .with("admin", admin.map(|a| format!("<@{a}>")).unwrap_or_default());
    embeds::verify_request(&settings.verify_embed, &placeholders)
}

/// React to a voice state change: request on verify channel joins, cleanup on leaves
pub async fn on_voice_update(data: &Data, update: &VoiceUpdate) {
    let Some(platform) = data.platform() else {
        return;
    };
    let settings = data.settings(update.guild_id).await;
    if !settings.verify_enabled {
        return;
    }
    if let Some(left) = update.left() {
        cleanup_on_leave(data, platform.as_ref(), &settings, update.guild_id, left).await;
    }
    if let Some(joined) = update.joined() {
        if settings.verify_channel_id == Some(joined) {
            post_request(data, platform.as_ref(), &settings, update.user_id, joined).await;
        }
    }
}

async fn post_request(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    user: UserId,
    channel: ChannelId,
) {
    let Some(log_channel) = settings.verify_log_channel_id else {
        return;
    };
    if !data.verifications.reserve(user) {
        debug!("Verification for {user} already pending");
        return;
    }
    send_request(data, platform, settings, user, channel, log_channel).await;
    data.verifications.release(user);
}

async fn send_request(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    user: UserId,
    channel: ChannelId,
    log_channel: ChannelId,
) {
    match platform.channel(log_channel).await {
        Ok(Some(info)) if info.kind == ChannelKind::Text => {}
        Ok(_) => {
            warn!("Verify log channel {log_channel} is missing or not a text channel");
            return;
        }
        Err(e) => {
            warn!("Failed to fetch verify log channel {log_channel}: {e}");
            return;
        }
    }
    let channel_name = match platform.channel(channel).await {
        Ok(Some(info)) => info.name,
        _ => channel.to_string(),
    };

    let message = OutgoingMessage::embed(request_embed(settings, user, &channel_name, None))
        .with_rows(claim_row(user));
    match platform.send_message(log_channel, message).await {
        Ok(message_id) => {
            data.verifications.register(
                message_id,
                ActiveVerification {
                    user_id: user,
                    channel_id: channel,
                    channel_name,
                    admin_id: None,
                    voice_channel_id: None,
                },
            );
            info!("Posted verification request for {user}");
        }
        Err(e) => warn!("Failed to post verification request for {user}: {e}"),
    }
}

/// Delete a verification channel once the last member has left it
async fn cleanup_on_leave(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    guild: GuildId,
    channel: ChannelId,
) {
    if platform.voice_member_count(guild, channel) > 0 {
        return;
    }
    let tracked = data.verifications.find_by_voice_channel(channel);
    if tracked.is_none() {
        let looks_like_verify = platform.cached_channel(guild, channel).is_some_and(|info| {
            info.name.to_lowercase().starts_with("verify-")
                && settings
                    .verify_category_id
                    .is_none_or(|category| info.parent_id == Some(category))
        });
        if !looks_like_verify {
            return;
        }
    }

    if let Err(e) = platform.delete_channel(channel).await {
        warn!("Failed to delete verification channel {channel}: {e}");
    }
    if let Some(message) = tracked {
        data.verifications.remove(message);
    }
}

/// Entry point for `verify_*` buttons on the request posted as `message`
pub async fn handle_component(
    data: &Data,
    guild: GuildId,
    message: MessageId,
    clicker: UserId,
    component: VerifyComponent,
) -> InteractionReply {
    let settings = data.settings(guild).await;
    if !settings.verify_enabled {
        return InteractionReply::ephemeral("Verification system is currently disabled.");
    }
    let Some(platform) = data.platform() else {
        return InteractionReply::ephemeral("Bot not ready");
    };
    match component {
        VerifyComponent::Claim(user) => {
            claim(data, platform, &settings, guild, message, clicker, user).await
        }
        VerifyComponent::Assign(gender, user) => {
            assign(data, platform.as_ref(), &settings, guild, message, gender, user).await
        }
    }
}

/// The request behind `message`, if it still belongs to `user`
fn request_for(data: &Data, message: MessageId, user: UserId) -> Option<ActiveVerification> {
    data.verifications
        .get(message)
        .filter(|verification| verification.user_id == user)
}

async fn claim(
    data: &Data,
    platform: Arc<dyn Platform>,
    settings: &GuildSettings,
    guild: GuildId,
    message: MessageId,
    admin: UserId,
    user: UserId,
) -> InteractionReply {
    let Some(verification) = request_for(data, message, user) else {
        return InteractionReply::ephemeral(EXPIRED);
    };
    if platform.voice_channel_of(guild, admin).is_none() {
        return InteractionReply::ephemeral(
            "You must be in a voice channel to claim this verification.",
        );
    }
    let is_verify_admin = match platform.fetch_member(guild, admin).await {
        Ok(Some(member)) => member
            .roles
            .iter()
            .any(|role| settings.verify_admin_role_ids.contains(role)),
        _ => false,
    };
    if !is_verify_admin {
        return InteractionReply::ephemeral("You do not have permission to claim verifications.");
    }

    let Some(category) = settings.verify_category_id else {
        return InteractionReply::ephemeral("Category ID is not configured.");
    };
    match platform.channel(category).await {
        Ok(Some(info)) if info.kind == ChannelKind::Category => {}
        _ => return InteractionReply::ephemeral("Category not found."),
    }
    let Ok(Some(member)) = platform.fetch_member(guild, user).await else {
        return InteractionReply::ephemeral(NOT_FOUND);
    };

    let access = Permissions::VIEW_CHANNEL | Permissions::CONNECT;
    let overwrites = vec![
        Overwrite::everyone(guild, Permissions::empty(), Permissions::VIEW_CHANNEL),
        Overwrite::member(user, access, Permissions::empty()),
        Overwrite::member(admin, access, Permissions::empty()),
    ];
    let voice = match platform
        .create_voice_channel(guild, format!("verify-{}", member.username), category, overwrites)
        .await
    {
        Ok(voice) => voice,
        Err(e) => {
            warn!("Failed to create verification channel for {}: {e}", member.tag());
            return InteractionReply::ephemeral("Failed to create verification channel.");
        }
    };

    for who in [user, admin] {
        if let Err(e) = platform.move_member(guild, who, voice.id).await {
            debug!("Could not move {who} into {}: {e}", voice.name);
        }
    }
    data.verifications.claim(message, admin, voice.id);
    schedule_empty_check(data.clone(), platform, guild, voice.id, message);
    info!("{admin} claimed verification of {}", member.tag());

    let mut embed = request_embed(settings, user, &verification.channel_name, Some(admin));
    embed.description.push_str(&format!("\n\n**Claimed by:** <@{admin}>"));
    InteractionReply::UpdateMessage {
        embed,
        rows: gender_row(user),
    }
}

/// Remove the verification channel if nobody is in it after the grace period
fn schedule_empty_check(
    data: Data,
    platform: Arc<dyn Platform>,
    guild: GuildId,
    channel: ChannelId,
    message: MessageId,
) {
    tokio::spawn(async move {
        tokio::time::sleep(EMPTY_CHECK_DELAY).await;
        match platform.channel(channel).await {
            Ok(Some(_)) => {}
            _ => return,
        }
        if platform.voice_member_count(guild, channel) > 0 {
            return;
        }
        if let Err(e) = platform.delete_channel(channel).await {
            warn!("Failed to delete unused verification channel {channel}: {e}");
        }
        data.verifications.remove_for_channel(message, channel);
    });
}

async fn assign(
    data: &Data,
    platform: &dyn Platform,
    settings: &GuildSettings,
    guild: GuildId,
    message: MessageId,
    gender: Gender,
    user: UserId,
) -> InteractionReply {
    let Some(verification) = request_for(data, message, user) else {
        return InteractionReply::ephemeral(EXPIRED);
    };
    let role = match gender {
        Gender::Girl => settings.verify_girl_role_id,
        Gender::Boy => settings.verify_boy_role_id,
    };
    let Some(role) = role else {
        return InteractionReply::ephemeral(format!("{} role is not configured.", gender.label()));
    };
    let Ok(Some(member)) = platform.fetch_member(guild, user).await else {
        return InteractionReply::ephemeral(NOT_FOUND);
    };

    if let Err(e) = platform.add_role(guild, user, role).await {
        warn!("Failed to add {} role to {}: {e}", gender.as_str(), member.tag());
    }

    let admin = verification
        .admin_id
        .map(|a| format!("<@{a}>"))
        .unwrap_or_default();
    let mut embed = request_embed(settings, user, &verification.channel_name, verification.admin_id);
    embed.description.push_str(&format!(
        "\n\n**Claimed by:** {admin}\n**Verified as:** {} {}",
        gender.emoji(),
        gender.label()
    ));
    embed.color = VERIFIED_COLOR;

    if let Some(voice) = verification.voice_channel_id {
        if platform.voice_member_count(guild, voice) == 0 {
            if let Err(e) = platform.delete_channel(voice).await {
                debug!("Could not delete verification channel {voice}: {e}");
            }
        }
    }
    data.verifications.remove(message);
    info!("Verified {} as {}", member.tag(), gender.as_str());

    InteractionReply::UpdateMessage {
        embed,
        rows: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelInfo, MemberInfo, MockPlatform};
    use poise::serenity_prelude::RoleId;

    const GUILD: u64 = 1;
    const VERIFY_CHANNEL: u64 = 20;
    const LOG_CHANNEL: u64 = 21;
    const CATEGORY: u64 = 22;
    const CREATED: u64 = 23;
    const ADMIN: u64 = 5;
    const USER: u64 = 6;

    fn channel_info(id: ChannelId) -> Option<ChannelInfo> {
        let (name, kind, parent_id) = match id.get() {
            VERIFY_CHANNEL => ("Verify", ChannelKind::Voice, None),
            LOG_CHANNEL => ("verify-log", ChannelKind::Text, None),
            CATEGORY => ("Verification", ChannelKind::Category, None),
            CREATED => ("verify-user", ChannelKind::Voice, Some(ChannelId::new(CATEGORY))),
            _ => return None,
        };
        Some(ChannelInfo {
            id,
            name: name.to_string(),
            kind,
            parent_id,
        })
    }

    async fn configured_data(platform: MockPlatform) -> Data {
        let data = Data::new();
        data.set_platform(Arc::new(platform));
        data.update_settings(GuildId::new(GUILD), None, |s| {
            s.verify_channel_id = Some(ChannelId::new(VERIFY_CHANNEL));
            s.verify_log_channel_id = Some(ChannelId::new(LOG_CHANNEL));
            s.verify_category_id = Some(ChannelId::new(CATEGORY));
            s.verify_admin_role_ids = vec![RoleId::new(100)];
            s.verify_girl_role_id = Some(RoleId::new(200));
        })
        .await
        .unwrap();
        data
    }

    fn pending(data: &Data) -> MessageId {
        let message = MessageId::new(900);
        data.verifications.register(
            message,
            ActiveVerification {
                user_id: UserId::new(USER),
                channel_id: ChannelId::new(VERIFY_CHANNEL),
                channel_name: "Verify".to_string(),
                admin_id: None,
                voice_channel_id: None,
            },
        );
        message
    }

    #[test]
    fn test_component_ids() {
        let user = UserId::new(42);
        for component in [
            VerifyComponent::Claim(user),
            VerifyComponent::Assign(Gender::Girl, user),
            VerifyComponent::Assign(Gender::Boy, user),
        ] {
            assert_eq!(VerifyComponent::parse(&component.custom_id()), Some(component));
        }
        assert_eq!(VerifyComponent::Claim(user).custom_id(), "verify_claim_42");
        assert_eq!(VerifyComponent::parse("verify_other_42"), None);
        assert_eq!(VerifyComponent::parse("tv_lock_42"), None);
    }

    #[tokio::test]
    async fn test_join_posts_single_request() {
        let mut platform = MockPlatform::new();
        platform.expect_channel().returning(|id| Ok(channel_info(id)));
        platform
            .expect_send_message()
            .withf(|channel, message| {
                *channel == ChannelId::new(LOG_CHANNEL)
                    && message.rows[0][0].custom_id == format!("verify_claim_{USER}")
            })
            .times(1)
            .returning(|_, _| Ok(MessageId::new(900)));
        let data = configured_data(platform).await;

        let join = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(USER),
            old_channel: None,
            new_channel: Some(ChannelId::new(VERIFY_CHANNEL)),
        };
        on_voice_update(&data, &join).await;
        on_voice_update(&data, &join).await;

        assert_eq!(data.verifications.len(), 1);
        let verification = data.verifications.get(MessageId::new(900)).unwrap();
        assert_eq!(verification.channel_name, "Verify");
    }

    #[tokio::test]
    async fn test_buttons_when_disabled() {
        let data = configured_data(MockPlatform::new()).await;
        data.update_settings(GuildId::new(GUILD), None, |s| s.verify_enabled = false)
            .await
            .unwrap();
        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Claim(UserId::new(USER)),
        )
        .await;
        assert_eq!(
            reply,
            InteractionReply::ephemeral("Verification system is currently disabled.")
        );
    }

    #[tokio::test]
    async fn test_claim_preconditions() {
        let mut platform = MockPlatform::new();
        platform
            .expect_voice_channel_of()
            .returning(|_, user| (user == UserId::new(ADMIN)).then(|| ChannelId::new(99)));
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "nobody"))));
        let data = configured_data(platform).await;

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Claim(UserId::new(USER)),
        )
        .await;
        assert_eq!(reply, InteractionReply::ephemeral(EXPIRED));

        pending(&data);
        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(7),
            VerifyComponent::Claim(UserId::new(USER)),
        )
        .await;
        assert_eq!(
            reply,
            InteractionReply::ephemeral("You must be in a voice channel to claim this verification.")
        );

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Claim(UserId::new(USER)),
        )
        .await;
        assert_eq!(
            reply,
            InteractionReply::ephemeral("You do not have permission to claim verifications.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_then_assign() {
        let mut platform = MockPlatform::new();
        platform.expect_channel().returning(|id| Ok(channel_info(id)));
        platform
            .expect_voice_channel_of()
            .returning(|_, _| Some(ChannelId::new(99)));
        platform.expect_fetch_member().returning(|_, user| {
            let mut member = MemberInfo::plain(user.get(), "user");
            if user == UserId::new(ADMIN) {
                member.roles = vec![RoleId::new(100)];
            }
            Ok(Some(member))
        });
        platform
            .expect_create_voice_channel()
            .withf(|_, name, parent, overwrites| {
                name == "verify-user" && *parent == ChannelId::new(CATEGORY) && overwrites.len() == 3
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
        platform.expect_move_member().times(2).returning(|_, _, _| Ok(()));
        platform
            .expect_add_role()
            .withf(|_, user, role| *user == UserId::new(USER) && *role == RoleId::new(200))
            .times(1)
            .returning(|_, _, _| Ok(()));
        platform.expect_voice_member_count().returning(|_, _| 2);
        platform.expect_delete_channel().times(0);
        let data = configured_data(platform).await;
        let message = pending(&data);

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Claim(UserId::new(USER)),
        )
        .await;
        match reply {
            InteractionReply::UpdateMessage { embed, rows } => {
                assert!(embed.description.ends_with(&format!("**Claimed by:** <@{ADMIN}>")));
                assert_eq!(rows[0].len(), 2);
                assert_eq!(rows[0][0].custom_id, format!("verify_girl_{USER}"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        let claimed = data.verifications.get(message).unwrap();
        assert_eq!(claimed.admin_id, Some(UserId::new(ADMIN)));
        assert_eq!(claimed.voice_channel_id, Some(ChannelId::new(CREATED)));

        // the channel is occupied, so the delayed check keeps it
        tokio::time::sleep(EMPTY_CHECK_DELAY + Duration::from_millis(10)).await;
        assert!(data.verifications.get(message).is_some());

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Assign(Gender::Girl, UserId::new(USER)),
        )
        .await;
        match reply {
            InteractionReply::UpdateMessage { embed, rows } => {
                assert!(embed.description.contains("**Verified as:** 👩 Girl"));
                assert_eq!(embed.color, VERIFIED_COLOR);
                assert!(rows.is_empty());
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(data.verifications.remove(message).is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_role() {
        let mut platform = MockPlatform::new();
        platform.expect_add_role().times(0);
        let data = configured_data(platform).await;
        pending(&data);

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            MessageId::new(900),
            UserId::new(ADMIN),
            VerifyComponent::Assign(Gender::Boy, UserId::new(USER)),
        )
        .await;
        assert_eq!(reply, InteractionReply::ephemeral("Boy role is not configured."));
    }

    #[test]
    fn test_reserve_blocks_concurrent_posts() {
        let registry = VerificationRegistry::default();
        let user = UserId::new(USER);
        assert!(registry.reserve(user));
        // a second join while the first request is still being sent
        assert!(!registry.reserve(user));

        registry.register(
            MessageId::new(900),
            ActiveVerification {
                user_id: user,
                channel_id: ChannelId::new(VERIFY_CHANNEL),
                channel_name: "Verify".to_string(),
                admin_id: None,
                voice_channel_id: None,
            },
        );
        registry.release(user);
        assert!(!registry.reserve(user));

        registry.claim(MessageId::new(900), UserId::new(ADMIN), ChannelId::new(CREATED));
        assert!(registry.reserve(user));
    }

    #[tokio::test]
    async fn test_assign_targets_clicked_request() {
        let mut platform = MockPlatform::new();
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), "user"))));
        platform.expect_add_role().times(1).returning(|_, _, _| Ok(()));
        platform
            .expect_voice_member_count()
            .withf(|_, channel| *channel == ChannelId::new(CREATED))
            .returning(|_, _| 0);
        platform
            .expect_delete_channel()
            .withf(|channel| *channel == ChannelId::new(CREATED))
            .times(1)
            .returning(|_| Ok(()));
        let data = configured_data(platform).await;

        // a claimed request and a newer unclaimed one for the same user
        let claimed = pending(&data);
        data.verifications
            .claim(claimed, UserId::new(ADMIN), ChannelId::new(CREATED));
        let newer = MessageId::new(901);
        data.verifications.register(
            newer,
            ActiveVerification {
                user_id: UserId::new(USER),
                channel_id: ChannelId::new(VERIFY_CHANNEL),
                channel_name: "Verify".to_string(),
                admin_id: None,
                voice_channel_id: None,
            },
        );

        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            claimed,
            UserId::new(ADMIN),
            VerifyComponent::Assign(Gender::Girl, UserId::new(USER)),
        )
        .await;
        match reply {
            InteractionReply::UpdateMessage { embed, .. } => {
                assert!(embed.description.contains(&format!("**Claimed by:** <@{ADMIN}>")));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(data.verifications.get(claimed).is_none());
        assert!(data.verifications.get(newer).is_some());

        // buttons on a request that belongs to someone else
        let reply = handle_component(
            &data,
            GuildId::new(GUILD),
            newer,
            UserId::new(ADMIN),
            VerifyComponent::Assign(Gender::Girl, UserId::new(7)),
        )
        .await;
        assert_eq!(reply, InteractionReply::ephemeral(EXPIRED));
    }

    #[tokio::test]
    async fn test_leave_deletes_empty_verify_channels() {
        let mut platform = MockPlatform::new();
        platform.expect_channel().times(0);
        platform
            .expect_cached_channel()
            .returning(|_, id| channel_info(id));
        platform.expect_voice_member_count().returning(|_, _| 0);
        platform
            .expect_delete_channel()
            .withf(|channel| *channel == ChannelId::new(CREATED))
            .times(1)
            .returning(|_| Ok(()));
        let data = configured_data(platform).await;

        // untracked, but named verify-* inside the category
        let leave = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(USER),
            old_channel: Some(ChannelId::new(CREATED)),
            new_channel: None,
        };
        on_voice_update(&data, &leave).await;

        // an ordinary channel is left alone
        let other = VoiceUpdate {
            old_channel: Some(ChannelId::new(VERIFY_CHANNEL)),
            ..leave
        };
        on_voice_update(&data, &other).await;
    }
}
