//! The chat platform seam.
//!
//! Everything the moderation logic needs from Discord goes through the [`Platform`]
//! trait so the reactors can be driven by a mock in tests. [`SerenityPlatform`] is the
//! production implementation backed by serenity's HTTP client and cache.

use crate::embeds::EmbedSpec;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{
    ButtonStyle, Cache, ChannelId, ChannelType, CreateActionRow, CreateButton, CreateChannel,
    CreateInputText, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
    CreateModal, CreateSelectMenu, CreateSelectMenuKind, EditChannel, EditMember, GuildId, Http,
    InputTextStyle, Member, MessageId, PermissionOverwrite, PermissionOverwriteType, Permissions,
    ReactionType, RoleId, UserId,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Discord JSON error codes we branch on
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_GUILD: isize = 10004;
const UNKNOWN_MEMBER: isize = 10007;
const UNKNOWN_USER: isize = 10013;
const MISSING_PERMISSIONS: isize = 50013;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Discord API error: {0}")]
    Discord(Box<serenity::Error>),

    #[error("Missing Permissions")]
    MissingPermissions,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serenity::Error> for PlatformError {
    fn from(error: serenity::Error) -> Self {
        match discord_code(&error) {
            Some(MISSING_PERMISSIONS) => Self::MissingPermissions,
            _ => Self::Discord(Box::new(error)),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

fn discord_code(error: &serenity::Error) -> Option<isize> {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) = error {
        Some(response.error.code)
    } else {
        None
    }
}

fn is_unknown(error: &serenity::Error) -> bool {
    matches!(
        discord_code(error),
        Some(UNKNOWN_CHANNEL | UNKNOWN_GUILD | UNKNOWN_MEMBER | UNKNOWN_USER)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSummary {
    pub id: GuildId,
    pub name: String,
    pub member_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
    pub position: u16,
}

/// What we need to know about a guild member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub username: String,
    pub global_name: Option<String>,
    pub nickname: Option<String>,
    pub roles: Vec<RoleId>,
    /// Highest role other than @everyone
    pub highest_role: Option<RoleInfo>,
}

impl MemberInfo {
    /// Global display name, else the username
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Nickname if set, else the username
    #[must_use]
    pub fn shown_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }

    #[must_use]
    pub fn tag(&self) -> String {
        self.username.clone()
    }

    /// A role-less member, for tests
    #[cfg(test)]
    pub(crate) fn plain(user_id: u64, username: &str) -> Self {
        Self {
            user_id: UserId::new(user_id),
            username: username.to_string(),
            global_name: None,
            nickname: None,
            roles: Vec::new(),
            highest_role: None,
        }
    }
}

/// A member's voice state change, reduced to the channels involved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

impl VoiceUpdate {
    /// Channel joined, if the member entered a different channel
    #[must_use]
    pub fn joined(&self) -> Option<ChannelId> {
        self.new_channel.filter(|new| self.old_channel != Some(*new))
    }

    /// Channel left. Moving to another channel counts as leaving.
    #[must_use]
    pub fn left(&self) -> Option<ChannelId> {
        self.old_channel.filter(|old| self.new_channel != Some(*old))
    }
}

/// The bot's own standing in a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotStanding {
    pub permissions: Permissions,
    pub highest_role: Option<RoleInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    #[must_use]
    pub fn role(role: RoleId, allow: Permissions, deny: Permissions) -> Self {
        Self {
            target: OverwriteTarget::Role(role),
            allow,
            deny,
        }
    }

    #[must_use]
    pub fn member(user: UserId, allow: Permissions, deny: Permissions) -> Self {
        Self {
            target: OverwriteTarget::Member(user),
            allow,
            deny,
        }
    }

    /// Overwrite for the @everyone role, whose id equals the guild id
    #[must_use]
    pub fn everyone(guild: GuildId, allow: Permissions, deny: Permissions) -> Self {
        Self::role(RoleId::new(guild.get()), allow, deny)
    }
}

impl From<Overwrite> for PermissionOverwrite {
    fn from(overwrite: Overwrite) -> Self {
        let kind = match overwrite.target {
            OverwriteTarget::Role(role) => PermissionOverwriteType::Role(role),
            OverwriteTarget::Member(user) => PermissionOverwriteType::Member(user),
        };
        Self {
            allow: overwrite.allow,
            deny: overwrite.deny,
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTone {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    pub custom_id: String,
    pub label: String,
    pub emoji: Option<String>,
    pub tone: ButtonTone,
}

impl ButtonSpec {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, tone: ButtonTone) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            emoji: None,
            tone,
        }
    }

    #[must_use]
    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    #[must_use]
    pub fn to_create_button(&self) -> CreateButton {
        let style = match self.tone {
            ButtonTone::Primary => ButtonStyle::Primary,
            ButtonTone::Secondary => ButtonStyle::Secondary,
            ButtonTone::Success => ButtonStyle::Success,
            ButtonTone::Danger => ButtonStyle::Danger,
        };
        let mut button = CreateButton::new(&self.custom_id)
            .label(&self.label)
            .style(style);
        if let Some(emoji) = &self.emoji {
            button = button.emoji(ReactionType::Unicode(emoji.clone()));
        }
        button
    }
}

/// Build serenity action rows from button rows
#[must_use]
pub fn action_rows(rows: &[Vec<ButtonSpec>]) -> Vec<CreateActionRow> {
    rows.iter()
        .map(|row| CreateActionRow::Buttons(row.iter().map(ButtonSpec::to_create_button).collect()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<EmbedSpec>,
    pub rows: Vec<Vec<ButtonSpec>>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn embed(embed: EmbedSpec) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Vec<ButtonSpec>>) -> Self {
        self.rows = rows;
        self
    }

    fn to_create_message(&self) -> CreateMessage {
        let mut message = CreateMessage::new();
        if let Some(content) = &self.content {
            message = message.content(content);
        }
        if let Some(embed) = &self.embed {
            message = message.embed(embed.to_create_embed());
        }
        if !self.rows.is_empty() {
            message = message.components(action_rows(&self.rows));
        }
        message
    }
}

/// Text input shown in a modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalSpec {
    pub custom_id: String,
    pub title: String,
    pub input_id: String,
    pub label: String,
    pub max_length: u16,
}

/// How to answer a component interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionReply {
    /// Acknowledge without touching the message
    Acknowledge,
    /// Ephemeral text reply
    Ephemeral(String),
    Modal(ModalSpec),
    /// Ephemeral single user picker
    UserSelect { custom_id: String, content: String },
    /// Replace the embed and buttons of the message the component belongs to
    UpdateMessage {
        embed: EmbedSpec,
        rows: Vec<Vec<ButtonSpec>>,
    },
}

impl InteractionReply {
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::Ephemeral(content.into())
    }

    #[must_use]
    pub fn to_response(&self) -> CreateInteractionResponse {
        match self {
            Self::Acknowledge => CreateInteractionResponse::Acknowledge,
            Self::Ephemeral(content) => CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
            Self::Modal(modal) => {
                let input = CreateInputText::new(InputTextStyle::Short, &modal.label, &modal.input_id)
                    .required(true)
                    .max_length(modal.max_length);
                CreateInteractionResponse::Modal(
                    CreateModal::new(&modal.custom_id, &modal.title)
                        .components(vec![CreateActionRow::InputText(input)]),
                )
            }
            Self::UserSelect { custom_id, content } => {
                let menu = CreateSelectMenu::new(
                    custom_id,
                    CreateSelectMenuKind::User {
                        default_users: None,
                    },
                )
                .placeholder("Select a user")
                .max_values(1);
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .components(vec![CreateActionRow::SelectMenu(menu)])
                        .ephemeral(true),
                )
            }
            Self::UpdateMessage { embed, rows } => CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embed.to_create_embed())
                    .components(action_rows(rows)),
            ),
        }
    }
}

/// Operations on the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    async fn guild_summary(&self, guild: GuildId) -> PlatformResult<Option<GuildSummary>>;

    /// `None` when the user is not a member of the guild
    async fn fetch_member(&self, guild: GuildId, user: UserId)
    -> PlatformResult<Option<MemberInfo>>;

    async fn bot_standing(&self, guild: GuildId) -> PlatformResult<BotStanding>;

    /// Voice channel the user is connected to, from the cache
    fn voice_channel_of(&self, guild: GuildId, user: UserId) -> Option<ChannelId>;

    /// Number of members connected to a voice channel, from the cache
    fn voice_member_count(&self, guild: GuildId, channel: ChannelId) -> usize;

    async fn channel(&self, channel: ChannelId) -> PlatformResult<Option<ChannelInfo>>;

    /// Guild channel from the cache, without a request
    fn cached_channel(&self, guild: GuildId, channel: ChannelId) -> Option<ChannelInfo>;

    async fn create_voice_channel(
        &self,
        guild: GuildId,
        name: String,
        parent: ChannelId,
        overwrites: Vec<Overwrite>,
    ) -> PlatformResult<ChannelInfo>;

    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()>;

    async fn rename_channel(&self, channel: ChannelId, name: String) -> PlatformResult<()>;

    /// Replace the overwrite for the target on a channel
    async fn set_overwrite(&self, channel: ChannelId, overwrite: Overwrite) -> PlatformResult<()>;

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> PlatformResult<MessageId>;

    /// Plain text reply referencing an existing message
    async fn reply(&self, channel: ChannelId, message: MessageId, content: String)
    -> PlatformResult<()>;

    async fn send_dm(&self, user: UserId, embed: EmbedSpec) -> PlatformResult<()>;

    /// An empty nickname resets it
    async fn set_nickname(&self, guild: GuildId, user: UserId, nickname: String)
    -> PlatformResult<()>;

    async fn move_member(&self, guild: GuildId, user: UserId, channel: ChannelId)
    -> PlatformResult<()>;

    async fn disconnect_member(&self, guild: GuildId, user: UserId) -> PlatformResult<()>;

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> PlatformResult<()>;

    async fn timeout_member(
        &self,
        guild: GuildId,
        user: UserId,
        until: DateTime<Utc>,
        reason: String,
    ) -> PlatformResult<()>;

    async fn ban_member(&self, guild: GuildId, user: UserId, reason: String) -> PlatformResult<()>;

    async fn kick_member(&self, guild: GuildId, user: UserId, reason: String)
    -> PlatformResult<()>;

    async fn set_voice_mute(&self, guild: GuildId, user: UserId, muted: bool)
    -> PlatformResult<()>;

    async fn set_voice_deafen(
        &self,
        guild: GuildId,
        user: UserId,
        deafened: bool,
    ) -> PlatformResult<()>;
}

/// [`Platform`] backed by serenity
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityPlatform {
    #[must_use]
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    fn highest_role(&self, guild: GuildId, roles: &[RoleId]) -> Option<RoleInfo> {
        let guild = self.cache.guild(guild)?;
        roles
            .iter()
            .filter(|id| id.get() != guild.id.get())
            .filter_map(|id| guild.roles.get(id))
            .max_by_key(|role| role.position)
            .map(|role| RoleInfo {
                id: role.id,
                name: role.name.clone(),
                position: role.position,
            })
    }

    fn member_info(&self, guild: GuildId, member: &Member) -> MemberInfo {
        MemberInfo {
            user_id: member.user.id,
            username: member.user.name.clone(),
            global_name: member.user.global_name.clone(),
            nickname: member.nick.clone(),
            roles: member.roles.clone(),
            highest_role: self.highest_role(guild, &member.roles),
        }
    }

    /// Guild-level permissions of a member, from the cached role table
    fn guild_permissions(&self, guild: GuildId, user: UserId, roles: &[RoleId]) -> Permissions {
        let Some(guild) = self.cache.guild(guild) else {
            return Permissions::empty();
        };
        if guild.owner_id == user {
            return Permissions::all();
        }
        let everyone = RoleId::new(guild.id.get());
        let permissions = std::iter::once(&everyone)
            .chain(roles.iter())
            .filter_map(|id| guild.roles.get(id))
            .fold(Permissions::empty(), |acc, role| acc | role.permissions);
        if permissions.contains(Permissions::ADMINISTRATOR) {
            Permissions::all()
        } else {
            permissions
        }
    }
}

fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Text,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        ChannelType::Category => ChannelKind::Category,
        _ => ChannelKind::Other,
    }
}

#[async_trait::async_trait]
impl Platform for SerenityPlatform {
    async fn guild_summary(&self, guild: GuildId) -> PlatformResult<Option<GuildSummary>> {
        let cached = self.cache.guild(guild).map(|g| GuildSummary {
            id: g.id,
            name: g.name.clone(),
            member_count: g.member_count,
        });
        if cached.is_some() {
            return Ok(cached);
        }
        match guild.to_partial_guild_with_counts(&*self.http).await {
            Ok(partial) => Ok(Some(GuildSummary {
                id: partial.id,
                name: partial.name,
                member_count: partial.approximate_member_count.unwrap_or_default(),
            })),
            Err(e) if is_unknown(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_member(
        &self,
        guild: GuildId,
        user: UserId,
    ) -> PlatformResult<Option<MemberInfo>> {
        match guild.member(&*self.http, user).await {
            Ok(member) => Ok(Some(self.member_info(guild, &member))),
            Err(e) if is_unknown(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn bot_standing(&self, guild: GuildId) -> PlatformResult<BotStanding> {
        let bot_id = self.cache.current_user().id;
        let member = guild.member(&*self.http, bot_id).await?;
        Ok(BotStanding {
            permissions: self.guild_permissions(guild, bot_id, &member.roles),
            highest_role: self.highest_role(guild, &member.roles),
        })
    }

    fn voice_channel_of(&self, guild: GuildId, user: UserId) -> Option<ChannelId> {
        self.cache
            .guild(guild)
            .and_then(|g| g.voice_states.get(&user).and_then(|state| state.channel_id))
    }

    fn voice_member_count(&self, guild: GuildId, channel: ChannelId) -> usize {
        self.cache.guild(guild).map_or(0, |g| {
            g.voice_states
                .values()
                .filter(|state| state.channel_id == Some(channel))
                .count()
        })
    }

    fn cached_channel(&self, guild: GuildId, channel: ChannelId) -> Option<ChannelInfo> {
        let guild = self.cache.guild(guild)?;
        guild.channels.get(&channel).map(|c| ChannelInfo {
            id: c.id,
            name: c.name.clone(),
            kind: channel_kind(c.kind),
            parent_id: c.parent_id,
        })
    }

    async fn channel(&self, channel: ChannelId) -> PlatformResult<Option<ChannelInfo>> {
        match channel.to_channel(&*self.http).await {
            Ok(found) => Ok(found.guild().map(|c| ChannelInfo {
                id: c.id,
                name: c.name.clone(),
                kind: channel_kind(c.kind),
                parent_id: c.parent_id,
            })),
            Err(e) if is_unknown(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_voice_channel(
        &self,
        guild: GuildId,
        name: String,
        parent: ChannelId,
        overwrites: Vec<Overwrite>,
    ) -> PlatformResult<ChannelInfo> {
        let builder = CreateChannel::new(name)
            .kind(ChannelType::Voice)
            .category(parent)
            .permissions(overwrites.into_iter().map(PermissionOverwrite::from));
        let created = guild.create_channel(&*self.http, builder).await?;
        debug!("Created voice channel {} ({})", created.name, created.id);
        Ok(ChannelInfo {
            id: created.id,
            name: created.name.clone(),
            kind: ChannelKind::Voice,
            parent_id: created.parent_id,
        })
    }

    async fn delete_channel(&self, channel: ChannelId) -> PlatformResult<()> {
        channel.delete(&*self.http).await?;
        Ok(())
    }

    async fn rename_channel(&self, channel: ChannelId, name: String) -> PlatformResult<()> {
        channel
            .edit(&*self.http, EditChannel::new().name(name))
            .await?;
        Ok(())
    }

    async fn set_overwrite(&self, channel: ChannelId, overwrite: Overwrite) -> PlatformResult<()> {
        channel
            .create_permission(&*self.http, PermissionOverwrite::from(overwrite))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> PlatformResult<MessageId> {
        let sent = channel
            .send_message(&*self.http, message.to_create_message())
            .await?;
        Ok(sent.id)
    }

    async fn reply(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: String,
    ) -> PlatformResult<()> {
        channel
            .send_message(
                &*self.http,
                CreateMessage::new()
                    .content(content)
                    .reference_message((channel, message)),
            )
            .await?;
        Ok(())
    }

    async fn send_dm(&self, user: UserId, embed: EmbedSpec) -> PlatformResult<()> {
        user.direct_message(&*self.http, CreateMessage::new().embed(embed.to_create_embed()))
            .await?;
        Ok(())
    }

    async fn set_nickname(
        &self,
        guild: GuildId,
        user: UserId,
        nickname: String,
    ) -> PlatformResult<()> {
        guild
            .edit_member(&*self.http, user, EditMember::new().nickname(nickname))
            .await?;
        Ok(())
    }

    async fn move_member(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> PlatformResult<()> {
        guild.move_member(&*self.http, user, channel).await?;
        Ok(())
    }

    async fn disconnect_member(&self, guild: GuildId, user: UserId) -> PlatformResult<()> {
        guild.disconnect_member(&*self.http, user).await?;
        Ok(())
    }

    async fn add_role(&self, guild: GuildId, user: UserId, role: RoleId) -> PlatformResult<()> {
        self.http
            .add_member_role(guild, user, role, Some("Verification"))
            .await?;
        Ok(())
    }

    async fn timeout_member(
        &self,
        guild: GuildId,
        user: UserId,
        until: DateTime<Utc>,
        reason: String,
    ) -> PlatformResult<()> {
        guild
            .edit_member(
                &*self.http,
                user,
                EditMember::new()
                    .disable_communication_until_datetime(until.into())
                    .audit_log_reason(&reason),
            )
            .await?;
        Ok(())
    }

    async fn ban_member(&self, guild: GuildId, user: UserId, reason: String) -> PlatformResult<()> {
        guild.ban_with_reason(&*self.http, user, 0, &reason).await?;
        Ok(())
    }

    async fn kick_member(
        &self,
        guild: GuildId,
        user: UserId,
        reason: String,
    ) -> PlatformResult<()> {
        guild.kick_with_reason(&*self.http, user, &reason).await?;
        Ok(())
    }

    async fn set_voice_mute(
        &self,
        guild: GuildId,
        user: UserId,
        muted: bool,
    ) -> PlatformResult<()> {
        guild
            .edit_member(&*self.http, user, EditMember::new().mute(muted))
            .await?;
        Ok(())
    }

    async fn set_voice_deafen(
        &self,
        guild: GuildId,
        user: UserId,
        deafened: bool,
    ) -> PlatformResult<()> {
        guild
            .edit_member(&*self.http, user, EditMember::new().deafen(deafened))
            .await?;
        Ok(())
    }
}
