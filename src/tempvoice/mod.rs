//! Temporary voice channels
//!
//! Joining the hub channel creates a voice channel owned by the joiner. The owner
//! controls it from a panel of buttons posted in the channel chat, and the channel
//! is deleted once the last member leaves. State lives in memory only.

mod controls;
mod lifecycle;

pub use controls::{handle_button, handle_rename, handle_select};
pub use lifecycle::on_voice_update;

use crate::platform::{ButtonSpec, ButtonTone};
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, UserId};
use std::collections::{HashMap, HashSet};

pub const MAX_NICKNAME_LEN: usize = 32;
pub const MAX_BASE_NAME_LEN: usize = 20;
pub const RENAME_INPUT_ID: &str = "new_name";

/// Runtime state of one temp voice channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempVoiceChannel {
    pub owner_id: UserId,
    pub emoji: String,
    pub name: String,
    pub locked: bool,
    pub trusted: HashSet<UserId>,
    pub blocked: HashSet<UserId>,
    /// Nickname each member had before joining, `None` when they had none
    pub original_nicks: HashMap<UserId, Option<String>>,
}

impl TempVoiceChannel {
    #[must_use]
    pub fn new(owner_id: UserId, emoji: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            emoji: emoji.into(),
            name: name.into(),
            locked: false,
            trusted: HashSet::from([owner_id]),
            blocked: HashSet::new(),
            original_nicks: HashMap::new(),
        }
    }

    /// Remember a member's nickname the first time they join
    pub fn remember_nick(&mut self, user: UserId, nickname: Option<String>) {
        self.original_nicks.entry(user).or_insert(nickname);
    }

    pub fn block(&mut self, user: UserId) {
        self.blocked.insert(user);
        self.trusted.remove(&user);
    }

    pub fn trust(&mut self, user: UserId) {
        self.trusted.insert(user);
        self.blocked.remove(&user);
    }
}

/// Temp voice channels by channel id
#[derive(Debug, Default)]
pub struct TempVoiceRegistry {
    channels: DashMap<ChannelId, TempVoiceChannel>,
}

impl TempVoiceRegistry {
    pub fn register(&self, channel: ChannelId, state: TempVoiceChannel) {
        self.channels.insert(channel, state);
    }

    #[must_use]
    pub fn get(&self, channel: ChannelId) -> Option<TempVoiceChannel> {
        self.channels.get(&channel).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, channel: ChannelId) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Run `f` on the state of a channel, if registered
    pub fn update<R>(&self, channel: ChannelId, f: impl FnOnce(&mut TempVoiceChannel) -> R) -> Option<R> {
        self.channels.get_mut(&channel).map(|mut entry| f(&mut entry))
    }

    pub fn remove(&self, channel: ChannelId) -> Option<TempVoiceChannel> {
        self.channels.remove(&channel).map(|(_, state)| state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Operations on a member picked from the user select menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    Block,
    Trust,
    Kick,
}

impl MemberOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Trust => "trust",
            Self::Kick => "kick",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "block" => Some(Self::Block),
            "trust" => Some(Self::Trust),
            "kick" => Some(Self::Kick),
            _ => None,
        }
    }
}

/// Control panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Lock,
    Unlock,
    Rename,
    /// Opens the user select menu for the operation
    Member(MemberOp),
}

impl ControlAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Rename => "rename",
            Self::Member(op) => op.as_str(),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lock" => Some(Self::Lock),
            "unlock" => Some(Self::Unlock),
            "rename" => Some(Self::Rename),
            other => MemberOp::parse(other).map(Self::Member),
        }
    }
}

/// A parsed `tv_*` component id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempVoiceComponent {
    /// `tv_<action>_<channel>`
    Button(ControlAction, ChannelId),
    /// `tv_sel_<op>_<channel>`
    Select(MemberOp, ChannelId),
    /// `tv_rename_modal_<channel>`
    RenameModal(ChannelId),
}

impl TempVoiceComponent {
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        let rest = custom_id.strip_prefix("tv_")?;
        if let Some(channel) = rest.strip_prefix("rename_modal_") {
            return parse_channel(channel).map(Self::RenameModal);
        }
        if let Some(rest) = rest.strip_prefix("sel_") {
            let (op, channel) = rest.split_once('_')?;
            return Some(Self::Select(MemberOp::parse(op)?, parse_channel(channel)?));
        }
        let (action, channel) = rest.split_once('_')?;
        Some(Self::Button(ControlAction::parse(action)?, parse_channel(channel)?))
    }

    #[must_use]
    pub fn custom_id(&self) -> String {
        match self {
            Self::Button(action, channel) => format!("tv_{}_{channel}", action.as_str()),
            Self::Select(op, channel) => format!("tv_sel_{}_{channel}", op.as_str()),
            Self::RenameModal(channel) => format!("tv_rename_modal_{channel}"),
        }
    }
}

fn parse_channel(raw: &str) -> Option<ChannelId> {
    crate::settings::parse_channel_id(raw)
}

/// The two button rows of the control panel
#[must_use]
pub fn control_rows(channel: ChannelId) -> Vec<Vec<ButtonSpec>> {
    let button = |action, label: &str, tone, emoji: &str| {
        ButtonSpec::new(TempVoiceComponent::Button(action, channel).custom_id(), label, tone).emoji(emoji)
    };
    vec![
        vec![
            button(ControlAction::Lock, "Lock", ButtonTone::Danger, "🔒"),
            button(ControlAction::Unlock, "Unlock", ButtonTone::Success, "🔓"),
            button(ControlAction::Member(MemberOp::Block), "Block User", ButtonTone::Secondary, "⛔"),
            button(ControlAction::Member(MemberOp::Trust), "Trusted User", ButtonTone::Primary, "✅"),
            button(ControlAction::Member(MemberOp::Kick), "Disconnect User", ButtonTone::Secondary, "🛑"),
        ],
        vec![button(ControlAction::Rename, "Rename", ButtonTone::Secondary, "✏️")],
    ]
}

/// Keep word characters, dashes and spaces; at most 20 characters
#[must_use]
pub fn sanitize_base_name(raw: &str, fallback: &str) -> String {
    let safe: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .take(MAX_BASE_NAME_LEN)
        .collect();
    if safe.is_empty() {
        fallback.to_string()
    } else {
        safe
    }
}

/// `<emoji> <base>`, cut to the platform nickname limit
#[must_use]
pub fn emoji_nickname(emoji: &str, base: &str) -> String {
    format!("{emoji} {base}").chars().take(MAX_NICKNAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ids() {
        let channel = ChannelId::new(123);
        let cases = [
            ("tv_lock_123", TempVoiceComponent::Button(ControlAction::Lock, channel)),
            ("tv_rename_123", TempVoiceComponent::Button(ControlAction::Rename, channel)),
            (
                "tv_kick_123",
                TempVoiceComponent::Button(ControlAction::Member(MemberOp::Kick), channel),
            ),
            ("tv_sel_trust_123", TempVoiceComponent::Select(MemberOp::Trust, channel)),
            ("tv_rename_modal_123", TempVoiceComponent::RenameModal(channel)),
        ];
        for (raw, parsed) in cases {
            assert_eq!(TempVoiceComponent::parse(raw), Some(parsed));
            assert_eq!(parsed.custom_id(), raw);
        }

        assert_eq!(TempVoiceComponent::parse("verify_claim_1"), None);
        assert_eq!(TempVoiceComponent::parse("tv_explode_123"), None);
        assert_eq!(TempVoiceComponent::parse("tv_sel_lock_123"), None);
        assert_eq!(TempVoiceComponent::parse("tv_lock_abc"), None);
    }

    #[test]
    fn test_control_rows_layout() {
        let rows = control_rows(ChannelId::new(9));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(rows[0][0].custom_id, "tv_lock_9");
        assert_eq!(rows[0][3].label, "Trusted User");
        assert_eq!(rows[1][0].custom_id, "tv_rename_9");
    }

    #[test]
    fn test_sanitize_and_nickname() {
        assert_eq!(sanitize_base_name("Cool.Guy!! 42", "user"), "CoolGuy 42");
        assert_eq!(sanitize_base_name("🎉🎉", "user"), "user");
        assert_eq!(sanitize_base_name(&"a".repeat(40), "voice").len(), 20);

        let nick = emoji_nickname("🎧", &"b".repeat(40));
        assert_eq!(nick.chars().count(), MAX_NICKNAME_LEN);
        assert!(nick.starts_with("🎧 b"));
    }

    #[test]
    fn test_block_and_trust_are_exclusive() {
        let owner = UserId::new(1);
        let guest = UserId::new(2);
        let mut state = TempVoiceChannel::new(owner, "🎧", "🎧・owner");
        assert!(state.trusted.contains(&owner));

        state.trust(guest);
        state.block(guest);
        assert!(state.blocked.contains(&guest));
        assert!(!state.trusted.contains(&guest));

        state.trust(guest);
        assert!(!state.blocked.contains(&guest));

        state.remember_nick(guest, Some("first".into()));
        state.remember_nick(guest, Some("second".into()));
        assert_eq!(state.original_nicks[&guest].as_deref(), Some("first"));
    }
}
