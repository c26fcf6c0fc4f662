//! Punishment kinds
//!
//! The six moderation actions the dashboard can dispatch, with their presentation
//! (names, emojis, colors) and the bot permissions each one needs.

use poise::serenity_prelude::Permissions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of moderation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    /// Counted warning, three of them trigger a timeout
    Warn,
    /// Communication timeout
    Timeout,
    Ban,
    Kick,
    /// Server-side voice mute
    VoiceMute,
    /// Server-side voice deafen
    VoiceDeafen,
}

impl PunishmentKind {
    pub const ALL: [Self; 6] = [
        Self::Warn,
        Self::Timeout,
        Self::Ban,
        Self::Kick,
        Self::VoiceMute,
        Self::VoiceDeafen,
    ];

    /// Wire name, as stored in logs and accepted by the API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Timeout => "timeout",
            Self::Ban => "ban",
            Self::Kick => "kick",
            Self::VoiceMute => "voice_mute",
            Self::VoiceDeafen => "voice_deafen",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Warn => "Warning",
            Self::Timeout => "Timeout",
            Self::Ban => "Ban",
            Self::Kick => "Kick",
            Self::VoiceMute => "Voice Mute",
            Self::VoiceDeafen => "Voice Deafen",
        }
    }

    #[must_use]
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Warn => "⚠️",
            Self::Timeout => "⏰",
            Self::Ban => "🔨",
            Self::Kick => "👢",
            Self::VoiceMute => "🔇",
            Self::VoiceDeafen => "🔕",
        }
    }

    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Warn => 0xffa500,
            Self::Timeout => 0xff6b6b,
            Self::Ban => 0xdc3545,
            Self::Kick => 0xffc107,
            Self::VoiceMute => 0x6c757d,
            Self::VoiceDeafen => 0x495057,
        }
    }

    /// Permissions the bot must hold to carry the action out
    #[must_use]
    pub const fn required_permissions(self) -> Permissions {
        match self {
            Self::Ban => Permissions::BAN_MEMBERS,
            Self::Kick => Permissions::KICK_MEMBERS,
            Self::Warn | Self::Timeout => Permissions::MODERATE_MEMBERS,
            Self::VoiceMute | Self::VoiceDeafen => Permissions::MUTE_MEMBERS,
        }
    }

    /// Verb used in "Cannot <verb> user" errors
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Warn | Self::Timeout => "timeout",
            Self::Ban => "ban",
            Self::Kick => "kick",
            Self::VoiceMute => "mute",
            Self::VoiceDeafen => "deafen",
        }
    }

    #[must_use]
    pub const fn is_voice(self) -> bool {
        matches!(self, Self::VoiceMute | Self::VoiceDeafen)
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not one of the six kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for PunishmentKind {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Human readable list of permission names, for error messages
#[must_use]
pub fn permission_names(permissions: Permissions) -> String {
    permissions
        .get_permission_names()
        .into_iter()
        .map(str::to_uppercase)
        .map(|name| name.replace(' ', "_"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        for kind in PunishmentKind::ALL {
            assert_eq!(kind.as_str().parse::<PunishmentKind>(), Ok(kind));
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert!("mute".parse::<PunishmentKind>().is_err());
        assert_eq!(
            serde_json::to_string(&PunishmentKind::VoiceDeafen).unwrap(),
            "\"voice_deafen\""
        );
    }

    #[test]
    fn test_required_permissions() {
        assert_eq!(
            PunishmentKind::Ban.required_permissions(),
            Permissions::BAN_MEMBERS
        );
        assert_eq!(
            PunishmentKind::Warn.required_permissions(),
            Permissions::MODERATE_MEMBERS
        );
        assert_eq!(
            PunishmentKind::VoiceDeafen.required_permissions(),
            Permissions::MUTE_MEMBERS
        );
    }

    #[test]
    fn test_presentation_tables() {
        assert_eq!(PunishmentKind::Warn.display_name(), "Warning");
        assert_eq!(PunishmentKind::Ban.color(), 0xdc3545);
        assert_eq!(PunishmentKind::VoiceMute.verb(), "mute");
        assert!(PunishmentKind::VoiceMute.is_voice());
        assert!(!PunishmentKind::Kick.is_voice());
    }
}
