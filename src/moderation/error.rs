//! Error types for the punishment dispatcher
//!
//! The messages are shown verbatim in the dashboard.

use crate::platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Bot not ready")]
    BotNotReady,

    #[error("Guild not found")]
    GuildNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("Bot lacks required permissions: {0}")]
    MissingBotPermissions(String),

    #[error("Bot role ({bot}) must be higher than target's role ({target})")]
    RoleTooLow { bot: String, target: String },

    #[error("Bot has no roles assigned. Please assign a role to the bot.")]
    BotHasNoRole,

    /// Shown to admins when the system is switched off
    #[error("Punish system off")]
    SystemOff,

    #[error("Punishments are currently disabled.")]
    PunishmentsDisabled,

    #[error("User is not in a voice channel")]
    NotInVoiceChannel,

    #[error("Cannot {0} user: Bot lacks permissions or bot's role is too low.")]
    CannotPerform(&'static str),

    #[error(
        "Cannot timeout user: Bot lacks permissions or bot's role is too low. Make sure the bot's role is above the target user's role."
    )]
    TimeoutRejected,

    #[error("Unknown action")]
    UnknownAction,

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("Failed to save punishment log: {0}")]
    Storage(String),
}

impl ModerationError {
    /// Map a platform failure during the action itself
    pub(crate) fn from_action(verb: &'static str, error: PlatformError) -> Self {
        match error {
            PlatformError::MissingPermissions if verb == "timeout" => Self::TimeoutRejected,
            PlatformError::MissingPermissions => Self::CannotPerform(verb),
            other => Self::Platform(other),
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;
