pub mod accounts;
pub mod autoreply;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod disputes;
pub mod duration;
pub mod embeds;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod platform;
pub mod settings;
pub mod stats;
pub mod tempvoice;
pub mod verify;

// Customize these constants for your bot
pub const BOT_NAME: &str = "voice_warden";
pub const COMMAND_TARGET: &str = "voice_warden::command";
pub const ERROR_TARGET: &str = "voice_warden::error";
pub const EVENT_TARGET: &str = "voice_warden::handlers";
pub const CONSOLE_TARGET: &str = "voice_warden";

pub use config::Config;
pub use data::{Data, DataInner};
pub use platform::{Platform, PlatformError, SerenityPlatform};
pub use settings::GuildSettings;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
