//! Console output plus two daily-rotated JSON files under `logs/`:
//! `commands` for slash command records and `events` for gateway events,
//! interactions and dashboard requests.

use crate::{COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, EVENT_TARGET, Error};
use poise::serenity_prelude::GuildId;
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{Subscriber, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";

/// Used when `RUST_LOG` is unset. Serenity's heartbeat chatter is dropped.
const DEFAULT_FILTER: &str = "info,serenity=error,tower_http=info";

const DASHBOARD_TARGET: &str = "voice_warden::dashboard";

/// The JSON log files and the targets routed to each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFile {
    Commands,
    Events,
}

impl LogFile {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::Events => "events",
        }
    }

    #[must_use]
    pub fn accepts(self, target: &str) -> bool {
        match self {
            Self::Commands => target == COMMAND_TARGET || target == ERROR_TARGET,
            Self::Events => {
                target == EVENT_TARGET
                    || target.starts_with(DASHBOARD_TARGET)
                    || target.starts_with("tower_http")
            }
        }
    }

    fn layer<S>(self) -> impl Layer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let writer = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, self.file_name());
        fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_ansi(false)
            .json()
            .with_writer(writer)
            .with_filter(filter_fn(move |meta| self.accepts(meta.target())))
    }
}

/// Install the global subscriber
///
/// # Errors
/// Fails when the log directory cannot be created or a subscriber is already set.
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let console = fmt::layer().with_target(true).with_ansi(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(LogFile::Commands.layer())
        .with(LogFile::Events.layer())
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Who ran which command where
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommandRecord {
    command: String,
    guild: String,
    user: u64,
}

impl CommandRecord {
    fn new(command: &str, guild: Option<GuildId>, user: u64) -> Self {
        Self {
            command: command.to_string(),
            guild: guild.map_or_else(|| "DM".to_string(), |id| id.get().to_string()),
            user,
        }
    }

    fn of(ctx: Context<'_, Data, Error>) -> Self {
        Self::new(&ctx.command().qualified_name, ctx.guild_id(), ctx.author().id.get())
    }
}

/// Start time kept in the invocation data between the two hooks
struct Started(Instant);

/// pre_command hook
pub async fn log_command_start(ctx: Context<'_, Data, Error>) {
    ctx.set_invocation_data(Started(Instant::now())).await;

    let record = CommandRecord::of(ctx);
    let arguments = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        ctx.invocation_string()
    };
    info!(
        target: COMMAND_TARGET,
        command = %record.command,
        guild_id = %record.guild,
        user_id = record.user,
        arguments = %arguments,
        event = "start",
        "Command execution started"
    );
}

/// post_command hook
pub async fn log_command_end(ctx: Context<'_, Data, Error>) {
    let elapsed = ctx
        .invocation_data::<Started>()
        .await
        .map(|started| started.0.elapsed());
    let duration_ms = elapsed.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

    let record = CommandRecord::of(ctx);
    info!(
        target: COMMAND_TARGET,
        command = %record.command,
        guild_id = %record.guild,
        user_id = record.user,
        duration_ms,
        event = "end",
        "Command execution completed"
    );
}

pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    let (ctx, message, summary) = match error {
        FrameworkError::Command { error, ctx, .. } => (*ctx, error.to_string(), "Command error"),
        FrameworkError::CommandCheckFailed { error, ctx, .. } => (
            *ctx,
            error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string),
            "Command check failed",
        ),
        other => {
            error!(target: ERROR_TARGET, error = ?other, "Other framework error");
            return;
        }
    };
    let record = CommandRecord::of(ctx);
    error!(
        target: ERROR_TARGET,
        command = %record.command,
        guild_id = %record.guild,
        user_id = record.user,
        error = %message,
        "{summary}"
    );
}

/// Startup notices without a more specific target
pub fn log_console(message: &str) {
    info!(target: CONSOLE_TARGET, event = "console", "{message}");
}
