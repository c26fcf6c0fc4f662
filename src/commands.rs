use crate::{Data, Error};
use poise::{Context, command};

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Show which moderation features are enabled in this server
#[command(slash_command, guild_only)]
pub async fn modstatus(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let data = ctx.data();
    let status = data.system_status(guild_id).await;
    let pending = data.sanctions.for_guild(guild_id).len();

    let text = format!(
        "{}\n{}\n{}\n{}\nTimed voice sanctions: {pending}\nTemp voice channels: {}",
        status_line("Punishments", status.punishments_enabled),
        status_line("Disputes", status.disputes_enabled),
        status_line("Verification", status.verify_enabled),
        status_line("Temp voice", status.temp_voice_enabled),
        data.temp_voice.len(),
    );
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}

fn status_line(name: &str, enabled: bool) -> String {
    if enabled {
        format!("✅ {name}: enabled")
    } else {
        format!("❌ {name}: disabled")
    }
}
