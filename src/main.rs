use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use std::sync::Arc;
use tracing::{error, info, warn};
use voice_warden::dashboard::{self, AppState};
use voice_warden::handlers::Handler;
use voice_warden::moderation::{SanctionCheckRequest, spawn_sanction_task};
use voice_warden::{Config, Data, Error, commands, logging};

/// Main function to run the bot and the dashboard
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    let config = Config::from_env()?;
    let data = Data::load(&config.data_dir).await?;

    if let (Some(username), Some(password)) = (&config.owner_username, &config.owner_password) {
        if data.seed_owner(username, password).await? {
            info!("Seeded owner account {username}");
        }
    }

    let state = AppState::new(data.clone(), config.session_ttl_hours, config.main_guild_id);
    let dashboard = {
        let host = config.dashboard_host.clone();
        let port = config.dashboard_port;
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(state, &host, port).await {
                error!("Dashboard stopped: {e}");
            }
        })
    };

    let Some(token) = config.discord_token.clone() else {
        warn!("DISCORD_TOKEN is not set, running the dashboard only");
        dashboard.await?;
        return Ok(());
    };

    let sanction_task = spawn_sanction_task(data.clone(), config.sanction_check_interval_secs);

    // Configure the Poise framework
    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::ping(), commands::modstatus()],
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx).await;
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx).await;
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    // Voice state and member lookups need the privileged members intent
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(Handler::new(data.clone()))
        .framework(framework)
        .await?;
    data.set_shard_manager(Arc::clone(&client.shard_manager));

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!("Error running the bot: {err}");
    }

    if let Some(tx) = data.sanction_sender() {
        let _ = tx.send(SanctionCheckRequest::Shutdown).await;
    }
    let _ = sanction_task.await;
    dashboard.abort();

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error building the runtime: {err}");
            std::process::exit(1);
        }
    };

    // Handle any errors that occurred during execution
    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
