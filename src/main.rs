use gatekeeper::config::BotConfig;
use gatekeeper::events::EventRegistry;
use gatekeeper::{BOT_NAME, Error, commands, framework, logging};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    let config = BotConfig::load().await?;
    logging::init(&config.log_dir)?;

    let token = config.token()?.to_string();
    let intents = config.intents();

    let mut manager = commands::bundled()?;
    if config.register_commands {
        manager.load();
    }
    let events = EventRegistry::with_defaults(&config.default_events);
    info!(
        commands = ?manager.names(),
        events = ?events.events(),
        "Configured {BOT_NAME}"
    );

    let framework = framework::build(manager, events, config);
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    client.start().await?;
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start the runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        error!("Error: {err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
