use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use pixie_bot::{
    audio::{player::MusicPlayer, songbird_backend::SongbirdBackend},
    bot::{platform::DiscordPlatform, PixieBot},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pixie_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Pixie v{}", env!("CARGO_PKG_VERSION"));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    let config = Config::load()?;
    info!("{}", config.summary());

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // The player needs Songbird and HTTP before the client exists
    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let backend = Arc::new(SongbirdBackend::new(
        Arc::clone(&songbird),
        config.search_results,
    )?);
    let platform = Arc::new(DiscordPlatform::new(Arc::clone(&http), Arc::clone(&songbird)));
    let player = MusicPlayer::start(backend, platform, config.player_settings());

    let handler = PixieBot::new(player, config.command_prefix.clone());
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let version = pixie_bot::audio::songbird_backend::verify_ytdlp().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
