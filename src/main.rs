use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod storage;
mod ui;

use crate::audio::{player::PlayerManager, playlist::PlaylistLoader};
use crate::bot::{nowplaying::NowPlayingTracker, GatewayEvent, PanelMusicBot, Router};
use crate::config::Config;
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("panel_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El probe del contenedor no necesita token
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando Panel Music v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("⚙️ {}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone()).await?,
    ));

    let http = Arc::new(Http::new(&config.discord_token));
    let playlists = PlaylistLoader::new(config.playlists_dir.clone());
    let now_playing = Arc::new(NowPlayingTracker::new(http.clone()));

    let songbird = Songbird::serenity();
    let players = Arc::new(PlayerManager::new(
        songbird.clone(),
        playlists.clone(),
        now_playing.clone(),
        config.max_queue_size,
    ));

    let router = Arc::new(Router::new(
        Arc::new(config.clone()),
        http,
        storage,
        players,
        now_playing,
        playlists,
    ));

    // Sin MESSAGE_CONTENT: sólo hacen falta los eventos de borrado
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(PanelMusicBot::new(router.clone()))
        .register_songbird_with(songbird)
        .await?;

    router.attach_shard_manager(client.shard_manager.clone());

    // Manejar shutdown graceful
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                router.dispatch(GatewayEvent::Shutdown).await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    info!("👋 Panel Music detenido");
    Ok(())
}

async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no disponible");
    }
}
