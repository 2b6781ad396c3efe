use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::PlayerManager;
use crate::bot::BiliMusicBot;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bili_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Bili Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    // Health check para contenedores: verifica dependencias y sale
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Intents mínimos: comandos slash y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Una sola instancia de Songbird compartida entre el cliente y el
    // registro de reproductores
    let songbird = Songbird::serenity();
    let manager = Arc::new(PlayerManager::new(config.clone(), songbird.clone()));

    if let Err(e) = manager.verify_dependencies().await {
        error!("❌ Dependencia externa ausente: {}", e);
        if let Some(suggestion) = e.suggestion() {
            error!("💡 {}", suggestion);
        }
        anyhow::bail!("dependencias externas incompletas");
    }

    manager.start_maintenance();

    let handler = BiliMusicBot::new(config.clone(), manager.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .application_id(config.application_id.into())
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Shutdown graceful: apagar pipelines y salir de los canales antes de
    // morir, que los ffmpeg huérfanos no avisan
    let shutdown_manager = manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_manager.shutdown().await;
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = tokio::process::Command::new(&config.yt_dlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = tokio::process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
