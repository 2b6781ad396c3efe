//! Capa de Discord: registro de comandos, despacho de interacciones y
//! paneles de estado.
//!
//! El bot gira alrededor de [`BiliMusicBot`], que implementa el
//! [`EventHandler`] de serenity y delega toda la lógica musical en el
//! [`PlayerManager`].

use serenity::{
    all::{Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;

use crate::{audio::PlayerManager, config::Config};
use notifier::PanelRegistry;

pub struct BiliMusicBot {
    config: Arc<Config>,
    pub manager: Arc<PlayerManager>,
    pub panels: Arc<PanelRegistry>,
    notifier_started: AtomicBool,
}

impl BiliMusicBot {
    pub fn new(config: Arc<Config>, manager: Arc<PlayerManager>) -> Self {
        Self {
            config,
            manager,
            panels: Arc::new(PanelRegistry::new()),
            notifier_started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventHandler for BiliMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("✅ {} conectado a Discord", ready.user.name);

        // En desarrollo los comandos van a una guild para propagación
        // inmediata; en producción se registran globales
        let result = match self.config.guild_id {
            Some(guild_id) => commands::register_guild_commands(&ctx, guild_id.into()).await,
            None => commands::register_global_commands(&ctx).await,
        };
        if let Err(e) = result {
            error!("❌ No se pudieron registrar los comandos: {}", e);
        }

        // ready puede dispararse de nuevo en reconexiones; un solo
        // notificador basta
        if !self.notifier_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(notifier::run(
                ctx.http.clone(),
                self.manager.clone(),
                self.panels.clone(),
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("❌ Error manejando comando: {}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("❌ Error manejando botón: {}", e);
                }
            }
            _ => {}
        }
    }

    /// Detecta cuando el bot es expulsado del canal de voz por fuera
    /// (kick, canal borrado) y limpia el reproductor huérfano.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        let was_connected = old.as_ref().and_then(|o| o.channel_id).is_some();
        if was_connected && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                warn!("👋 [{}] Desconexión externa del canal de voz", guild_id);
                self.manager.on_external_disconnect(guild_id).await;
                self.panels.forget(guild_id);
            }
        }
    }
}
