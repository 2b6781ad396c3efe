use dashmap::DashMap;
use serenity::{
    builder::EditMessage,
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    audio::{state::PlayerState, PlayerManager},
    ui::{buttons, embeds},
};

struct Panel {
    channel_id: ChannelId,
    message_id: MessageId,
    /// Última secuencia renderizada en este mensaje
    last_seq: u64,
}

/// Paneles de reproducción registrados por guild, el mensaje que el bus de
/// estado mantiene actualizado.
#[derive(Default)]
pub struct PanelRegistry {
    panels: DashMap<GuildId, Panel>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) el panel de una guild
    pub fn register(&self, guild_id: GuildId, channel_id: ChannelId, message_id: MessageId, seq: u64) {
        self.panels.insert(
            guild_id,
            Panel {
                channel_id,
                message_id,
                last_seq: seq,
            },
        );
    }

    pub fn forget(&self, guild_id: GuildId) {
        self.panels.remove(&guild_id);
    }

    /// Reclama el render de `state`: devuelve el destino si la secuencia
    /// avanza sobre lo ya renderizado, y lo marca como renderizado.
    ///
    /// Un estado con secuencia ya superada se descarta aquí; así un render
    /// rezagado nunca pisa uno más fresco.
    fn claim(&self, state: &PlayerState) -> Option<(ChannelId, MessageId)> {
        let mut panel = self.panels.get_mut(&state.guild_id)?;
        if state.seq <= panel.last_seq {
            debug!(
                "⏰ Render obsoleto descartado para guild {} (seq {} <= {})",
                state.guild_id, state.seq, panel.last_seq
            );
            return None;
        }
        panel.last_seq = state.seq;
        Some((panel.channel_id, panel.message_id))
    }
}

/// Bucle del notificador: consume el bus de estado y edita los paneles
/// registrados. Corre hasta que el bus se cierra.
pub async fn run(http: Arc<Http>, manager: Arc<PlayerManager>, panels: Arc<PanelRegistry>) {
    let bus = manager.bus();
    let mut rx = bus.subscribe();
    info!("📣 Notificador de paneles arrancado");

    loop {
        let state = match rx.recv().await {
            Ok(state) => state,
            Err(RecvError::Lagged(skipped)) => {
                // Perder eventos intermedios no importa: el siguiente trae
                // el estado completo
                debug!("⏰ Notificador rezagado, {} eventos saltados", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some((channel_id, message_id)) = panels.claim(&state) else {
            continue;
        };

        let elapsed = match manager.get(state.guild_id) {
            Some(player) => player.elapsed().await,
            None => None,
        };

        let embed = embeds::create_now_playing_embed(&state, elapsed);
        let rows = buttons::create_control_rows(&state);
        let edit = EditMessage::new().embed(embed).components(rows);

        if let Err(e) = channel_id.edit_message(&http, message_id, edit).await {
            // Mensaje borrado o sin permisos: el panel deja de existir
            warn!(
                "⚠️ Panel de guild {} no se pudo actualizar: {}",
                state.guild_id, e
            );
            panels.forget(state.guild_id);
        }
    }

    info!("📣 Notificador de paneles detenido");
}
