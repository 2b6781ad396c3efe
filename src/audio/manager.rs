use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::{
    player::GuildPlayer,
    queue::Track,
    state::{PlayerState, StateBus},
};
use crate::{
    config::Config,
    error::MusicError,
    sources::{search::pick_candidates, BilibiliExtractor, SearchClient},
};

/// Resultado de una operación de encolado, con todo lo que el render
/// necesita para contar qué pasó.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub track: Track,
    /// Posición asignada en la cola (0-based)
    pub position: usize,
    /// `true` si el encolado arrancó la reproducción en el acto
    pub started: bool,
}

/// Backoff lineal entre intentos de unión al canal de voz. Se aplica en
/// todos los caminos de fallo, incluido el timeout de conexión.
fn join_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * attempt as u64)
}

/// Registro de reproductores por guild y fachada de todas las operaciones
/// musicales del bot.
///
/// Cada guild tiene a lo sumo un [`GuildPlayer`], creado al unirse a un
/// canal de voz y destruido al salir.
pub struct PlayerManager {
    config: Arc<Config>,
    songbird: Arc<Songbird>,
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    bus: Arc<StateBus>,
    extractor: BilibiliExtractor,
    search: SearchClient,
    /// Ids reproducidos recientemente por la auto-playlist, por guild
    recent: DashMap<GuildId, VecDeque<String>>,
}

impl PlayerManager {
    pub fn new(config: Arc<Config>, songbird: Arc<Songbird>) -> Self {
        Self {
            extractor: BilibiliExtractor::new(config.clone()),
            search: SearchClient::new(),
            config,
            songbird,
            players: DashMap::new(),
            bus: Arc::new(StateBus::new()),
            recent: DashMap::new(),
        }
    }

    pub fn bus(&self) -> Arc<StateBus> {
        self.bus.clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    /// Une el bot al canal de voz y devuelve el reproductor de la guild,
    /// creándolo si no existía.
    ///
    /// La conexión de voz es quisquillosa con el gateway: se reintenta con
    /// backoff lineal antes de rendirse.
    pub async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<GuildPlayer>, MusicError> {
        let mut last_err = String::new();
        for attempt in 1..=self.config.voice_join_retries {
            let joined = tokio::time::timeout(
                self.config.connect_timeout(),
                self.songbird.join(guild_id, channel_id),
            )
            .await
            .map_err(|_| MusicError::ConnectionTimeout);
            match joined {
                Err(e) => {
                    warn!("⏰ [{}] {} (intento {})", guild_id, e, attempt);
                    last_err = e.to_string();
                    tokio::time::sleep(join_backoff(attempt)).await;
                }
                Ok(Ok(call)) => {
                    {
                        let mut call_guard = call.lock().await;
                        let _ = call_guard.deafen(true).await;
                    }
                    info!("🔊 [{}] Conectado al canal {}", guild_id, channel_id);

                    let player = self
                        .players
                        .entry(guild_id)
                        .or_insert_with(|| {
                            Arc::new(GuildPlayer::new(
                                guild_id,
                                self.config.clone(),
                                call.clone(),
                                self.bus.clone(),
                            ))
                        })
                        .clone();
                    return Ok(player);
                }
                Ok(Err(e)) => {
                    last_err = e.to_string();
                    warn!(
                        "⚠️ [{}] Fallo al unirse (intento {}/{}): {}",
                        guild_id, attempt, self.config.voice_join_retries, last_err
                    );
                    tokio::time::sleep(join_backoff(attempt)).await;
                }
            }
        }
        Err(MusicError::VoiceJoin(last_err))
    }

    /// Abandona el canal de voz y desecha el reproductor de la guild.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            player.on_disconnect().await;
            self.bus.publish(PlayerState::idle(guild_id));
        }
        self.songbird
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::Internal(format!("leave: {}", e)))?;
        info!("👋 [{}] Canal de voz abandonado", guild_id);
        Ok(())
    }

    /// El bot fue desconectado por fuera (kick, canal borrado). Limpia el
    /// reproductor sin tocar songbird, que ya perdió la llamada.
    pub async fn on_external_disconnect(&self, guild_id: GuildId) {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            player.on_disconnect().await;
            self.bus.publish(PlayerState::idle(guild_id));
        }
    }

    /// Resuelve una consulta (URL de Bilibili o palabras clave) y la
    /// encola en la guild.
    pub async fn play(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        query: &str,
    ) -> Result<Enqueued, MusicError> {
        let player = self.get(guild_id).ok_or(MusicError::NotInVoiceChannel)?;

        let url = if BilibiliExtractor::is_bilibili_url(query) {
            query.to_string()
        } else {
            // Palabras clave: el primer candidato de calidad gana
            let results = self
                .search
                .search(query, 1, self.config.search_page_size)
                .await?;
            let best = results
                .iter()
                .find(|r| r.is_quality())
                .or_else(|| results.first())
                .ok_or_else(|| MusicError::NoResults(query.to_string()))?;
            debug!("🔍 [{}] '{}' resuelto a {}", guild_id, query, best.id);
            best.url.clone()
        };

        let meta = self.extractor.extract(&url).await?;
        let track = Track::new(meta, user_id);

        let was_idle = !player.state().await.is_playing;
        let position = player.enqueue(track.clone()).await?;
        Ok(Enqueued {
            track,
            position,
            started: was_idle,
        })
    }

    /// Llena la cola con candidatos de búsqueda que pasen el filtro de
    /// calidad, evitando repetir lo ya sonado en esta guild.
    ///
    /// Devuelve los tracks efectivamente encolados; los candidatos cuya
    /// extracción falla se saltan en lugar de abortar el lote.
    pub async fn autoplaylist(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        keyword: &str,
        count: usize,
    ) -> Result<Vec<Track>, MusicError> {
        let player = self.get(guild_id).ok_or(MusicError::NotInVoiceChannel)?;

        let results = self
            .search
            .search(keyword, 1, self.config.search_page_size)
            .await?;

        let recent: Vec<String> = self
            .recent
            .get(&guild_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        let candidates = pick_candidates(results, &recent, count);
        if candidates.is_empty() {
            return Err(MusicError::NoResults(keyword.to_string()));
        }

        let mut queued = Vec::new();
        for candidate in candidates {
            match self.extractor.extract(&candidate.url).await {
                Ok(meta) => {
                    let track = Track::new(meta, user_id);
                    match player.enqueue(track.clone()).await {
                        Ok(_) => {
                            self.remember(guild_id, candidate.id);
                            queued.push(track);
                        }
                        Err(MusicError::QueueFull(_)) => break,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => {
                    warn!(
                        "⚠️ [{}] Candidato '{}' descartado: {}",
                        guild_id, candidate.title, e
                    );
                }
            }
        }

        if queued.is_empty() {
            return Err(MusicError::NoResults(keyword.to_string()));
        }
        info!(
            "📻 [{}] Auto-playlist: {} tracks para '{}'",
            guild_id,
            queued.len(),
            keyword
        );
        Ok(queued)
    }

    fn remember(&self, guild_id: GuildId, id: String) {
        let mut history = self.recent.entry(guild_id).or_default();
        history.push_back(id);
        while history.len() > self.config.autoplaylist_history {
            history.pop_front();
        }
    }

    /// Tarea de mantenimiento periódica: purga la caché de extracción.
    pub fn start_maintenance(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(600));
            loop {
                interval.tick().await;
                let purged = manager.extractor.purge_cache();
                if purged > 0 {
                    debug!("🧹 Mantenimiento: {} entradas de caché purgadas", purged);
                }
            }
        });
    }

    /// Comprueba que yt-dlp y ffmpeg existen y responden.
    pub async fn verify_dependencies(&self) -> Result<(), MusicError> {
        self.extractor.verify_dependencies().await?;
        let output = tokio::process::Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|_| MusicError::TranscoderMissing)?;
        if !output.status.success() {
            return Err(MusicError::TranscoderMissing);
        }
        Ok(())
    }

    /// Apagado ordenado: detiene todos los reproductores y abandona todos
    /// los canales.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|e| *e.key()).collect();
        info!("📦 Apagando {} reproductores", guilds.len());
        for guild_id in guilds {
            if let Err(e) = self.leave(guild_id).await {
                warn!("⚠️ [{}] Error al salir durante apagado: {}", guild_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backoff_de_union_crece_con_el_intento() {
        assert_eq!(join_backoff(1), Duration::from_millis(500));
        assert_eq!(join_backoff(2), Duration::from_millis(1000));
        assert_eq!(join_backoff(3), Duration::from_millis(1500));
    }
}
