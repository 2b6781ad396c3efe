use dashmap::DashMap;
use serenity::model::id::GuildId;
use tokio::sync::broadcast;
use tracing::debug;

use super::queue::{LoopMode, Track};

/// Instantánea del estado de un reproductor, la forma canónica que consume
/// cualquier renderizador.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub guild_id: GuildId,
    /// Secuencia monótona por guild; un render con secuencia superada se
    /// descarta en lugar de pisar uno más fresco
    pub seq: u64,
    pub is_playing: bool,
    pub is_paused: bool,
    pub current: Option<Track>,
    pub current_index: Option<usize>,
    pub queue_len: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub loop_mode: LoopMode,
}

impl PlayerState {
    /// Estado vacío (reproductor recién creado o detenido)
    pub fn idle(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            seq: 0,
            is_playing: false,
            is_paused: false,
            current: None,
            current_index: None,
            queue_len: 0,
            has_next: false,
            has_previous: false,
            loop_mode: LoopMode::default(),
        }
    }
}

/// Bus de notificaciones de estado, clave por guild.
///
/// Cada publicación recibe una secuencia monótona creciente por guild; los
/// suscriptores comparan contra [`StateBus::latest`] para descartar renders
/// obsoletos en vez de sobreescribir uno más nuevo.
pub struct StateBus {
    tx: broadcast::Sender<PlayerState>,
    seqs: DashMap<GuildId, u64>,
}

impl StateBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            seqs: DashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerState> {
        self.tx.subscribe()
    }

    /// Publica el estado, estampando la siguiente secuencia de la guild.
    pub fn publish(&self, mut state: PlayerState) {
        let seq = {
            let mut entry = self.seqs.entry(state.guild_id).or_insert(0);
            *entry += 1;
            *entry
        };
        state.seq = seq;
        debug!(
            "📣 Estado publicado para guild {} (seq {}, playing={})",
            state.guild_id, seq, state.is_playing
        );
        // Sin suscriptores no es un error: el bus simplemente descarta
        let _ = self.tx.send(state);
    }

    /// Última secuencia publicada para la guild
    pub fn latest(&self, guild_id: GuildId) -> u64 {
        self.seqs.get(&guild_id).map(|s| *s).unwrap_or(0)
    }

    /// `true` si la secuencia ya fue superada por una publicación más nueva
    pub fn is_stale(&self, guild_id: GuildId, seq: u64) -> bool {
        seq < self.latest(guild_id)
    }
}

impl Default for StateBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn secuencia_monotona_por_guild() {
        let bus = StateBus::new();
        let g1 = GuildId::new(1);
        let g2 = GuildId::new(2);

        let mut rx = bus.subscribe();

        bus.publish(PlayerState::idle(g1));
        bus.publish(PlayerState::idle(g1));
        bus.publish(PlayerState::idle(g2));

        let a = rx.recv().await.expect("estado");
        let b = rx.recv().await.expect("estado");
        let c = rx.recv().await.expect("estado");

        assert_eq!((a.guild_id, a.seq), (g1, 1));
        assert_eq!((b.guild_id, b.seq), (g1, 2));
        // Las guilds llevan secuencias independientes
        assert_eq!((c.guild_id, c.seq), (g2, 1));
    }

    #[tokio::test]
    async fn guardia_de_escritura_obsoleta() {
        let bus = StateBus::new();
        let guild = GuildId::new(7);

        bus.publish(PlayerState::idle(guild));
        assert!(!bus.is_stale(guild, 1));

        // Una publicación más nueva invalida la secuencia 1 en vuelo
        bus.publish(PlayerState::idle(guild));
        assert!(bus.is_stale(guild, 1));
        assert!(!bus.is_stale(guild, 2));
        assert_eq!(bus.latest(guild), 2);
    }

    #[tokio::test]
    async fn publicar_sin_suscriptores_no_falla() {
        let bus = StateBus::new();
        bus.publish(PlayerState::idle(GuildId::new(9)));
        assert_eq!(bus.latest(GuildId::new(9)), 1);
    }
}
