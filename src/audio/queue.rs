use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, info};

use crate::{error::MusicError, sources::TrackMetadata};

/// Un elemento de la cola: metadatos resueltos más el estado de reintentos.
///
/// Inmutable salvo `retry_count`, que el reproductor ajusta al detectar
/// arranques fallidos (falso idle).
#[derive(Debug, Clone)]
pub struct Track {
    pub source_id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub stream_url: String,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
    pub retry_count: u8,
}

impl Track {
    pub fn new(meta: TrackMetadata, requested_by: UserId) -> Self {
        Self {
            source_id: meta.source_id,
            title: meta.title,
            uploader: meta.uploader,
            duration: meta.duration,
            thumbnail: meta.thumbnail,
            url: meta.url,
            stream_url: meta.stream_url,
            requested_by,
            added_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Modo de repetición del reproductor.
///
/// Gobierna qué pasa con el cursor cuando la cola se agota hacia adelante o
/// hacia atrás. El valor por defecto es `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "off" => Some(Self::Off),
            "track" => Some(Self::Track),
            "queue" => Some(Self::Queue),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "➡️ Desactivada",
            Self::Track => "🔂 Canción",
            Self::Queue => "🔁 Cola",
        }
    }
}

/// Cola ordenada con cursor de posición actual.
///
/// Invariante: `current_index` es `None` o un índice válido dentro de
/// `items`. La cola no opina sobre "reproduciéndose" — resolver una
/// referencia colgante tras remover el elemento actual es trabajo del
/// reproductor.
#[derive(Debug)]
pub struct TrackQueue {
    items: Vec<Track>,
    current_index: Option<usize>,
    /// Posición donde retomar tras agotarse la cola (ver `mark_exhausted`)
    resume_at: Option<usize>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            current_index: None,
            resume_at: None,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&Track> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut Track> {
        match self.current_index {
            Some(i) => self.items.get_mut(i),
            None => None,
        }
    }

    /// Agrega un track al final y devuelve su posición.
    pub fn enqueue(&mut self, track: Track) -> Result<usize, MusicError> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }
        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push(track);
        Ok(self.items.len() - 1)
    }

    /// Remueve por índice. Fuera de rango devuelve `None` sin tocar nada.
    ///
    /// Si se remueve el elemento actual, el cursor queda en `None`; el
    /// reproductor decide qué hacer con la referencia colgante.
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        match self.current_index {
            Some(cur) if index < cur => self.current_index = Some(cur - 1),
            Some(cur) if index == cur => self.current_index = None,
            _ => {}
        }
        debug!("❌ Track eliminado en posición {}: {}", index, removed.title);
        Some(removed)
    }

    /// Limpia la cola conservando solo el track actual (si existe) como
    /// cola de un solo elemento. Devuelve cuántos elementos se descartaron.
    pub fn clear(&mut self) -> usize {
        self.resume_at = None;
        match self.current_index {
            Some(cur) => {
                let kept = self.items.remove(cur);
                let removed = self.items.len();
                self.items.clear();
                self.items.push(kept);
                self.current_index = Some(0);
                info!("🗑️ Cola limpiada: {} tracks removidos, actual conservado", removed);
                removed
            }
            None => {
                let removed = self.items.len();
                self.items.clear();
                if removed > 0 {
                    info!("🗑️ Cola limpiada: {} tracks removidos", removed);
                }
                removed
            }
        }
    }

    /// Vacía todo, incluido el cursor. Usado por stop().
    pub fn clear_all(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        self.current_index = None;
        self.resume_at = None;
        removed
    }

    /// Mezcla la cola. El track actual queda fijado en la posición 0; el
    /// resto se permuta con Fisher-Yates.
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        match self.current_index {
            Some(cur) => {
                self.items.swap(0, cur);
                self.current_index = Some(0);
                self.items[1..].shuffle(&mut rng);
            }
            None => self.items.shuffle(&mut rng),
        }
        info!("🔀 Cola mezclada ({} tracks)", self.items.len());
    }

    /// Mueve el cursor a un índice válido.
    pub fn set_current(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.current_index = Some(index);
            self.resume_at = None;
            true
        } else {
            false
        }
    }

    /// Suelta el cursor sin recordar posición (p. ej. tras remover el actual)
    pub fn drop_cursor(&mut self) {
        self.current_index = None;
    }

    /// Marca la cola como agotada: el cursor se suelta pero se recuerda la
    /// posición de continuación, de modo que un `play` posterior a un
    /// refill arranque en el primer track recién agregado y no en el 0.
    pub fn mark_exhausted(&mut self) {
        self.resume_at = Some(self.items.len());
        self.current_index = None;
    }

    /// Posición donde debe empezar `play_next` cuando no hay track actual.
    ///
    /// Si la cola se agotó y luego se rellenó, es el índice del primer track
    /// nuevo; si no, el 0. `None` con cola vacía.
    pub fn start_position(&self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        match self.resume_at {
            Some(at) if at < self.items.len() => Some(at),
            _ => Some(0),
        }
    }

    /// Posición que reproducirá `play_next`: el cursor existente si lo hay
    /// (nunca se resetea a 0 con una posición válida), si no el arranque.
    pub fn play_position(&self) -> Option<usize> {
        self.current_index.or_else(|| self.start_position())
    }

    /// Índice siguiente según el modo de repetición; `None` = fin de cola.
    pub fn next_index(&self, loop_mode: LoopMode) -> Option<usize> {
        let cur = self.current_index?;
        if cur + 1 < self.items.len() {
            Some(cur + 1)
        } else {
            match loop_mode {
                LoopMode::Queue if !self.items.is_empty() => Some(0),
                LoopMode::Track => Some(cur),
                _ => None,
            }
        }
    }

    /// Índice anterior, simétrico a `next_index`.
    pub fn prev_index(&self, loop_mode: LoopMode) -> Option<usize> {
        let cur = self.current_index?;
        if cur > 0 {
            Some(cur - 1)
        } else {
            match loop_mode {
                LoopMode::Queue if !self.items.is_empty() => Some(self.items.len() - 1),
                LoopMode::Track => Some(cur),
                _ => None,
            }
        }
    }

    pub fn has_next(&self, loop_mode: LoopMode) -> bool {
        match self.current_index {
            Some(_) => self.next_index(loop_mode).is_some(),
            None => !self.items.is_empty(),
        }
    }

    pub fn has_previous(&self, loop_mode: LoopMode) -> bool {
        match self.current_index {
            Some(_) => self.prev_index(loop_mode).is_some(),
            None => false,
        }
    }

    /// Duración total encolada (tracks sin duración cuentan como 0)
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|t| t.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(id: &str) -> TrackMetadata {
        TrackMetadata {
            source_id: id.to_string(),
            title: format!("título {}", id),
            uploader: Some("up".to_string()),
            duration: Some(Duration::from_secs(60)),
            thumbnail: None,
            url: format!("https://www.bilibili.com/video/{}", id),
            stream_url: format!("https://cdn.example/{}", id),
        }
    }

    fn queue_with(n: usize) -> TrackQueue {
        let mut q = TrackQueue::new(100);
        for i in 0..n {
            q.enqueue(Track::new(meta(&format!("BV{}", i)), UserId::new(1)))
                .expect("cola con espacio");
        }
        q
    }

    #[test]
    fn invariante_de_indice_tras_mutaciones() {
        let mut q = queue_with(3);
        q.set_current(1);
        assert_eq!(q.current().map(|t| t.source_id.as_str()), Some("BV1"));

        // Remover antes del actual desplaza el cursor
        q.remove_at(0);
        assert_eq!(q.current_index(), Some(0));
        assert_eq!(q.current().map(|t| t.source_id.as_str()), Some("BV1"));

        // Remover el actual suelta el cursor
        q.remove_at(0);
        assert_eq!(q.current_index(), None);
        assert!(q.current().is_none());

        // Fuera de rango no toca nada
        assert!(q.remove_at(99).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn play_no_resetea_posicion_valida() {
        let mut q = queue_with(3);
        q.set_current(1);
        // Un play repetido (p. ej. tras pausa/reanudar) respeta el cursor
        assert_eq!(q.play_position(), Some(1));
    }

    #[test]
    fn loop_de_cola_envuelve_al_inicio() {
        let mut q = queue_with(3);
        q.set_current(2);
        assert_eq!(q.next_index(LoopMode::Queue), Some(0));
    }

    #[test]
    fn loop_de_track_repite_el_mismo_indice() {
        let mut q = queue_with(3);
        q.set_current(1);
        assert_eq!(q.next_index(LoopMode::Track), Some(1));
        assert_eq!(q.prev_index(LoopMode::Track), Some(1));
        assert!(q.has_next(LoopMode::Track));
        assert!(q.has_previous(LoopMode::Track));
    }

    #[test]
    fn fin_de_cola_sin_loop() {
        let mut q = queue_with(3);
        q.set_current(2);
        assert_eq!(q.next_index(LoopMode::Off), None);
        assert!(!q.has_next(LoopMode::Off));

        // El agotamiento suelta el cursor pero no toca la secuencia
        q.mark_exhausted();
        assert_eq!(q.current_index(), None);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn refill_tras_agotamiento_elige_el_nuevo() {
        let mut q = queue_with(3);
        q.set_current(2);
        q.mark_exhausted();

        q.enqueue(Track::new(meta("BVnuevo"), UserId::new(1)))
            .expect("cola con espacio");
        // Debe elegir el recién agregado (índice 3), no el 0
        assert_eq!(q.play_position(), Some(3));
    }

    #[test]
    fn cola_fresca_arranca_en_cero() {
        let q = queue_with(3);
        assert_eq!(q.play_position(), Some(0));
    }

    #[test]
    fn retroceso_envuelve_al_final_con_loop_de_cola() {
        let mut q = queue_with(3);
        q.set_current(0);
        assert_eq!(q.prev_index(LoopMode::Queue), Some(2));
        assert_eq!(q.prev_index(LoopMode::Off), None);
    }

    #[test]
    fn shuffle_fija_el_actual_en_cero() {
        let mut q = queue_with(5);
        q.set_current(2);
        let current_id = q.current().map(|t| t.source_id.clone());
        let mut before: Vec<String> =
            q.tracks().iter().map(|t| t.source_id.clone()).collect();

        q.shuffle();

        assert_eq!(q.current_index(), Some(0));
        assert_eq!(q.current().map(|t| t.source_id.clone()), current_id);

        // Multiconjunto preservado: ni pérdida ni duplicación
        let mut after: Vec<String> =
            q.tracks().iter().map(|t| t.source_id.clone()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn clear_conserva_solo_el_actual() {
        let mut q = queue_with(4);
        q.set_current(2);
        let removed = q.clear();
        assert_eq!(removed, 3);
        assert_eq!(q.len(), 1);
        assert_eq!(q.current_index(), Some(0));
        assert_eq!(q.current().map(|t| t.source_id.as_str()), Some("BV2"));
    }

    #[test]
    fn clear_sin_actual_vacia_todo() {
        let mut q = queue_with(4);
        assert_eq!(q.clear(), 4);
        assert!(q.is_empty());
    }

    #[test]
    fn respeta_capacidad_maxima() {
        let mut q = TrackQueue::new(2);
        q.enqueue(Track::new(meta("a"), UserId::new(1))).expect("espacio");
        q.enqueue(Track::new(meta("b"), UserId::new(1))).expect("espacio");
        assert!(matches!(
            q.enqueue(Track::new(meta("c"), UserId::new(1))),
            Err(MusicError::QueueFull(2))
        ));
    }
}
