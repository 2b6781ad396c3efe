use async_trait::async_trait;
use serenity::model::id::GuildId;
use songbird::{
    tracks::TrackHandle, Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use super::{
    pipeline::PipelineHandle,
    queue::{LoopMode, Track, TrackQueue},
    state::{PlayerState, StateBus},
};
use crate::{config::Config, error::MusicError};

/// Un track que muere antes de este umbral sin acercarse a su duración
/// esperada se trata como arranque fallido, no como fin legítimo.
const FALSE_IDLE_WINDOW: Duration = Duration::from_secs(3);

/// Margen sobre la duración esperada: terminar a menos de esto del final
/// cuenta como fin legítimo aunque haya sido rápido.
const NEAR_END_MARGIN: Duration = Duration::from_secs(2);

/// Qué hacer cuando termina el track en curso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndAction {
    /// Arranque fallido: reintentar el mismo track en el mismo índice
    Retry,
    /// Bucle de track: repetir, reseteando el contador de reintentos
    Replay,
    /// Avanzar el cursor al índice dado
    Advance(usize),
    /// Cola agotada hacia adelante
    Finish,
}

/// Decide la acción al terminar un track. Pura para poder testearla sin
/// levantar un pipeline.
fn decide_end_action(
    elapsed: Duration,
    expected: Option<Duration>,
    retry_count: u8,
    max_retries: u8,
    loop_mode: LoopMode,
    next: Option<usize>,
) -> EndAction {
    let reached_end = match expected {
        Some(total) => elapsed + NEAR_END_MARGIN >= total,
        None => false,
    };

    if elapsed < FALSE_IDLE_WINDOW && !reached_end && retry_count < max_retries {
        return EndAction::Retry;
    }

    if loop_mode == LoopMode::Track {
        return EndAction::Replay;
    }

    match next {
        Some(index) => EndAction::Advance(index),
        None => EndAction::Finish,
    }
}

/// Resultado de un salto explícito.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipOutcome {
    /// Arrancar el índice indicado (con bucle de track, el mismo)
    Jump(usize),
    /// Sin siguiente: apagar la reproducción dejando cola y conexión
    Exhausted,
}

/// Decide el destino de un salto. El modo de bucle participa igual que en
/// el avance automático: el bucle de track repite el índice en curso.
fn decide_skip(queue: &TrackQueue, loop_mode: LoopMode) -> SkipOutcome {
    match queue.next_index(loop_mode) {
        Some(index) => SkipOutcome::Jump(index),
        None => SkipOutcome::Exhausted,
    }
}

/// Un evento de fin de track es obsoleto si su generación no coincide con
/// la del pipeline vigente.
fn is_stale_event(event_generation: u64, current_generation: u64) -> bool {
    event_generation != current_generation
}

/// Sondea `check` hasta que devuelva `true` o venza el plazo.
async fn await_ready<F, Fut>(mut check: F, timeout: Duration) -> Result<(), MusicError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(MusicError::ConnectionTimeout);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Estado mutable del reproductor, serializado bajo un solo mutex para que
/// cada operación vea la cola y el pipeline de forma consistente.
struct PlayerInner {
    queue: TrackQueue,
    loop_mode: LoopMode,
    pipeline: Option<Arc<PipelineHandle>>,
    handle: Option<TrackHandle>,
    is_paused: bool,
    started_at: Option<Instant>,
    volume: f32,
}

/// Reproductor de una guild: cola indexada, pipeline en vuelo y modo de
/// bucle.
///
/// Todas las operaciones toman el mutex interno; el contador de generación
/// descarta eventos de fin de track que pertenecen a un pipeline anterior.
pub struct GuildPlayer {
    guild_id: GuildId,
    config: Arc<Config>,
    call: Arc<tokio::sync::Mutex<Call>>,
    bus: Arc<StateBus>,
    inner: tokio::sync::Mutex<PlayerInner>,
    generation: AtomicU64,
}

impl GuildPlayer {
    pub fn new(
        guild_id: GuildId,
        config: Arc<Config>,
        call: Arc<tokio::sync::Mutex<Call>>,
        bus: Arc<StateBus>,
    ) -> Self {
        let volume = config.default_volume;
        let max_queue = config.max_queue_size;
        Self {
            guild_id,
            config,
            call,
            bus,
            inner: tokio::sync::Mutex::new(PlayerInner {
                queue: TrackQueue::new(max_queue),
                loop_mode: LoopMode::default(),
                pipeline: None,
                handle: None,
                is_paused: false,
                started_at: None,
                volume,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Encola un track y, si no hay nada sonando, arranca la reproducción.
    ///
    /// Devuelve la posición asignada en la cola.
    pub async fn enqueue(self: &Arc<Self>, track: Track) -> Result<usize, MusicError> {
        let mut inner = self.inner.lock().await;
        let title = track.title.clone();
        let position = inner.queue.enqueue(track)?;
        info!("➕ [{}] '{}' en posición {}", self.guild_id, title, position);

        if inner.handle.is_none() {
            // Cola parada: el cursor retoma donde la marca de agotamiento
            // diga, no necesariamente en el primer elemento
            if let Some(start) = inner.queue.play_position() {
                inner.queue.set_current(start);
                self.start_current(&mut inner).await?;
            }
        }

        self.publish(&inner);
        Ok(position)
    }

    /// Salta al track del índice dado, terminando el pipeline actual.
    pub async fn play_at(self: &Arc<Self>, index: usize) -> Result<Track, MusicError> {
        let mut inner = self.inner.lock().await;
        if !inner.queue.set_current(index) {
            return Err(MusicError::IndexOutOfRange(index));
        }
        if let Some(track) = inner.queue.current_mut() {
            track.retry_count = 0;
        }
        self.start_current(&mut inner).await?;
        self.publish(&inner);
        Ok(inner.queue.current().cloned().ok_or(MusicError::NothingPlaying)?)
    }

    pub async fn pause(&self) -> Result<(), MusicError> {
        let mut inner = self.inner.lock().await;
        let handle = inner.handle.as_ref().ok_or(MusicError::NothingPlaying)?;
        if inner.is_paused {
            return Err(MusicError::AlreadyPaused);
        }
        handle
            .pause()
            .map_err(|e| MusicError::Internal(format!("pause: {}", e)))?;
        if let Some(pipeline) = &inner.pipeline {
            pipeline.set_paused(true);
        }
        inner.is_paused = true;
        info!("⏸️ [{}] Pausado", self.guild_id);
        self.publish(&inner);
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), MusicError> {
        let mut inner = self.inner.lock().await;
        let handle = inner.handle.as_ref().ok_or(MusicError::NothingPlaying)?;
        if !inner.is_paused {
            return Err(MusicError::NotPaused);
        }
        handle
            .play()
            .map_err(|e| MusicError::Internal(format!("resume: {}", e)))?;
        if let Some(pipeline) = &inner.pipeline {
            pipeline.set_paused(false);
        }
        inner.is_paused = false;
        info!("▶️ [{}] Reanudado", self.guild_id);
        self.publish(&inner);
        Ok(())
    }

    /// Avanza según el modo de bucle: con bucle de track el salto repite
    /// el mismo índice con un pipeline fresco; sin siguiente, la
    /// reproducción se apaga pero la cola y la conexión quedan intactas.
    pub async fn next(self: &Arc<Self>) -> Result<Track, MusicError> {
        let mut inner = self.inner.lock().await;
        let index = match decide_skip(&inner.queue, inner.loop_mode) {
            SkipOutcome::Jump(index) => index,
            SkipOutcome::Exhausted => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.teardown_playback(&mut inner).await;
                inner.queue.mark_exhausted();
                info!(
                    "🏁 [{}] Salto sin siguiente: reproducción detenida",
                    self.guild_id
                );
                self.publish(&inner);
                return Err(MusicError::NoNextTrack);
            }
        };
        inner.queue.set_current(index);
        if let Some(track) = inner.queue.current_mut() {
            track.retry_count = 0;
        }
        info!("⏭️ [{}] Saltando al índice {}", self.guild_id, index);
        self.start_current(&mut inner).await?;
        self.publish(&inner);
        inner.queue.current().cloned().ok_or(MusicError::NothingPlaying)
    }

    /// Retrocede al track anterior según el modo de bucle.
    pub async fn previous(self: &Arc<Self>) -> Result<Track, MusicError> {
        let mut inner = self.inner.lock().await;
        let prev = inner.queue.prev_index(inner.loop_mode);
        let index = prev.ok_or(MusicError::NoPreviousTrack)?;
        inner.queue.set_current(index);
        if let Some(track) = inner.queue.current_mut() {
            track.retry_count = 0;
        }
        info!("⏮️ [{}] Volviendo al índice {}", self.guild_id, index);
        self.start_current(&mut inner).await?;
        self.publish(&inner);
        inner.queue.current().cloned().ok_or(MusicError::NothingPlaying)
    }

    /// Detiene la reproducción y vacía la cola por completo.
    pub async fn stop(&self) -> Result<usize, MusicError> {
        let mut inner = self.inner.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_playback(&mut inner).await;
        let removed = inner.queue.clear_all();
        info!("⏹️ [{}] Detenido, {} tracks eliminados", self.guild_id, removed);
        self.publish(&inner);
        Ok(removed)
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) {
        let mut inner = self.inner.lock().await;
        inner.loop_mode = mode;
        info!("🔁 [{}] Modo de bucle: {}", self.guild_id, mode.label());
        self.publish(&inner);
    }

    pub async fn shuffle(&self) -> Result<usize, MusicError> {
        let mut inner = self.inner.lock().await;
        if inner.queue.len() < 2 {
            return Err(MusicError::EmptyQueue);
        }
        inner.queue.shuffle();
        self.publish(&inner);
        Ok(inner.queue.len())
    }

    /// Vacía la cola conservando el track en curso.
    pub async fn clear(&self) -> Result<usize, MusicError> {
        let mut inner = self.inner.lock().await;
        let removed = inner.queue.clear();
        info!("🗑️ [{}] Cola limpiada ({} fuera)", self.guild_id, removed);
        self.publish(&inner);
        Ok(removed)
    }

    /// Quita el track del índice dado. Si era el que sonaba, la
    /// reproducción continúa con el que ocupa ahora esa posición, o se
    /// apaga si no queda ninguno.
    pub async fn remove_at(self: &Arc<Self>, index: usize) -> Result<Track, MusicError> {
        let mut inner = self.inner.lock().await;
        let was_current = inner.queue.current_index() == Some(index);
        let removed = inner
            .queue
            .remove_at(index)
            .ok_or(MusicError::IndexOutOfRange(index))?;
        info!("🗑️ [{}] '{}' fuera de la cola", self.guild_id, removed.title);

        if was_current {
            if index < inner.queue.len() {
                inner.queue.set_current(index);
                self.start_current(&mut inner).await?;
            } else {
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.teardown_playback(&mut inner).await;
                inner.queue.mark_exhausted();
            }
        }
        self.publish(&inner);
        Ok(removed)
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), MusicError> {
        let mut inner = self.inner.lock().await;
        let volume = volume.clamp(0.0, 2.0);
        inner.volume = volume;
        if let Some(handle) = &inner.handle {
            handle
                .set_volume(volume)
                .map_err(|e| MusicError::Internal(format!("volume: {}", e)))?;
        }
        self.publish(&inner);
        Ok(())
    }

    /// Instantánea del estado actual
    pub async fn state(&self) -> PlayerState {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    /// Copia de los tracks de la cola, para los renders de paginación
    pub async fn queue_view(&self) -> (Vec<Track>, Option<usize>, Duration) {
        let inner = self.inner.lock().await;
        (
            inner.queue.tracks().to_vec(),
            inner.queue.current_index(),
            inner.queue.total_duration(),
        )
    }

    /// Tiempo transcurrido del track en curso
    pub async fn elapsed(&self) -> Option<Duration> {
        let inner = self.inner.lock().await;
        inner.started_at.map(|t| t.elapsed())
    }

    /// Apaga pipeline y track sin tocar la cola. El llamante bumpea la
    /// generación antes si no quiere que el evento de fin reaccione.
    async fn teardown_playback(&self, inner: &mut PlayerInner) {
        if let Some(handle) = inner.handle.take() {
            let _ = handle.stop();
        }
        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.terminate(self.config.pipeline_grace()).await;
        }
        inner.started_at = None;
        inner.is_paused = false;
    }

    /// Arranca el track bajo el cursor.
    ///
    /// Invariante de limpieza: el pipeline anterior se termina por completo
    /// antes de lanzar el nuevo; nunca hay dos ffmpeg alimentando la misma
    /// llamada de voz.
    async fn start_current(self: &Arc<Self>, inner: &mut PlayerInner) -> Result<(), MusicError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.teardown_playback(inner).await;

        let track = inner.queue.current().cloned().ok_or(MusicError::NothingPlaying)?;
        debug!(
            "🎵 [{}] Arrancando '{}' (generación {})",
            self.guild_id, track.title, generation
        );

        self.wait_connection_ready().await?;
        let (pipeline, input) =
            PipelineHandle::spawn(&self.config, &track.stream_url, generation)?;
        pipeline.start_monitor(self.config.pipeline_warn(), self.config.pipeline_kill());
        let pipeline = Arc::new(pipeline);

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        let _ = handle.set_volume(inner.volume);
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                PlaybackEndNotifier {
                    player: Arc::downgrade(self),
                    generation,
                },
            )
            .map_err(|e| MusicError::Internal(format!("add_event: {}", e)))?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                PlaybackErrorNotifier {
                    guild_id: self.guild_id,
                    title: track.title.clone(),
                },
            )
            .map_err(|e| MusicError::Internal(format!("add_event: {}", e)))?;

        inner.pipeline = Some(pipeline);
        inner.handle = Some(handle);
        inner.started_at = Some(Instant::now());
        inner.is_paused = false;

        info!("🎵 [{}] Reproduciendo '{}'", self.guild_id, track.title);
        Ok(())
    }

    /// Espera, con cota, a que la conexión de voz esté lista. Tras una
    /// reconexión del gateway la llamada puede existir sin conexión viva;
    /// arrancar ffmpeg contra ella desperdicia el proceso.
    async fn wait_connection_ready(&self) -> Result<(), MusicError> {
        let call = Arc::clone(&self.call);
        await_ready(
            move || {
                let call = Arc::clone(&call);
                async move { call.lock().await.current_connection().is_some() }
            },
            self.config.connect_timeout(),
        )
        .await
        .inspect_err(|_| {
            warn!(
                "⚠️ [{}] Conexión de voz sin establecerse a tiempo",
                self.guild_id
            );
        })
    }

    /// Reacciona al fin del track en curso. Los eventos de generaciones
    /// anteriores (pipelines ya reemplazados) se descartan.
    pub(crate) async fn handle_track_end(self: Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock().await;
        if is_stale_event(generation, self.generation.load(Ordering::SeqCst)) {
            debug!(
                "⏰ [{}] Fin de track de generación {} descartado",
                self.guild_id, generation
            );
            return;
        }

        let elapsed = inner
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);

        // Reaping del pipeline y clasificación de fallos
        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.terminate(self.config.pipeline_grace()).await;
            if let Some(failure) = pipeline.failure() {
                warn!("❌ [{}] Pipeline terminó con fallo: {}", self.guild_id, failure);
            }
        }
        inner.handle = None;
        inner.started_at = None;

        let (expected, retry_count) = match inner.queue.current() {
            Some(track) => (track.duration, track.retry_count),
            None => (None, 0),
        };
        let next = inner.queue.next_index(inner.loop_mode);
        let action = decide_end_action(
            elapsed,
            expected,
            retry_count,
            self.config.false_idle_retries,
            inner.loop_mode,
            next,
        );

        let result = match action {
            EndAction::Retry => {
                if let Some(track) = inner.queue.current_mut() {
                    track.retry_count += 1;
                    warn!(
                        "🔄 [{}] '{}' murió a los {:?}, reintento {}",
                        self.guild_id, track.title, elapsed, track.retry_count
                    );
                }
                self.start_current(&mut inner).await
            }
            EndAction::Replay => {
                if let Some(track) = inner.queue.current_mut() {
                    track.retry_count = 0;
                }
                debug!("🔂 [{}] Repitiendo track en bucle", self.guild_id);
                self.start_current(&mut inner).await
            }
            EndAction::Advance(index) => {
                inner.queue.set_current(index);
                if let Some(track) = inner.queue.current_mut() {
                    track.retry_count = 0;
                }
                self.start_current(&mut inner).await
            }
            EndAction::Finish => {
                info!("🏁 [{}] Cola agotada", self.guild_id);
                inner.queue.mark_exhausted();
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("❌ [{}] No se pudo continuar la reproducción: {}", self.guild_id, e);
            inner.queue.drop_cursor();
        }
        self.publish(&inner);
    }

    /// Desconexión del canal de voz: apaga todo pero conserva la cola.
    pub async fn on_disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown_playback(&mut inner).await;
        inner.queue.drop_cursor();
        info!("👋 [{}] Desconectado del canal de voz", self.guild_id);
        self.publish(&inner);
    }

    fn snapshot(&self, inner: &PlayerInner) -> PlayerState {
        PlayerState {
            guild_id: self.guild_id,
            seq: 0,
            is_playing: inner.handle.is_some(),
            is_paused: inner.is_paused,
            current: inner.queue.current().cloned(),
            current_index: inner.queue.current_index(),
            queue_len: inner.queue.len(),
            has_next: inner.queue.has_next(inner.loop_mode),
            has_previous: inner.queue.has_previous(inner.loop_mode),
            loop_mode: inner.loop_mode,
        }
    }

    fn publish(&self, inner: &PlayerInner) {
        self.bus.publish(self.snapshot(inner));
    }
}

/// Notifica el fin del track al reproductor, arrastrando la generación del
/// pipeline que lo produjo para que los eventos tardíos se descarten.
struct PlaybackEndNotifier {
    player: Weak<GuildPlayer>,
    generation: u64,
}

#[async_trait]
impl VoiceEventHandler for PlaybackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(_) = ctx {
            if let Some(player) = self.player.upgrade() {
                let generation = self.generation;
                tokio::spawn(player.handle_track_end(generation));
            }
        }
        None
    }
}

struct PlaybackErrorNotifier {
    guild_id: GuildId,
    title: String,
}

#[async_trait]
impl VoiceEventHandler for PlaybackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(list) = ctx {
            for (state, _) in *list {
                error!(
                    "❌ [{}] Error de reproducción en '{}': {:?}",
                    self.guild_id, self.title, state.playing
                );
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MAX_RETRIES: u8 = 2;

    #[test]
    fn muerte_temprana_se_reintenta() {
        let action = decide_end_action(
            Duration::from_millis(800),
            Some(Duration::from_secs(180)),
            0,
            MAX_RETRIES,
            LoopMode::Off,
            Some(1),
        );
        assert_eq!(action, EndAction::Retry);
    }

    #[test]
    fn reintentos_agotados_avanzan() {
        let action = decide_end_action(
            Duration::from_millis(500),
            Some(Duration::from_secs(180)),
            MAX_RETRIES,
            MAX_RETRIES,
            LoopMode::Off,
            Some(1),
        );
        assert_eq!(action, EndAction::Advance(1));
    }

    #[test]
    fn track_corto_que_llega_al_final_no_es_falso_idle() {
        // Duración esperada de 2s: terminar a los 1.5s es legítimo
        let action = decide_end_action(
            Duration::from_millis(1500),
            Some(Duration::from_secs(2)),
            0,
            MAX_RETRIES,
            LoopMode::Off,
            Some(1),
        );
        assert_eq!(action, EndAction::Advance(1));
    }

    #[test]
    fn bucle_de_track_repite_tras_fin_legitimo() {
        let action = decide_end_action(
            Duration::from_secs(180),
            Some(Duration::from_secs(180)),
            1,
            MAX_RETRIES,
            LoopMode::Track,
            Some(1),
        );
        assert_eq!(action, EndAction::Replay);
    }

    #[test]
    fn bucle_de_track_no_absorbe_arranques_fallidos() {
        // El falso idle tiene prioridad sobre el bucle: si no, un stream
        // roto entraria en un ciclo infinito de arranques de 0 segundos
        let action = decide_end_action(
            Duration::from_millis(300),
            Some(Duration::from_secs(180)),
            0,
            MAX_RETRIES,
            LoopMode::Track,
            Some(1),
        );
        assert_eq!(action, EndAction::Retry);
    }

    #[test]
    fn fin_de_cola_sin_bucle_termina() {
        let action = decide_end_action(
            Duration::from_secs(180),
            Some(Duration::from_secs(180)),
            0,
            MAX_RETRIES,
            LoopMode::Off,
            None,
        );
        assert_eq!(action, EndAction::Finish);
    }

    #[test]
    fn duracion_desconocida_solo_mira_la_ventana() {
        let action = decide_end_action(
            Duration::from_secs(2),
            None,
            0,
            MAX_RETRIES,
            LoopMode::Off,
            Some(1),
        );
        assert_eq!(action, EndAction::Retry);

        let action = decide_end_action(
            Duration::from_secs(4),
            None,
            0,
            MAX_RETRIES,
            LoopMode::Off,
            Some(1),
        );
        assert_eq!(action, EndAction::Advance(1));
    }

    fn skip_queue(n: usize) -> TrackQueue {
        use crate::sources::TrackMetadata;
        use serenity::model::id::UserId;

        let mut q = TrackQueue::new(100);
        for i in 0..n {
            let meta = TrackMetadata {
                source_id: format!("BV{}", i),
                title: format!("título {}", i),
                uploader: None,
                duration: Some(Duration::from_secs(60)),
                thumbnail: None,
                url: format!("https://www.bilibili.com/video/BV{}", i),
                stream_url: format!("https://cdn.example/BV{}", i),
            };
            q.enqueue(Track::new(meta, UserId::new(1)))
                .expect("cola con espacio");
        }
        q
    }

    #[test]
    fn salto_con_bucle_de_track_repite_el_ultimo_indice() {
        // Con bucle de track el salto nunca se agota: en el último índice
        // vuelve a arrancar el mismo track
        let mut q = skip_queue(3);
        q.set_current(2);
        assert_eq!(decide_skip(&q, LoopMode::Track), SkipOutcome::Jump(2));
        assert!(q.has_next(LoopMode::Track));
    }

    #[test]
    fn salto_sin_siguiente_se_agota() {
        let mut q = skip_queue(3);
        q.set_current(2);
        assert_eq!(decide_skip(&q, LoopMode::Off), SkipOutcome::Exhausted);
        assert_eq!(decide_skip(&q, LoopMode::Queue), SkipOutcome::Jump(0));
    }

    #[test]
    fn salto_intermedio_avanza() {
        let mut q = skip_queue(3);
        q.set_current(0);
        assert_eq!(decide_skip(&q, LoopMode::Off), SkipOutcome::Jump(1));
    }

    #[tokio::test]
    async fn espera_de_conexion_vence_con_timeout() {
        let result = await_ready(|| async { false }, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(MusicError::ConnectionTimeout)));
    }

    #[tokio::test]
    async fn espera_de_conexion_resuelve_al_estar_lista() {
        use std::sync::atomic::AtomicU32;

        // Lista al tercer sondeo, dentro del plazo
        let polls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&polls);
        let result = await_ready(
            move || {
                let seen = Arc::clone(&seen);
                async move { seen.fetch_add(1, Ordering::SeqCst) >= 2 }
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(result.is_ok());
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn fin_de_generacion_anterior_es_obsoleto() {
        // Cada arranque incrementa la generación: el evento del pipeline
        // reemplazado llega con la vieja y se descarta
        assert!(is_stale_event(2, 3));
        assert!(!is_stale_event(3, 3));
    }
}
