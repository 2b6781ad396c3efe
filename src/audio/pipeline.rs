use parking_lot::Mutex;
use songbird::input::{AudioStream, Input, LiveInput};
use std::{
    collections::VecDeque,
    io::{Read, Write},
    process::{Child, ChildStdin, Command, Stdio},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use symphonia::core::io::{MediaSource, ReadOnlySource};
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::MusicError,
    sources::{BILIBILI_REFERER, BROWSER_USER_AGENT},
};

/// Códigos de salida inducidos por señales o por nuestra propia limpieza;
/// no cuentan como fallo del transcodificador.
const BENIGN_EXIT_CODES: [i32; 3] = [15, 137, 143];

/// Estados del ciclo de vida de un pipeline.
///
/// Las transiciones válidas son Starting → Running → Terminating →
/// Terminated; `terminate` es quien mueve el estado hacia adelante, nunca
/// hacia atrás.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    Terminating,
    Terminated,
}

/// Sonda de actividad compartida entre el lector de audio y el monitor.
///
/// El lector marca cada llegada de bytes; el monitor compara contra los
/// umbrales de warning y de kill.
#[derive(Debug)]
pub struct ActivityProbe {
    origin: Instant,
    last_ms: AtomicU64,
    bytes: AtomicU64,
}

impl ActivityProbe {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn add_bytes(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Tiempo desde la última llegada de bytes
    pub fn idle_for(&self) -> Duration {
        let now = self.origin.elapsed().as_millis() as u64;
        let last = self.last_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Lector que contabiliza la llegada de bytes del transcodificador.
///
/// songbird lo consume a ritmo de reproducción, así que mientras haya audio
/// fluyendo la sonda se refresca sola.
struct CountingReader {
    inner: std::process::ChildStdout,
    probe: Arc<ActivityProbe>,
    state: Arc<Mutex<PipelineState>>,
    saw_bytes: bool,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.probe.touch();
            self.probe.add_bytes(n);
            if !self.saw_bytes {
                self.saw_bytes = true;
                let mut state = self.state.lock();
                if *state == PipelineState::Starting {
                    *state = PipelineState::Running;
                }
            }
        }
        Ok(n)
    }
}

/// Envuelve el subproceso de transcodificación y el recurso de audio de
/// exactamente un track en vuelo.
///
/// Invariante: a lo sumo un `PipelineHandle` vivo por reproductor; arrancar
/// uno nuevo exige terminar el anterior primero, o el audio de ambos se
/// mezclaría en el sink de voz.
pub struct PipelineHandle {
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    state: Arc<Mutex<PipelineState>>,
    probe: Arc<ActivityProbe>,
    inactive: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    exit_code: Arc<Mutex<Option<i32>>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    monitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
    generation: u64,
}

impl PipelineHandle {
    /// Lanza ffmpeg sobre la URL de stream y construye el `Input` de
    /// songbird a partir de su stdout (WAV PCM 48kHz estéreo).
    pub fn spawn(
        config: &Config,
        stream_url: &str,
        generation: u64,
    ) -> Result<(Self, Input), MusicError> {
        let headers = format!("Referer: {}\r\n", BILIBILI_REFERER);

        let mut cmd = Command::new(&config.ffmpeg_path);
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "warning",
            // Las URLs del CDN son inestables: reconexión automática y
            // timeouts generosos
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-rw_timeout",
            "15000000",
            "-user_agent",
            BROWSER_USER_AGENT,
            "-headers",
            headers.as_str(),
            "-i",
            stream_url,
            "-vn",
            "-f",
            "wav",
            "-ar",
            "48000",
            "-ac",
            "2",
            "-acodec",
            "pcm_s16le",
            "pipe:1",
        ]);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MusicError::TranscoderMissing
            } else {
                MusicError::ResourceCreation(format!("no se pudo lanzar ffmpeg: {}", e))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MusicError::ResourceCreation("ffmpeg sin stdout".to_string()))?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();

        let probe = Arc::new(ActivityProbe::new());
        probe.touch();
        let state = Arc::new(Mutex::new(PipelineState::Starting));
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(8)));

        // Drenar stderr en un hilo aparte: diagnóstico de fallos sin
        // bloquear al proceso cuando el buffer del pipe se llena
        if let Some(stderr) = stderr {
            let tail = stderr_tail.clone();
            std::thread::spawn(move || {
                use std::io::{BufRead, BufReader};
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    debug!("📺 ffmpeg: {}", line);
                    let mut tail = tail.lock();
                    if tail.len() >= 8 {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        let reader = CountingReader {
            inner: stdout,
            probe: probe.clone(),
            state: state.clone(),
            saw_bytes: false,
        };

        let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(reader));
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: Some(hint),
            }),
            None,
        );

        info!("🎛️ Pipeline {} lanzado (pid {:?})", generation, child.id());

        let handle = Self {
            child: Arc::new(Mutex::new(Some(child))),
            stdin: Arc::new(Mutex::new(stdin)),
            state,
            probe,
            inactive: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(Mutex::new(None)),
            stderr_tail,
            monitor: Mutex::new(None),
            generation,
        };

        Ok((handle, input))
    }

    /// Arranca el latido de actividad: si no llegan bytes durante el umbral
    /// de warning se loguea, y pasado el umbral de kill el proceso se da
    /// por colgado y se termina.
    pub fn start_monitor(&self, warn_after: Duration, kill_after: Duration) {
        let probe = self.probe.clone();
        let state = self.state.clone();
        let child = self.child.clone();
        let inactive = self.inactive.clone();
        let paused = self.paused.clone();
        let exit_code = self.exit_code.clone();
        let generation = self.generation;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            let mut warned = false;

            loop {
                interval.tick().await;

                match *state.lock() {
                    PipelineState::Terminating | PipelineState::Terminated => break,
                    _ => {}
                }

                // En pausa songbird no consume stdout: el silencio es normal
                if paused.load(Ordering::Relaxed) {
                    probe.touch();
                    continue;
                }

                let idle = probe.idle_for();
                if idle >= kill_after {
                    warn!(
                        "💀 Pipeline {} sin actividad por {:?}, terminando proceso",
                        generation, idle
                    );
                    inactive.store(true, Ordering::Relaxed);
                    let mut guard = child.lock();
                    if let Some(mut c) = guard.take() {
                        let _ = c.kill();
                        if let Ok(status) = c.wait() {
                            *exit_code.lock() = status.code();
                        }
                    }
                    *state.lock() = PipelineState::Terminated;
                    break;
                } else if idle >= warn_after && !warned {
                    warned = true;
                    warn!(
                        "⚠️ Pipeline {} lleva {:?} sin recibir bytes",
                        generation, idle
                    );
                } else if idle < warn_after {
                    warned = false;
                }
            }
        });

        *self.monitor.lock() = Some(task);
    }

    /// Termina el subproceso: `q` por stdin para la salida limpia de
    /// ffmpeg, ventana de gracia, y kill si sigue vivo. Idempotente.
    pub async fn terminate(&self, grace: Duration) {
        if let Some(task) = self.monitor.lock().take() {
            task.abort();
        }

        let force = {
            let mut state = self.state.lock();
            match *state {
                PipelineState::Terminated => return,
                PipelineState::Terminating => true,
                _ => {
                    *state = PipelineState::Terminating;
                    false
                }
            }
        };

        if !force {
            // Cierre limpio: ffmpeg trata 'q' en stdin como orden de salida
            if let Some(mut stdin) = self.stdin.lock().take() {
                let _ = stdin.write_all(b"q");
                // drop cierra el pipe
            }

            let deadline = Instant::now() + grace;
            loop {
                {
                    let mut guard = self.child.lock();
                    match guard.as_mut().map(|c| c.try_wait()) {
                        Some(Ok(Some(status))) => {
                            debug!(
                                "🧹 Pipeline {} salió con {:?} tras cierre limpio",
                                self.generation,
                                status.code()
                            );
                            *self.exit_code.lock() = status.code();
                            guard.take();
                            break;
                        }
                        Some(Ok(None)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        // Gracia agotada (o segunda terminación concurrente): kill directo
        {
            let mut guard = self.child.lock();
            if let Some(mut c) = guard.take() {
                warn!("💀 Pipeline {} no salió a tiempo, kill", self.generation);
                let _ = c.kill();
                if let Ok(status) = c.wait() {
                    *self.exit_code.lock() = status.code();
                }
            }
        }

        *self.state.lock() = PipelineState::Terminated;
    }

    /// Marca el pipeline como pausado para que el monitor no confunda la
    /// pausa con un proceso colgado.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
        if !paused {
            self.probe.touch();
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn was_inactive(&self) -> bool {
        self.inactive.load(Ordering::Relaxed)
    }

    /// Clasifica un fin de pipeline como fallo, si lo fue.
    ///
    /// Las salidas inducidas por señal (137/143/15) son nuestra propia
    /// limpieza y no cuentan.
    pub fn failure(&self) -> Option<MusicError> {
        if self.was_inactive() {
            return Some(MusicError::ProcessInactive);
        }
        match *self.exit_code.lock() {
            Some(code) if code != 0 && !BENIGN_EXIT_CODES.contains(&code) => {
                let tail: Vec<String> = self.stderr_tail.lock().iter().cloned().collect();
                Some(MusicError::ResourceCreation(format!(
                    "ffmpeg salió con código {}: {}",
                    code,
                    tail.join(" | ")
                )))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("generation", &self.generation)
            .field("state", &*self.state.lock())
            .field("bytes", &self.probe.total_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Construye un handle alrededor de un proceso inocuo, sin pasar por
    // ffmpeg, para ejercitar la máquina de estados de terminación.
    fn handle_for(cmd: &mut Command) -> PipelineHandle {
        let child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("proceso de prueba");

        let mut child = child;
        let stdin = child.stdin.take();
        PipelineHandle {
            child: Arc::new(Mutex::new(Some(child))),
            stdin: Arc::new(Mutex::new(stdin)),
            state: Arc::new(Mutex::new(PipelineState::Starting)),
            probe: Arc::new(ActivityProbe::new()),
            inactive: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            exit_code: Arc::new(Mutex::new(None)),
            stderr_tail: Arc::new(Mutex::new(VecDeque::new())),
            monitor: Mutex::new(None),
            generation: 1,
        }
    }

    #[tokio::test]
    async fn terminate_mata_y_marca_terminado() {
        let handle = handle_for(Command::new("sleep").arg("30"));
        assert_eq!(handle.state(), PipelineState::Starting);

        handle.terminate(Duration::from_millis(200)).await;

        assert_eq!(handle.state(), PipelineState::Terminated);
        assert!(handle.child.lock().is_none());
    }

    #[tokio::test]
    async fn terminate_es_idempotente() {
        let handle = handle_for(Command::new("sleep").arg("30"));
        handle.terminate(Duration::from_millis(100)).await;
        // Segunda llamada sobre un pipeline ya terminado: no-op
        handle.terminate(Duration::from_millis(100)).await;
        assert_eq!(handle.state(), PipelineState::Terminated);
    }

    #[tokio::test]
    async fn proceso_que_cierra_solo_no_cuenta_como_fallo() {
        let handle = handle_for(&mut Command::new("true"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.terminate(Duration::from_millis(500)).await;
        assert!(handle.failure().is_none());
    }

    #[tokio::test]
    async fn reemplazo_termina_el_anterior_antes_de_arrancar() {
        // Orden de arranque: el pipeline viejo se termina por completo
        // antes de crear el nuevo, así nunca hay dos procesos vivos
        let viejo = handle_for(Command::new("sleep").arg("30"));
        viejo.terminate(Duration::from_millis(200)).await;
        assert_eq!(viejo.state(), PipelineState::Terminated);
        assert!(viejo.child.lock().is_none());

        let nuevo = handle_for(Command::new("sleep").arg("30"));
        assert_eq!(nuevo.state(), PipelineState::Starting);
        assert!(nuevo.child.lock().is_some());

        nuevo.terminate(Duration::from_millis(200)).await;
    }

    #[test]
    fn sonda_reporta_inactividad() {
        let probe = ActivityProbe::new();
        probe.touch();
        std::thread::sleep(Duration::from_millis(30));
        assert!(probe.idle_for() >= Duration::from_millis(20));
        probe.touch();
        assert!(probe.idle_for() < Duration::from_millis(20));
    }
}
