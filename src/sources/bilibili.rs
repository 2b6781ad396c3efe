use regex::Regex;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    cache::TtlCache,
    config::Config,
    error::{classify_extractor_error, is_transient, MusicError},
};

use super::TrackMetadata;

/// Extractor de metadatos y URL de audio vía yt-dlp.
///
/// Trata a yt-dlp como una función async `extract(url) -> TrackMetadata` con
/// timeout acotado y reintentos lineales para fallos transitorios de red.
/// Los resultados se cachean ~30 minutos por BV id normalizado.
pub struct BilibiliExtractor {
    config: Arc<Config>,
    cache: TtlCache<String, TrackMetadata>,
    bv_pattern: Regex,
}

/// Payload JSON de `yt-dlp -j` (solo los campos que usamos)
#[derive(Debug, Deserialize)]
struct YtDlpVideo {
    id: String,
    title: String,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// URL directa del mejor stream de audio
    url: String,
}

impl BilibiliExtractor {
    pub fn new(config: Arc<Config>) -> Self {
        let cache = TtlCache::new(config.cache_capacity, config.cache_ttl());
        Self {
            config,
            cache,
            // BV ids: "BV" seguido de 10 caracteres alfanuméricos
            bv_pattern: Regex::new(r"(BV[0-9A-Za-z]{10})")
                .expect("patrón BV inválido"),
        }
    }

    /// Verifica que la URL apunte a Bilibili (incluye enlaces cortos b23.tv)
    pub fn is_bilibili_url(url: &str) -> bool {
        url.contains("bilibili.com") || url.contains("b23.tv")
    }

    /// Normaliza una URL de video a su clave de caché.
    ///
    /// Para URLs largas la clave es el BV id, así `/play` con y sin
    /// parámetros de tracking comparten entrada. Los enlaces cortos b23.tv
    /// se cachean por URL completa porque el BV id solo se conoce tras la
    /// redirección que resuelve yt-dlp.
    pub fn normalize(&self, raw: &str) -> Result<String, MusicError> {
        let parsed = Url::parse(raw).map_err(|_| MusicError::InvalidUrl(raw.to_string()))?;

        match parsed.host_str() {
            Some(host) if host.ends_with("bilibili.com") => self
                .bv_pattern
                .captures(parsed.path())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| MusicError::InvalidUrl(raw.to_string())),
            Some(host) if host.ends_with("b23.tv") => Ok(raw.to_string()),
            _ => Err(MusicError::InvalidUrl(raw.to_string())),
        }
    }

    /// Extrae metadatos y URL de stream para un video.
    ///
    /// Idempotente; los fallos transitorios de red se reintentan hasta
    /// `extract_retries` veces con backoff lineal.
    pub async fn extract(&self, url: &str) -> Result<TrackMetadata, MusicError> {
        let key = self.normalize(url)?;

        if let Some(cached) = self.cache.get(&key) {
            debug!("📦 Caché de extracción: hit para {}", key);
            return Ok(cached);
        }

        let mut last_error = MusicError::Internal("extracción sin intentos".to_string());

        for attempt in 0..=self.config.extract_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(attempt as u64);
                warn!(
                    "🔄 Reintentando extracción de {} (intento {}) en {:?}",
                    key,
                    attempt + 1,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            match self.run_ytdlp(url).await {
                Ok(meta) => {
                    info!(
                        "✅ Extraído: {} ({}) en intento {}",
                        meta.title,
                        meta.source_id,
                        attempt + 1
                    );
                    self.cache.insert(key, meta.clone());
                    return Ok(meta);
                }
                Err(e) if is_transient(&e) => {
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    /// Invoca yt-dlp con salida JSON de una línea y timeout acotado.
    async fn run_ytdlp(&self, url: &str) -> Result<TrackMetadata, MusicError> {
        let mut cmd = tokio::process::Command::new(&self.config.yt_dlp_path);
        cmd.args([
            "-j",
            "--no-playlist",
            "--no-warnings",
            "-f",
            "bestaudio/best",
            "--socket-timeout",
            "15",
            "--retries",
            "2",
        ]);
        cmd.arg(url);
        cmd.kill_on_drop(true);

        let started = std::time::Instant::now();
        let output = match timeout(self.config.extract_timeout(), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MusicError::ExtractorMissing);
            }
            Ok(Err(e)) => return Err(MusicError::Internal(format!("yt-dlp: {}", e))),
            Err(_) => {
                warn!("⏰ Extracción de {} excedió el tiempo límite", url);
                return Err(MusicError::ExtractionTimeout);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_extractor_error(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let video: YtDlpVideo = serde_json::from_str(stdout.trim())
            .map_err(|e| MusicError::Internal(format!("JSON de yt-dlp inválido: {}", e)))?;

        debug!(
            "🎬 yt-dlp resolvió {} en {}",
            video.id,
            humantime::format_duration(Duration::from_millis(
                started.elapsed().as_millis() as u64
            ))
        );

        let duration = video.duration.map(Duration::from_secs_f64);
        if let Some(d) = duration {
            if d.as_secs() > self.config.max_song_duration {
                return Err(MusicError::Unavailable(format!(
                    "el video dura {} y el máximo permitido es {}s",
                    humantime::format_duration(Duration::from_secs(d.as_secs())),
                    self.config.max_song_duration
                )));
            }
        }

        Ok(TrackMetadata {
            url: video
                .webpage_url
                .unwrap_or_else(|| format!("https://www.bilibili.com/video/{}", video.id)),
            source_id: video.id,
            title: video.title,
            uploader: video.uploader,
            duration,
            thumbnail: video.thumbnail,
            stream_url: video.url,
        })
    }

    /// Descarta las entradas de caché cuya URL de stream ya expiró
    pub fn purge_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Verifica que yt-dlp esté disponible en el PATH
    pub async fn verify_dependencies(&self) -> Result<(), MusicError> {
        let check = tokio::process::Command::new(&self.config.yt_dlp_path)
            .arg("--version")
            .output()
            .await;

        match check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
                Ok(())
            }
            _ => Err(MusicError::ExtractorMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extractor() -> BilibiliExtractor {
        BilibiliExtractor::new(Arc::new(Config::default()))
    }

    #[test]
    fn normaliza_url_larga_a_bv_id() {
        let e = extractor();
        let key = e
            .normalize("https://www.bilibili.com/video/BV1xx411c7mD?p=1&spm_id_from=333")
            .expect("URL válida");
        assert_eq!(key, "BV1xx411c7mD");
    }

    #[test]
    fn enlace_corto_se_cachea_por_url() {
        let e = extractor();
        let key = e.normalize("https://b23.tv/abc123").expect("URL válida");
        assert_eq!(key, "https://b23.tv/abc123");
    }

    #[test]
    fn rechaza_dominios_ajenos() {
        let e = extractor();
        assert!(matches!(
            e.normalize("https://example.com/video/BV1xx411c7mD"),
            Err(MusicError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rechaza_texto_que_no_es_url() {
        let e = extractor();
        assert!(e.normalize("no es una url").is_err());
    }

    #[test]
    fn detecta_urls_de_bilibili() {
        assert!(BilibiliExtractor::is_bilibili_url(
            "https://www.bilibili.com/video/BV1xx411c7mD"
        ));
        assert!(BilibiliExtractor::is_bilibili_url("https://b23.tv/xyz"));
        assert!(!BilibiliExtractor::is_bilibili_url(
            "https://youtube.com/watch?v=abc"
        ));
    }
}
