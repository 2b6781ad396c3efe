use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Herramientas externas
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,

    // Extracción
    pub extract_timeout_secs: u64,
    pub extract_retries: u32,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,

    // Pipeline
    pub connect_timeout_secs: u64,
    pub pipeline_warn_secs: u64,
    pub pipeline_kill_secs: u64,
    pub pipeline_grace_millis: u64,
    pub false_idle_retries: u8,

    // Conexión de voz
    pub voice_join_retries: u32,

    // Auto-playlist
    pub search_page_size: u32,
    pub autoplaylist_history: usize,

    // Límites
    pub max_song_duration: u64, // En segundos
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,

            // Herramientas externas
            yt_dlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),

            // Extracción
            extract_timeout_secs: std::env::var("EXTRACT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            extract_retries: std::env::var("EXTRACT_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string()) // 30 minutos
                .parse()?,
            cache_capacity: std::env::var("CACHE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,

            // Pipeline
            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            pipeline_warn_secs: std::env::var("PIPELINE_WARN_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            pipeline_kill_secs: std::env::var("PIPELINE_KILL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            pipeline_grace_millis: std::env::var("PIPELINE_GRACE_MILLIS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            false_idle_retries: std::env::var("FALSE_IDLE_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,

            // Conexión de voz
            voice_join_retries: std::env::var("VOICE_JOIN_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            // Auto-playlist
            search_page_size: std::env::var("SEARCH_PAGE_SIZE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            autoplaylist_history: std::env::var("AUTOPLAYLIST_HISTORY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,

            // Límites
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hora
                .parse()?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Performs sanity checks to catch common mistakes before the bot
    /// connects to Discord.
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.cache_capacity == 0 {
            anyhow::bail!("Cache capacity must be greater than 0");
        }

        if self.pipeline_warn_secs >= self.pipeline_kill_secs {
            anyhow::bail!(
                "Pipeline warn threshold ({}s) must be below the kill threshold ({}s)",
                self.pipeline_warn_secs,
                self.pipeline_kill_secs
            );
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        Ok(())
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pipeline_warn(&self) -> Duration {
        Duration::from_secs(self.pipeline_warn_secs)
    }

    pub fn pipeline_kill(&self) -> Duration {
        Duration::from_secs(self.pipeline_kill_secs)
    }

    pub fn pipeline_grace(&self) -> Duration {
        Duration::from_millis(self.pipeline_grace_millis)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, cola máx {}\n  \
            Extracción: timeout {}s, {} reintentos, caché {}s/{} entradas\n  \
            Pipeline: warn {}s, kill {}s, gracia {}ms, {} reintentos falso-idle",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.extract_timeout_secs,
            self.extract_retries,
            self.cache_ttl_secs,
            self.cache_capacity,
            self.pipeline_warn_secs,
            self.pipeline_kill_secs,
            self.pipeline_grace_millis,
            self.false_idle_retries,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 500,

            // Tool defaults
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),

            // Extraction defaults
            extract_timeout_secs: 30,
            extract_retries: 2,
            cache_ttl_secs: 1800,
            cache_capacity: 256,

            // Pipeline defaults
            connect_timeout_secs: 15,
            pipeline_warn_secs: 10,
            pipeline_kill_secs: 30,
            pipeline_grace_millis: 1000,
            false_idle_retries: 2,

            // Voice defaults
            voice_join_retries: 3,

            // Auto-playlist defaults
            search_page_size: 30,
            autoplaylist_history: 50,

            // Limit defaults
            max_song_duration: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_por_defecto_es_valida() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rechaza_umbral_de_warn_mayor_que_kill() {
        let config = Config {
            pipeline_warn_secs: 40,
            pipeline_kill_secs: 30,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rechaza_volumen_fuera_de_rango() {
        let config = Config {
            default_volume: 3.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
