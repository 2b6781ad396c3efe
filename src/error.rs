use thiserror::Error;

/// Taxonomía de errores del bot.
///
/// Los errores de entrada se devuelven tal cual al usuario, los transitorios
/// se reintentan antes de llegar aquí, y los fatales llevan una sugerencia
/// accionable (ver [`MusicError::suggestion`]).
#[derive(Debug, Error)]
pub enum MusicError {
    // Errores de entrada - sin reintento
    #[error("URL inválida: {0}")]
    InvalidUrl(String),
    #[error("Debes estar en un canal de voz para usar este comando")]
    NotInVoiceChannel,
    #[error("Índice fuera de rango: {0}")]
    IndexOutOfRange(usize),
    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    // Errores del extractor
    #[error("El video no está disponible: {0}")]
    Unavailable(String),
    #[error("Error de red durante la extracción: {0}")]
    Network(String),
    #[error("La extracción excedió el tiempo límite")]
    ExtractionTimeout,
    #[error("yt-dlp no está instalado o no se encuentra en el PATH")]
    ExtractorMissing,

    // Errores del pipeline
    #[error("ffmpeg no está instalado o no se encuentra en el PATH")]
    TranscoderMissing,
    #[error("La conexión de voz no estuvo lista a tiempo")]
    ConnectionTimeout,
    #[error("El proceso de transcodificación dejó de producir audio")]
    ProcessInactive,
    #[error("No se pudo crear el recurso de audio: {0}")]
    ResourceCreation(String),

    // Errores de voz
    #[error("No se pudo conectar al canal de voz: {0}")]
    VoiceJoin(String),

    // Errores de estado del reproductor
    #[error("No hay nada reproduciéndose")]
    NothingPlaying,
    #[error("La reproducción no está pausada")]
    NotPaused,
    #[error("La reproducción ya está pausada")]
    AlreadyPaused,
    #[error("La cola está vacía")]
    EmptyQueue,
    #[error("No hay canción siguiente")]
    NoNextTrack,
    #[error("No hay canción anterior")]
    NoPreviousTrack,

    // Búsqueda
    #[error("Sin resultados para: {0}")]
    NoResults(String),

    #[error("Error interno: {0}")]
    Internal(String),
}

impl MusicError {
    /// Sugerencia accionable para el usuario, categorizada por firma del
    /// error. Es un triaje por coincidencia de palabras clave, no una
    /// taxonomía exhaustiva.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ExtractorMissing => {
                Some("Instala yt-dlp con `pip install yt-dlp` y reinicia el bot")
            }
            Self::TranscoderMissing => {
                Some("Instala ffmpeg con `sudo apt install ffmpeg` y reinicia el bot")
            }
            Self::Network(msg) | Self::VoiceJoin(msg) | Self::Unavailable(msg) => {
                classify_suggestion(msg)
            }
            Self::ExtractionTimeout | Self::ConnectionTimeout => {
                Some("Parece un problema de red temporal, intenta de nuevo en unos segundos")
            }
            Self::ProcessInactive => {
                Some("El stream se quedó sin datos, intenta reproducir el video de nuevo")
            }
            Self::NotInVoiceChannel => Some("Únete a un canal de voz y vuelve a intentarlo"),
            Self::InvalidUrl(_) => {
                Some("Usa un enlace de video de Bilibili, por ejemplo https://www.bilibili.com/video/BV...")
            }
            _ => None,
        }
    }
}

/// Triaje por palabras clave sobre el texto de un error externo.
fn classify_suggestion(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();

    if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
        Some("Error de certificado: verifica la hora del sistema y los certificados CA")
    } else if lower.contains("timed out") || lower.contains("timeout") {
        Some("Parece un problema de red temporal, intenta de nuevo en unos segundos")
    } else if lower.contains("not exist")
        || lower.contains("404")
        || lower.contains("unavailable")
        || lower.contains("稿件不可见")
    {
        Some("El video fue borrado o es privado, prueba con otro enlace")
    } else if lower.contains("permission") || lower.contains("missing access") {
        Some("Verifica que el bot tenga permisos de Conectar y Hablar en el canal de voz")
    } else {
        None
    }
}

/// Clasifica la salida de error de una herramienta externa (yt-dlp) en una
/// variante tipada. Coincidencia de palabras clave sobre stderr.
pub fn classify_extractor_error(stderr: &str) -> MusicError {
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        MusicError::InvalidUrl(first_line(stderr))
    } else if lower.contains("timed out") || lower.contains("timeout") {
        MusicError::Network(first_line(stderr))
    } else if lower.contains("certificate") || lower.contains("ssl") {
        MusicError::Network(first_line(stderr))
    } else if lower.contains("unable to download")
        || lower.contains("not exist")
        || lower.contains("unavailable")
        || lower.contains("private")
        || lower.contains("404")
    {
        MusicError::Unavailable(first_line(stderr))
    } else if lower.contains("connection") || lower.contains("network") {
        MusicError::Network(first_line(stderr))
    } else {
        MusicError::Unavailable(first_line(stderr))
    }
}

/// Un error transitorio se reintenta con backoff lineal; el resto se
/// propaga de inmediato.
pub fn is_transient(error: &MusicError) -> bool {
    matches!(
        error,
        MusicError::Network(_) | MusicError::ExtractionTimeout
    )
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("error desconocido")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clasifica_video_no_disponible() {
        let err = classify_extractor_error("ERROR: [BiliBili] Video unavailable");
        assert!(matches!(err, MusicError::Unavailable(_)));
    }

    #[test]
    fn clasifica_timeout_como_red() {
        let err = classify_extractor_error("ERROR: Connection timed out after 30s");
        assert!(matches!(err, MusicError::Network(_)));
        assert!(is_transient(&err));
    }

    #[test]
    fn herramienta_faltante_sugiere_instalacion() {
        let suggestion = MusicError::ExtractorMissing.suggestion();
        assert_eq!(
            suggestion,
            Some("Instala yt-dlp con `pip install yt-dlp` y reinicia el bot")
        );
    }

    #[test]
    fn error_fatal_sin_sugerencia() {
        assert_eq!(MusicError::Internal("x".into()).suggestion(), None);
    }
}
