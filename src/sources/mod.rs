pub mod bilibili;
pub mod search;

pub use bilibili::BilibiliExtractor;
pub use search::SearchClient;

use std::time::Duration;

/// Metadatos resueltos de un video de Bilibili.
///
/// Es el resultado de la extracción: título, duración y una URL de stream de
/// audio lista para entregar al transcodificador. Inmutable una vez creado.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    /// Identificador del video (BV id)
    pub source_id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    /// URL de la página del video
    pub url: String,
    /// URL directa del stream de audio (expira, por eso la caché tiene TTL)
    pub stream_url: String,
}

/// User-Agent tipo navegador: el CDN de Bilibili rechaza clientes desnudos.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Referer obligatorio para las URLs de stream del CDN de Bilibili.
pub const BILIBILI_REFERER: &str = "https://www.bilibili.com/";
