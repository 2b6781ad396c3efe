use rand::seq::SliceRandom;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::MusicError;

use super::{BILIBILI_REFERER, BROWSER_USER_AGENT};

/// Cliente para la API de búsqueda web de Bilibili.
///
/// Alimenta el auto-playlist por palabra clave: busca candidatos, filtra por
/// calidad (vistas o tasa de likes) y muestrea al azar evitando lo ya
/// reproducido recientemente en la guild.
pub struct SearchClient {
    client: reqwest::Client,
    em_tags: Regex,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    code: i64,
    message: Option<String>,
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    result: Option<Vec<SearchVideo>>,
}

#[derive(Debug, Deserialize)]
struct SearchVideo {
    bvid: String,
    title: String,
    author: String,
    #[serde(default)]
    play: u64,
    #[serde(default)]
    like: u64,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    pic: String,
}

/// Un candidato de búsqueda ya saneado
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub author: String,
    pub views: u64,
    pub likes: u64,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub url: String,
}

impl SearchResult {
    /// Predicado de calidad: suficientes vistas o buena tasa de likes
    pub fn is_quality(&self) -> bool {
        if self.views > 10_000 {
            return true;
        }
        self.views > 0 && (self.likes as f64 / self.views as f64) > 0.05
    }
}

impl SearchClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            // La API devuelve títulos con resaltado <em class="keyword">
            em_tags: Regex::new(r"</?em[^>]*>").expect("patrón em inválido"),
        }
    }

    /// Busca videos por palabra clave, paginado.
    pub async fn search(
        &self,
        keyword: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<SearchResult>, MusicError> {
        info!("🔍 Buscando en Bilibili: {}", keyword);

        let response = self
            .client
            .get("https://api.bilibili.com/x/web-interface/search/type")
            .header("Referer", BILIBILI_REFERER)
            .query(&[
                ("search_type", "video"),
                ("keyword", keyword),
                ("page", &page.to_string()),
                ("page_size", &page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| MusicError::Network(e.to_string()))?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| MusicError::Network(format!("respuesta de búsqueda inválida: {}", e)))?;

        if body.code != 0 {
            let message = body.message.unwrap_or_else(|| "sin detalle".to_string());
            warn!("⚠️ API de búsqueda devolvió código {}: {}", body.code, message);
            return Err(MusicError::Network(format!(
                "búsqueda falló (código {}): {}",
                body.code, message
            )));
        }

        let videos = body.data.and_then(|d| d.result).unwrap_or_default();
        if videos.is_empty() {
            return Err(MusicError::NoResults(keyword.to_string()));
        }

        let results: Vec<SearchResult> = videos
            .into_iter()
            .map(|v| self.sanitize(v))
            .collect();

        info!("🔍 Encontrados {} resultados para: {}", results.len(), keyword);
        Ok(results)
    }

    fn sanitize(&self, video: SearchVideo) -> SearchResult {
        let title = self.em_tags.replace_all(&video.title, "").to_string();
        let thumbnail = if video.pic.is_empty() {
            None
        } else if video.pic.starts_with("//") {
            Some(format!("https:{}", video.pic))
        } else {
            Some(video.pic)
        };

        SearchResult {
            url: format!("https://www.bilibili.com/video/{}", video.bvid),
            id: video.bvid,
            title,
            author: video.author,
            views: video.play,
            likes: video.like,
            duration: parse_duration(&video.duration),
            thumbnail,
        }
    }
}

impl Default for SearchClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtra candidatos por el predicado de calidad, descarta los ya
/// reproducidos recientemente y muestrea `count` al azar.
pub fn pick_candidates(
    results: Vec<SearchResult>,
    recent: &[String],
    count: usize,
) -> Vec<SearchResult> {
    let fresh: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| r.is_quality())
        .filter(|r| !recent.contains(&r.id))
        .collect();

    let mut rng = rand::thread_rng();
    fresh
        .choose_multiple(&mut rng, count)
        .cloned()
        .collect()
}

/// Parsea duraciones "mm:ss" o "hh:mm:ss" de la API de búsqueda
fn parse_duration(raw: &str) -> Option<Duration> {
    let parts: Vec<&str> = raw.split(':').collect();
    let mut seconds: u64 = 0;
    for part in &parts {
        seconds = seconds * 60 + part.trim().parse::<u64>().ok()?;
    }
    if parts.is_empty() || seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(id: &str, views: u64, likes: u64) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            title: format!("video {}", id),
            author: "up".to_string(),
            views,
            likes,
            duration: Some(Duration::from_secs(180)),
            thumbnail: None,
            url: format!("https://www.bilibili.com/video/{}", id),
        }
    }

    #[test]
    fn parsea_duracion_mm_ss() {
        assert_eq!(parse_duration("3:25"), Some(Duration::from_secs(205)));
        assert_eq!(parse_duration("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn predicado_de_calidad() {
        assert!(result("a", 50_000, 0).is_quality());
        assert!(result("b", 1_000, 100).is_quality()); // 10% de likes
        assert!(!result("c", 1_000, 10).is_quality()); // 1% de likes, pocas vistas
        assert!(!result("d", 0, 0).is_quality());
    }

    #[test]
    fn descarta_reproducidos_recientemente() {
        let results = vec![
            result("a", 50_000, 0),
            result("b", 50_000, 0),
            result("c", 50_000, 0),
        ];
        let recent = vec!["a".to_string(), "b".to_string()];
        let picked = pick_candidates(results, &recent, 5);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "c");
    }

    #[test]
    fn muestrea_como_maximo_count() {
        let results = (0..10).map(|i| result(&format!("v{}", i), 50_000, 0)).collect();
        let picked = pick_candidates(results, &[], 3);
        assert_eq!(picked.len(), 3);
    }
}
