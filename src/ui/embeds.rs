use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{manager::Enqueued, queue::Track, state::PlayerState, LoopMode},
    error::MusicError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Bili Music Bot";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(state: &PlayerState, elapsed: Option<Duration>) -> CreateEmbed {
    let Some(track) = &state.current else {
        return CreateEmbed::default()
            .title("💤 Nada en reproducción")
            .description("Usa `/play` para encolar algo")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    };

    let title = if state.is_paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎤 Uploader",
            track.uploader.as_deref().unwrap_or("Desconocido"),
            true,
        );

    match (elapsed, track.duration) {
        (Some(pos), Some(total)) => {
            embed = embed.field(
                "⏱️ Progreso",
                format!("{} / {}", format_duration(pos), format_duration(total)),
                true,
            );
        }
        (_, Some(total)) => {
            embed = embed.field("⏱️ Duración", format_duration(total), true);
        }
        _ => {
            embed = embed.field("⏱️ Duración", "🔴 En vivo", true);
        }
    }

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("🔁 Bucle", state.loop_mode.label(), true)
        .field(
            "📋 Cola",
            match state.current_index {
                Some(i) => format!("{} de {}", i + 1, state.queue_len),
                None => format!("{} canciones", state.queue_len),
            },
            true,
        );

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de confirmación de encolado
pub fn create_queued_embed(enqueued: &Enqueued) -> CreateEmbed {
    let title = if enqueued.started {
        "🎵 Reproduciendo"
    } else {
        "➕ Añadida a la cola"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", enqueued.track.title))
        .color(colors::INFO_BLUE)
        .field("📋 Posición", format!("#{}", enqueued.position + 1), true);

    if let Some(duration) = enqueued.track.duration {
        embed = embed.field("⏱️ Duración", format_duration(duration), true);
    }
    if let Some(uploader) = &enqueued.track.uploader {
        embed = embed.field("🎤 Uploader", uploader, true);
    }
    if let Some(thumbnail) = &enqueued.track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&enqueued.track.url)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Canciones mostradas por página de cola
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Embed de la cola, paginado
pub fn create_queue_embed(
    tracks: &[Track],
    current: Option<usize>,
    total_duration: Duration,
    page: usize,
) -> CreateEmbed {
    if tracks.is_empty() {
        return CreateEmbed::default()
            .title("📋 Cola de Reproducción")
            .description("La cola está vacía")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let total_pages = tracks.len().div_ceil(QUEUE_PAGE_SIZE);
    let page = page.min(total_pages.saturating_sub(1));
    let start = page * QUEUE_PAGE_SIZE;

    let mut lines = Vec::new();
    for (offset, track) in tracks.iter().skip(start).take(QUEUE_PAGE_SIZE).enumerate() {
        let index = start + offset;
        let marker = if current == Some(index) { "▶️" } else { "▫️" };
        let duration = track
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "??:??".to_string());
        lines.push(format!(
            "{} `{}` **{}** `[{}]`",
            marker,
            index + 1,
            truncate(&track.title, 45),
            duration
        ));
    }

    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(lines.join("\n"))
        .color(colors::MUSIC_PURPLE)
        .field("🎵 Total", format!("{} canciones", tracks.len()), true)
        .field("⏱️ Duración", format_duration(total_duration), true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • {}",
            page + 1,
            total_pages,
            STANDARD_FOOTER
        )))
}

/// Embed con el resultado de una auto-playlist
pub fn create_autoplaylist_embed(keyword: &str, tracks: &[Track]) -> CreateEmbed {
    let lines: Vec<String> = tracks
        .iter()
        .take(QUEUE_PAGE_SIZE)
        .map(|t| format!("▫️ **{}**", truncate(&t.title, 50)))
        .collect();

    CreateEmbed::default()
        .title("📻 Auto-playlist")
        .description(format!(
            "**{}** canciones para `{}`:\n\n{}",
            tracks.len(),
            keyword,
            lines.join("\n")
        ))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de error, con la sugerencia accionable si el triaje conoce una
pub fn create_error_embed(error: &MusicError) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("❌ Error")
        .description(error.to_string())
        .color(colors::ERROR_RED);

    if let Some(suggestion) = error.suggestion() {
        embed = embed.field("💡 Sugerencia", suggestion, false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de cambio de modo de bucle
pub fn create_loop_embed(mode: LoopMode) -> CreateEmbed {
    let description = match mode {
        LoopMode::Off => "El bucle está desactivado",
        LoopMode::Track => "Repitiendo la canción actual",
        LoopMode::Queue => "Repitiendo la cola completa",
    };
    CreateEmbed::default()
        .title(format!("🔁 Bucle: {}", mode.label()))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración como mm:ss o hh:mm:ss
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formato_de_duracion() {
        assert_eq!(format_duration(Duration::from_secs(45)), "0:45");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn truncado_respeta_caracteres_multibyte() {
        let title = "合唱曲メドレー歌ってみた全部入り";
        let cut = truncate(title, 5);
        assert!(cut.chars().count() <= 5);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate("corto", 45), "corto");
    }
}
