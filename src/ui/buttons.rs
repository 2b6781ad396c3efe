use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::state::PlayerState;

/// IDs de componente de los controles del reproductor
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const PREVIOUS: &str = "music_previous";
    pub const STOP: &str = "music_stop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const LOOP_MODE: &str = "music_loop";
    pub const QUEUE: &str = "music_queue";
    /// Prefijo de paginación; el sufijo es la página destino (0-based)
    pub const QUEUE_PAGE_PREFIX: &str = "queue_page:";
}

/// Filas de botones del panel de reproducción, habilitadas según el estado
pub fn create_control_rows(state: &PlayerState) -> Vec<CreateActionRow> {
    let play_pause = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(if state.is_paused { '▶' } else { '⏸' })
        .style(ButtonStyle::Primary)
        .disabled(!state.is_playing);

    let previous = CreateButton::new(button_ids::PREVIOUS)
        .emoji('⏮')
        .style(ButtonStyle::Secondary)
        .disabled(!state.has_previous);

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary)
        .disabled(!state.has_next);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger)
        .disabled(!state.is_playing);

    let row1 = CreateActionRow::Buttons(vec![previous, play_pause, skip, stop]);

    let shuffle = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .style(ButtonStyle::Secondary)
        .disabled(state.queue_len < 2);

    let loop_mode = CreateButton::new(button_ids::LOOP_MODE)
        .emoji('🔁')
        .label(state.loop_mode.label())
        .style(ButtonStyle::Secondary);

    let queue = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .label(format!("{}", state.queue_len))
        .style(ButtonStyle::Secondary);

    let row2 = CreateActionRow::Buttons(vec![shuffle, loop_mode, queue]);

    vec![row1, row2]
}

/// Controles de paginación para el embed de la cola. Cada botón lleva la
/// página destino en su custom id, así el handler no guarda estado.
pub fn create_pagination_row(page: usize, total_pages: usize) -> CreateActionRow {
    let previous = CreateButton::new(format!(
        "{}{}",
        button_ids::QUEUE_PAGE_PREFIX,
        page.saturating_sub(1)
    ))
    .emoji('◀')
    .style(ButtonStyle::Primary)
    .disabled(page == 0);

    let next = CreateButton::new(format!("{}{}", button_ids::QUEUE_PAGE_PREFIX, page + 1))
        .emoji('▶')
        .style(ButtonStyle::Primary)
        .disabled(page + 1 >= total_pages);

    CreateActionRow::Buttons(vec![previous, next])
}

/// Página destino codificada en un custom id de paginación, si lo es
pub fn parse_queue_page(custom_id: &str) -> Option<usize> {
    custom_id
        .strip_prefix(button_ids::QUEUE_PAGE_PREFIX)
        .and_then(|raw| raw.parse().ok())
}
