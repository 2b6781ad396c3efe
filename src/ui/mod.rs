//! Capa de presentación: embeds y controles de botones.

pub mod buttons;
pub mod embeds;
