//! Motor de audio: cola indexada, pipeline de transcodificación,
//! reproductor por guild y bus de estado.

pub mod manager;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod state;

pub use manager::{Enqueued, PlayerManager};
pub use player::GuildPlayer;
pub use queue::{LoopMode, Track, TrackQueue};
pub use state::{PlayerState, StateBus};
