//! Venue playback core: command interpretation, queue arbitration and the
//! state machine that turns validated events into new venue documents.

mod commands;
mod events;
pub mod queue;
mod state_machine;

pub use commands::{PlaybackCommand, PlaybackError};
pub use events::{event_types, PlayerEvent};
pub use state_machine::{apply_command, apply_player_event, Transition};
