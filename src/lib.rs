// Dicebars - Dice-driven bar splicing over a MIDI corpus
// Module declarations

pub mod bars;
pub mod commands;
pub mod composer;
pub mod config;
pub mod corpus;
pub mod pipeline;
pub mod selection;

pub use commands::{
    compose, compose_to_file, load_corpus, new_session, new_session_from_config, rescan_corpus, spin, undo,
    CommandError, CommandResult,
};
pub use composer::{Composition, MidiExportOptions, OverhangPolicy};
pub use config::EngineConfig;
pub use corpus::Corpus;
pub use selection::{GameSession, Pick, SelectionMode, SessionState};
