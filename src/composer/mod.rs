// Composer - Splice picked bars into one timeline and write it as a MIDI file

pub mod channels;
pub mod layout;
pub mod midi;

// Re-export main types
pub use channels::ChannelPalette;
pub use layout::{
    compose_picks, compose_session, ComposeError, ComposeResult, Composition, PlacedBar, COMPOSED_FILE_ID,
};
pub use midi::{normalize_output_path, save_midi, write_timeline, MidiExportOptions, OverhangPolicy};
