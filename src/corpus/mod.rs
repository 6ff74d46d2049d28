// Corpus - Source MIDI loading and the shared, read-only corpus cache
// Parsed timelines and their bar indexes are built once per file and reused by every session

pub mod types;
pub mod loader;
pub mod cache;

// Re-export main types
pub use types::{NoteEvent, SourceTimeline, TempoChange, TimeSignature, DEFAULT_US_PER_BEAT, DRUM_CHANNEL};
pub use loader::{CorpusError, CorpusResult, parse_timeline, read_timeline};
pub use cache::{Corpus, CorpusFile, RescanReport, discover_midi_files};
