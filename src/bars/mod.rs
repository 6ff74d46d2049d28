// Bars - Bar indexing and cut-safety classification
// Turns a parsed timeline into an immutable sequence of classified bars

pub mod indexer;
pub mod safety;

// Re-export main types
pub use indexer::{Bar, BarIndex, index_bars};
pub use safety::{SafetyClass, SafetyReport, crossing_notes, is_clean_boundary, summarize};
