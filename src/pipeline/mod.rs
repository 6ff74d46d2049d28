// Pipeline monitoring module
// Session journaling for the spin / undo / compose flow

pub mod journal;

pub use journal::{JournalEntry, JournalError, JournalEvent, JournalWriter, read_journal_file};
