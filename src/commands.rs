// Engine commands
// Flat entry points for front ends: load a corpus, run a session, compose

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::composer::{self, Composition, MidiExportOptions};
use crate::config::EngineConfig;
use crate::corpus::{Corpus, RescanReport};
use crate::pipeline::{JournalEvent, JournalWriter};
use crate::selection::{GameSession, Pick, SelectionMode, SpinCount};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

// ==================== CORPUS COMMANDS ====================

/// Load every MIDI file in `directory`
pub fn load_corpus(directory: &Path) -> CommandResult<Arc<Corpus>> {
    let corpus = Corpus::load(directory)?;
    Ok(Arc::new(corpus))
}

/// Rescan the corpus directory, re-parsing only files whose content changed
///
/// Returns a fresh handle; sessions holding the old one keep working against it.
pub fn rescan_corpus(corpus: &Arc<Corpus>) -> CommandResult<(Arc<Corpus>, RescanReport)> {
    let mut next = Corpus::clone(corpus);
    let report = next.rescan()?;

    log::info!(
        "Rescan: {} added, {} changed, {} removed, {} rejected, {} unchanged",
        report.added.len(),
        report.changed.len(),
        report.removed.len(),
        report.rejected.len(),
        report.unchanged
    );

    Ok((Arc::new(next), report))
}

// ==================== SESSION COMMANDS ====================

/// Start a round of `spins_total` (3 or 4) spins
pub fn new_session(
    corpus: &Arc<Corpus>,
    spins_total: u8,
    mode: SelectionMode,
    seed: Option<u64>,
) -> CommandResult<GameSession> {
    let spins = SpinCount::new(spins_total)?;
    Ok(GameSession::new(Arc::clone(corpus), spins, mode, seed))
}

/// Start a session using the configured policy table and journal
pub fn new_session_from_config(
    corpus: &Arc<Corpus>,
    config: &EngineConfig,
    mode: SelectionMode,
    seed: Option<u64>,
) -> CommandResult<GameSession> {
    let mut session = new_session(corpus, config.spins, mode, seed.or(config.seed))?
        .with_policy(config.policy.clone());

    if let Some(ref path) = config.journal_path {
        session = session.with_journal(JournalWriter::new(path.clone()));
    }

    Ok(session)
}

/// Take one spin, optionally with a forced total
pub fn spin(session: &mut GameSession, forced_total: Option<u32>) -> CommandResult<Pick> {
    Ok(session.spin(forced_total)?)
}

/// Remove the last pick; false when there was nothing to remove
pub fn undo(session: &mut GameSession) -> bool {
    session.undo().is_some()
}

// ==================== COMPOSE COMMANDS ====================

/// Compose a finished session into MIDI bytes
pub fn compose(session: &GameSession, corpus: &Corpus, options: &MidiExportOptions) -> CommandResult<Composition> {
    let composition = composer::compose_session(session, corpus, options)?;

    session.record(
        JournalEvent::Composed,
        format!(
            "Composed {} bars ({} ticks)",
            composition.bars.len(),
            composition.length_ticks()
        ),
        Some(serde_json::json!({
            "bars": composition.bars.len(),
            "length_ticks": composition.length_ticks(),
            "ticks_per_beat": composition.timeline.ticks_per_beat,
            "details": composition.log_lines,
        })),
    );

    Ok(composition)
}

/// Compose and write the result; returns the composition and the path written
pub fn compose_to_file(
    session: &GameSession,
    corpus: &Corpus,
    options: &MidiExportOptions,
    output: &Path,
) -> CommandResult<(Composition, PathBuf)> {
    let composition = compose(session, corpus, options)?;
    let path = composer::save_midi(output, &composition.bytes)?;

    log::info!("Wrote {} ({} bytes)", path.display(), composition.bytes.len());
    session.record(
        JournalEvent::Composed,
        format!("Saved {}", path.display()),
        Some(serde_json::json!({ "path": path.display().to_string() })),
    );

    Ok((composition, path))
}
