// Game Session - One round of spins over a shared corpus
// AwaitingSpin -> (n spins) -> ReadyToCompose, with undo and reset

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::dice::{DiceRoll, DiceSpec, SpinCount};
use super::policy::{draw, PolicyTable, SelectionStrategy};
use crate::corpus::Corpus;
use crate::pipeline::{JournalEntry, JournalEvent, JournalWriter};

/// Errors raised by spins and session setup
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("No eligible bars in the corpus")]
    NoEligibleBars,

    #[error("Forced total {value} is outside the dice range {min}..={max}")]
    InvalidForcedTotal { value: u32, min: u32, max: u32 },

    #[error("All {spins} spins already taken; compose or reset first")]
    SessionComplete { spins: u8 },

    #[error("Spin count must be 3 or 4, got {0}")]
    InvalidSpinCount(u8),

    #[error("Unknown mode '{0}' (expected dice, chaos or medley)")]
    UnknownMode(String),
}

pub type SelectionResult<T> = Result<T, SelectionError>;

/// How bars are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Roll picks a file and a cleanliness bias
    Dice,

    /// Uniform over every eligible bar; rolls are only shown
    Chaos,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Dice => "dice",
            SelectionMode::Chaos => "chaos",
        }
    }
}

impl FromStr for SelectionMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dice" => Ok(SelectionMode::Dice),
            "chaos" | "medley" => Ok(SelectionMode::Chaos),
            other => Err(SelectionError::UnknownMode(other.to_string())),
        }
    }
}

/// One selected bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub file_id: String,
    pub bar_index: usize,

    /// Dice total (or forced total) that produced this pick
    pub roll_value: u32,

    /// Individual die faces, for display
    pub faces: Vec<u8>,

    /// Whether `roll_value` was supplied instead of rolled
    pub forced: bool,
}

/// Where the session is in its round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingSpin { remaining: u8 },
    ReadyToCompose,
}

/// A round of spins
///
/// Reads bars from a shared `Arc<Corpus>`; never mutates it. With a seed,
/// spin `k` is a pure function of (seed, k), so a round can be replayed exactly.
#[derive(Debug, Clone)]
pub struct GameSession {
    id: Uuid,
    corpus: Arc<Corpus>,
    spins_total: SpinCount,
    mode: SelectionMode,
    seed: u64,
    seeded: bool,
    policy: PolicyTable,
    picks: Vec<Pick>,
    forced_total: Option<u32>,
    journal: Option<JournalWriter>,
}

impl GameSession {
    /// Start a session; without a seed one is drawn from entropy (see `seed()`)
    pub fn new(corpus: Arc<Corpus>, spins_total: SpinCount, mode: SelectionMode, seed: Option<u64>) -> Self {
        let session = GameSession {
            id: Uuid::new_v4(),
            corpus,
            spins_total,
            mode,
            seed: seed.unwrap_or_else(|| rand::thread_rng().gen()),
            seeded: seed.is_some(),
            policy: PolicyTable::default(),
            picks: Vec::new(),
            forced_total: None,
            journal: None,
        };

        log::info!(
            "Session {} started: {} spins, {} mode, seed {}{}",
            session.id,
            spins_total.get(),
            mode.as_str(),
            session.seed,
            if session.seeded { "" } else { " (random)" }
        );

        session
    }

    /// Replace the roll-to-strategy table
    pub fn with_policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// Append every session event to a JSONL journal
    pub fn with_journal(mut self, journal: JournalWriter) -> Self {
        self.journal = Some(journal);
        self.record(
            JournalEvent::SessionStarted,
            format!(
                "New game: {} spins, {} mode, seed {}",
                self.spins_total.get(),
                self.mode.as_str(),
                self.seed
            ),
            None,
        );
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn spins_total(&self) -> SpinCount {
        self.spins_total
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Seed in use (supplied or generated)
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn dice(&self) -> DiceSpec {
        self.spins_total.dice()
    }

    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    pub fn pending_forced_total(&self) -> Option<u32> {
        self.forced_total
    }

    pub fn state(&self) -> SessionState {
        let remaining = self.spins_total.get().saturating_sub(self.picks.len() as u8);
        if remaining == 0 {
            SessionState::ReadyToCompose
        } else {
            SessionState::AwaitingSpin { remaining }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == SessionState::ReadyToCompose
    }

    /// Arm a forced total for the next spin only
    ///
    /// # Errors
    /// `InvalidForcedTotal` when the dice can't produce `total`; nothing changes.
    pub fn force_next(&mut self, total: u32) -> SelectionResult<()> {
        self.dice().validate(total)?;
        self.forced_total = Some(total);
        Ok(())
    }

    /// Take one spin
    ///
    /// Uses the forced total if one is given or armed, otherwise rolls the dice.
    /// In dice mode the roll picks the strategy; in chaos mode every eligible
    /// bar is equally likely.
    ///
    /// # Errors
    /// `SessionComplete` after the last spin, `InvalidForcedTotal` for an
    /// impossible forced total, `NoEligibleBars` when the corpus has none.
    /// On error the session is left unchanged.
    pub fn spin(&mut self, forced_total: Option<u32>) -> SelectionResult<Pick> {
        if self.is_complete() {
            return Err(SelectionError::SessionComplete {
                spins: self.spins_total.get(),
            });
        }

        let dice = self.dice();
        if let Some(total) = forced_total {
            dice.validate(total)?;
        }
        if self.corpus.total_eligible_bars() == 0 {
            return Err(SelectionError::NoEligibleBars);
        }

        let spin_index = self.picks.len();
        let mut rng = spin_rng(self.seed, spin_index as u64);

        let roll = match forced_total.or(self.forced_total) {
            Some(total) => dice.forced(total)?,
            None => dice.roll(&mut rng),
        };

        let strategy = match self.mode {
            SelectionMode::Dice => {
                self.policy
                    .strategy_for(roll.total, dice, self.corpus.eligible_files().count())
            }
            SelectionMode::Chaos => SelectionStrategy::chaos(),
        };

        let bar = draw(&self.corpus, &strategy, &mut rng).ok_or(SelectionError::NoEligibleBars)?;
        let pick = Pick {
            file_id: bar.file_id.clone(),
            bar_index: bar.bar_index,
            roll_value: roll.total,
            faces: roll.faces.clone(),
            forced: roll.forced,
        };

        self.forced_total = None;
        self.picks.push(pick.clone());

        let message = format!(
            "Spin {}: {} -> {} bar {}{}",
            spin_index + 1,
            describe_roll(&roll),
            pick.file_id,
            pick.bar_index,
            if bar.is_fully_clean() { "" } else { " (splice risk)" }
        );
        log::info!("{}", message);
        self.record(JournalEvent::Spin, message, serde_json::to_value(&pick).ok());

        Ok(pick)
    }

    /// Remove the most recent pick; None (and no change) when there is none
    pub fn undo(&mut self) -> Option<Pick> {
        let removed = self.picks.pop()?;
        let message = format!(
            "Undo spin {} (removed {} from {} bar {})",
            self.picks.len() + 1,
            removed.roll_value,
            removed.file_id,
            removed.bar_index
        );
        log::info!("{}", message);
        self.record(JournalEvent::Undo, message, None);
        Some(removed)
    }

    /// Clear every pick and any pending forced total
    pub fn reset(&mut self) {
        self.picks.clear();
        self.forced_total = None;
        log::info!("Session {} reset", self.id);
        self.record(JournalEvent::Reset, "New round", None);
    }

    /// Write a journal entry if a journal is attached
    pub(crate) fn record(&self, event: JournalEvent, message: impl Into<String>, data: Option<serde_json::Value>) {
        if let Some(ref journal) = self.journal {
            let entry = JournalEntry::new(self.id, event, message);
            let entry = match data {
                Some(data) => entry.with_data(data),
                None => entry,
            };
            if let Err(e) = journal.write(&entry) {
                log::warn!("Failed to write journal {}: {}", journal.path().display(), e);
            }
        }
    }
}

/// Generator for one spin: the session seed on stream `spin_index`
fn spin_rng(seed: u64, spin_index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(spin_index);
    rng
}

/// "rolled 3+5+1 = 9" or "forced -> 7"
pub fn describe_roll(roll: &DiceRoll) -> String {
    if roll.forced {
        format!("forced -> {}", roll.total)
    } else {
        let faces: Vec<String> = roll.faces.iter().map(|f| f.to_string()).collect();
        format!("rolled {} = {}", faces.join("+"), roll.total)
    }
}
