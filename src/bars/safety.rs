// Cut Safety - Decide which bar lines can be spliced without hanging notes
// A boundary is clean when no note sounds across it

use serde::{Deserialize, Serialize};

use super::indexer::BarIndex;
use crate::corpus::SourceTimeline;

/// Cleanliness class of a bar, derived from its two boundary flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyClass {
    /// Both boundaries clean - preferred for splicing
    FullyClean,

    /// Clean start, a note rings past the end
    CleanStartOnly,

    /// A note rings in from before the start, clean end
    CleanEndOnly,

    /// Notes cross both boundaries
    Dirty,
}

impl SafetyClass {
    pub fn from_flags(clean_start: bool, clean_end: bool) -> Self {
        match (clean_start, clean_end) {
            (true, true) => SafetyClass::FullyClean,
            (true, false) => SafetyClass::CleanStartOnly,
            (false, true) => SafetyClass::CleanEndOnly,
            (false, false) => SafetyClass::Dirty,
        }
    }

    /// Safety score in [0.0, 1.0]: fraction of clean boundaries
    pub fn score(&self) -> f64 {
        match self {
            SafetyClass::FullyClean => 1.0,
            SafetyClass::CleanStartOnly | SafetyClass::CleanEndOnly => 0.5,
            SafetyClass::Dirty => 0.0,
        }
    }

    /// Usable, but splicing it may leave an audible seam
    pub fn is_splice_risk(&self) -> bool {
        *self != SafetyClass::FullyClean
    }
}

/// Ids of the notes (out of `note_ids`) sounding across `boundary`
pub fn crossing_notes<'a>(
    timeline: &'a SourceTimeline,
    note_ids: &'a [usize],
    boundary: u64,
) -> impl Iterator<Item = usize> + 'a {
    note_ids
        .iter()
        .copied()
        .filter(move |&id| timeline.note(id).map_or(false, |n| n.spans(boundary)))
}

/// True when none of the given notes sounds across `boundary`
pub fn is_clean_boundary(timeline: &SourceTimeline, note_ids: &[usize], boundary: u64) -> bool {
    crossing_notes(timeline, note_ids, boundary).next().is_none()
}

/// Per-file cleanliness summary, used for logging and diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub fully_clean: usize,
    pub clean_start_only: usize,
    pub clean_end_only: usize,
    pub dirty: usize,

    /// Whether a trailing partial bar was dropped
    pub partial_tail: bool,
}

impl SafetyReport {
    pub fn total(&self) -> usize {
        self.fully_clean + self.clean_start_only + self.clean_end_only + self.dirty
    }

    /// Mean safety score over all eligible bars (0.0 for an empty file)
    pub fn mean_score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let half = (self.clean_start_only + self.clean_end_only) as f64 * 0.5;
        (self.fully_clean as f64 + half) / total as f64
    }
}

/// Count the safety classes of every eligible bar
pub fn summarize(index: &BarIndex) -> SafetyReport {
    let mut report = SafetyReport {
        partial_tail: index.tail.is_some(),
        ..Default::default()
    };

    for bar in index.eligible() {
        match bar.safety() {
            SafetyClass::FullyClean => report.fully_clean += 1,
            SafetyClass::CleanStartOnly => report.clean_start_only += 1,
            SafetyClass::CleanEndOnly => report.clean_end_only += 1,
            SafetyClass::Dirty => report.dirty += 1,
        }
    }

    report
}
