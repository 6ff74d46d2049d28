// Bar Indexer - Partition a source timeline into fixed-length bars
// Bars reference notes by index into the timeline's note arena

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::safety::{is_clean_boundary, SafetyClass};
use crate::corpus::SourceTimeline;

/// One bar (measure) of a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Source file this bar was cut from
    pub file_id: String,

    /// Position of the bar within its source (0-indexed)
    pub bar_index: usize,

    /// First tick of the bar (inclusive)
    pub start_tick: u64,

    /// End tick of the bar (exclusive)
    pub end_tick: u64,

    /// Indices of every note overlapping the bar, in arena order.
    /// A note crossing a bar line appears in both neighbouring bars.
    pub note_ids: Vec<usize>,

    /// No note is sounding across the start boundary
    pub is_clean_start: bool,

    /// No note is sounding across the end boundary
    pub is_clean_end: bool,
}

impl Bar {
    pub fn length_ticks(&self) -> u64 {
        self.end_tick - self.start_tick
    }

    pub fn tick_range(&self) -> Range<u64> {
        self.start_tick..self.end_tick
    }

    pub fn is_fully_clean(&self) -> bool {
        self.is_clean_start && self.is_clean_end
    }

    pub fn safety(&self) -> SafetyClass {
        SafetyClass::from_flags(self.is_clean_start, self.is_clean_end)
    }
}

/// All bars of one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarIndex {
    /// Bar length in ticks derived from the time signature
    pub bar_ticks: u64,

    /// Complete bars, contiguous from tick 0
    pub bars: Vec<Bar>,

    /// Trailing partial bar, if the timeline doesn't end on a bar line.
    /// Never eligible for selection.
    pub tail: Option<Bar>,
}

impl BarIndex {
    /// Bars that may be picked (every complete bar)
    pub fn eligible(&self) -> &[Bar] {
        &self.bars
    }

    pub fn eligible_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get(&self, bar_index: usize) -> Option<&Bar> {
        self.bars.get(bar_index)
    }

    /// End of the last complete bar
    pub fn playable_end(&self) -> u64 {
        self.bars.last().map(|b| b.end_tick).unwrap_or(0)
    }
}

/// Split a timeline into bars and classify every bar line
///
/// Algorithm:
/// 1. bar_ticks = ticks_per_beat x quarter notes per bar
/// 2. Walk tick 0..end_tick in bar_ticks steps
/// 3. Attach each note to every bar its span intersects
/// 4. Mark each bar's start/end boundary clean when no attached note spans it
pub fn index_bars(timeline: &SourceTimeline) -> BarIndex {
    let bar_ticks = timeline.bar_ticks();
    let full_bars = (timeline.end_tick / bar_ticks) as usize;
    let has_tail = timeline.end_tick % bar_ticks != 0;
    let bar_count = full_bars + usize::from(has_tail);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); bar_count];
    for (id, note) in timeline.notes.iter().enumerate() {
        let first = (note.start_tick / bar_ticks) as usize;
        let last = if note.end_tick > note.start_tick {
            ((note.end_tick - 1) / bar_ticks) as usize
        } else {
            first
        };
        if first >= bar_count {
            continue;
        }
        for bar in members.iter_mut().take(last.min(bar_count - 1) + 1).skip(first) {
            bar.push(id);
        }
    }

    let mut bars: Vec<Bar> = members
        .into_iter()
        .enumerate()
        .map(|(bar_index, note_ids)| {
            let start_tick = bar_index as u64 * bar_ticks;
            let end_tick = (start_tick + bar_ticks).min(timeline.end_tick);
            Bar {
                file_id: timeline.file_id.clone(),
                bar_index,
                is_clean_start: is_clean_boundary(timeline, &note_ids, start_tick),
                is_clean_end: is_clean_boundary(timeline, &note_ids, end_tick),
                start_tick,
                end_tick,
                note_ids,
            }
        })
        .collect();

    let tail = if has_tail { bars.pop() } else { None };

    log::debug!(
        "{}: {} bars of {} ticks{}",
        timeline.file_id,
        bars.len(),
        bar_ticks,
        if tail.is_some() { " (+ partial tail)" } else { "" }
    );

    BarIndex {
        bar_ticks,
        bars,
        tail,
    }
}
