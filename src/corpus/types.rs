// Corpus types - Normalized note timeline for one source file
// Everything downstream (bars, selection, composer) reads these, never raw MIDI

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default tempo when a file carries no Set Tempo event (120 BPM)
pub const DEFAULT_US_PER_BEAT: u32 = 500_000;

/// General MIDI percussion channel (channel 10, 0-indexed = 9)
pub const DRUM_CHANNEL: u8 = 9;

/// A resolved note with absolute tick positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch (0-127)
    pub pitch: u8,

    /// Note-on velocity (1-127)
    pub velocity: u8,

    /// MIDI channel (0-15)
    pub channel: u8,

    /// Absolute start tick
    pub start_tick: u64,

    /// Absolute end tick (exclusive)
    pub end_tick: u64,
}

impl NoteEvent {
    pub fn duration_ticks(&self) -> u64 {
        self.end_tick.saturating_sub(self.start_tick)
    }

    /// True when the note is sounding on both sides of `tick`
    pub fn spans(&self, tick: u64) -> bool {
        self.start_tick < tick && tick < self.end_tick
    }

    /// True when the note intersects the half-open range `[start, end)`
    ///
    /// Zero-length notes count as overlapping the range holding their start tick.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        if self.start_tick == self.end_tick {
            return self.start_tick >= start && self.start_tick < end;
        }
        self.start_tick < end && self.end_tick > start
    }
}

/// One entry of a tempo map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoChange {
    /// Absolute tick where the tempo takes effect
    pub tick: u64,

    /// Microseconds per quarter note
    pub us_per_beat: u32,
}

impl TempoChange {
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / self.us_per_beat as f64
    }
}

/// Musical time signature as written in the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar
    pub numerator: u8,

    /// Note value that gets one beat (4 = quarter, 8 = eighth)
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// Length of one bar in quarter notes (6/8 -> 3.0, 3/4 -> 3.0)
    pub fn quarter_notes_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator.max(1) as f64
    }

    /// Length of one bar in ticks, never less than one tick
    pub fn bar_ticks(&self, ticks_per_beat: u16) -> u64 {
        let den = self.denominator.max(1) as u64;
        let scaled = ticks_per_beat as u64 * self.numerator as u64 * 4;
        // Round to nearest for denominators that don't divide evenly
        ((scaled + den / 2) / den).max(1)
    }

    /// Denominator as the power of two used by the Time Signature meta event
    pub fn denominator_pow(&self) -> u8 {
        self.denominator.max(1).trailing_zeros() as u8
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::new(4, 4)
    }
}

/// Parsed, immutable timeline of one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTimeline {
    /// Identifier of the source (its file name inside the corpus)
    pub file_id: String,

    /// Note arena, sorted by start tick then pitch
    pub notes: Vec<NoteEvent>,

    /// Tempo map, sorted by tick, always starting at tick 0
    pub tempo_map: Vec<TempoChange>,

    /// Pulses per quarter note
    pub ticks_per_beat: u16,

    /// First time signature in the file (4/4 if absent)
    pub time_signature: TimeSignature,

    /// First program change seen on each channel
    pub programs: BTreeMap<u8, u8>,

    /// Last tick of the timeline (end of the longest track or last note-off)
    pub end_tick: u64,
}

impl SourceTimeline {
    /// Tempo in effect at tick 0
    pub fn initial_tempo(&self) -> u32 {
        self.tempo_map
            .first()
            .map(|t| t.us_per_beat)
            .unwrap_or(DEFAULT_US_PER_BEAT)
    }

    pub fn bar_ticks(&self) -> u64 {
        self.time_signature.bar_ticks(self.ticks_per_beat)
    }

    /// Program for a channel, falling back to Acoustic Grand Piano
    pub fn program_for(&self, channel: u8) -> u8 {
        self.programs.get(&channel).copied().unwrap_or(0)
    }

    pub fn note(&self, id: usize) -> Option<&NoteEvent> {
        self.notes.get(id)
    }
}
