// Composer layout - Concatenate picked bars into one output timeline
// Bar i starts at the summed length of bars 0..i; tempo and meter come from the first pick

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::channels::ChannelPalette;
use super::midi::{write_timeline, MidiExportOptions, OverhangPolicy};
use crate::bars::{Bar, SafetyClass};
use crate::corpus::{Corpus, CorpusFile, NoteEvent, SourceTimeline, TempoChange};
use crate::selection::{describe_roll, DiceRoll, GameSession, Pick};

/// File id given to composed timelines
pub const COMPOSED_FILE_ID: &str = "composition";

/// Errors raised while composing
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Session has {have} of {need} picks; spin before composing")]
    Incomplete { have: usize, need: usize },

    #[error("Nothing to compose")]
    NoPicks,

    #[error("Pick refers to {file} bar {bar}, which is not in the corpus (reloaded?)")]
    StaleReference { file: String, bar: usize },

    #[error("{0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ComposeResult<T> = Result<T, ComposeError>;

/// Where a pick landed in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBar {
    pub file_id: String,
    pub bar_index: usize,
    pub roll_value: u32,
    pub output_start: u64,
    pub output_end: u64,
    pub safety: SafetyClass,
}

/// A finished piece
#[derive(Debug, Clone)]
pub struct Composition {
    /// Output timeline (single tempo, single time signature, remapped channels)
    pub timeline: SourceTimeline,

    pub bars: Vec<PlacedBar>,

    /// Standard MIDI file bytes
    pub bytes: Vec<u8>,

    /// One line per spin, e.g. "Spin 1: rolled 3+5+1 = 9 -> a.mid bar 4 (splice risk)"
    pub log_lines: Vec<String>,
}

impl Composition {
    /// Output length in ticks
    pub fn length_ticks(&self) -> u64 {
        self.timeline.end_tick
    }
}

/// Compose a finished session
///
/// # Errors
/// `Incomplete` unless every spin has been taken, `StaleReference` when a
/// pick no longer resolves against `corpus`.
pub fn compose_session(
    session: &GameSession,
    corpus: &Corpus,
    options: &MidiExportOptions,
) -> ComposeResult<Composition> {
    let need = session.spins_total().get() as usize;
    let have = session.picks().len();
    if have < need {
        return Err(ComposeError::Incomplete { have, need });
    }
    compose_picks(session.picks(), corpus, options)
}

/// Lay out `picks` back to back and serialize the result
///
/// Every pick is resolved before anything is written, so a stale pick never
/// yields a partial file.
pub fn compose_picks(picks: &[Pick], corpus: &Corpus, options: &MidiExportOptions) -> ComposeResult<Composition> {
    let resolved = resolve_picks(picks, corpus)?;
    let (first_file, _) = resolved.first().copied().ok_or(ComposeError::NoPicks)?;

    let source = &first_file.timeline;
    let out_tpb = options.ppq.filter(|&ppq| ppq > 0).unwrap_or(source.ticks_per_beat);
    let tempo = source.initial_tempo();
    let time_signature = source.time_signature;

    let mut palette = ChannelPalette::new(options.max_channels);
    let mut notes: Vec<NoteEvent> = Vec::new();
    let mut placed = Vec::with_capacity(resolved.len());
    let mut log_lines = Vec::with_capacity(resolved.len());
    let mut warned: HashSet<&str> = HashSet::new();
    let mut cursor = 0u64;

    for (spin, ((file, bar), pick)) in resolved.iter().zip(picks).enumerate() {
        let timeline = &file.timeline;

        if timeline.initial_tempo() != tempo || timeline.time_signature != time_signature {
            if warned.insert(file.file_id.as_str()) {
                log::warn!(
                    "{}: tempo {} / meter {}/{} differs from the first pick; using {} / {}/{}",
                    file.file_id,
                    timeline.initial_tempo(),
                    timeline.time_signature.numerator,
                    timeline.time_signature.denominator,
                    tempo,
                    time_signature.numerator,
                    time_signature.denominator
                );
            }
        }

        let scale = |ticks: u64| rescale(ticks, timeline.ticks_per_beat, out_tpb);
        let output_end = cursor + scale(bar.length_ticks()).max(1);

        for note in bar.note_ids.iter().filter_map(|&id| timeline.note(id)) {
            // Notes that began in an earlier bar stay behind
            if note.start_tick < bar.start_tick {
                continue;
            }

            let end = match options.overhang {
                OverhangPolicy::Clip => note.end_tick.min(bar.end_tick),
                OverhangPolicy::Keep => note.end_tick,
            };
            let mut start_tick = cursor + scale(note.start_tick - bar.start_tick);
            if options.overhang == OverhangPolicy::Clip {
                start_tick = start_tick.min(output_end - 1);
            }
            // Every note keeps at least one tick so its note-off can't precede its note-on
            let end_tick = (cursor + scale(end - bar.start_tick)).max(start_tick + 1);

            notes.push(NoteEvent {
                pitch: note.pitch,
                velocity: note.velocity,
                channel: palette.assign(note.channel, timeline.program_for(note.channel)),
                start_tick,
                end_tick,
            });
        }

        placed.push(PlacedBar {
            file_id: file.file_id.clone(),
            bar_index: bar.bar_index,
            roll_value: pick.roll_value,
            output_start: cursor,
            output_end,
            safety: bar.safety(),
        });
        log_lines.push(describe_pick(spin, pick, bar));
        cursor = output_end;
    }

    notes.sort_by_key(|n| (n.start_tick, n.channel, n.pitch));
    let end_tick = notes.iter().map(|n| n.end_tick).fold(cursor, u64::max);

    let programs: BTreeMap<u8, u8> = palette.programs();
    let timeline = SourceTimeline {
        file_id: COMPOSED_FILE_ID.to_string(),
        notes,
        tempo_map: vec![TempoChange {
            tick: 0,
            us_per_beat: tempo,
        }],
        ticks_per_beat: out_tpb,
        time_signature,
        programs,
        end_tick,
    };

    let bytes = write_timeline(&timeline, options)?;

    log::info!(
        "Composed {} bars: {} ticks at {} ppq, {} notes on {} channels",
        placed.len(),
        timeline.end_tick,
        out_tpb,
        timeline.notes.len(),
        palette.channel_count()
    );

    Ok(Composition {
        timeline,
        bars: placed,
        bytes,
        log_lines,
    })
}

fn resolve_picks<'a>(picks: &[Pick], corpus: &'a Corpus) -> ComposeResult<Vec<(&'a CorpusFile, &'a Bar)>> {
    picks
        .iter()
        .map(|pick| {
            let stale = || ComposeError::StaleReference {
                file: pick.file_id.clone(),
                bar: pick.bar_index,
            };
            let file = corpus.file(&pick.file_id).ok_or_else(stale)?;
            let bar = file.bars.get(pick.bar_index).ok_or_else(stale)?;
            Ok((file, bar))
        })
        .collect()
}

/// Convert a tick count between resolutions, rounding to nearest
fn rescale(ticks: u64, from_tpb: u16, to_tpb: u16) -> u64 {
    if from_tpb == to_tpb || from_tpb == 0 {
        return ticks;
    }
    let from = from_tpb as u64;
    (ticks * to_tpb as u64 + from / 2) / from
}

fn describe_pick(spin: usize, pick: &Pick, bar: &Bar) -> String {
    let roll = DiceRoll {
        faces: pick.faces.clone(),
        total: pick.roll_value,
        forced: pick.forced,
    };
    let risk = match bar.safety() {
        SafetyClass::FullyClean => "",
        SafetyClass::CleanStartOnly => " (rings out)",
        SafetyClass::CleanEndOnly => " (enters mid-note)",
        SafetyClass::Dirty => " (splice risk)",
    };
    format!(
        "Spin {}: {} -> {} bar {}{}",
        spin + 1,
        describe_roll(&roll),
        pick.file_id,
        pick.bar_index,
        risk
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{parse_timeline, TimeSignature, DRUM_CHANNEL};

    fn note(pitch: u8, channel: u8, start_tick: u64, end_tick: u64) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 90,
            channel,
            start_tick,
            end_tick,
        }
    }

    fn timeline(
        file_id: &str,
        tpb: u16,
        time_signature: TimeSignature,
        us_per_beat: u32,
        mut notes: Vec<NoteEvent>,
        programs: &[(u8, u8)],
        end_tick: u64,
    ) -> SourceTimeline {
        notes.sort_by_key(|n| (n.start_tick, n.channel, n.pitch));
        SourceTimeline {
            file_id: file_id.to_string(),
            notes,
            tempo_map: vec![TempoChange { tick: 0, us_per_beat }],
            ticks_per_beat: tpb,
            time_signature,
            programs: programs.iter().copied().collect(),
            end_tick,
        }
    }

    fn pick(file_id: &str, bar_index: usize) -> Pick {
        Pick {
            file_id: file_id.to_string(),
            bar_index,
            roll_value: 10,
            faces: vec![3, 3, 4],
            forced: false,
        }
    }

    /// a.mid: 4/4 @ 480, 4 bars, piano; bar 1 holds a note that rings into bar 2
    /// b.mid: 3/4 @ 96, 4 bars, strings on channel 3 plus drums
    fn corpus() -> Corpus {
        let a = timeline(
            "a.mid",
            480,
            TimeSignature::default(),
            500_000,
            vec![
                note(60, 0, 0, 480),
                note(62, 0, 1920, 2400),
                note(64, 0, 3600, 4200),
                note(65, 0, 5760, 6240),
            ],
            &[(0, 0)],
            7680,
        );
        let b = timeline(
            "b.mid",
            96,
            TimeSignature::new(3, 4),
            400_000,
            vec![
                note(50, 3, 0, 96),
                note(36, DRUM_CHANNEL, 0, 24),
                note(52, 3, 288, 384),
                note(53, 3, 576, 672),
                note(55, 3, 864, 960),
            ],
            &[(3, 48)],
            1152,
        );
        Corpus::from_timelines(vec![a, b])
    }

    #[test]
    fn test_length_is_sum_of_bars() {
        let corpus = corpus();
        let picks = vec![pick("a.mid", 0), pick("a.mid", 3), pick("a.mid", 2)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        assert_eq!(composition.length_ticks(), 3 * 1920);
        let starts: Vec<u64> = composition.bars.iter().map(|b| b.output_start).collect();
        assert_eq!(starts, vec![0, 1920, 3840]);
        assert_eq!(composition.log_lines.len(), 3);
    }

    #[test]
    fn test_notes_shift_with_their_bar() {
        let corpus = corpus();
        let picks = vec![pick("a.mid", 3), pick("a.mid", 1)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        let notes: Vec<(u8, u64, u64)> = composition
            .timeline
            .notes
            .iter()
            .map(|n| (n.pitch, n.start_tick, n.end_tick))
            .collect();
        // Bar 3 note at offset 0, then bar 1 notes shifted by one bar; 64 clipped at the bar line
        assert_eq!(notes, vec![(65, 0, 480), (62, 1920, 2400), (64, 3600, 3840)]);
    }

    #[test]
    fn test_keep_overhang_preserves_duration() {
        let corpus = corpus();
        let options = MidiExportOptions {
            overhang: OverhangPolicy::Keep,
            ..Default::default()
        };
        let composition = compose_picks(&[pick("a.mid", 1)], &corpus, &options).unwrap();

        let held = composition.timeline.notes.iter().find(|n| n.pitch == 64).unwrap();
        assert_eq!((held.start_tick, held.end_tick), (1680, 2280));
        assert_eq!(composition.timeline.end_tick, 2280);
    }

    #[test]
    fn test_notes_from_previous_bar_not_carried_in() {
        let corpus = corpus();
        let composition = compose_picks(&[pick("a.mid", 2)], &corpus, &MidiExportOptions::default()).unwrap();

        assert!(composition.timeline.notes.is_empty());
        assert_eq!(composition.length_ticks(), 1920);
    }

    #[test]
    fn test_first_pick_sets_tempo_meter_and_resolution() {
        let corpus = corpus();
        let picks = vec![pick("b.mid", 0), pick("a.mid", 0)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        let tl = &composition.timeline;
        assert_eq!(tl.ticks_per_beat, 96);
        assert_eq!(tl.initial_tempo(), 400_000);
        assert_eq!(tl.time_signature, TimeSignature::new(3, 4));
        // 288 ticks of 3/4 at 96, then a 4/4 bar at 480 rescaled to 96
        assert_eq!(tl.end_tick, 288 + 384);

        let piano = tl.notes.iter().find(|n| n.pitch == 60).unwrap();
        assert_eq!((piano.start_tick, piano.end_tick), (288, 384));
    }

    #[test]
    fn test_ppq_override_rescales_every_bar() {
        let corpus = corpus();
        let options = MidiExportOptions {
            ppq: Some(960),
            ..Default::default()
        };
        let picks = vec![pick("a.mid", 0), pick("b.mid", 1)];
        let composition = compose_picks(&picks, &corpus, &options).unwrap();

        assert_eq!(composition.timeline.ticks_per_beat, 960);
        assert_eq!(composition.length_ticks(), 3840 + 2880);
    }

    #[test]
    fn test_channels_remapped_to_palette() {
        let corpus = corpus();
        let picks = vec![pick("b.mid", 0), pick("a.mid", 0)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        let tl = &composition.timeline;
        let strings = tl.notes.iter().find(|n| n.pitch == 50).unwrap();
        let drums = tl.notes.iter().find(|n| n.pitch == 36).unwrap();
        let piano = tl.notes.iter().find(|n| n.pitch == 60).unwrap();

        assert_eq!(strings.channel, 0);
        assert_eq!(drums.channel, DRUM_CHANNEL);
        assert_eq!(piano.channel, 1);
        assert_eq!(tl.program_for(0), 48);
        assert_eq!(tl.program_for(1), 0);
    }

    #[test]
    fn test_stale_reference_fails() {
        let corpus = corpus();
        for bad in [pick("a.mid", 4), pick("gone.mid", 0)] {
            let picks = vec![pick("a.mid", 0), bad];
            assert!(matches!(
                compose_picks(&picks, &corpus, &MidiExportOptions::default()),
                Err(ComposeError::StaleReference { .. })
            ));
        }
    }

    #[test]
    fn test_short_notes_survive_downscaling() {
        // 96 ppq first pick, then a 960 ppq bar holding a 4-tick grace note
        // and a note on the last two ticks of the bar
        let coarse = timeline(
            "coarse.mid",
            96,
            TimeSignature::default(),
            500_000,
            vec![note(60, 0, 0, 96)],
            &[(0, 0)],
            384,
        );
        let fine = timeline(
            "fine.mid",
            960,
            TimeSignature::default(),
            500_000,
            vec![note(72, 0, 0, 4), note(74, 0, 3838, 3840)],
            &[(0, 0)],
            3840,
        );
        let corpus = Corpus::from_timelines(vec![coarse, fine]);
        let picks = vec![pick("coarse.mid", 0), pick("fine.mid", 0)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        assert_eq!(composition.length_ticks(), 768);
        for n in &composition.timeline.notes {
            assert!(n.end_tick > n.start_tick, "pitch {} has no length", n.pitch);
        }

        let parsed = parse_timeline("out.mid", &composition.bytes).unwrap();
        assert_eq!(parsed.end_tick, 768);
        let span = |pitch: u8| {
            let n = parsed.notes.iter().find(|n| n.pitch == pitch).unwrap();
            (n.start_tick, n.end_tick)
        };
        assert_eq!(span(72), (384, 385));
        assert_eq!(span(74), (767, 768));
    }

    #[test]
    fn test_empty_picks() {
        assert!(matches!(
            compose_picks(&[], &corpus(), &MidiExportOptions::default()),
            Err(ComposeError::NoPicks)
        ));
    }

    #[test]
    fn test_output_parses_back_to_same_length() {
        let corpus = corpus();
        let picks = vec![pick("a.mid", 0), pick("b.mid", 2), pick("a.mid", 1)];
        let composition = compose_picks(&picks, &corpus, &MidiExportOptions::default()).unwrap();

        let parsed = parse_timeline("out.mid", &composition.bytes).unwrap();
        assert_eq!(parsed.end_tick, composition.length_ticks());
        assert_eq!(parsed.notes.len(), composition.timeline.notes.len());
        assert_eq!(parsed.ticks_per_beat, 480);
    }

    #[test]
    fn test_log_lines_describe_spins() {
        let corpus = corpus();
        let mut forced = pick("a.mid", 1);
        forced.roll_value = 7;
        forced.forced = true;

        let composition = compose_picks(&[pick("a.mid", 0), forced], &corpus, &MidiExportOptions::default()).unwrap();
        assert_eq!(composition.log_lines[0], "Spin 1: rolled 3+3+4 = 10 -> a.mid bar 0");
        assert_eq!(composition.log_lines[1], "Spin 2: forced -> 7 -> a.mid bar 1 (rings out)");
    }
}
