// MIDI Loader - Parse standard MIDI files into note timelines using midly
// Merges every track onto one absolute tick axis and pairs note-on/note-off

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::types::{NoteEvent, SourceTimeline, TempoChange, TimeSignature, DEFAULT_US_PER_BEAT};

/// Errors raised while loading source files or scanning a corpus directory
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("{file} uses SMPTE timecode; only metrical (ticks per beat) timing is supported")]
    UnsupportedTiming { file: String },

    #[error("No MIDI files found in {}", dir.display())]
    EmptyCorpus { dir: PathBuf },
}

pub type CorpusResult<T> = Result<T, CorpusError>;

/// Parse MIDI bytes into a `SourceTimeline`
///
/// Note-on with velocity 0 counts as note-off, and a second note-on for a
/// pitch/channel that is already sounding closes the first one. Notes still
/// open at the end of the stream are closed at the timeline's final tick.
///
/// # Errors
/// `Parse` when the bytes are not a MIDI file or contain no notes,
/// `UnsupportedTiming` for SMPTE-timed files.
pub fn parse_timeline(file_id: &str, bytes: &[u8]) -> CorpusResult<SourceTimeline> {
    let parse_error = |reason: String| CorpusError::Parse {
        file: file_id.to_string(),
        reason,
    };

    let smf = Smf::parse(bytes).map_err(|e| parse_error(e.to_string()))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => {
            return Err(CorpusError::UnsupportedTiming {
                file: file_id.to_string(),
            })
        }
    };
    if ticks_per_beat == 0 {
        return Err(parse_error("ticks per beat is zero".to_string()));
    }

    // Merge all tracks onto one axis; the stable sort keeps track order on ties
    let mut merged: Vec<(u64, TrackEventKind)> = Vec::new();
    let mut end_tick = 0u64;
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            merged.push((tick, event.kind));
        }
        end_tick = end_tick.max(tick);
    }
    merged.sort_by_key(|(tick, _)| *tick);

    let mut open: HashMap<(u8, u8), (u64, u8)> = HashMap::new();
    let mut notes: Vec<NoteEvent> = Vec::new();
    let mut tempo_map: Vec<TempoChange> = Vec::new();
    let mut time_signature: Option<TimeSignature> = None;
    let mut programs: BTreeMap<u8, u8> = BTreeMap::new();

    let close = |notes: &mut Vec<NoteEvent>, channel: u8, pitch: u8, (start, velocity): (u64, u8), end: u64| {
        notes.push(NoteEvent {
            pitch,
            velocity,
            channel,
            start_tick: start,
            end_tick: end,
        });
    };

    for (tick, kind) in merged {
        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                tempo_map.push(TempoChange {
                    tick,
                    us_per_beat: tempo.as_int(),
                });
            }
            TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, pow, _, _)) => {
                if time_signature.is_some() {
                    continue;
                }
                match 1u8.checked_shl(pow as u32) {
                    Some(denominator) if numerator > 0 => {
                        time_signature = Some(TimeSignature::new(numerator, denominator));
                    }
                    _ => log::warn!(
                        "{}: ignoring invalid time signature {}/2^{}",
                        file_id,
                        numerator,
                        pow
                    ),
                }
            }
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        let pitch = key.as_int();
                        // Retrigger of a sounding note ends the previous one
                        if let Some(prev) = open.insert((channel, pitch), (tick, vel.as_int())) {
                            close(&mut notes, channel, pitch, prev, tick);
                        }
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let pitch = key.as_int();
                        if let Some(started) = open.remove(&(channel, pitch)) {
                            close(&mut notes, channel, pitch, started, tick);
                        }
                    }
                    MidiMessage::ProgramChange { program } => {
                        programs.entry(channel).or_insert(program.as_int());
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    for ((channel, pitch), started) in open.drain() {
        close(&mut notes, channel, pitch, started, end_tick);
    }

    if notes.is_empty() {
        return Err(parse_error("no note events".to_string()));
    }

    notes.sort_by_key(|n| (n.start_tick, n.channel, n.pitch, n.end_tick));
    let last_note_end = notes.iter().map(|n| n.end_tick).max().unwrap_or(0);
    end_tick = end_tick.max(last_note_end);

    // Downstream code always finds a tempo at tick 0
    if tempo_map.first().map_or(true, |t| t.tick > 0) {
        tempo_map.insert(
            0,
            TempoChange {
                tick: 0,
                us_per_beat: DEFAULT_US_PER_BEAT,
            },
        );
    }

    Ok(SourceTimeline {
        file_id: file_id.to_string(),
        notes,
        tempo_map,
        ticks_per_beat,
        time_signature: time_signature.unwrap_or_default(),
        programs,
        end_tick,
    })
}

/// Read a MIDI file from disk and parse it
///
/// Returns the timeline together with the raw bytes so callers can hash them.
pub fn read_timeline(path: &Path) -> CorpusResult<(SourceTimeline, Vec<u8>)> {
    let bytes = std::fs::read(path)?;
    let file_id = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let timeline = parse_timeline(&file_id, &bytes)?;
    Ok((timeline, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::{Format, Fps, Header, Track, TrackEvent};

    fn note_on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: vel.into(),
                },
            },
        }
    }

    fn note_off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        }
    }

    fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Meta(message),
        }
    }

    fn smf_bytes(timing: Timing, tracks: Vec<Track<'static>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(Format::Parallel, timing),
            tracks,
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_pairs_note_on_and_off() {
        let bytes = smf_bytes(
            Timing::Metrical(480.into()),
            vec![vec![
                note_on(0, 0, 60, 100),
                note_off(480, 0, 60),
                meta(0, MetaMessage::EndOfTrack),
            ]],
        );

        let timeline = parse_timeline("one.mid", &bytes).unwrap();
        assert_eq!(timeline.ticks_per_beat, 480);
        assert_eq!(timeline.notes.len(), 1);
        assert_eq!(timeline.notes[0].start_tick, 0);
        assert_eq!(timeline.notes[0].end_tick, 480);
        assert_eq!(timeline.notes[0].velocity, 100);
        assert_eq!(timeline.end_tick, 480);
    }

    #[test]
    fn test_single_tempo_map_starts_at_zero() {
        let bytes = smf_bytes(
            Timing::Metrical(96.into()),
            vec![vec![note_on(0, 0, 60, 90), note_off(96, 0, 60)]],
        );

        let timeline = parse_timeline("t.mid", &bytes).unwrap();
        assert_eq!(timeline.tempo_map.len(), 1);
        assert_eq!(timeline.tempo_map[0].tick, 0);
        assert_eq!(timeline.initial_tempo(), DEFAULT_US_PER_BEAT);
        assert_eq!(timeline.time_signature, TimeSignature::new(4, 4));
    }

    #[test]
    fn test_velocity_zero_note_on_is_note_off() {
        let bytes = smf_bytes(
            Timing::Metrical(480.into()),
            vec![vec![note_on(0, 2, 64, 80), note_on(240, 2, 64, 0)]],
        );

        let timeline = parse_timeline("v0.mid", &bytes).unwrap();
        assert_eq!(timeline.notes.len(), 1);
        assert_eq!(timeline.notes[0].channel, 2);
        assert_eq!(timeline.notes[0].end_tick, 240);
    }

    #[test]
    fn test_retrigger_closes_previous_note() {
        let bytes = smf_bytes(
            Timing::Metrical(480.into()),
            vec![vec![
                note_on(0, 0, 60, 100),
                note_on(120, 0, 60, 90),
                note_off(120, 0, 60),
            ]],
        );

        let timeline = parse_timeline("re.mid", &bytes).unwrap();
        assert_eq!(timeline.notes.len(), 2);
        assert_eq!((timeline.notes[0].start_tick, timeline.notes[0].end_tick), (0, 120));
        assert_eq!((timeline.notes[1].start_tick, timeline.notes[1].end_tick), (120, 240));
        assert_eq!(timeline.notes[1].velocity, 90);
    }

    #[test]
    fn test_unterminated_note_closed_at_final_tick() {
        let bytes = smf_bytes(
            Timing::Metrical(480.into()),
            vec![vec![
                note_on(0, 0, 60, 100),
                note_on(0, 0, 67, 100),
                note_off(480, 0, 67),
                meta(1440, MetaMessage::EndOfTrack),
            ]],
        );

        let timeline = parse_timeline("open.mid", &bytes).unwrap();
        let held = timeline.notes.iter().find(|n| n.pitch == 60).unwrap();
        assert_eq!(held.end_tick, 1920);
        assert_eq!(timeline.end_tick, 1920);
    }

    #[test]
    fn test_merges_tracks_and_reads_meta() {
        let conductor = vec![
            meta(0, MetaMessage::Tempo(600_000.into())),
            meta(0, MetaMessage::TimeSignature(3, 2, 24, 8)),
            meta(960, MetaMessage::Tempo(400_000.into())),
            meta(0, MetaMessage::EndOfTrack),
        ];
        let melody = vec![
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Midi {
                    channel: 1.into(),
                    message: MidiMessage::ProgramChange { program: 40.into() },
                },
            },
            note_on(480, 1, 72, 100),
            note_off(480, 1, 72),
        ];
        let bass = vec![note_on(0, 3, 36, 110), note_off(1440, 3, 36)];

        let bytes = smf_bytes(Timing::Metrical(480.into()), vec![conductor, melody, bass]);
        let timeline = parse_timeline("multi.mid", &bytes).unwrap();

        assert_eq!(timeline.time_signature, TimeSignature::new(3, 4));
        assert_eq!(timeline.bar_ticks(), 1440);
        assert_eq!(timeline.tempo_map.len(), 2);
        assert_eq!(timeline.initial_tempo(), 600_000);
        assert_eq!(timeline.tempo_map[1].tick, 960);
        assert_eq!(timeline.program_for(1), 40);
        assert_eq!(timeline.program_for(3), 0);

        // Sorted by start tick across tracks
        assert_eq!(timeline.notes[0].pitch, 36);
        assert_eq!(timeline.notes[1].pitch, 72);
        assert_eq!(timeline.notes[1].start_tick, 480);
    }

    #[test]
    fn test_garbage_bytes_fail_to_parse() {
        let result = parse_timeline("junk.mid", b"definitely not midi");
        assert!(matches!(result, Err(CorpusError::Parse { .. })));
    }

    #[test]
    fn test_no_notes_is_parse_error() {
        let bytes = smf_bytes(
            Timing::Metrical(480.into()),
            vec![vec![meta(0, MetaMessage::Tempo(500_000.into()))]],
        );
        let result = parse_timeline("empty.mid", &bytes);
        assert!(matches!(result, Err(CorpusError::Parse { .. })));
    }

    #[test]
    fn test_timecode_timing_rejected() {
        let bytes = smf_bytes(
            Timing::Timecode(Fps::Fps25, 40),
            vec![vec![note_on(0, 0, 60, 100), note_off(100, 0, 60)]],
        );
        let result = parse_timeline("smpte.mid", &bytes);
        assert!(matches!(result, Err(CorpusError::UnsupportedTiming { .. })));
    }

    #[test]
    fn test_read_timeline_missing_file() {
        let result = read_timeline(Path::new("/nonexistent/dir/missing.mid"));
        assert!(matches!(result, Err(CorpusError::Io(_))));
    }
}
