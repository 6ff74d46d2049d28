// MIDI Export - Serialize timelines to standard MIDI files using midly crate
// One meta track plus one track per output channel

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::layout::{ComposeError, ComposeResult};
use crate::corpus::{SourceTimeline, TimeSignature, DRUM_CHANNEL};

/// What to do with notes still sounding when their bar ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverhangPolicy {
    /// Cut the note at the bar line
    Clip,

    /// Keep the full duration, ringing into the next spliced bar
    Keep,
}

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiExportOptions {
    /// Output pulses per quarter note; None keeps the first picked file's resolution
    pub ppq: Option<u16>,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Include time signature metadata
    pub include_time_signature: bool,

    /// Include track names
    pub track_names: bool,

    /// Handling of notes crossing the end of a picked bar
    pub overhang: OverhangPolicy,

    /// Upper bound on melodic output channels (1-15)
    pub max_channels: usize,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: None,
            include_tempo: true,
            include_time_signature: true,
            track_names: true,
            overhang: OverhangPolicy::Clip,
            max_channels: 15,
        }
    }
}

/// Export a timeline to MIDI file bytes
///
/// Writes a format 1 file: track 0 carries the track name, tempo map and
/// time signature; every channel in use gets its own track with a program
/// change at tick 0. End-of-track lands on the timeline's end tick.
pub fn write_timeline(timeline: &SourceTimeline, options: &MidiExportOptions) -> ComposeResult<Vec<u8>> {
    let header = Header {
        format: midly::Format::Parallel,
        timing: Timing::Metrical(timeline.ticks_per_beat.into()),
    };

    let channels: BTreeSet<u8> = timeline
        .notes
        .iter()
        .map(|n| n.channel)
        .chain(timeline.programs.keys().copied())
        .collect();
    let names: Vec<String> = channels.iter().map(|&c| channel_name(c)).collect();

    let mut tracks = Vec::with_capacity(channels.len() + 1);

    // Track 0: Tempo and time signature metadata
    let mut meta_events: Vec<(u64, u8, TrackEventKind)> = Vec::new();
    if options.track_names {
        meta_events.push((0, 0, TrackEventKind::Meta(MetaMessage::TrackName(b"META"))));
    }
    if options.include_time_signature {
        meta_events.push((0, 1, time_signature_event(timeline.time_signature)));
    }
    if options.include_tempo {
        for tempo in &timeline.tempo_map {
            meta_events.push((
                tempo.tick,
                2,
                TrackEventKind::Meta(MetaMessage::Tempo(tempo.us_per_beat.into())),
            ));
        }
    }
    tracks.push(to_track(meta_events, timeline.end_tick));

    for (&channel, name) in channels.iter().zip(names.iter()) {
        tracks.push(channel_track(timeline, channel, name, options));
    }

    let smf = Smf { header, tracks };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| ComposeError::Write(format!("Failed to write MIDI: {}", e)))?;

    Ok(bytes)
}

/// Build the track for one output channel
fn channel_track<'a>(
    timeline: &SourceTimeline,
    channel: u8,
    name: &'a str,
    options: &MidiExportOptions,
) -> Track<'a> {
    let mut events: Vec<(u64, u8, TrackEventKind<'a>)> = Vec::new();

    if options.track_names {
        events.push((0, 0, TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes()))));
    }

    if channel != DRUM_CHANNEL {
        if let Some(&program) = timeline.programs.get(&channel) {
            events.push((
                0,
                1,
                TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::ProgramChange {
                        program: program.into(),
                    },
                },
            ));
        }
    }

    for note in timeline.notes.iter().filter(|n| n.channel == channel) {
        // Note-offs sort ahead of note-ons on the same tick so repeated
        // pitches don't cut each other short; a note's own off is at least
        // one tick after its on
        let end_tick = note.end_tick.max(note.start_tick + 1);
        events.push((
            note.start_tick,
            3,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: note.pitch.into(),
                    vel: note.velocity.max(1).into(),
                },
            },
        ));
        events.push((
            end_tick,
            2,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: note.pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    to_track(events, timeline.end_tick)
}

/// Sort absolute-tick events, convert to delta times and close the track
fn to_track(mut events: Vec<(u64, u8, TrackEventKind)>, end_tick: u64) -> Track {
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Track::new();
    let mut last_tick = 0u64;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: (tick.saturating_sub(last_tick) as u32).into(),
            kind,
        });
        last_tick = last_tick.max(tick);
    }

    add_end_of_track(&mut track, end_tick.saturating_sub(last_tick) as u32);
    track
}

fn channel_name(channel: u8) -> String {
    if channel == DRUM_CHANNEL {
        "Drums".to_string()
    } else {
        format!("Channel {}", channel + 1)
    }
}

/// Time signature meta message
fn time_signature_event<'a>(ts: TimeSignature) -> TrackEventKind<'a> {
    // MIDI clocks per metronome click (24 for quarter note)
    let clocks_per_click = 24u8;

    // 32nd notes per quarter note (8)
    let thirty_seconds_per_quarter = 8u8;

    TrackEventKind::Meta(MetaMessage::TimeSignature(
        ts.numerator,
        ts.denominator_pow(),
        clocks_per_click,
        thirty_seconds_per_quarter,
    ))
}

/// Add end of track message
fn add_end_of_track(track: &mut Track<'_>, delta: u32) {
    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
}

/// Append `.mid` unless the path already ends in `.mid`/`.midi`
pub fn normalize_output_path(path: &Path) -> PathBuf {
    let has_midi_ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        .unwrap_or(false);

    if has_midi_ext {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".mid");
        PathBuf::from(name)
    }
}

/// Write MIDI bytes to disk, creating parent directories; returns the final path
pub fn save_midi(path: &Path, bytes: &[u8]) -> ComposeResult<PathBuf> {
    let path = normalize_output_path(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{parse_timeline, NoteEvent, TempoChange};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn note(pitch: u8, channel: u8, start_tick: u64, end_tick: u64) -> NoteEvent {
        NoteEvent {
            pitch,
            velocity: 100,
            channel,
            start_tick,
            end_tick,
        }
    }

    fn timeline(notes: Vec<NoteEvent>, end_tick: u64) -> SourceTimeline {
        SourceTimeline {
            file_id: "out.mid".to_string(),
            notes,
            tempo_map: vec![TempoChange {
                tick: 0,
                us_per_beat: 500_000,
            }],
            ticks_per_beat: 480,
            time_signature: TimeSignature::new(3, 4),
            programs: BTreeMap::from([(0, 19)]),
            end_tick,
        }
    }

    #[test]
    fn test_export_track_layout() {
        let tl = timeline(vec![note(60, 0, 0, 480), note(36, DRUM_CHANNEL, 0, 120)], 1440);
        let bytes = write_timeline(&tl, &MidiExportOptions::default()).unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, midly::Format::Parallel);
        // meta + channel 0 + drums
        assert_eq!(smf.tracks.len(), 3);

        if let TrackEventKind::Meta(MetaMessage::TrackName(name)) = &smf.tracks[0][0].kind {
            assert_eq!(*name, b"META");
        } else {
            panic!("Expected TrackName event");
        }

        let has_program = smf.tracks[1].iter().any(|e| {
            matches!(
                e.kind,
                TrackEventKind::Midi {
                    message: MidiMessage::ProgramChange { program },
                    ..
                } if program.as_int() == 19
            )
        });
        assert!(has_program);
    }

    #[test]
    fn test_tempo_and_time_signature_written() {
        let tl = timeline(vec![note(60, 0, 0, 480)], 1440);
        let bytes = write_timeline(&tl, &MidiExportOptions::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let tempo = smf.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(500_000));

        let ts = smf.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::TimeSignature(n, d, _, _)) => Some((n, d)),
            _ => None,
        });
        assert_eq!(ts, Some((3, 2)));
    }

    #[test]
    fn test_without_metadata() {
        let tl = timeline(vec![note(60, 0, 0, 480)], 1440);
        let options = MidiExportOptions {
            include_tempo: false,
            include_time_signature: false,
            track_names: false,
            ..Default::default()
        };
        let bytes = write_timeline(&tl, &options).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        // Only end-of-track left in the meta track
        assert_eq!(smf.tracks[0].len(), 1);
    }

    #[test]
    fn test_note_off_precedes_note_on_at_same_tick() {
        let tl = timeline(vec![note(60, 0, 0, 480), note(60, 0, 480, 960)], 1440);
        let bytes = write_timeline(&tl, &MidiExportOptions::default()).unwrap();

        let parsed = parse_timeline("back.mid", &bytes).unwrap();
        assert_eq!(parsed.notes.len(), 2);
        assert_eq!((parsed.notes[0].start_tick, parsed.notes[0].end_tick), (0, 480));
        assert_eq!((parsed.notes[1].start_tick, parsed.notes[1].end_tick), (480, 960));
    }

    #[test]
    fn test_zero_length_note_gets_one_tick() {
        let tl = timeline(vec![note(60, 0, 480, 480), note(62, 0, 960, 1440)], 1920);
        let bytes = write_timeline(&tl, &MidiExportOptions::default()).unwrap();

        let parsed = parse_timeline("back.mid", &bytes).unwrap();
        let spans: Vec<(u8, u64, u64)> = parsed
            .notes
            .iter()
            .map(|n| (n.pitch, n.start_tick, n.end_tick))
            .collect();
        assert_eq!(spans, vec![(60, 480, 481), (62, 960, 1440)]);
        assert_eq!(parsed.end_tick, 1920);
    }

    #[test]
    fn test_end_of_track_at_timeline_end() {
        let tl = timeline(vec![note(60, 0, 0, 100)], 2880);
        let bytes = write_timeline(&tl, &MidiExportOptions::default()).unwrap();

        let parsed = parse_timeline("back.mid", &bytes).unwrap();
        assert_eq!(parsed.end_tick, 2880);
        assert_eq!(parsed.time_signature, TimeSignature::new(3, 4));
        assert_eq!(parsed.program_for(0), 19);
    }

    #[test]
    fn test_normalize_output_path() {
        assert_eq!(normalize_output_path(Path::new("song")), PathBuf::from("song.mid"));
        assert_eq!(normalize_output_path(Path::new("song.MID")), PathBuf::from("song.MID"));
        assert_eq!(normalize_output_path(Path::new("a/b.midi")), PathBuf::from("a/b.midi"));
    }

    #[test]
    fn test_save_midi_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("take1");

        let saved = save_midi(&target, b"MThd").unwrap();
        assert_eq!(saved.extension().unwrap(), "mid");
        assert_eq!(std::fs::read(saved).unwrap(), b"MThd");
    }
}
