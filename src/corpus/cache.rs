// Corpus cache - Load-once store of parsed timelines and bar indexes
// Passed explicitly to sessions; rescanning the directory invalidates changed files only

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::loader::{parse_timeline, CorpusError, CorpusResult};
use super::types::SourceTimeline;
use crate::bars::{index_bars, summarize, Bar, BarIndex, SafetyReport};

/// A loaded source file with its derived bar index
#[derive(Debug, Clone)]
pub struct CorpusFile {
    /// File name, unique within the corpus
    pub file_id: String,

    /// Where the file was read from (None for in-memory sources)
    pub path: Option<PathBuf>,

    /// SHA256 of the source bytes, used to detect changes on rescan
    pub digest: String,

    pub timeline: SourceTimeline,
    pub bars: BarIndex,
    pub safety: SafetyReport,
}

impl CorpusFile {
    /// Parse and index one file's bytes
    pub fn from_bytes(file_id: &str, path: Option<PathBuf>, bytes: &[u8]) -> CorpusResult<Self> {
        let timeline = parse_timeline(file_id, bytes)?;
        Ok(Self::build(timeline, path, calculate_sha256(bytes)))
    }

    /// Index an already-parsed timeline
    pub fn from_timeline(timeline: SourceTimeline) -> Self {
        let digest = serde_json::to_vec(&timeline)
            .map(|json| calculate_sha256(&json))
            .unwrap_or_default();
        Self::build(timeline, None, digest)
    }

    fn build(timeline: SourceTimeline, path: Option<PathBuf>, digest: String) -> Self {
        let bars = index_bars(&timeline);
        let safety = summarize(&bars);
        CorpusFile {
            file_id: timeline.file_id.clone(),
            path,
            digest,
            timeline,
            bars,
            safety,
        }
    }

    /// Has at least one complete bar
    pub fn is_eligible(&self) -> bool {
        self.bars.eligible_count() > 0
    }
}

/// A file that could not be loaded, kept for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedFile {
    pub file_id: String,
    pub reason: String,
}

/// What changed during a rescan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescanReport {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub rejected: Vec<RejectedFile>,
    pub unchanged: usize,
}

impl RescanReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.rejected.is_empty()
    }
}

/// All loaded source files, ordered by file id
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    directory: Option<PathBuf>,
    files: Vec<CorpusFile>,
    rejected: Vec<RejectedFile>,
    generation: u64,
}

impl Corpus {
    /// Load every MIDI file in `dir`
    ///
    /// Files that fail to parse are logged and skipped; files shorter than one
    /// bar are kept but contribute no eligible bars.
    ///
    /// # Errors
    /// `EmptyCorpus` when the directory holds no MIDI files at all,
    /// `Io` when the directory can't be read.
    pub fn load(dir: &Path) -> CorpusResult<Self> {
        let mut corpus = Corpus {
            directory: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let report = corpus.rescan()?;

        log::info!(
            "Loaded corpus from {}: {} files, {} eligible bars, {} rejected",
            dir.display(),
            corpus.files.len(),
            corpus.total_eligible_bars(),
            report.rejected.len()
        );

        Ok(corpus)
    }

    /// Build a corpus from timelines already in memory
    pub fn from_timelines(timelines: Vec<SourceTimeline>) -> Self {
        let mut files: Vec<CorpusFile> = timelines.into_iter().map(CorpusFile::from_timeline).collect();
        files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        for file in files.iter().filter(|f| !f.is_eligible()) {
            log::warn!("{}: no complete bars, excluded from the pool", file.file_id);
        }
        Corpus {
            directory: None,
            files,
            rejected: Vec::new(),
            generation: 1,
        }
    }

    /// Re-read the corpus directory
    ///
    /// Files whose bytes are unchanged keep their cached timeline and bars;
    /// changed or new files are re-parsed, vanished files are dropped. The
    /// generation counter increases whenever anything changed.
    pub fn rescan(&mut self) -> CorpusResult<RescanReport> {
        let dir = match &self.directory {
            Some(dir) => dir.clone(),
            None => return Ok(RescanReport::default()),
        };

        let paths = discover_midi_files(&dir)?;
        if paths.is_empty() {
            return Err(CorpusError::EmptyCorpus { dir });
        }

        let mut report = RescanReport::default();
        let mut previous = std::mem::take(&mut self.files);
        let mut files = Vec::with_capacity(paths.len());
        let mut rejected = Vec::new();

        for path in paths {
            let file_id = file_id_for(&path);
            let cached = previous
                .iter()
                .position(|f| f.file_id == file_id)
                .map(|i| previous.swap_remove(i));

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Could not read {}: {}", path.display(), e);
                    rejected.push(RejectedFile {
                        file_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let digest = calculate_sha256(&bytes);
            if let Some(cached) = cached.as_ref().filter(|f| f.digest == digest) {
                report.unchanged += 1;
                files.push(cached.clone());
                continue;
            }

            match CorpusFile::from_bytes(&file_id, Some(path.clone()), &bytes) {
                Ok(file) => {
                    if !file.is_eligible() {
                        log::warn!("{}: no complete bars, excluded from the pool", file_id);
                    } else {
                        log::debug!(
                            "{}: {} bars ({} fully clean)",
                            file_id,
                            file.bars.eligible_count(),
                            file.safety.fully_clean
                        );
                    }
                    if cached.is_some() {
                        report.changed.push(file_id);
                    } else {
                        report.added.push(file_id);
                    }
                    files.push(file);
                }
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    rejected.push(RejectedFile {
                        file_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.removed = previous.into_iter().map(|f| f.file_id).collect();
        report.rejected = rejected.clone();

        files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        self.files = files;
        self.rejected = rejected;
        if !report.is_noop() || self.generation == 0 {
            self.generation += 1;
        }

        Ok(report)
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Increases every time a rescan changes the corpus
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn files(&self) -> &[CorpusFile] {
        &self.files
    }

    pub fn rejected(&self) -> &[RejectedFile] {
        &self.rejected
    }

    pub fn file(&self, file_id: &str) -> Option<&CorpusFile> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    /// Files contributing at least one bar to the selection pool
    pub fn eligible_files(&self) -> impl Iterator<Item = &CorpusFile> {
        self.files.iter().filter(|f| f.is_eligible())
    }

    pub fn total_eligible_bars(&self) -> usize {
        self.files.iter().map(|f| f.bars.eligible_count()).sum()
    }

    /// Look up an eligible bar
    pub fn bar(&self, file_id: &str, bar_index: usize) -> Option<&Bar> {
        self.file(file_id).and_then(|f| f.bars.get(bar_index))
    }
}

/// List `.mid`/`.midi` files in a directory, sorted by name
pub fn discover_midi_files(dir: &Path) -> CorpusResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn file_id_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Calculate SHA256 hash of data
fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
