// Engine configuration - JSON file with defaults for every field
// Lookup: explicit path, then $DICEBARS_CONFIG, then the user config directory

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::composer::MidiExportOptions;
use crate::selection::{PolicyTable, SelectionMode};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "DICEBARS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned for source MIDI files
    pub corpus_dir: PathBuf,

    /// Dice per game (3 or 4)
    pub spins: u8,

    pub mode: SelectionMode,

    /// Fixed seed for replayable games
    pub seed: Option<u64>,

    /// Output file for dice games
    pub dice_output: PathBuf,

    /// Output file for chaos medleys
    pub chaos_output: PathBuf,

    /// JSONL game journal; disabled when unset
    pub journal_path: Option<PathBuf>,

    pub policy: PolicyTable,

    pub export: MidiExportOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            corpus_dir: PathBuf::from("."),
            spins: 4,
            mode: SelectionMode::Dice,
            seed: None,
            dice_output: PathBuf::from("dice_game.mid"),
            chaos_output: PathBuf::from("chaos_medley.mid"),
            journal_path: None,
            policy: PolicyTable::default(),
            export: MidiExportOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `explicit`, `$DICEBARS_CONFIG` or the user config file
    ///
    /// Falls back to defaults when no file is named and the user config file
    /// doesn't exist. A named file that is missing is an error.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(3..=4).contains(&self.spins) {
            return Err(ConfigError::Invalid(format!("spins must be 3 or 4, got {}", self.spins)));
        }
        if self.policy.bands.is_empty() {
            return Err(ConfigError::Invalid("policy needs at least one band".to_string()));
        }
        if let Some(band) = self.policy.bands.iter().find(|b| b.clean_weight.is_nan() || b.clean_weight <= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "policy band weight must be positive, got {}",
                band.clean_weight
            )));
        }
        if self.export.max_channels == 0 {
            return Err(ConfigError::Invalid("export.max_channels must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Default output file for a mode
    pub fn output_for(&self, mode: SelectionMode) -> &Path {
        match mode {
            SelectionMode::Dice => &self.dice_output,
            SelectionMode::Chaos => &self.chaos_output,
        }
    }
}

/// `<config dir>/dicebars/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dicebars").join("config.json"))
}
