// Selection Policy - Map a roll value to a bar-selection strategy
// The table is plain data so the mapping can be inspected and tested without randomness

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dice::DiceSpec;
use crate::bars::Bar;
use crate::corpus::Corpus;

/// Which boundary flags a strategy favours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarPreference {
    /// No bias
    Any,

    /// Favour bars that start with nothing sounding
    CleanStart,

    /// Favour bars that end with nothing sounding
    CleanEnd,

    /// Favour bars clean at both ends
    FullyClean,
}

impl BarPreference {
    pub fn accepts(&self, bar: &Bar) -> bool {
        match self {
            BarPreference::Any => true,
            BarPreference::CleanStart => bar.is_clean_start,
            BarPreference::CleanEnd => bar.is_clean_end,
            BarPreference::FullyClean => bar.is_fully_clean(),
        }
    }
}

/// One row of the policy table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyBand {
    /// Upper bound (inclusive) of the normalized roll position covered by this band
    pub upto: f64,

    /// Bars the band favours
    pub preference: BarPreference,

    /// Sampling weight of a favoured bar; other bars weigh 1.0
    pub clean_weight: f64,
}

/// Roll-value to strategy mapping
///
/// Rolls are normalized to [0.0, 1.0] over the dice range and matched against
/// the bands in order. The defaults bias higher totals toward cleaner bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub bands: Vec<PolicyBand>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        PolicyTable {
            bands: vec![
                PolicyBand {
                    upto: 1.0 / 3.0,
                    preference: BarPreference::CleanStart,
                    clean_weight: 3.0,
                },
                PolicyBand {
                    upto: 2.0 / 3.0,
                    preference: BarPreference::CleanEnd,
                    clean_weight: 3.5,
                },
                PolicyBand {
                    upto: 1.0,
                    preference: BarPreference::FullyClean,
                    clean_weight: 4.0,
                },
            ],
        }
    }
}

impl PolicyTable {
    /// Band covering a normalized roll position (the last band catches the rest)
    pub fn band_for(&self, position: f64) -> Option<&PolicyBand> {
        self.bands
            .iter()
            .find(|band| position <= band.upto)
            .or_else(|| self.bands.last())
    }

    /// Strategy for a roll
    ///
    /// The source file is `(roll - min) mod eligible_files`, so every total
    /// always names a file while any file is eligible.
    pub fn strategy_for(&self, roll: u32, dice: DiceSpec, eligible_files: usize) -> SelectionStrategy {
        let source = if eligible_files == 0 {
            SourceChoice::AnyFile
        } else {
            let offset = roll.saturating_sub(dice.min_total()) as usize;
            SourceChoice::File(offset % eligible_files)
        };

        match self.band_for(dice.position(roll)) {
            Some(band) => SelectionStrategy {
                source,
                preference: band.preference,
                clean_weight: band.clean_weight,
            },
            None => SelectionStrategy {
                source,
                preference: BarPreference::Any,
                clean_weight: 1.0,
            },
        }
    }
}

/// Where bars are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceChoice {
    /// Position among the corpus's eligible files
    File(usize),

    /// Union of every eligible bar
    AnyFile,
}

/// Resolved strategy for one spin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionStrategy {
    pub source: SourceChoice,
    pub preference: BarPreference,
    pub clean_weight: f64,
}

impl SelectionStrategy {
    /// Uniform draw over the whole corpus, cleanliness ignored
    pub fn chaos() -> Self {
        SelectionStrategy {
            source: SourceChoice::AnyFile,
            preference: BarPreference::Any,
            clean_weight: 1.0,
        }
    }

    /// Sampling weight of one bar
    pub fn weight(&self, bar: &Bar) -> f64 {
        if self.preference != BarPreference::Any && self.preference.accepts(bar) {
            self.clean_weight
        } else {
            1.0
        }
    }
}

/// Eligible bars the strategy draws from
pub fn candidate_pool<'a>(corpus: &'a Corpus, strategy: &SelectionStrategy) -> Vec<&'a Bar> {
    match strategy.source {
        SourceChoice::File(position) => corpus
            .eligible_files()
            .nth(position)
            .map(|file| file.bars.eligible().iter().collect())
            .unwrap_or_default(),
        SourceChoice::AnyFile => all_bars(corpus),
    }
}

fn all_bars(corpus: &Corpus) -> Vec<&Bar> {
    corpus
        .eligible_files()
        .flat_map(|file| file.bars.eligible().iter())
        .collect()
}

/// Draw one bar according to the strategy
///
/// Falls back to a uniform draw over the whole corpus when the mapped pool is
/// empty. Returns None only when the corpus has no eligible bar at all.
pub fn draw<'a, R: Rng>(corpus: &'a Corpus, strategy: &SelectionStrategy, rng: &mut R) -> Option<&'a Bar> {
    let pool = candidate_pool(corpus, strategy);
    if pool.is_empty() {
        log::debug!("Mapped pool {:?} is empty, drawing from the whole corpus", strategy.source);
        return uniform(&all_bars(corpus), rng);
    }

    let weights: Vec<f64> = pool.iter().map(|bar| strategy.weight(bar)).collect();
    if weights.iter().all(|&w| w == weights[0]) {
        return uniform(&pool, rng);
    }

    match WeightedIndex::new(&weights) {
        Ok(dist) => Some(pool[dist.sample(rng)]),
        Err(e) => {
            log::warn!("Invalid policy weights ({}), drawing uniformly", e);
            uniform(&pool, rng)
        }
    }
}

fn uniform<'a, R: Rng>(pool: &[&'a Bar], rng: &mut R) -> Option<&'a Bar> {
    if pool.is_empty() {
        None
    } else {
        Some(pool[rng.gen_range(0..pool.len())])
    }
}
