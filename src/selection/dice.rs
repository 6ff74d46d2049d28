// Dice - Spin counts, dice simulation and forced totals

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::session::{SelectionError, SelectionResult};

/// Number of spins in a round (and dice per roll)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SpinCount {
    Three,
    Four,
}

impl SpinCount {
    pub fn new(spins: u8) -> SelectionResult<Self> {
        match spins {
            3 => Ok(SpinCount::Three),
            4 => Ok(SpinCount::Four),
            other => Err(SelectionError::InvalidSpinCount(other)),
        }
    }

    pub fn get(&self) -> u8 {
        match self {
            SpinCount::Three => 3,
            SpinCount::Four => 4,
        }
    }

    /// Dice rolled on each spin
    pub fn dice(&self) -> DiceSpec {
        DiceSpec::new(self.get())
    }
}

impl TryFrom<u8> for SpinCount {
    type Error = SelectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SpinCount::new(value)
    }
}

impl From<SpinCount> for u8 {
    fn from(value: SpinCount) -> Self {
        value.get()
    }
}

/// A set of six-sided dice summed into one roll value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceSpec {
    pub count: u8,
}

impl DiceSpec {
    pub const FACES: u8 = 6;

    pub fn new(count: u8) -> Self {
        DiceSpec {
            count: count.max(1),
        }
    }

    pub fn min_total(&self) -> u32 {
        self.count as u32
    }

    pub fn max_total(&self) -> u32 {
        self.count as u32 * Self::FACES as u32
    }

    pub fn contains(&self, total: u32) -> bool {
        (self.min_total()..=self.max_total()).contains(&total)
    }

    /// Where a total sits in the range, 0.0 (lowest) to 1.0 (highest)
    pub fn position(&self, total: u32) -> f64 {
        let span = (self.max_total() - self.min_total()) as f64;
        if span == 0.0 {
            return 0.0;
        }
        let clamped = total.clamp(self.min_total(), self.max_total());
        (clamped - self.min_total()) as f64 / span
    }

    /// Roll every die
    pub fn roll<R: Rng>(&self, rng: &mut R) -> DiceRoll {
        let faces: Vec<u8> = (0..self.count)
            .map(|_| rng.gen_range(1..=Self::FACES))
            .collect();
        DiceRoll {
            total: faces.iter().map(|&f| f as u32).sum(),
            faces,
            forced: false,
        }
    }

    /// Build a roll for an explicit total, with faces that add up to it
    ///
    /// # Errors
    /// `InvalidForcedTotal` when no throw of these dice can produce `total`.
    pub fn forced(&self, total: u32) -> SelectionResult<DiceRoll> {
        self.validate(total)?;
        Ok(DiceRoll {
            faces: split_total(total, self.count),
            total,
            forced: true,
        })
    }

    pub fn validate(&self, total: u32) -> SelectionResult<()> {
        if self.contains(total) {
            Ok(())
        } else {
            Err(SelectionError::InvalidForcedTotal {
                value: total,
                min: self.min_total(),
                max: self.max_total(),
            })
        }
    }
}

/// The outcome of one throw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    /// Face shown on each die, for display
    pub faces: Vec<u8>,

    /// Sum of the faces
    pub total: u32,

    /// True when the total was supplied instead of rolled
    pub forced: bool,
}

/// Spread `total` as evenly as possible over `count` dice
fn split_total(total: u32, count: u8) -> Vec<u8> {
    let count = count.max(1) as u32;
    let base = total / count;
    let extra = total % count;
    (0..count)
        .map(|i| (base + u32::from(i < extra)) as u8)
        .collect()
}
