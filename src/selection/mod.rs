// Selection - Dice, the roll-to-strategy policy table and game sessions
// Produces the ordered list of picks the composer consumes

pub mod dice;
pub mod policy;
pub mod session;

// Re-export main types
pub use dice::{DiceRoll, DiceSpec, SpinCount};
pub use policy::{BarPreference, PolicyBand, PolicyTable, SelectionStrategy, SourceChoice, candidate_pool, draw};
pub use session::{GameSession, Pick, SelectionError, SelectionMode, SelectionResult, SessionState, describe_roll};
