//! Weighting and voting: how module train estimates become votes and how votes
//! become one distribution.

/// Distribution helpers shared by voting and estimates.
pub mod func;
/// Folding weighted module distributions.
pub mod voting;
/// Train-estimate driven module weights.
pub mod weighting;

pub use voting::{ModuleVote, VotingScheme};
pub use weighting::{ModuleWeight, WeightingScheme, WEIGHT_FLOOR};
