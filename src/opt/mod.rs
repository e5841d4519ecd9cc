//! Layout optimization: objectives, the local minimizer and the coarse
//! population search.

pub mod coarse;
pub mod fine;
pub mod gradient;
pub mod histogram;
pub mod minimizer;
pub mod search;

pub use coarse::{CoarseObjective, CoarseScales, CoarseTopology};
pub use fine::{FineObjective, FineScales};
pub use gradient::{GradientMismatch, central_difference, check_gradient};
pub use histogram::EnergyHistogram;
pub use minimizer::{EnergyTerm, Objective, OptOutcome, Optimizer, OptimizerConfig};
pub use search::{SearchConfig, SearchOutcome, SpeciesSearch};
