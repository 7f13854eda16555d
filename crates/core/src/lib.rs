pub mod lexicon;
pub mod models;
pub mod normalize;
pub mod rework;
pub mod urgency;

pub use lexicon::{ResolutionTable, ResolutionWeight, SignalLexicon, WeightedSignal};
pub use models::*;
pub use normalize::normalize;
pub use rework::ReworkRiskScorer;
pub use urgency::{scan_signals, tier_for, SignalScan};
