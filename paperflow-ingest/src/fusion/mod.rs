// Fusion Module
//
// Combines the deterministic rule classifier with the probabilistic LLM
// classifier into one decision per document.

pub mod policy;

pub use policy::{FusionPolicy, FusionThresholds};
