//! paperflow-ingest library interface
//!
//! Classification fusion and adaptive foldering for scanned administrative
//! documents. Exposes the engine for the binary and for integration testing.

pub mod classifier;
pub mod collaborators;
pub mod fusion;
pub mod organizer;
pub mod pipeline;
pub mod scanner;
pub mod text;
pub mod thresholds;
pub mod types;

pub use crate::classifier::{RuleBasedClassifier, RuleSet};
pub use crate::fusion::FusionPolicy;
pub use crate::organizer::{DocumentOrganizer, FixedThreshold, FolderThreshold, OrganizationResult};
pub use crate::pipeline::{DocumentPipeline, ProcessingReport};
pub use crate::scanner::InboxScanner;
pub use crate::thresholds::ThresholdManager;
pub use crate::types::{Category, ClassificationResult, ClassificationSource, EmitterInfo};
