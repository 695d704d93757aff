//! Pipeline stage implementations.
//!
//! The agents are stateless stage structs operating on explicit record
//! values: profile, simulate, analyze and advise each wrap one (or, for
//! simulation, many parallel) resilient reasoning calls, while tracking is
//! purely rule-based and never leaves the process.

/// Advice generation from the analysis and DNA.
pub mod advise;
/// Cross-scenario analysis and recommendation.
pub mod analyze;
/// Decision DNA extraction from a user profile.
pub mod profile;
/// Parallel scenario generation per (timeline, variant) cell.
pub mod simulate;
/// Local decision tracking and accuracy scoring.
pub mod track;

pub use advise::AdviceStage;
pub use analyze::AnalysisStage;
pub use profile::ProfileStage;
pub use simulate::{SimulationOutcome, SimulationStage};
pub use track::{CategoricalScorer, OutcomeScorer, TrackingResult, TrackingStage};
