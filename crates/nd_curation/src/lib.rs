//! Scoring, merging, selection and the run state machine that sequences them.

pub mod merger;
pub mod orchestrator;
pub mod scoring;
pub mod selector;

pub use merger::{merge, Merged};
pub use orchestrator::{Curator, RunCounts, RunOutcome, RunReport, RunStage};
pub use scoring::{EnrichedArticle, ScoredBatch, ScoringEngine};
pub use selector::select;

pub mod prelude {
    pub use super::{Curator, RunOutcome, RunReport, RunStage};
    pub use nd_core::{AppConfig, DigestSelection, Error, Result};
}
