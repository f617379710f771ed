//! Demand priority rules and rule engine.
//!
//! Orders demands before greedy placement so that the hardest ones
//! (shared lectures, labs, large groups, scarce teachers) get first pick
//! of the slots.
//!
//! # Usage
//!
//! ```
//! use u_timetable::models::{Catalog, CatalogIndex};
//! use u_timetable::priority::{PriorityContext, PriorityEngine};
//!
//! let catalog = Catalog::new();
//! let index = CatalogIndex::new(&catalog);
//! let engine = PriorityEngine::standard();
//! let order = engine.sort_indices(&[], &PriorityContext::new(&index));
//! assert!(order.is_empty());
//! ```

mod context;
mod engine;
pub mod rules;

pub use context::PriorityContext;
pub use engine::{EvaluationMode, PriorityEngine};

use crate::models::ClassDemand;
use std::fmt::Debug;

/// Score returned by a priority rule.
///
/// Lower scores = placed earlier.
pub type RuleScore = f64;

/// A rule that scores how early a demand should be placed.
///
/// # Score Convention
/// **Lower score = higher priority.** Bonuses are negative, penalties
/// positive.
pub trait PriorityRule: Send + Sync + Debug {
    /// Rule name (e.g., "LAB_FIRST").
    fn name(&self) -> &'static str;

    /// Scores a demand; lower = placed earlier.
    fn evaluate(&self, demand: &ClassDemand, context: &PriorityContext<'_>) -> RuleScore;

    /// Rule description.
    fn description(&self) -> &'static str {
        self.name()
    }
}
