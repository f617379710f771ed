//! Exam-session scheduling.
//!
//! A sibling of the semester pipeline: exams and tests come from the
//! attestation kind of plan entries, consultations from a day offset
//! before each exam. Placement is first-fit with same-day and rest-day
//! spacing instead of the weighted cost model.

mod events;
mod scheduler;

pub use events::{EventKind, EventPool, SessionEvent};
pub use scheduler::SessionScheduler;

use serde::Serialize;

use crate::config::SessionConfig;
use crate::models::{Catalog, PlacedSession, UnresolvableDemand};

/// Input of an exam-session run.
#[derive(Debug, Clone, Copy)]
pub struct SessionRequest<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a SessionConfig,
    /// Sessions already in the schedule.
    pub existing: &'a [PlacedSession],
}

impl<'a> SessionRequest<'a> {
    /// Creates a request with no existing sessions.
    pub fn new(catalog: &'a Catalog, config: &'a SessionConfig) -> Self {
        Self {
            catalog,
            config,
            existing: &[],
        }
    }

    /// Sets the existing sessions.
    pub fn with_existing(mut self, existing: &'a [PlacedSession]) -> Self {
        self.existing = existing;
        self
    }
}

/// Result of an exam-session run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    /// Newly placed exams, tests and consultations.
    pub sessions: Vec<PlacedSession>,
    pub unplaced: Vec<SessionEvent>,
    pub unresolvable: Vec<UnresolvableDemand>,
}
