//! Semester timetabling: greedy placement under multi-start control.
//!
//! [`Problem::prepare`] validates a [`TimetableRequest`] and builds
//! everything attempts share. [`GreedyScheduler`] runs one placement
//! pass; [`MultiStartScheduler`] repeats it with seeded diversification
//! and keeps the best outcome, optionally refined by the [`Annealer`].
//! [`TimetableKpi`] summarises a result.
//!
//! # Algorithm
//!
//! Demands are ordered by priority rules, then each takes the cheapest
//! feasible `(date, slot, room)` under the slot cost evaluator. It is not
//! optimal, but is fast and reproducible for a given seed.

mod anneal;
mod greedy;
mod kpi;
mod multistart;
mod problem;

pub use anneal::Annealer;
pub use greedy::{Attempt, GreedyScheduler, Placement};
pub use kpi::TimetableKpi;
pub use multistart::{MultiStartScheduler, Progress, TimetableResult};
pub use problem::{PlanningDay, Problem, SlotRef, TimetableRequest};
