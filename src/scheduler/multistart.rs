//! Multi-start controller.
//!
//! Runs the greedy scheduler several times over one prepared problem and
//! keeps the best attempt: fewest unplaced demands, then lowest total
//! cost, then lowest attempt number. Attempt 0 is deterministic; attempt
//! `i > 0` is seeded with `seed + i`, so a run is reproducible for a given
//! configuration regardless of parallelism.
//!
//! A run stops early once an attempt places everything, when the time
//! budget is spent, or when the cancellation flag is raised. With
//! `refine_iterations > 0` the winning attempt is then refined by
//! simulated annealing (skipped after cancellation).

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::anneal::Annealer;
use super::greedy::{Attempt, GreedyScheduler};
use super::problem::{Problem, TimetableRequest};
use crate::error::{Result, TimetableError};
use crate::models::{PlacedSession, UnplacedDemand, UnresolvableDemand};

/// Progress report emitted after every completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Attempts completed so far.
    pub current: usize,
    /// Attempts requested.
    pub total: usize,
    /// Unplaced demands of the best attempt so far.
    pub best_unplaced: usize,
}

/// Result of a timetabling run.
///
/// `sessions` holds the newly placed sessions only; sessions retained from
/// the existing schedule are not repeated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableResult {
    pub sessions: Vec<PlacedSession>,
    pub unplaced: Vec<UnplacedDemand>,
    pub unresolvable: Vec<UnresolvableDemand>,
    /// Attempts that ran to completion.
    pub attempts: usize,
    /// Attempt the result comes from.
    pub best_attempt: usize,
    pub total_cost: f64,
    /// Whether the run was interrupted by the cancellation flag.
    pub cancelled: bool,
    /// `(date, slot)` pairs in the planning horizon.
    pub horizon_slots: usize,
}

impl TimetableResult {
    /// Demands that reached placement.
    pub fn demand_count(&self) -> usize {
        self.placed_count() + self.unplaced.len()
    }

    /// Demands with at least one placed session.
    pub fn placed_count(&self) -> usize {
        let mut uids: Vec<&str> = self
            .sessions
            .iter()
            .filter_map(|s| s.unscheduled_uid.as_deref())
            .collect();
        uids.sort_unstable();
        uids.dedup();
        uids.len()
    }
}

/// Repeated greedy placement with seeded diversification.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use u_timetable::config::HeuristicConfig;
/// use u_timetable::models::*;
/// use u_timetable::scheduler::{MultiStartScheduler, TimetableRequest};
///
/// let mut catalog = Catalog::new();
/// catalog.teachers = vec![Teacher::new("t1")];
/// catalog.groups = vec![Group::new("g1", 20).with_specialty("cs")];
/// catalog.subjects = vec![Subject::new("math")];
/// catalog.rooms = vec![Room::new("r1", "hall", 30)];
/// catalog.time_slots = vec![TimeSlot::new("ts1", "08:30"), TimeSlot::new("ts2", "10:10")];
/// catalog.plans = vec![CurriculumPlan::new("p", "cs")
///     .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(4, 0, 0))];
/// catalog.teacher_subject_links =
///     vec![TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture])];
///
/// let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
/// let config = HeuristicConfig::new(DateWindow::new(monday, monday)).with_iterations(5);
/// let result = MultiStartScheduler::new()
///     .run(&TimetableRequest::new(&catalog, &config))
///     .unwrap();
/// assert_eq!(result.sessions.len(), 2);
/// assert!(result.unplaced.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MultiStartScheduler {
    greedy: GreedyScheduler,
    annealer: Annealer,
    cancel: Option<Arc<AtomicBool>>,
}

impl MultiStartScheduler {
    /// Creates a controller with the default greedy scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the greedy scheduler.
    pub fn with_greedy(mut self, greedy: GreedyScheduler) -> Self {
        self.greedy = greedy;
        self
    }

    /// Replaces the annealer; its step count is taken from the config.
    pub fn with_annealer(mut self, annealer: Annealer) -> Self {
        self.annealer = annealer;
        self
    }

    /// Observes a cancellation flag between attempts.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Runs the configured number of attempts and returns the best one.
    ///
    /// # Errors
    /// Input errors from [`Problem::prepare`], or
    /// [`TimetableError::Cancelled`] when cancelled before any attempt
    /// completed.
    pub fn run(&self, request: &TimetableRequest<'_>) -> Result<TimetableResult> {
        self.run_with_progress(request, |_| {})
    }

    /// Like [`run`](Self::run), reporting progress after each attempt.
    pub fn run_with_progress<F>(&self, request: &TimetableRequest<'_>, mut on_progress: F) -> Result<TimetableResult>
    where
        F: FnMut(Progress),
    {
        let problem = Problem::prepare(request)?;
        let config = problem.config;
        let total = config.iterations as usize;
        let started = Instant::now();
        let budget = config.time_budget_secs.map(Duration::from_secs);

        info!(
            event = "timetable_run_started",
            attempts = total,
            parallel = config.parallel,
            seed = config.seed,
            demands = problem.pool.len()
        );

        let mut best: Option<Attempt> = None;
        let mut completed = 0usize;
        let mut cancelled = false;
        let batch_size = if config.parallel {
            rayon::current_num_threads().max(1)
        } else {
            1
        };

        while completed < total {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }
            if completed > 0 && budget.is_some_and(|b| started.elapsed() >= b) {
                debug!(event = "time_budget_spent", completed);
                break;
            }

            let end = (completed + batch_size).min(total);
            let batch: Vec<Attempt> = if config.parallel {
                (completed..end)
                    .into_par_iter()
                    .map(|i| self.attempt(&problem, i))
                    .collect()
            } else {
                (completed..end).map(|i| self.attempt(&problem, i)).collect()
            };

            for attempt in batch {
                debug!(
                    event = "attempt_completed",
                    attempt = attempt.index,
                    unplaced = attempt.unplaced.len(),
                    cost = attempt.total_cost
                );
                if best.as_ref().map_or(true, |b| attempt.is_better_than(b)) {
                    best = Some(attempt);
                }
                completed += 1;
                on_progress(Progress {
                    current: completed,
                    total,
                    best_unplaced: best.as_ref().map_or(0, |b| b.unplaced.len()),
                });
                // Later attempts of a parallel batch are ignored, as in a sequential run
                if best.as_ref().is_some_and(|b| b.unplaced.is_empty()) {
                    break;
                }
            }

            if best.as_ref().is_some_and(|b| b.unplaced.is_empty()) {
                break;
            }
        }

        let Some(mut best) = best else {
            info!(event = "timetable_run_cancelled", completed);
            return Err(TimetableError::Cancelled { completed });
        };
        if config.refine_iterations > 0 && !cancelled {
            best = self
                .annealer
                .clone()
                .with_iterations(config.refine_iterations)
                .refine(&problem, best, config.seed);
        }

        info!(
            event = "timetable_run_finished",
            attempts = completed,
            best_attempt = best.index,
            placed_sessions = best.sessions.len(),
            unplaced = best.unplaced.len(),
            unresolvable = problem.pool.unresolvable.len(),
            cost = best.total_cost,
            cancelled
        );

        Ok(TimetableResult {
            sessions: best.sessions,
            unplaced: best.unplaced,
            unresolvable: problem.pool.unresolvable.clone(),
            attempts: completed,
            best_attempt: best.index,
            total_cost: best.total_cost,
            cancelled,
            horizon_slots: problem.horizon_slots(),
        })
    }

    fn attempt(&self, problem: &Problem<'_>, index: usize) -> Attempt {
        let mut attempt = if index == 0 {
            self.greedy.run(problem, None::<&mut ChaCha8Rng>)
        } else {
            let seed = problem.config.seed.wrapping_add(index as u64);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            self.greedy.run(problem, Some(&mut rng))
        };
        attempt.index = index;
        attempt
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeuristicConfig;
    use crate::models::{
        AttestationKind, Catalog, ClassType, CurriculumPlan, DateWindow, Group, PlanEntry, Room, Stream, Subject,
        Teacher, TeacherSubjectLink, TimeSlot,
    };
    use crate::validation::audit_sessions;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.teachers = vec![Teacher::new("t1"), Teacher::new("t2"), Teacher::new("t3")];
        c.groups = vec![
            Group::new("g1", 25).with_specialty("cs"),
            Group::new("g2", 20).with_specialty("cs"),
            Group::new("g3", 30).with_specialty("cs"),
        ];
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
        c.subjects = vec![Subject::new("math"), Subject::new("phys")];
        c.rooms = vec![
            Room::new("r1", "hall", 30),
            Room::new("r2", "hall", 30),
            Room::new("big", "hall", 80),
        ];
        c.time_slots = vec![
            TimeSlot::new("ts1", "08:30"),
            TimeSlot::new("ts2", "10:10"),
            TimeSlot::new("ts3", "11:50"),
        ];
        c.plans = vec![CurriculumPlan::new("p", "cs")
            .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(4, 4, 0))
            .with_entry(PlanEntry::new("phys", 1, AttestationKind::Test).with_hours(2, 0, 2))];
        c.teacher_subject_links = vec![
            TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture]),
            TeacherSubjectLink::new("t2", "math", vec![ClassType::Practical]),
            TeacherSubjectLink::new("t3", "phys", vec![ClassType::Lecture, ClassType::Lab]),
        ];
        c
    }

    fn week() -> HeuristicConfig {
        HeuristicConfig::new(DateWindow::new(date(2), date(7)))
    }

    #[test]
    fn test_full_placement_stops_early() {
        let c = make_catalog();
        let config = week().with_iterations(10);
        let mut reports = Vec::new();
        let result = MultiStartScheduler::new()
            .run_with_progress(&TimetableRequest::new(&c, &config), |p| reports.push(p))
            .unwrap();

        assert!(result.unplaced.is_empty());
        assert_eq!(result.attempts, 1);
        assert_eq!(reports, vec![Progress {
            current: 1,
            total: 10,
            best_unplaced: 0
        }]);
        assert!(audit_sessions(&c, &result.sessions).is_empty());
        assert!(!result.cancelled);
    }

    #[test]
    fn test_reproducible_for_seed() {
        let mut c = make_catalog();
        // One slot per day keeps the week saturated so every attempt runs
        c.time_slots.truncate(1);
        let config = week().with_iterations(6).with_seed(42);
        let request = TimetableRequest::new(&c, &config);

        let a = MultiStartScheduler::new().run(&request).unwrap();
        let b = MultiStartScheduler::new().run(&request).unwrap();
        assert_eq!(a.sessions, b.sessions);
        assert_eq!(a.best_attempt, b.best_attempt);
        assert_eq!(a.attempts, 6);

        let parallel = week().with_iterations(6).with_seed(42).with_parallel(true);
        let p = MultiStartScheduler::new()
            .run(&TimetableRequest::new(&c, &parallel))
            .unwrap();
        assert_eq!(p.sessions, a.sessions);
        assert_eq!(p.best_attempt, a.best_attempt);
    }

    #[test]
    fn test_more_attempts_never_worse() {
        let mut c = make_catalog();
        c.time_slots.truncate(1);
        let one = week().with_seed(3);
        let many = week().with_seed(3).with_iterations(8);
        let r1 = MultiStartScheduler::new().run(&TimetableRequest::new(&c, &one)).unwrap();
        let r8 = MultiStartScheduler::new().run(&TimetableRequest::new(&c, &many)).unwrap();
        assert!(r8.unplaced.len() <= r1.unplaced.len());
        if r8.unplaced.len() == r1.unplaced.len() {
            assert!(r8.total_cost <= r1.total_cost + 1e-9);
        }
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let c = make_catalog();
        let config = week().with_iterations(3);
        let flag = Arc::new(AtomicBool::new(true));
        let err = MultiStartScheduler::new()
            .with_cancel_flag(flag)
            .run(&TimetableRequest::new(&c, &config))
            .unwrap_err();
        assert!(matches!(err, TimetableError::Cancelled { completed: 0 }));
    }

    #[test]
    fn test_cancel_keeps_best_so_far() {
        let mut c = make_catalog();
        c.time_slots.truncate(1);
        let config = week().with_iterations(50);
        let flag = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&flag);
        let result = MultiStartScheduler::new()
            .with_cancel_flag(flag)
            .run_with_progress(&TimetableRequest::new(&c, &config), |p| {
                if p.current == 2 {
                    trigger.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.attempts, 2);
    }

    #[test]
    fn test_result_counts() {
        let c = make_catalog();
        let result = MultiStartScheduler::new()
            .run(&TimetableRequest::new(&c, &week()))
            .unwrap();
        // math: 2 stream lectures, 2 lectures of g3, 2 practicals per group
        // phys: 1 stream lecture, 1 lecture of g3, 1 lab per group
        assert_eq!(result.demand_count(), 2 + 2 + 6 + 1 + 1 + 3);
        assert_eq!(result.placed_count(), result.demand_count());
        assert!(result.horizon_slots > 0);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("horizonSlots").is_some());
    }

    #[test]
    fn test_progress_best_unplaced_never_increases() {
        let mut c = make_catalog();
        c.time_slots.truncate(1);
        let config = week().with_iterations(8).with_seed(5);
        let request = TimetableRequest::new(&c, &config);
        let scheduler = MultiStartScheduler::new();
        let mut reports = Vec::new();
        let result = scheduler.run_with_progress(&request, |p| reports.push(p)).unwrap();

        assert_eq!(reports.len(), result.attempts);
        for (i, pair) in reports.windows(2).enumerate() {
            assert_eq!(pair[0].current, i + 1);
            assert!(pair[1].best_unplaced <= pair[0].best_unplaced);
        }
        let last = reports.last().unwrap();
        assert_eq!(last.best_unplaced, result.unplaced.len());

        // The reported best is the minimum over the attempts that ran
        let problem = Problem::prepare(&request).unwrap();
        let counts: Vec<usize> = (0..result.attempts)
            .map(|i| scheduler.attempt(&problem, i).unplaced.len())
            .collect();
        assert_eq!(counts.iter().min().copied(), Some(last.best_unplaced));
    }

    #[test]
    fn test_every_demand_placed_or_unplaced_once() {
        use std::collections::HashSet;

        let mut c = make_catalog();
        c.time_slots.truncate(1);
        let config = week().with_iterations(4).with_seed(9);
        let request = TimetableRequest::new(&c, &config);
        let result = MultiStartScheduler::new().run(&request).unwrap();
        assert!(!result.unplaced.is_empty());

        let pool: HashSet<String> = Problem::prepare(&request)
            .unwrap()
            .pool
            .demands
            .iter()
            .map(|d| d.uid.clone())
            .collect();
        let placed: HashSet<String> = result
            .sessions
            .iter()
            .filter_map(|s| s.unscheduled_uid.clone())
            .collect();
        let unplaced: HashSet<String> = result.unplaced.iter().map(|u| u.demand.uid.clone()).collect();

        assert_eq!(unplaced.len(), result.unplaced.len());
        assert!(placed.is_disjoint(&unplaced));
        let all: HashSet<String> = placed.union(&unplaced).cloned().collect();
        assert_eq!(all, pool);
    }

    #[test]
    fn test_refinement_keeps_placement_count() {
        let mut c = make_catalog();
        c.time_slots.truncate(2);
        let plain = week().with_seed(4);
        let refined = week().with_seed(4).with_refinement(200);

        let base = MultiStartScheduler::new()
            .run(&TimetableRequest::new(&c, &plain))
            .unwrap();
        let better = MultiStartScheduler::new()
            .with_annealer(Annealer::new().with_chains(2))
            .run(&TimetableRequest::new(&c, &refined))
            .unwrap();
        assert_eq!(better.unplaced.len(), base.unplaced.len());
        assert_eq!(better.sessions.len(), base.sessions.len());
        assert!(better.total_cost <= base.total_cost + 1e-9);
        assert!(audit_sessions(&c, &better.sessions).is_empty());
    }
}
