//! Simulated-annealing refinement of a greedy attempt.
//!
//! # Algorithm
//!
//! The state is the attempt's placements in commit order. Its cost comes
//! from replaying them on a copy of the seeded ledger and summing the slot
//! costs; a replay that hits a hard reject is infeasible and never
//! accepted.
//!
//! 1. Every chain starts from the greedy placements
//! 2. A step either relocates one placement to a random day, slot and
//!    suitable room, or swaps the `(day, slot)` of two placements
//! 3. A feasible neighbour is accepted with probability
//!    `min(1, exp(-Δ / T))`, then `T` is multiplied by the cooling rate
//! 4. Each chain keeps its best state; the cheapest chain wins, ties to
//!    the lower chain number
//!
//! Chains run in parallel on rayon, each with its own `ChaCha8Rng`, so the
//! outcome depends only on the seed. Unplaced demands stay unplaced.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use super::greedy::{book, commit, suitable_rooms, Attempt, Placement};
use super::problem::Problem;
use crate::cost::SlotCostEvaluator;

const MAX_CHAINS: usize = 8;
const CHAIN_SEED_STRIDE: u64 = 777;
const COST_EPSILON: f64 = 1e-9;

/// Parallel annealing chains over one attempt.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use u_timetable::config::HeuristicConfig;
/// use u_timetable::models::*;
/// use u_timetable::scheduler::{Annealer, GreedyScheduler, Problem, TimetableRequest};
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
/// let config = HeuristicConfig::new(DateWindow::new(monday, monday));
/// let problem = Problem::prepare(&TimetableRequest::new(&catalog, &config)).unwrap();
/// let greedy = GreedyScheduler::new().run(&problem, None::<&mut rand_chacha::ChaCha8Rng>);
///
/// let refined = Annealer::new().with_iterations(100).refine(&problem, greedy.clone(), 7);
/// assert!(refined.total_cost <= greedy.total_cost);
/// assert_eq!(refined.sessions.len(), greedy.sessions.len());
/// ```
#[derive(Debug, Clone)]
pub struct Annealer {
    iterations: u32,
    chains: usize,
    initial_temperature: f64,
    cooling: f64,
}

impl Annealer {
    /// 5000 steps per chain, one chain per rayon thread (at most 8),
    /// temperature 1000 cooled by 0.995 per step.
    pub fn new() -> Self {
        Self {
            iterations: 5000,
            chains: rayon::current_num_threads().clamp(1, MAX_CHAINS),
            initial_temperature: 1000.0,
            cooling: 0.995,
        }
    }

    /// Sets the steps per chain.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the number of chains.
    pub fn with_chains(mut self, chains: usize) -> Self {
        self.chains = chains.max(1);
        self
    }

    /// Sets the initial temperature and the per-step cooling factor.
    pub fn with_temperature(mut self, initial: f64, cooling: f64) -> Self {
        self.initial_temperature = initial;
        self.cooling = cooling;
        self
    }

    /// Refines the attempt's placements.
    ///
    /// Returns the attempt unchanged unless some chain finds a strictly
    /// cheaper feasible state.
    pub fn refine(&self, problem: &Problem<'_>, attempt: Attempt, seed: u64) -> Attempt {
        if self.iterations == 0 || attempt.placements.is_empty() {
            return attempt;
        }
        let evaluator = problem.evaluator();
        let Some(start_cost) = replay_cost(problem, &evaluator, &attempt.placements) else {
            return attempt;
        };
        let rooms: Vec<Vec<usize>> = problem
            .pool
            .demands
            .iter()
            .map(|d| suitable_rooms(problem, d))
            .collect();

        let chains: Vec<(usize, Vec<Placement>, f64)> = (0..self.chains)
            .into_par_iter()
            .map(|chain| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(chain as u64 * CHAIN_SEED_STRIDE));
                let (placements, cost) =
                    self.chain(problem, &evaluator, &rooms, &attempt.placements, start_cost, &mut rng);
                debug!(event = "anneal_chain_finished", chain, cost);
                (chain, placements, cost)
            })
            .collect();

        let Some((chain, placements, cost)) = chains
            .into_iter()
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)))
        else {
            return attempt;
        };
        info!(
            event = "refinement_finished",
            chains = self.chains,
            iterations = self.iterations,
            start_cost,
            cost,
            best_chain = chain
        );
        if cost >= start_cost - COST_EPSILON {
            return attempt;
        }

        let mut ledger = problem.ledger.clone();
        let sessions = placements
            .iter()
            .flat_map(|p| commit(problem, p, &mut ledger))
            .collect();
        Attempt {
            index: attempt.index,
            sessions,
            placements,
            unplaced: attempt.unplaced,
            total_cost: cost,
        }
    }

    fn chain<R: Rng + ?Sized>(
        &self,
        problem: &Problem<'_>,
        evaluator: &SlotCostEvaluator<'_>,
        rooms: &[Vec<usize>],
        start: &[Placement],
        start_cost: f64,
        rng: &mut R,
    ) -> (Vec<Placement>, f64) {
        let mut current = start.to_vec();
        let mut current_cost = start_cost;
        let mut best = current.clone();
        let mut best_cost = start_cost;
        let mut temperature = self.initial_temperature;

        for _ in 0..self.iterations {
            let mut next = current.clone();
            if neighbour(problem, rooms, &mut next, rng) {
                if let Some(cost) = replay_cost(problem, evaluator, &next) {
                    let delta = cost - current_cost;
                    if delta < 0.0 || rng.random::<f64>() < (-delta / temperature).exp() {
                        current = next;
                        current_cost = cost;
                        if current_cost < best_cost - COST_EPSILON {
                            best.clone_from(&current);
                            best_cost = current_cost;
                        }
                    }
                }
            }
            temperature *= self.cooling;
        }
        (best, best_cost)
    }
}

impl Default for Annealer {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies a random relocate or swap move; `false` when the move is a no-op.
fn neighbour<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    rooms: &[Vec<usize>],
    placements: &mut [Placement],
    rng: &mut R,
) -> bool {
    let n = placements.len();
    if n >= 2 && rng.random_bool(0.5) {
        let i = rng.random_range(0..n);
        let j = rng.random_range(0..n);
        let (a, b) = (placements[i], placements[j]);
        if (a.day, a.slot) == (b.day, b.slot) {
            return false;
        }
        // Shortened days have fewer slots
        if b.slot >= problem.days[a.day].slots.len() || a.slot >= problem.days[b.day].slots.len() {
            return false;
        }
        placements[i].day = b.day;
        placements[i].slot = b.slot;
        placements[j].day = a.day;
        placements[j].slot = a.slot;
        return true;
    }

    let i = rng.random_range(0..n);
    let fitting = &rooms[placements[i].demand];
    let day = rng.random_range(0..problem.days.len());
    let slots = problem.days[day].slots.len();
    if fitting.is_empty() || slots == 0 {
        return false;
    }
    let p = &mut placements[i];
    p.day = day;
    p.slot = rng.random_range(0..slots);
    p.room = fitting[rng.random_range(0..fitting.len())];
    true
}

/// Total slot cost of booking the placements in order, `None` on a hard reject.
fn replay_cost(problem: &Problem<'_>, evaluator: &SlotCostEvaluator<'_>, placements: &[Placement]) -> Option<f64> {
    let mut ledger = problem.ledger.clone();
    let mut total = 0.0;
    for p in placements {
        let demand = &problem.pool.demands[p.demand];
        total += evaluator.evaluate(demand, &p.candidate(problem), &ledger).cost()?;
        book(problem, p, &mut ledger);
    }
    Some(total)
}
