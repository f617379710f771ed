//! Greedy placement.
//!
//! # Algorithm
//!
//! 1. Order demands with the priority engine (with seeded jitter when the
//!    attempt is randomised)
//! 2. For each demand, pre-filter rooms by capacity, type and tags
//! 3. Score every `(date, slot, room)` of the horizon and keep the
//!    cheapest feasible candidate
//! 4. Commit it to the attempt's ledger, or record the demand as unplaced
//!
//! Ties on cost go to the first candidate in `(date, slot, room)` order,
//! or to a uniformly random one among the tied when an rng is supplied.
//!
//! # Complexity
//! O(d × h × r) cost evaluations for d demands, h horizon slots and
//! r rooms.

use rand::Rng;
use tracing::debug;

use super::problem::{PlanningDay, Problem};
use crate::cost::{Candidate, SlotCostEvaluator};
use crate::ledger::{BookedSession, BookingLedger};
use crate::models::{ClassDemand, DemandTarget, PlacedSession, Room, UnplacedDemand, UnplacedReason};
use crate::priority::{PriorityContext, PriorityEngine};

const COST_EPSILON: f64 = 1e-9;

/// Where one demand landed, as indices into the [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into the demand pool.
    pub demand: usize,
    /// Index into `Problem::days`.
    pub day: usize,
    /// Slot position within the day.
    pub slot: usize,
    /// Index into `Problem::rooms`.
    pub room: usize,
}

impl Placement {
    /// The `(date, slot, room)` candidate this placement stands for.
    pub fn candidate<'p>(&self, problem: &'p Problem<'_>) -> Candidate<'p> {
        let day = &problem.days[self.day];
        Candidate {
            date: day.date,
            slot: self.slot,
            slot_id: day.slots[self.slot].standard_id,
            room: problem.rooms[self.room],
        }
    }
}

/// Outcome of one greedy pass.
#[derive(Debug, Clone, Default)]
pub struct Attempt {
    /// Attempt number within the run (0 = deterministic).
    pub index: usize,
    pub sessions: Vec<PlacedSession>,
    /// Placed demands in commit order.
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedDemand>,
    /// Sum of the chosen candidates' soft costs.
    pub total_cost: f64,
}

impl Attempt {
    /// Whether this attempt beats `other`: fewer unplaced demands, then
    /// lower cost. Equal attempts do not beat each other.
    pub fn is_better_than(&self, other: &Attempt) -> bool {
        match self.unplaced.len().cmp(&other.unplaced.len()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.total_cost < other.total_cost - COST_EPSILON,
        }
    }
}

/// Chosen candidate of a demand.
#[derive(Debug, Clone, Copy)]
struct Choice {
    day: usize,
    slot: usize,
    room: usize,
    cost: f64,
}

/// Greedy slot-by-slot scheduler.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use u_timetable::config::HeuristicConfig;
/// use u_timetable::models::*;
/// use u_timetable::scheduler::{GreedyScheduler, Problem, TimetableRequest};
///
/// let mut catalog = Catalog::new();
/// catalog.teachers = vec![Teacher::new("t1")];
/// catalog.groups = vec![Group::new("g1", 20).with_specialty("cs")];
/// catalog.subjects = vec![Subject::new("math")];
/// catalog.rooms = vec![Room::new("r1", "hall", 30)];
/// catalog.time_slots = vec![TimeSlot::new("ts1", "08:30")];
/// catalog.plans = vec![CurriculumPlan::new("p", "cs")
///     .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(2, 0, 0))];
/// catalog.teacher_subject_links =
///     vec![TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture])];
///
/// let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
/// let config = HeuristicConfig::new(DateWindow::new(monday, monday));
/// let problem = Problem::prepare(&TimetableRequest::new(&catalog, &config)).unwrap();
///
/// let attempt = GreedyScheduler::new().run(&problem, None::<&mut rand_chacha::ChaCha8Rng>);
/// assert_eq!(attempt.sessions.len(), 1);
/// assert!(attempt.unplaced.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct GreedyScheduler {
    priority: PriorityEngine,
    /// Upper bound of the priority noise in randomised attempts.
    jitter: f64,
}

impl GreedyScheduler {
    /// Creates a scheduler with the standard priority engine.
    pub fn new() -> Self {
        Self {
            priority: PriorityEngine::standard(),
            jitter: 60.0,
        }
    }

    /// Replaces the priority engine.
    pub fn with_priority_engine(mut self, engine: PriorityEngine) -> Self {
        self.priority = engine;
        self
    }

    /// Sets the priority noise amplitude for randomised attempts.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Runs one greedy pass over the problem's demands.
    ///
    /// Without an rng the pass is fully deterministic.
    pub fn run<R: Rng + ?Sized>(&self, problem: &Problem<'_>, mut rng: Option<&mut R>) -> Attempt {
        let demands = &problem.pool.demands;
        let context = PriorityContext::new(&problem.index);
        let order = match rng.as_deref_mut() {
            Some(r) => self
                .priority
                .sort_indices_jittered(demands, &context, r, self.jitter),
            None => self.priority.sort_indices(demands, &context),
        };

        let evaluator = problem.evaluator();
        let mut ledger = problem.ledger.clone();
        let mut attempt = Attempt::default();

        for i in order {
            let demand = &demands[i];
            let rooms = suitable_rooms(problem, demand);
            if rooms.is_empty() {
                debug!(event = "demand_unplaced", uid = %demand.uid, reason = %UnplacedReason::NoSuitableRoom);
                attempt.unplaced.push(UnplacedDemand {
                    demand: demand.clone(),
                    reason: UnplacedReason::NoSuitableRoom,
                });
                continue;
            }

            match best_candidate(problem, &evaluator, demand, &rooms, &ledger, rng.as_deref_mut()) {
                Some(choice) => {
                    let placement = Placement {
                        demand: i,
                        day: choice.day,
                        slot: choice.slot,
                        room: choice.room,
                    };
                    attempt.total_cost += choice.cost;
                    attempt.sessions.extend(commit(problem, &placement, &mut ledger));
                    attempt.placements.push(placement);
                }
                None => {
                    debug!(event = "demand_unplaced", uid = %demand.uid, reason = %UnplacedReason::NoFeasibleSlot);
                    attempt.unplaced.push(UnplacedDemand {
                        demand: demand.clone(),
                        reason: UnplacedReason::NoFeasibleSlot,
                    });
                }
            }
        }
        attempt
    }
}

impl Default for GreedyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Indices of the problem's rooms that pass the demand's room checks.
pub(super) fn suitable_rooms(problem: &Problem<'_>, demand: &ClassDemand) -> Vec<usize> {
    problem
        .rooms
        .iter()
        .enumerate()
        .filter(|(_, r)| problem.index.room_fits(demand, r))
        .map(|(i, _)| i)
        .collect()
}

/// Cheapest feasible candidate, ties broken by order or by the rng.
fn best_candidate<R: Rng + ?Sized>(
    problem: &Problem<'_>,
    evaluator: &SlotCostEvaluator<'_>,
    demand: &ClassDemand,
    rooms: &[usize],
    ledger: &BookingLedger,
    mut rng: Option<&mut R>,
) -> Option<Choice> {
    let mut best: Option<Choice> = None;
    let mut ties = 0u32;
    let scorer = evaluator.for_demand(demand, ledger);

    for (d, PlanningDay { date, slots }) in problem.days.iter().enumerate() {
        let day = scorer.on(*date);
        for slot in slots {
            for &r in rooms {
                let cand = Candidate {
                    date: *date,
                    slot: slot.position,
                    slot_id: slot.standard_id,
                    room: problem.rooms[r],
                };
                let Some(cost) = day.evaluate(&cand).cost() else {
                    continue;
                };
                let choice = Choice {
                    day: d,
                    slot: slot.position,
                    room: r,
                    cost,
                };
                match best {
                    Some(b) if cost > b.cost + COST_EPSILON => {}
                    Some(b) if cost >= b.cost - COST_EPSILON => {
                        // Reservoir sampling over the tied candidates
                        ties += 1;
                        if let Some(r) = rng.as_deref_mut() {
                            if r.random_range(0..ties) == 0 {
                                best = Some(choice);
                            }
                        }
                    }
                    _ => {
                        best = Some(choice);
                        ties = 1;
                    }
                }
            }
        }
    }
    best
}

/// Books the placement's resources.
pub(super) fn book(problem: &Problem<'_>, placement: &Placement, ledger: &mut BookingLedger) {
    let demand = &problem.pool.demands[placement.demand];
    let room: &Room = problem.rooms[placement.room];
    ledger.book_session(
        problem.days[placement.day].date,
        BookedSession {
            slot: placement.slot,
            teacher_id: demand.teacher_id.clone(),
            group_ids: demand.group_ids().to_vec(),
            subgroup_id: demand.subgroup_id().map(str::to_string),
            subject_id: demand.subject_id.clone(),
            room_id: room.id.clone(),
            class_type: demand.class_type,
            department_ids: problem.index.departments(&demand.teacher_id, demand.group_ids()),
        },
    );
}

/// Books the placement and emits the sessions it stands for.
///
/// A multi-group demand yields one session per member group.
pub(super) fn commit(problem: &Problem<'_>, placement: &Placement, ledger: &mut BookingLedger) -> Vec<PlacedSession> {
    book(problem, placement, ledger);
    let demand = &problem.pool.demands[placement.demand];
    let day = &problem.days[placement.day];
    let slot_id = day.slots[placement.slot].id;
    let room: &Room = problem.rooms[placement.room];

    let session = |group_id: &str| {
        PlacedSession::new(
            format!("sched-{}-{}", demand.uid, group_id),
            day.date,
            slot_id,
            &room.id,
            &demand.teacher_id,
            &demand.subject_id,
            demand.class_type,
        )
        .with_group(group_id)
        .with_source(&demand.uid)
    };

    match &demand.target {
        DemandTarget::Groups { group_ids, stream_id } => group_ids
            .iter()
            .map(|g| {
                let s = session(g).with_groups(group_ids.clone());
                match stream_id {
                    Some(stream) => s.with_stream(stream),
                    None => s,
                }
            })
            .collect(),
        DemandTarget::Subgroup { group_id, subgroup_id } => {
            vec![session(group_id).with_subgroup(subgroup_id)]
        }
        DemandTarget::Group { group_id } => vec![session(group_id)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeuristicConfig;
    use crate::models::{
        AttestationKind, Availability, AvailabilityGrid, Catalog, ClassType, CurriculumPlan, DateWindow, Day,
        Group, PlanEntry, RoomType, Stream, Subgroup, Subject, Teacher, TeacherSubjectLink, TimeSlot,
    };
    use crate::scheduler::TimetableRequest;
    use crate::validation::audit_sessions;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn monday_only() -> HeuristicConfig {
        HeuristicConfig::new(DateWindow::new(date(2), date(2)))
    }

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.teachers = vec![Teacher::new("t1"), Teacher::new("t2")];
        c.groups = vec![
            Group::new("g1", 25).with_specialty("cs"),
            Group::new("g2", 25).with_specialty("cs"),
        ];
        c.subjects = vec![Subject::new("math")];
        c.rooms = vec![Room::new("r1", "hall", 30), Room::new("big", "hall", 60)];
        c.time_slots = vec![
            TimeSlot::new("ts1", "08:30"),
            TimeSlot::new("ts2", "10:10"),
            TimeSlot::new("ts3", "11:50"),
        ];
        c.teacher_subject_links = vec![TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture])];
        c
    }

    fn plan(lecture: u32, practical: u32, lab: u32) -> CurriculumPlan {
        CurriculumPlan::new("p", "cs")
            .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(lecture, practical, lab))
    }

    fn run(c: &Catalog, config: &HeuristicConfig) -> Attempt {
        let problem = Problem::prepare(&TimetableRequest::new(c, config)).unwrap();
        GreedyScheduler::new().run(&problem, None::<&mut ChaCha8Rng>)
    }

    #[test]
    fn test_shared_stream_lecture() {
        let mut c = make_catalog();
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
        c.plans = vec![plan(2, 0, 0)];
        let attempt = run(&c, &monday_only());

        assert!(attempt.unplaced.is_empty());
        assert_eq!(attempt.sessions.len(), 2);
        let a = &attempt.sessions[0];
        let b = &attempt.sessions[1];
        assert_eq!((a.date, &a.time_slot_id, &a.room_id), (b.date, &b.time_slot_id, &b.room_id));
        // 50 students only fit the big room
        assert_eq!(a.room_id, "big");
        assert_eq!(a.stream_id.as_deref(), Some("s1"));
        assert_eq!(a.group_ids.as_ref().map(Vec::len), Some(2));
        assert_ne!(a.id, b.id);
        assert_eq!(a.unscheduled_uid, b.unscheduled_uid);
        assert!(audit_sessions(&c, &attempt.sessions).is_empty());
        // One placement stands for both copies
        assert_eq!(attempt.placements.len(), 1);
    }

    #[test]
    fn test_unplaced_reasons() {
        let mut c = make_catalog();
        c.groups[0].student_count = 100;
        c.groups.truncate(1);
        c.plans = vec![plan(2, 0, 0)];
        let attempt = run(&c, &monday_only());
        assert!(attempt.sessions.is_empty());
        assert_eq!(attempt.unplaced[0].reason, UnplacedReason::NoSuitableRoom);

        // Four lectures, three slots, one teacher
        let mut c = make_catalog();
        c.groups.truncate(1);
        c.plans = vec![plan(8, 0, 0)];
        let attempt = run(&c, &monday_only());
        assert_eq!(attempt.sessions.len(), 3);
        assert_eq!(attempt.unplaced.len(), 1);
        assert_eq!(attempt.unplaced[0].reason, UnplacedReason::NoFeasibleSlot);
        assert!(audit_sessions(&c, &attempt.sessions).is_empty());
    }

    #[test]
    fn test_subgroup_sessions() {
        let mut c = make_catalog();
        c.groups.truncate(1);
        c.subgroups = vec![Subgroup::new("g1-a", "g1", 12), Subgroup::new("g1-b", "g1", 13)];
        c.plans = vec![CurriculumPlan::new("p", "cs")
            .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(0, 0, 2).split())];
        c.teacher_subject_links = vec![TeacherSubjectLink::new("t2", "math", vec![ClassType::Lab])];
        let attempt = run(&c, &monday_only());

        assert_eq!(attempt.sessions.len(), 2);
        for s in &attempt.sessions {
            assert_eq!(s.group_id.as_deref(), Some("g1"));
            assert!(s.subgroup_id.is_some());
        }
        // Parent group is occupied by both, so they cannot share a slot
        assert_ne!(attempt.sessions[0].time_slot_id, attempt.sessions[1].time_slot_id);
        assert!(audit_sessions(&c, &attempt.sessions).is_empty());
    }

    #[test]
    fn test_forbidden_slot_avoided() {
        let mut c = make_catalog();
        c.groups.truncate(1);
        c.plans = vec![plan(2, 0, 0)];
        c.teachers[0].availability_grid = Some(
            AvailabilityGrid::new()
                .with(Day::Monday, "ts1", Availability::Forbidden)
                .with(Day::Monday, "ts3", Availability::Desirable),
        );
        let attempt = run(&c, &monday_only());
        assert_eq!(attempt.sessions[0].time_slot_id, "ts3");
    }

    #[test]
    fn test_forbidden_only_slot() {
        let mut c = make_catalog();
        c.groups.truncate(1);
        c.time_slots.truncate(1);
        c.plans = vec![plan(2, 0, 0)];
        c.teachers[0].availability_grid =
            Some(AvailabilityGrid::new().with(Day::Monday, "ts1", Availability::Forbidden));
        let attempt = run(&c, &monday_only());
        assert!(attempt.sessions.is_empty());
        assert_eq!(attempt.unplaced[0].reason, UnplacedReason::NoFeasibleSlot);

        c.settings.allow_manual_override_of_forbidden = true;
        let attempt = run(&c, &monday_only());
        assert_eq!(attempt.sessions.len(), 1);
        assert_eq!(attempt.sessions[0].time_slot_id, "ts1");
    }

    #[test]
    fn test_lab_takes_room_that_fits() {
        let mut c = make_catalog();
        c.groups = vec![Group::new("g1", 20).with_specialty("cs")];
        c.room_types = vec![RoomType::new("lab", "Lab"), RoomType::new("hall", "Hall")];
        c.rooms = vec![
            Room::new("lab15", "lab", 15),
            Room::new("hall", "hall", 60),
            Room::new("lab25", "lab", 25),
        ];
        c.subjects = vec![Subject::new("math").with_room_types(ClassType::Lab, vec!["lab".into()])];
        c.teacher_subject_links = vec![TeacherSubjectLink::new("t2", "math", vec![ClassType::Lab])];
        c.plans = vec![plan(0, 0, 2)];
        let attempt = run(&c, &monday_only());

        assert!(attempt.unplaced.is_empty());
        assert_eq!(attempt.sessions.len(), 1);
        assert_eq!(attempt.sessions[0].room_id, "lab25");
    }

    #[test]
    fn test_deterministic_and_seeded() {
        let mut c = make_catalog();
        c.plans = vec![plan(4, 4, 0)];
        c.teacher_subject_links = vec![
            TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture]),
            TeacherSubjectLink::new("t2", "math", vec![ClassType::Practical]),
        ];
        let config = HeuristicConfig::new(DateWindow::new(date(2), date(4)));
        let problem = Problem::prepare(&TimetableRequest::new(&c, &config)).unwrap();
        let greedy = GreedyScheduler::new();

        let a = greedy.run(&problem, None::<&mut ChaCha8Rng>);
        let b = greedy.run(&problem, None::<&mut ChaCha8Rng>);
        assert_eq!(a.sessions, b.sessions);

        let x = greedy.run(&problem, Some(&mut ChaCha8Rng::seed_from_u64(11)));
        let y = greedy.run(&problem, Some(&mut ChaCha8Rng::seed_from_u64(11)));
        assert_eq!(x.sessions, y.sessions);
        assert!(audit_sessions(&c, &x.sessions).is_empty());
    }

    #[test]
    fn test_attempt_ordering() {
        let target = DemandTarget::Group { group_id: "g1".into() };
        let demand = ClassDemand::new("math", ClassType::Lecture, "t1", 10, target, 0);
        let one_unplaced = Attempt {
            unplaced: vec![UnplacedDemand {
                demand,
                reason: UnplacedReason::NoFeasibleSlot,
            }],
            total_cost: 0.0,
            ..Default::default()
        };
        let cheap = Attempt {
            total_cost: 10.0,
            ..Default::default()
        };
        let dear = Attempt {
            total_cost: 20.0,
            ..Default::default()
        };
        assert!(cheap.is_better_than(&one_unplaced));
        assert!(cheap.is_better_than(&dear));
        assert!(!dear.is_better_than(&cheap));
        assert!(!cheap.is_better_than(&cheap.clone()));
    }
}
