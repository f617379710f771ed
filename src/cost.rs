//! Slot cost evaluator.
//!
//! Scores one candidate `(date, slot, room)` for one demand against the
//! current ledger. A candidate is either rejected by a hard constraint or
//! feasible with a soft cost; lower is better and costs may be negative.
//!
//! # Hard constraints
//! - teacher, involved groups, subgroup or room at the overbooking limit
//! - room capacity, type or tag mismatch
//! - Forbidden availability (unless the override setting is on)
//! - violated Strict rules (`MinPerDay` excepted, it is scored as Strong)
//!
//! # Ordering
//! Default weights keep: isolated session > overload > pin mismatch >
//! availability and rule penalties. The total soft cost is multiplied by
//! `strictness / 5`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::Settings;
use crate::ledger::{BookingLedger, ResourceKind, SlotKey};
use crate::models::{
    availability_of, Availability, AvailabilityGrid, CatalogIndex, ClassDemand, Day, Room, Rule, RuleAction,
    RuleSeverity, SessionFacts,
};

/// Soft-cost weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Per Undesirable cell of teacher, group, subgroup or room.
    pub undesirable: f64,
    /// Per Desirable cell (subtracted).
    pub desirable: f64,
    /// Per pin holder whose pinned room is another room.
    pub pin_mismatch: f64,
    /// Per pin holder whose pinned room is this room (subtracted).
    pub pin_match: f64,
    /// Per resource left without an adjacent session on a busy day.
    pub isolated: f64,
    /// Per resource with a neighbour on one side and a gap on the other.
    pub one_sided_gap: f64,
    /// Per involved group that already has the subject that day.
    pub same_subject: f64,
    /// Per session beyond `overload_threshold` on a day.
    pub overload: f64,
    pub overload_threshold: u32,
    pub rule_strong: f64,
    pub rule_medium: f64,
    pub rule_weak: f64,
    pub saturday: f64,
    /// Forbidden slot accepted under the override setting.
    pub forbidden_override: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            undesirable: 20.0,
            desirable: 10.0,
            pin_mismatch: 50.0,
            pin_match: 100.0,
            isolated: 400.0,
            one_sided_gap: 200.0,
            same_subject: 75.0,
            overload: 100.0,
            overload_threshold: 3,
            rule_strong: 40.0,
            rule_medium: 25.0,
            rule_weak: 10.0,
            saturday: 25.0,
            forbidden_override: 500.0,
        }
    }
}

impl CostWeights {
    fn severity(&self, severity: RuleSeverity) -> f64 {
        match severity {
            RuleSeverity::Strict | RuleSeverity::Strong => self.rule_strong,
            RuleSeverity::Medium => self.rule_medium,
            RuleSeverity::Weak => self.rule_weak,
        }
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TeacherBusy,
    GroupBusy(String),
    SubgroupBusy,
    RoomBusy,
    RoomUnsuitable,
    Forbidden,
    StrictRule(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TeacherBusy => f.write_str("teacher busy"),
            RejectReason::GroupBusy(g) => write!(f, "group {g} busy"),
            RejectReason::SubgroupBusy => f.write_str("subgroup busy"),
            RejectReason::RoomBusy => f.write_str("classroom busy"),
            RejectReason::RoomUnsuitable => f.write_str("classroom unsuitable"),
            RejectReason::Forbidden => f.write_str("forbidden slot"),
            RejectReason::StrictRule(id) => write!(f, "strict rule {id} violated"),
        }
    }
}

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotCost {
    Rejected(RejectReason),
    Feasible(f64),
}

impl SlotCost {
    /// Cost of a feasible candidate.
    pub fn cost(&self) -> Option<f64> {
        match self {
            SlotCost::Feasible(c) => Some(*c),
            SlotCost::Rejected(_) => None,
        }
    }
}

/// A `(date, slot, room)` candidate.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub date: NaiveDate,
    /// Position in the day's active slot catalog.
    pub slot: usize,
    /// Standard-catalog slot id at that position (grids and rules key on it).
    pub slot_id: &'a str,
    pub room: &'a Room,
}

/// Scores candidates for demands.
///
/// Scoring is split in two levels so a scan over the horizon does each
/// piece of work once: [`SlotCostEvaluator::for_demand`] resolves what
/// depends only on the demand and the ledger, [`DemandCost::on`] buckets
/// the day's booked sessions per rule, and [`DayCost::evaluate`] scores a
/// single `(slot, room)`.
#[derive(Debug, Clone)]
pub struct SlotCostEvaluator<'a> {
    index: &'a CatalogIndex<'a>,
    settings: &'a Settings,
    rules: &'a [Rule],
    weights: CostWeights,
    strictness: f64,
}

impl<'a> SlotCostEvaluator<'a> {
    /// Creates an evaluator with default weights and neutral strictness.
    pub fn new(index: &'a CatalogIndex<'a>) -> Self {
        let catalog = index.catalog;
        Self {
            index,
            settings: &catalog.settings,
            rules: &catalog.rules,
            weights: CostWeights::default(),
            strictness: 1.0,
        }
    }

    /// Sets the weights.
    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the soft-cost multiplier (`strictness / 5`).
    pub fn with_strictness_factor(mut self, factor: f64) -> Self {
        self.strictness = factor;
        self
    }

    /// Whether the room passes capacity, type and tag checks for the demand.
    pub fn room_suits(&self, demand: &ClassDemand, room: &Room) -> bool {
        self.index.room_fits(demand, room)
    }

    /// Evaluates a single candidate.
    pub fn evaluate(&self, demand: &ClassDemand, cand: &Candidate<'_>, ledger: &BookingLedger) -> SlotCost {
        self.for_demand(demand, ledger).on(cand.date).evaluate(cand)
    }

    /// Resolves the demand-level inputs against the current ledger.
    pub fn for_demand<'d>(&'d self, demand: &'d ClassDemand, ledger: &'d BookingLedger) -> DemandCost<'d, 'a> {
        let departments = self.index.departments(&demand.teacher_id, demand.group_ids());

        let mut grids = vec![self
            .index
            .teacher(&demand.teacher_id)
            .and_then(|t| t.availability_grid.as_ref())];
        grids.extend(
            demand
                .group_ids()
                .iter()
                .map(|g| self.index.group(g).and_then(|g| g.availability_grid.as_ref())),
        );
        if let Some(sg) = demand.subgroup_id() {
            grids.push(self.index.subgroup(sg).and_then(|s| s.availability_grid.as_ref()));
        }
        grids.retain(Option::is_some);

        let mut pins = vec![
            self.index
                .teacher(&demand.teacher_id)
                .and_then(|t| t.pinned_room_id.as_deref()),
            self.index
                .subject(&demand.subject_id)
                .and_then(|s| s.pinned_room_id.as_deref()),
        ];
        pins.extend(
            demand
                .group_ids()
                .iter()
                .map(|g| self.index.group(g).and_then(|g| g.pinned_room_id.as_deref())),
        );
        if let Some(sg) = demand.subgroup_id() {
            pins.push(self.index.subgroup(sg).and_then(|s| s.pinned_room_id.as_deref()));
        }

        // SameDay looks past the current day: one scan per demand.
        let anywhere = self
            .rules
            .iter()
            .map(|rule| {
                if rule.action != RuleAction::SameDay {
                    return (false, false);
                }
                ledger.all_sessions().fold((false, false), |(a, b), (_, s)| {
                    let (sa, sb) = rule.sides(&s.facts());
                    (a || sa, b || sb)
                })
            })
            .collect();

        DemandCost {
            eval: self,
            demand,
            ledger,
            departments,
            grids,
            pins: pins.into_iter().flatten().collect(),
            anywhere,
        }
    }

    fn overload_cost(&self, load_before: u32) -> f64 {
        let load = load_before + 1;
        let excess = load.saturating_sub(self.weights.overload_threshold);
        f64::from(excess) * self.weights.overload
    }
}

/// Demand-level scoring state, valid while the ledger is unchanged.
#[derive(Debug)]
pub struct DemandCost<'d, 'a> {
    eval: &'d SlotCostEvaluator<'a>,
    demand: &'d ClassDemand,
    ledger: &'d BookingLedger,
    departments: Vec<String>,
    /// Teacher, group and subgroup grids (room grids vary per candidate).
    grids: Vec<Option<&'a AvailabilityGrid>>,
    pins: Vec<&'a str>,
    /// Per rule: whether side A and side B sessions exist on any date.
    anywhere: Vec<(bool, bool)>,
}

/// Sessions of one first-condition entity on a day.
#[derive(Debug, Default)]
struct EntityDay {
    /// Every selected session, overbooked ones included.
    count: u32,
    /// Distinct slot positions, ascending.
    slots: Vec<usize>,
}

/// Per-rule view of the day's booked sessions.
#[derive(Debug)]
enum RuleDay<'a> {
    Unused,
    /// Keyed by first-condition entity; `None` holds sessions the rule
    /// selects through its other conditions only.
    PerEntity(HashMap<Option<&'a str>, EntityDay>),
    Sides { a: Vec<usize>, b: Vec<usize> },
}

fn is_day_limit(action: RuleAction) -> bool {
    matches!(
        action,
        RuleAction::MaxPerDay
            | RuleAction::MinPerDay
            | RuleAction::Consecutive
            | RuleAction::MaxConsecutive
            | RuleAction::AtMostNGaps
    )
}

fn entity_keys<'a>(rule: &'a Rule, facts: &SessionFacts<'_>) -> Vec<Option<&'a str>> {
    let ids = rule.limited_entities(facts);
    if ids.is_empty() {
        vec![None]
    } else {
        ids.into_iter().map(Some).collect()
    }
}

impl<'d, 'a> DemandCost<'d, 'a> {
    /// Prepares scoring for one date.
    pub fn on(&self, date: NaiveDate) -> DayCost<'_, 'a> {
        let eval = self.eval;
        let w = &eval.weights;
        let ledger = self.ledger;
        let demand = self.demand;
        let groups = demand.group_ids();
        let day = Day::of(date);

        let mut base = 0.0;
        for g in groups {
            if ledger.subject_count(ResourceKind::Group, g, date, &demand.subject_id) > 0 {
                base += w.same_subject;
            }
        }
        base += eval.overload_cost(ledger.day_load(ResourceKind::Teacher, &demand.teacher_id, date));
        for g in groups {
            base += eval.overload_cost(ledger.day_load(ResourceKind::Group, g, date));
        }
        if day == Day::Saturday {
            base += w.saturday;
        }

        let windows = if eval.settings.allow_windows {
            Vec::new()
        } else {
            std::iter::once(ledger.occupied_slots(ResourceKind::Teacher, &demand.teacher_id, date))
                .chain(groups.iter().map(|g| ledger.occupied_slots(ResourceKind::Group, g, date)))
                .filter(|slots| !slots.is_empty())
                .collect()
        };

        let sessions = ledger.sessions_on(date);
        let rules = eval
            .rules
            .iter()
            .map(|rule| {
                if rule.action.is_pairwise() {
                    let mut a = Vec::new();
                    let mut b = Vec::new();
                    for s in sessions {
                        let (sa, sb) = rule.sides(&s.facts());
                        if sa {
                            a.push(s.slot);
                        }
                        if sb {
                            b.push(s.slot);
                        }
                    }
                    RuleDay::Sides { a, b }
                } else if is_day_limit(rule.action) {
                    let mut entities: HashMap<Option<&'a str>, EntityDay> = HashMap::new();
                    for s in sessions {
                        let facts = s.facts();
                        if !rule.selects(&facts) {
                            continue;
                        }
                        for key in entity_keys(rule, &facts) {
                            let e = entities.entry(key).or_default();
                            e.count += 1;
                            if let Err(at) = e.slots.binary_search(&s.slot) {
                                e.slots.insert(at, s.slot);
                            }
                        }
                    }
                    RuleDay::PerEntity(entities)
                } else {
                    RuleDay::Unused
                }
            })
            .collect();

        DayCost {
            demand: self,
            date,
            day,
            base,
            windows,
            rules,
        }
    }
}

/// Day-level scoring state of one demand.
#[derive(Debug)]
pub struct DayCost<'d, 'a> {
    demand: &'d DemandCost<'d, 'a>,
    date: NaiveDate,
    day: Day,
    /// Same-subject, overload and Saturday terms.
    base: f64,
    /// Occupied slots of the teacher and each group, busy days only.
    windows: Vec<Vec<usize>>,
    rules: Vec<RuleDay<'a>>,
}

impl DayCost<'_, '_> {
    /// Evaluates a candidate on this day.
    pub fn evaluate(&self, cand: &Candidate<'_>) -> SlotCost {
        let dc = self.demand;
        let eval = dc.eval;
        let ledger = dc.ledger;
        let demand = dc.demand;
        let key = SlotKey::new(self.date, cand.slot);

        if !ledger.is_free(ResourceKind::Teacher, &demand.teacher_id, key) {
            return SlotCost::Rejected(RejectReason::TeacherBusy);
        }
        if let Some(g) = demand
            .group_ids()
            .iter()
            .find(|g| !ledger.is_free(ResourceKind::Group, g, key))
        {
            return SlotCost::Rejected(RejectReason::GroupBusy(g.clone()));
        }
        if demand
            .subgroup_id()
            .is_some_and(|sg| !ledger.is_free(ResourceKind::Subgroup, sg, key))
        {
            return SlotCost::Rejected(RejectReason::SubgroupBusy);
        }
        if !ledger.is_free(ResourceKind::Room, &cand.room.id, key) {
            return SlotCost::Rejected(RejectReason::RoomBusy);
        }
        if !eval.room_suits(demand, cand.room) {
            return SlotCost::Rejected(RejectReason::RoomUnsuitable);
        }

        let w = &eval.weights;
        let mut cost = self.base;

        // Availability
        let mut forbidden = false;
        let room_grid = cand.room.availability_grid.as_ref();
        for grid in dc.grids.iter().copied().chain(std::iter::once(room_grid)) {
            match availability_of(grid, self.day, cand.slot_id) {
                Availability::Forbidden => forbidden = true,
                Availability::Undesirable => cost += w.undesirable,
                Availability::Desirable => cost -= w.desirable,
                Availability::Allowed => {}
            }
        }
        if forbidden {
            if !eval.settings.allow_manual_override_of_forbidden {
                return SlotCost::Rejected(RejectReason::Forbidden);
            }
            cost += w.forbidden_override;
        }

        match self.rule_cost(cand) {
            Ok(c) => cost += c,
            Err(reason) => return SlotCost::Rejected(reason),
        }

        // Pinned rooms
        for &pin in &dc.pins {
            if pin == cand.room.id {
                cost -= w.pin_match;
            } else {
                cost += w.pin_mismatch;
            }
        }

        for occupied in &self.windows {
            cost += window_cost(w, occupied, cand.slot);
        }

        SlotCost::Feasible(cost * eval.strictness)
    }

    /// Soft cost of non-strict rule violations, or the strict rule that rejects.
    fn rule_cost(&self, cand: &Candidate<'_>) -> Result<f64, RejectReason> {
        let dc = self.demand;
        let eval = dc.eval;
        if eval.rules.is_empty() {
            return Ok(0.0);
        }
        let demand = dc.demand;
        let facts = SessionFacts {
            teacher_id: &demand.teacher_id,
            group_ids: demand.group_ids(),
            subgroup_id: demand.subgroup_id(),
            subject_id: &demand.subject_id,
            room_id: &cand.room.id,
            class_type: demand.class_type,
            department_ids: &dc.departments,
        };

        let mut cost = 0.0;
        for (i, rule) in eval.rules.iter().enumerate() {
            if !self.violates(i, rule, &facts, cand) {
                continue;
            }
            let softened = rule.action == RuleAction::MinPerDay;
            if rule.severity == RuleSeverity::Strict && !softened {
                return Err(RejectReason::StrictRule(rule.id.clone()));
            }
            cost += eval.weights.severity(rule.severity);
        }
        Ok(cost)
    }

    fn violates(&self, i: usize, rule: &Rule, facts: &SessionFacts<'_>, cand: &Candidate<'_>) -> bool {
        match &self.rules[i] {
            RuleDay::Sides { a, b } => return self.violates_pairwise(i, rule, facts, cand, a, b),
            RuleDay::PerEntity(entities) => {
                if !rule.selects(facts) {
                    return false;
                }
                let empty = EntityDay::default();
                return entity_keys(rule, facts)
                    .into_iter()
                    .any(|key| violates_day_limit(rule, entities.get(&key).unwrap_or(&empty), cand.slot));
            }
            RuleDay::Unused => {}
        }
        if !rule.selects(facts) {
            return false;
        }
        let day = self.day;
        match rule.action {
            RuleAction::AvoidTime => rule.matches_time(day, cand.slot_id),
            RuleAction::RequireTime | RuleAction::PreferTime => !rule.matches_time(day, cand.slot_id),
            RuleAction::StartAfter | RuleAction::EndBefore => {
                if rule.day.is_some_and(|d| d != day) {
                    return false;
                }
                let Some(bound) = rule
                    .time_slot_id
                    .as_deref()
                    .and_then(|id| self.demand.eval.index.catalog.time_slots.iter().position(|s| s.id == id))
                else {
                    return false;
                };
                if rule.action == RuleAction::StartAfter {
                    cand.slot < bound
                } else {
                    cand.slot > bound
                }
            }
            _ => false,
        }
    }

    fn violates_pairwise(
        &self,
        i: usize,
        rule: &Rule,
        facts: &SessionFacts<'_>,
        cand: &Candidate<'_>,
        side_a: &[usize],
        side_b: &[usize],
    ) -> bool {
        let (is_a, is_b) = rule.sides(facts);
        let (any_a, any_b) = self.demand.anywhere[i];

        let mut violated = false;
        // (candidate on this side, other side is A)
        for (mine, other_is_a) in [(is_a, false), (is_b, true)] {
            if !mine {
                continue;
            }
            let (others_today, others_anywhere) = if other_is_a { (side_a, any_a) } else { (side_b, any_b) };
            violated |= match rule.action {
                RuleAction::SameDay => others_today.is_empty() && others_anywhere,
                RuleAction::DifferentDay => !others_today.is_empty(),
                RuleAction::NoOverlap => others_today.contains(&cand.slot),
                // A must be strictly before B
                RuleAction::Order => {
                    if other_is_a {
                        others_today.iter().any(|&s| s >= cand.slot)
                    } else {
                        others_today.iter().any(|&s| s <= cand.slot)
                    }
                }
                _ => false,
            };
        }
        violated
    }
}

/// Per-day limit check for one entity's bucket.
fn violates_day_limit(rule: &Rule, entity: &EntityDay, slot: usize) -> bool {
    let slots = &entity.slots;
    match rule.action {
        RuleAction::MaxPerDay => rule.param.is_some_and(|n| entity.count + 1 > n),
        RuleAction::MinPerDay => rule.param.is_some_and(|n| n > 1 && entity.count == 0),
        RuleAction::Consecutive => !slots.is_empty() && !slots.iter().any(|&s| s + 1 == slot || s == slot + 1),
        RuleAction::MaxConsecutive => rule.param.is_some_and(|n| {
            let mut run = 1;
            let mut s = slot;
            while s > 0 && slots.binary_search(&(s - 1)).is_ok() {
                run += 1;
                s -= 1;
            }
            let mut s = slot;
            while slots.binary_search(&(s + 1)).is_ok() {
                run += 1;
                s += 1;
            }
            run > n
        }),
        RuleAction::AtMostNGaps => rule.param.is_some_and(|n| {
            let mut all = slots.clone();
            if let Err(at) = all.binary_search(&slot) {
                all.insert(at, slot);
            }
            let gaps: usize = all.windows(2).map(|w| w[1] - w[0] - 1).sum();
            gaps > n as usize
        }),
        _ => false,
    }
}

/// Window penalty of one resource whose day is already busy.
fn window_cost(w: &CostWeights, occupied: &[usize], slot: usize) -> f64 {
    let has = |s: usize| occupied.binary_search(&s).is_ok();
    let before = slot > 0 && has(slot - 1);
    let after = has(slot + 1);
    let earlier = occupied.iter().any(|&s| s < slot);
    let later = occupied.iter().any(|&s| s > slot);

    if !before && !after {
        w.isolated
    } else if (before && !after && later) || (after && !before && earlier) {
        w.one_sided_gap
    } else {
        0.0
    }
}
