//! Run preparation shared by every attempt.
//!
//! Validates the request, resolves the planning horizon (working days and
//! the slot catalog active on each), seeds the booking ledger from the
//! sessions that survive the run, and generates the demand pool. Every
//! attempt then starts from a clone of the seeded ledger.

use chrono::NaiveDate;
use tracing::info;

use crate::config::{HeuristicConfig, TargetKind};
use crate::cost::{CostWeights, SlotCostEvaluator};
use crate::error::{Result, TimetableError};
use crate::ledger::BookingLedger;
use crate::models::{Catalog, CatalogIndex, PlacedSession, Room, WorkCalendar};
use crate::pool::DemandPool;
use crate::validation::validate_catalog;

/// Input of a semester timetabling run.
#[derive(Debug, Clone, Copy)]
pub struct TimetableRequest<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a HeuristicConfig,
    /// Sessions already in the schedule.
    pub existing: &'a [PlacedSession],
}

impl<'a> TimetableRequest<'a> {
    /// Creates a request with no existing sessions.
    pub fn new(catalog: &'a Catalog, config: &'a HeuristicConfig) -> Self {
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

/// One slot of a planning day.
#[derive(Debug, Clone, Copy)]
pub struct SlotRef<'a> {
    /// Position in the day's active catalog.
    pub position: usize,
    /// Id in the day's active catalog (written to sessions).
    pub id: &'a str,
    /// Standard-catalog id at the same position (keys grids and rules).
    pub standard_id: &'a str,
}

/// A working day of the window with its active slots.
#[derive(Debug, Clone)]
pub struct PlanningDay<'a> {
    pub date: NaiveDate,
    pub slots: Vec<SlotRef<'a>>,
}

/// A validated, seeded run.
#[derive(Debug, Clone)]
pub struct Problem<'a> {
    pub index: CatalogIndex<'a>,
    pub config: &'a HeuristicConfig,
    pub pool: DemandPool,
    pub days: Vec<PlanningDay<'a>>,
    /// Rooms any demand may use (one room under a classroom target).
    pub rooms: Vec<&'a Room>,
    /// Ledger seeded with the retained sessions.
    pub ledger: BookingLedger,
    pub weights: CostWeights,
}

impl<'a> Problem<'a> {
    /// Validates the request and prepares the run.
    ///
    /// # Errors
    /// - `InvalidConfig` for out-of-range settings, an empty slot catalog
    ///   or a window without working days.
    /// - `InconsistentCatalog` for unresolved references or duplicate ids.
    pub fn prepare(request: &TimetableRequest<'a>) -> Result<Self> {
        let TimetableRequest {
            catalog,
            config,
            existing,
        } = *request;

        config.validate()?;
        validate_catalog(catalog)?;
        if catalog.time_slots.is_empty() {
            return Err(TimetableError::InvalidConfig("time slot catalog is empty".into()));
        }

        let calendar = WorkCalendar::new(catalog);
        let days: Vec<PlanningDay<'a>> = calendar
            .working_days(&config.time_frame)
            .into_iter()
            .map(|date| PlanningDay {
                date,
                slots: calendar
                    .slots_for(date)
                    .iter()
                    .enumerate()
                    .map(|(position, slot)| SlotRef {
                        position,
                        id: slot.id.as_str(),
                        standard_id: calendar.standard_slot_id(position).unwrap_or(slot.id.as_str()),
                    })
                    .collect(),
            })
            .collect();
        if days.is_empty() {
            return Err(TimetableError::InvalidConfig(format!(
                "no working day between {} and {}",
                config.time_frame.start, config.time_frame.end
            )));
        }

        let retained: Vec<PlacedSession> = existing
            .iter()
            .filter(|s| !(config.clear_existing && config.time_frame.contains(s.date) && !s.is_attestation()))
            .cloned()
            .collect();
        let index = CatalogIndex::new(catalog);
        let mut ledger = BookingLedger::new(catalog.settings.overbooking_limit());
        ledger.seed(&retained, &calendar, &index);

        let mut pool = DemandPool::generate(catalog, config.semester);
        if let Some(target) = &config.target {
            pool = pool.restrict_to(target, &index);
        }
        let pool = pool.skip_satisfied(&retained);

        let rooms: Vec<&'a Room> = match &config.target {
            Some(t) if t.kind == TargetKind::Classroom => index.room(&t.id).into_iter().collect(),
            _ => catalog.rooms.iter().collect(),
        };

        let problem = Self {
            index,
            config,
            pool,
            days,
            rooms,
            ledger,
            weights: CostWeights::default(),
        };
        info!(
            event = "timetable_prepared",
            demands = problem.pool.len(),
            unresolvable = problem.pool.unresolvable.len(),
            working_days = problem.days.len(),
            horizon_slots = problem.horizon_slots(),
            retained = retained.len()
        );
        Ok(problem)
    }

    /// Replaces the cost weights.
    pub fn with_weights(mut self, weights: CostWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Number of `(date, slot)` pairs in the horizon.
    pub fn horizon_slots(&self) -> usize {
        self.days.iter().map(|d| d.slots.len()).sum()
    }

    /// Cost evaluator configured for this run.
    pub fn evaluator(&self) -> SlotCostEvaluator<'_> {
        SlotCostEvaluator::new(&self.index)
            .with_weights(self.weights.clone())
            .with_strictness_factor(self.config.strictness_factor())
    }
}
