//! Timetable quality metrics (KPIs).
//!
//! Computes placement and room-usage indicators from a finished run.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Placement Rate | Placed demands / demands that reached placement |
//! | Avg Room Fill | Mean students / capacity over physical sessions |
//! | Room Utilization | Booked `(date, slot)` pairs / horizon slots, per room |
//! | Avg Utilization | Mean room utilization over the catalog's rooms |

use std::collections::{HashMap, HashSet};

use super::TimetableResult;
use crate::models::{Catalog, CatalogIndex, PlacedSession};

/// Timetable performance indicators.
#[derive(Debug, Clone)]
pub struct TimetableKpi {
    /// Demands that reached placement (placed + unplaced).
    pub demand_count: usize,
    pub placed_count: usize,
    pub unplaced_count: usize,
    /// Required sessions without a teacher.
    pub unresolvable_count: usize,
    /// Fraction of demands placed (0.0..=1.0).
    pub placement_rate: f64,
    /// Mean seat occupancy of the rooms used (0.0..=1.0).
    pub avg_room_fill: f64,
    /// Average room utilization (0.0..=1.0).
    pub avg_utilization: f64,
    /// Per-room utilization.
    pub utilization_by_room: HashMap<String, f64>,
}

impl TimetableKpi {
    /// Computes KPIs from a run result and its catalog.
    pub fn calculate(result: &TimetableResult, catalog: &Catalog) -> Self {
        let index = CatalogIndex::new(catalog);
        let placed_count = result.placed_count();
        let unplaced_count = result.unplaced.len();
        let demand_count = placed_count + unplaced_count;

        let placement_rate = if demand_count == 0 {
            1.0
        } else {
            placed_count as f64 / demand_count as f64
        };

        // Per-group copies of a shared lecture are one physical session
        let mut physical: HashMap<&str, Vec<&PlacedSession>> = HashMap::new();
        for s in &result.sessions {
            let key = s.unscheduled_uid.as_deref().unwrap_or(s.id.as_str());
            physical.entry(key).or_default().push(s);
        }

        let fills: Vec<f64> = physical
            .values()
            .filter_map(|copies| {
                let first = copies.first()?;
                let room = index.room(&first.room_id)?;
                if room.capacity == 0 {
                    return None;
                }
                let students = match first.subgroup_id.as_deref().and_then(|id| index.subgroup(id)) {
                    Some(sg) => sg.student_count,
                    None => {
                        let groups: HashSet<&str> = copies
                            .iter()
                            .flat_map(|s| s.involved_groups())
                            .map(String::as_str)
                            .collect();
                        groups
                            .into_iter()
                            .filter_map(|g| index.group(g))
                            .map(|g| g.student_count)
                            .sum()
                    }
                };
                Some(f64::from(students) / f64::from(room.capacity))
            })
            .collect();
        let avg_room_fill = mean(&fills);

        let mut booked: HashMap<&str, HashSet<(chrono::NaiveDate, &str)>> = HashMap::new();
        for s in &result.sessions {
            booked
                .entry(s.room_id.as_str())
                .or_default()
                .insert((s.date, s.time_slot_id.as_str()));
        }
        let utilization_by_room: HashMap<String, f64> = catalog
            .rooms
            .iter()
            .map(|r| {
                let used = booked.get(r.id.as_str()).map_or(0, HashSet::len);
                let u = if result.horizon_slots == 0 {
                    0.0
                } else {
                    used as f64 / result.horizon_slots as f64
                };
                (r.id.clone(), u)
            })
            .collect();
        let avg_utilization = mean(&utilization_by_room.values().copied().collect::<Vec<_>>());

        Self {
            demand_count,
            placed_count,
            unplaced_count,
            unresolvable_count: result.unresolvable.len(),
            placement_rate,
            avg_room_fill,
            avg_utilization,
            utilization_by_room,
        }
    }

    /// Whether the timetable meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_unplaced: usize, min_placement_rate: f64) -> bool {
        self.unplaced_count <= max_unplaced && self.placement_rate >= min_placement_rate
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClassDemand, ClassType, DemandTarget, Group, Room, Subgroup, UnplacedDemand, UnplacedReason,
    };
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.groups = vec![Group::new("g1", 20), Group::new("g2", 20)];
        c.subgroups = vec![Subgroup::new("g1-a", "g1", 10)];
        c.rooms = vec![Room::new("r1", "hall", 40), Room::new("r2", "lab", 20)];
        c
    }

    fn session(id: &str, uid: &str, slot: &str, room: &str, group: &str) -> PlacedSession {
        PlacedSession::new(id, date(2), slot, room, "t1", "math", ClassType::Lecture)
            .with_group(group)
            .with_source(uid)
    }

    fn result(sessions: Vec<PlacedSession>, unplaced: usize) -> TimetableResult {
        let demand = ClassDemand::new(
            "math",
            ClassType::Lab,
            "t1",
            20,
            DemandTarget::Group { group_id: "g2".into() },
            0,
        );
        TimetableResult {
            sessions,
            unplaced: (0..unplaced)
                .map(|_| UnplacedDemand {
                    demand: demand.clone(),
                    reason: UnplacedReason::NoFeasibleSlot,
                })
                .collect(),
            unresolvable: Vec::new(),
            attempts: 1,
            best_attempt: 0,
            total_cost: 0.0,
            cancelled: false,
            horizon_slots: 4,
        }
    }

    #[test]
    fn test_kpi_shared_lecture() {
        let shared = vec!["g1".to_string(), "g2".to_string()];
        let sessions = vec![
            session("a", "d1", "ts1", "r1", "g1").with_groups(shared.clone()),
            session("b", "d1", "ts1", "r1", "g2").with_groups(shared),
            session("c", "d2", "ts2", "r2", "g1").with_subgroup("g1-a"),
        ];
        let kpi = TimetableKpi::calculate(&result(sessions, 1), &make_catalog());

        assert_eq!(kpi.placed_count, 2);
        assert_eq!(kpi.demand_count, 3);
        assert!((kpi.placement_rate - 2.0 / 3.0).abs() < 1e-10);
        // 40/40 and 10/20
        assert!((kpi.avg_room_fill - 0.75).abs() < 1e-10);
        assert!((kpi.utilization_by_room["r1"] - 0.25).abs() < 1e-10);
        assert!((kpi.utilization_by_room["r2"] - 0.25).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_empty() {
        let kpi = TimetableKpi::calculate(&result(Vec::new(), 0), &make_catalog());
        assert_eq!(kpi.demand_count, 0);
        assert!((kpi.placement_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_room_fill - 0.0).abs() < 1e-10);
        assert!((kpi.avg_utilization - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_meets_thresholds() {
        let sessions = vec![session("a", "d1", "ts1", "r1", "g1")];
        let kpi = TimetableKpi::calculate(&result(sessions, 1), &make_catalog());
        assert!(kpi.meets_thresholds(1, 0.5));
        assert!(!kpi.meets_thresholds(0, 0.5));
        assert!(!kpi.meets_thresholds(1, 0.9));
    }
}
