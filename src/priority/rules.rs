//! Built-in priority rules.
//!
//! # Score Convention
//! All rules return lower scores for demands that should be placed
//! earlier.

use super::{PriorityContext, PriorityRule, RuleScore};
use crate::models::{ClassDemand, ClassType};

/// Shared multi-group lectures go first.
#[derive(Debug, Clone, Copy)]
pub struct MultiGroupFirst;

impl PriorityRule for MultiGroupFirst {
    fn name(&self) -> &'static str {
        "MULTI_GROUP_FIRST"
    }

    fn evaluate(&self, demand: &ClassDemand, _context: &PriorityContext<'_>) -> RuleScore {
        if demand.target.is_multi_group() {
            -200.0
        } else {
            0.0
        }
    }

    fn description(&self) -> &'static str {
        "Stream and multi-group lectures first"
    }
}

/// Labs need special rooms, so they go before ordinary classes.
#[derive(Debug, Clone, Copy)]
pub struct LabFirst;

impl PriorityRule for LabFirst {
    fn name(&self) -> &'static str {
        "LAB_FIRST"
    }

    fn evaluate(&self, demand: &ClassDemand, _context: &PriorityContext<'_>) -> RuleScore {
        if demand.class_type == ClassType::Lab {
            -100.0
        } else {
            0.0
        }
    }
}

/// Electives fill what is left.
#[derive(Debug, Clone, Copy)]
pub struct ElectiveLast;

impl PriorityRule for ElectiveLast {
    fn name(&self) -> &'static str {
        "ELECTIVE_LAST"
    }

    fn evaluate(&self, demand: &ClassDemand, _context: &PriorityContext<'_>) -> RuleScore {
        if demand.class_type == ClassType::Elective {
            50.0
        } else {
            0.0
        }
    }
}

/// Subgroup demands occupy the parent group too.
#[derive(Debug, Clone, Copy)]
pub struct SubgroupBonus;

impl PriorityRule for SubgroupBonus {
    fn name(&self) -> &'static str {
        "SUBGROUP"
    }

    fn evaluate(&self, demand: &ClassDemand, _context: &PriorityContext<'_>) -> RuleScore {
        if demand.subgroup_id().is_some() {
            -50.0
        } else {
            0.0
        }
    }
}

/// Larger audiences have fewer rooms to choose from.
#[derive(Debug, Clone, Copy)]
pub struct StudentCount;

impl PriorityRule for StudentCount {
    fn name(&self) -> &'static str {
        "STUDENT_COUNT"
    }

    fn evaluate(&self, demand: &ClassDemand, _context: &PriorityContext<'_>) -> RuleScore {
        -2.0 * f64::from(demand.student_count)
    }

    fn description(&self) -> &'static str {
        "Two points per student"
    }
}

/// Scarce teachers first.
///
/// A subject/class type taught by at most one teacher gets a large bonus;
/// otherwise each additional linked teacher lowers the priority slightly.
#[derive(Debug, Clone, Copy)]
pub struct SoleTeacher;

impl PriorityRule for SoleTeacher {
    fn name(&self) -> &'static str {
        "SOLE_TEACHER"
    }

    fn evaluate(&self, demand: &ClassDemand, context: &PriorityContext<'_>) -> RuleScore {
        let links = context.link_count(&demand.subject_id, demand.class_type);
        if links <= 1 {
            -150.0
        } else {
            5.0 * links as f64
        }
    }
}

/// Pinned rooms narrow the choice.
#[derive(Debug, Clone, Copy)]
pub struct PinnedRoom;

impl PriorityRule for PinnedRoom {
    fn name(&self) -> &'static str {
        "PINNED_ROOM"
    }

    fn evaluate(&self, demand: &ClassDemand, context: &PriorityContext<'_>) -> RuleScore {
        -30.0 * context.pin_count(demand) as f64
    }
}
