//! Timetabling domain models.
//!
//! Provides the catalog snapshot the engine reads, the demands it
//! generates and the sessions it produces. Every entity is referenced by
//! an opaque string id.
//!
//! # Domain Mappings
//!
//! | u-timetable | University | Wire name |
//! |-------------|------------|-----------|
//! | Room | Classroom / lecture hall | `classrooms` |
//! | Rule | Scheduling rule | `schedulingRules` |
//! | CalendarDay | Production calendar event | `productionCalendar` |
//! | CurriculumPlan | Educational plan | `educationalPlans` |
//! | ClassDemand | Unscheduled entry | `unscheduledUid` |
//! | PlacedSession | Schedule entry | `schedule` |

mod availability;
mod calendar;
mod catalog;
mod demand;
mod rule;
mod schedule;

pub(crate) use availability::availability_of;
pub use availability::{Availability, AvailabilityGrid, Day};
pub use calendar::{CalendarDay, CalendarEventKind, DateWindow, WorkCalendar};
pub use catalog::{
    AttestationKind, Catalog, CatalogIndex, ClassType, CurriculumPlan, Elective, Group, PlanEntry, Room, RoomType,
    Stream, Subgroup, Subject, Teacher, TeacherAssignment, TeacherSubjectLink, TimeSlot,
};
pub use demand::{ClassDemand, DemandTarget};
pub use rule::{EntityType, LogicalOperator, Rule, RuleAction, RuleCondition, RuleSeverity, SessionFacts};
pub use schedule::{
    PlacedSession, UnplacedDemand, UnplacedReason, UnresolvableDemand, UnresolvableReason, Violation,
    ViolationType,
};
