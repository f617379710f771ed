//! Timetable (solution) model.
//!
//! A run produces placed sessions plus the demands it could not place
//! and those it could not even formulate. Audits over a set of sessions
//! report [`Violation`]s.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::slice;

use super::{ClassDemand, ClassType, Day, DemandTarget};

/// One session at a concrete `(date, slot, room)`.
///
/// A multi-group lecture yields one session per member group; all of
/// them share date, slot, room and teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedSession {
    pub id: String,
    pub date: NaiveDate,
    pub day: Day,
    pub time_slot_id: String,
    #[serde(rename = "classroomId")]
    pub room_id: String,
    pub teacher_id: String,
    pub subject_id: String,
    pub class_type: ClassType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Uid of the demand or event this session fulfils.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unscheduled_uid: Option<String>,
}

impl PlacedSession {
    /// Creates a session for a single group.
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        time_slot_id: impl Into<String>,
        room_id: impl Into<String>,
        teacher_id: impl Into<String>,
        subject_id: impl Into<String>,
        class_type: ClassType,
    ) -> Self {
        Self {
            id: id.into(),
            date,
            day: Day::of(date),
            time_slot_id: time_slot_id.into(),
            room_id: room_id.into(),
            teacher_id: teacher_id.into(),
            subject_id: subject_id.into(),
            class_type,
            group_id: None,
            group_ids: None,
            subgroup_id: None,
            stream_id: None,
            unscheduled_uid: None,
        }
    }

    /// Sets the single group.
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets all groups sharing the session.
    pub fn with_groups(mut self, group_ids: Vec<String>) -> Self {
        self.group_ids = Some(group_ids);
        self
    }

    /// Sets the subgroup.
    pub fn with_subgroup(mut self, subgroup_id: impl Into<String>) -> Self {
        self.subgroup_id = Some(subgroup_id.into());
        self
    }

    /// Sets the stream.
    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Sets the back reference to the fulfilled demand.
    pub fn with_source(mut self, uid: impl Into<String>) -> Self {
        self.unscheduled_uid = Some(uid.into());
        self
    }

    /// Groups occupied by the session.
    ///
    /// `groupIds` wins over `groupId` when both are present.
    pub fn involved_groups(&self) -> &[String] {
        match (&self.group_ids, &self.group_id) {
            (Some(ids), _) if !ids.is_empty() => ids,
            (_, Some(id)) => slice::from_ref(id),
            _ => &[],
        }
    }

    /// Whether the session is an exam-period event.
    pub fn is_attestation(&self) -> bool {
        matches!(
            self.class_type,
            ClassType::Exam | ClassType::Test | ClassType::Consultation
        )
    }

    /// Key identifying the physical session behind per-group copies.
    pub(crate) fn merge_key(&self) -> (NaiveDate, &str, &str, &str, &str, ClassType) {
        (
            self.date,
            self.time_slot_id.as_str(),
            self.teacher_id.as_str(),
            self.room_id.as_str(),
            self.subject_id.as_str(),
            self.class_type,
        )
    }
}

/// Why a demand was left unplaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnplacedReason {
    /// No room passes the capacity, type and tag pre-filter.
    NoSuitableRoom,
    /// Rooms exist but every `(date, slot, room)` was rejected.
    NoFeasibleSlot,
}

impl fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplacedReason::NoSuitableRoom => f.write_str("no suitable room"),
            UnplacedReason::NoFeasibleSlot => f.write_str("no feasible slot"),
        }
    }
}

/// A demand the engine could not place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedDemand {
    #[serde(flatten)]
    pub demand: ClassDemand,
    pub reason: UnplacedReason,
}

/// Why a demand could not be formulated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvableReason {
    /// No teacher is linked to the subject and class type.
    NoTeacher,
}

/// A required session with no resolvable teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvableDemand {
    pub uid: String,
    pub subject_id: String,
    pub class_type: ClassType,
    pub student_count: u32,
    #[serde(flatten)]
    pub target: DemandTarget,
    pub reason: UnresolvableReason,
}

impl UnresolvableDemand {
    /// Records a demand that was formulated without a teacher.
    pub fn new(demand: ClassDemand, reason: UnresolvableReason) -> Self {
        Self {
            uid: demand.uid,
            subject_id: demand.subject_id,
            class_type: demand.class_type,
            student_count: demand.student_count,
            target: demand.target,
            reason,
        }
    }
}

/// A hard-constraint violation found by an audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related entity id (teacher, group, room or session).
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Classification of timetable violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    /// Resource booked beyond the overbooking limit at one `(date, slot)`.
    DoubleBooking,
    /// Room smaller than the attending students.
    CapacityExceeded,
    /// Room type not acceptable for the subject and class type.
    RoomTypeMismatch,
    /// Room lacks a tag the subject requires.
    MissingRoomTag,
    /// Session on a Forbidden availability slot.
    ForbiddenSlot,
}

impl Violation {
    /// Creates a violation.
    pub fn new(violation_type: ViolationType, entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation_type,
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    /// Creates a double-booking violation.
    pub fn double_booking(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationType::DoubleBooking, entity_id, message)
    }

    /// Creates a capacity violation.
    pub fn capacity_exceeded(room_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ViolationType::CapacityExceeded, room_id, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    #[test]
    fn test_session_day_from_date() {
        let s = PlacedSession::new("s1", monday(), "ts1", "r1", "t1", "math", ClassType::Lecture);
        assert_eq!(s.day, Day::Monday);
        assert!(!s.is_attestation());
    }

    #[test]
    fn test_involved_groups() {
        let base = PlacedSession::new("s1", monday(), "ts1", "r1", "t1", "math", ClassType::Lecture);
        assert!(base.involved_groups().is_empty());

        let single = base.clone().with_group("g1");
        assert_eq!(single.involved_groups(), &["g1".to_string()]);

        let multi = base.with_group("g1").with_groups(vec!["g1".into(), "g2".into()]);
        assert_eq!(multi.involved_groups().len(), 2);
    }

    #[test]
    fn test_session_wire_format() {
        let s = PlacedSession::new("s1", monday(), "ts1", "r1", "t1", "math", ClassType::Exam)
            .with_groups(vec!["g1".into()])
            .with_source("exam-math-g1");
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["classroomId"], "r1");
        assert_eq!(json["date"], "2024-09-02");
        assert_eq!(json["day"], "Понедельник");
        assert_eq!(json["classType"], "Экзамен");
        assert_eq!(json["unscheduledUid"], "exam-math-g1");
        assert!(json.get("groupId").is_none());
    }

    #[test]
    fn test_merge_key_ignores_group() {
        let a = PlacedSession::new("a", monday(), "ts1", "r1", "t1", "math", ClassType::Lecture).with_group("g1");
        let b = PlacedSession::new("b", monday(), "ts1", "r1", "t1", "math", ClassType::Lecture).with_group("g2");
        assert_eq!(a.merge_key(), b.merge_key());
    }
}
