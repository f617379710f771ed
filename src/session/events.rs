//! Exam-session event pool.
//!
//! Each group's plan entries for the semester yield an exam or a test
//! event; a stream's members of the same course sit one shared event.
//! Exams get a consultation event when a consultation offset is set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::{SessionConfig, TestMode};
use crate::models::{
    AttestationKind, Catalog, ClassType, DemandTarget, Group, UnresolvableDemand, UnresolvableReason,
};

/// Kind of exam-session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Exam,
    Test,
    Consultation,
}

impl EventKind {
    /// Class type of the placed session.
    pub fn class_type(self) -> ClassType {
        match self {
            EventKind::Exam => ClassType::Exam,
            EventKind::Test => ClassType::Test,
            EventKind::Consultation => ClassType::Consultation,
        }
    }

    fn uid_prefix(self) -> &'static str {
        match self {
            EventKind::Exam => "exam",
            EventKind::Test => "test",
            EventKind::Consultation => "consult",
        }
    }
}

/// An exam, test or consultation to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub subject_id: String,
    pub teacher_id: String,
    pub student_count: u32,
    /// Sorted ids of the attending groups.
    pub group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Uid of the exam a consultation precedes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation_for: Option<String>,
}

impl SessionEvent {
    /// Whether the event counts towards same-day and rest-day limits.
    pub fn is_attestation(&self) -> bool {
        matches!(self.kind, EventKind::Exam | EventKind::Test)
    }
}

/// Events of one session run.
#[derive(Debug, Clone, Default)]
pub struct EventPool {
    /// Exams and tests in generation order, each exam followed by its
    /// consultation.
    pub events: Vec<SessionEvent>,
    /// Attestations without any linked teacher.
    pub unresolvable: Vec<UnresolvableDemand>,
}

impl EventPool {
    /// Builds the event pool for the configured semester.
    pub fn generate(catalog: &Catalog, config: &SessionConfig) -> Self {
        let mut pool = Self::default();
        let mut seen: HashSet<(String, Vec<String>)> = HashSet::new();

        for group in &catalog.groups {
            let Some(plan) = catalog.plan_for(&group.specialty_id) else {
                continue;
            };
            for entry in plan.entries.iter().filter(|e| e.semester == config.semester) {
                let kind = match entry.attestation {
                    AttestationKind::Exam => EventKind::Exam,
                    a if a.is_test() && config.schedule_tests != TestMode::None => EventKind::Test,
                    _ => continue,
                };

                let (members, stream_id) = event_groups(catalog, group);
                let group_ids: Vec<String> = {
                    let mut ids: Vec<String> = members.iter().map(|g| g.id.clone()).collect();
                    ids.sort();
                    ids
                };
                if !seen.insert((entry.subject_id.clone(), group_ids.clone())) {
                    continue;
                }
                let student_count = members.iter().map(|g| g.student_count).sum();
                let key = format!("{}-{}", entry.subject_id, group_ids.join(","));

                let Some(teacher_id) = event_teacher(catalog, &entry.subject_id, kind) else {
                    pool.unresolvable.push(UnresolvableDemand {
                        uid: format!("{}-{}", kind.uid_prefix(), key),
                        subject_id: entry.subject_id.clone(),
                        class_type: kind.class_type(),
                        student_count,
                        target: target_of(&group_ids, stream_id.as_deref()),
                        reason: UnresolvableReason::NoTeacher,
                    });
                    continue;
                };

                let event = SessionEvent {
                    uid: format!("{}-{}", kind.uid_prefix(), key),
                    kind,
                    subject_id: entry.subject_id.clone(),
                    teacher_id: teacher_id.to_string(),
                    student_count,
                    group_ids,
                    stream_id,
                    consultation_for: None,
                };
                let consultation = (kind == EventKind::Exam && config.consultation_offset > 0).then(|| SessionEvent {
                    uid: format!("{}-{}", EventKind::Consultation.uid_prefix(), key),
                    kind: EventKind::Consultation,
                    consultation_for: Some(event.uid.clone()),
                    ..event.clone()
                });
                pool.events.push(event);
                pool.events.extend(consultation);
            }
        }

        debug!(
            event = "session_pool_generated",
            semester = config.semester,
            events = pool.events.len(),
            unresolvable = pool.unresolvable.len()
        );
        pool
    }

    /// Events of one kind, in generation order.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &SessionEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Stream members of the group's course, or the group alone.
///
/// The stream id is kept only when every stream member attends.
fn event_groups<'c>(catalog: &'c Catalog, group: &'c Group) -> (Vec<&'c Group>, Option<String>) {
    if let Some(stream) = catalog.stream_of(&group.id) {
        let members: Vec<&Group> = catalog
            .groups
            .iter()
            .filter(|g| stream.group_ids.contains(&g.id) && g.course == group.course)
            .collect();
        if !members.is_empty() {
            let full = members.len() == stream.group_ids.len();
            return (members, full.then(|| stream.id.clone()));
        }
    }
    (vec![group], None)
}

/// Examiner lookup.
///
/// Exams: lecture link, then exam link. Tests: test or practical link.
/// Both fall back to any link of the subject.
fn event_teacher<'c>(catalog: &'c Catalog, subject_id: &str, kind: EventKind) -> Option<&'c str> {
    let links = &catalog.teacher_subject_links;
    let covering = |types: &[ClassType]| {
        links
            .iter()
            .find(|l| l.subject_id == subject_id && types.iter().any(|t| l.class_types.contains(t)))
            .map(|l| l.teacher_id.as_str())
    };
    let preferred = match kind {
        EventKind::Exam => covering(&[ClassType::Lecture]).or_else(|| covering(&[ClassType::Exam])),
        EventKind::Test => covering(&[ClassType::Test, ClassType::Practical]),
        EventKind::Consultation => None,
    };
    preferred.or_else(|| {
        links
            .iter()
            .find(|l| l.subject_id == subject_id)
            .map(|l| l.teacher_id.as_str())
    })
}

fn target_of(group_ids: &[String], stream_id: Option<&str>) -> DemandTarget {
    match group_ids {
        [single] => DemandTarget::Group {
            group_id: single.clone(),
        },
        _ => DemandTarget::Groups {
            group_ids: group_ids.to_vec(),
            stream_id: stream_id.map(str::to_string),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CurriculumPlan, DateWindow, PlanEntry, Stream, TeacherSubjectLink};
    use chrono::NaiveDate;

    fn config() -> SessionConfig {
        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        SessionConfig::new(DateWindow::new(d(9), d(31)))
    }

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.groups = vec![
            Group::new("g2", 20).with_specialty("cs"),
            Group::new("g1", 25).with_specialty("cs"),
            Group::new("g3", 15).with_specialty("cs").with_course(2),
        ];
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
        c.plans = vec![CurriculumPlan::new("p", "cs")
            .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam))
            .with_entry(PlanEntry::new("phys", 1, AttestationKind::DifferentiatedTest))
            .with_entry(PlanEntry::new("chem", 2, AttestationKind::Exam))];
        c.teacher_subject_links = vec![
            TeacherSubjectLink::new("t-prac", "math", vec![ClassType::Practical]),
            TeacherSubjectLink::new("t-lect", "math", vec![ClassType::Lecture]),
            TeacherSubjectLink::new("t-any", "phys", vec![ClassType::Lab]),
            TeacherSubjectLink::new("t-test", "phys", vec![ClassType::Test]),
        ];
        c
    }

    #[test]
    fn test_stream_events_collapsed() {
        let pool = EventPool::generate(&make_catalog(), &config());
        let exams: Vec<&SessionEvent> = pool.of_kind(EventKind::Exam).collect();

        // g1+g2 share one exam; g3 (course 2) sits alone
        assert_eq!(exams.len(), 2);
        assert_eq!(exams[0].uid, "exam-math-g1,g2");
        assert_eq!(exams[0].group_ids, vec!["g1".to_string(), "g2".to_string()]);
        assert_eq!(exams[0].student_count, 45);
        assert_eq!(exams[0].stream_id.as_deref(), Some("s1"));
        assert_eq!(exams[1].uid, "exam-math-g3");
        assert_eq!(exams[1].stream_id, None);
    }

    #[test]
    fn test_teacher_preferences() {
        let pool = EventPool::generate(&make_catalog(), &config());
        let exam = pool.of_kind(EventKind::Exam).next().unwrap();
        assert_eq!(exam.teacher_id, "t-lect");
        let test = pool.of_kind(EventKind::Test).next().unwrap();
        assert_eq!(test.teacher_id, "t-test");
        assert_eq!(test.kind.class_type(), ClassType::Test);
    }

    #[test]
    fn test_consultations() {
        let pool = EventPool::generate(&make_catalog(), &config().with_consultation_offset(1));
        let consults: Vec<&SessionEvent> = pool.of_kind(EventKind::Consultation).collect();
        assert_eq!(consults.len(), 2);
        assert_eq!(consults[0].uid, "consult-math-g1,g2");
        assert_eq!(consults[0].consultation_for.as_deref(), Some("exam-math-g1,g2"));

        let none = EventPool::generate(&make_catalog(), &config().with_consultation_offset(0));
        assert_eq!(none.of_kind(EventKind::Consultation).count(), 0);
    }

    #[test]
    fn test_mode_none_skips_tests() {
        let pool = EventPool::generate(&make_catalog(), &config().with_test_mode(TestMode::None));
        assert_eq!(pool.of_kind(EventKind::Test).count(), 0);
        assert_eq!(pool.of_kind(EventKind::Exam).count(), 2);
    }

    #[test]
    fn test_unresolvable_attestation() {
        let mut c = make_catalog();
        c.teacher_subject_links.retain(|l| l.subject_id != "phys");
        let pool = EventPool::generate(&c, &config());
        assert_eq!(pool.of_kind(EventKind::Test).count(), 0);
        assert_eq!(pool.unresolvable.len(), 2);
        assert_eq!(pool.unresolvable[0].uid, "test-phys-g1,g2");
        assert_eq!(pool.unresolvable[0].class_type, ClassType::Test);
        assert!(pool.unresolvable[0].target.is_multi_group());
    }

    #[test]
    fn test_event_wire_format() {
        let pool = EventPool::generate(&make_catalog(), &config());
        let json = serde_json::to_value(&pool.events[0]).unwrap();
        assert_eq!(json["type"], "exam");
        assert_eq!(json["groupIds"][0], "g1");
        assert!(json.get("consultationFor").is_none());
    }
}
