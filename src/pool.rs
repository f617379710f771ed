//! Demand generation from curriculum plans and electives.
//!
//! Each group's plan entries for the configured semester expand into
//! 2-hour class demands: lectures (shared by stream members where
//! possible), practicals and labs (split per subgroup when the plan says
//! so), then electives. A demand whose teacher cannot be resolved is kept
//! apart as unresolvable and never reaches placement.
//!
//! # Example
//!
//! ```
//! use u_timetable::models::*;
//! use u_timetable::pool::DemandPool;
//!
//! let mut catalog = Catalog::new();
//! catalog.groups = vec![Group::new("g1", 25).with_specialty("cs")];
//! catalog.plans = vec![CurriculumPlan::new("p", "cs").with_entry(
//!     PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(4, 2, 0),
//! )];
//! catalog.teacher_subject_links = vec![TeacherSubjectLink::new(
//!     "t1",
//!     "math",
//!     vec![ClassType::Lecture, ClassType::Practical],
//! )];
//!
//! let pool = DemandPool::generate(&catalog, 1);
//! assert_eq!(pool.demands.len(), 3); // 2 lectures + 1 practical
//! assert!(pool.unresolvable.is_empty());
//! ```

use std::collections::HashSet;
use tracing::debug;

use crate::config::{Target, TargetKind};
use crate::models::{
    Catalog, CatalogIndex, ClassDemand, ClassType, DemandTarget, Group, PlacedSession, PlanEntry,
    UnresolvableDemand, UnresolvableReason,
};

/// Demands of one run, in generation order.
#[derive(Debug, Clone, Default)]
pub struct DemandPool {
    /// Demands with a resolved teacher.
    pub demands: Vec<ClassDemand>,
    /// Required sessions without any linked teacher.
    pub unresolvable: Vec<UnresolvableDemand>,
}

impl DemandPool {
    /// Expands the catalog's plans for `semester` and its electives.
    pub fn generate(catalog: &Catalog, semester: u32) -> Self {
        let mut pool = Self::default();
        let mut shared: HashSet<(&str, &str)> = HashSet::new();

        for group in &catalog.groups {
            let Some(plan) = catalog.plan_for(&group.specialty_id) else {
                continue;
            };
            for entry in plan.entries.iter().filter(|e| e.semester == semester) {
                if entry.lecture_hours > 0 && !shared.contains(&(entry.subject_id.as_str(), group.id.as_str())) {
                    pool.push_lecture(catalog, group, entry, semester, &mut shared);
                }
                for class_type in [ClassType::Practical, ClassType::Lab] {
                    pool.push_group_classes(catalog, group, entry, class_type);
                }
            }
        }

        for elective in &catalog.electives {
            let Some(group) = catalog.groups.iter().find(|g| g.id == elective.group_id) else {
                continue;
            };
            let teacher = Some(elective.teacher_id.as_str()).filter(|t| !t.is_empty());
            for i in 0..elective.hours_per_semester.div_ceil(2) {
                let mut demand = ClassDemand::new(
                    &elective.subject_id,
                    ClassType::Elective,
                    teacher.unwrap_or_default(),
                    group.student_count,
                    DemandTarget::Group {
                        group_id: group.id.clone(),
                    },
                    i,
                );
                demand.uid = format!("unsched-elective-{}-{}", elective.id, i);
                pool.push(demand, teacher.is_some());
            }
        }

        debug!(
            event = "demand_pool_generated",
            semester,
            demands = pool.demands.len(),
            unresolvable = pool.unresolvable.len()
        );
        pool
    }

    fn push(&mut self, demand: ClassDemand, resolved: bool) {
        if resolved {
            self.demands.push(demand);
        } else {
            self.unresolvable
                .push(UnresolvableDemand::new(demand, UnresolvableReason::NoTeacher));
        }
    }

    fn push_many(
        &mut self,
        entry: &PlanEntry,
        class_type: ClassType,
        teacher: Option<&str>,
        student_count: u32,
        target: DemandTarget,
    ) {
        for i in 0..entry.hours_for(class_type).div_ceil(2) {
            let demand = ClassDemand::new(
                &entry.subject_id,
                class_type,
                teacher.unwrap_or_default(),
                student_count,
                target.clone(),
                i,
            );
            self.push(demand, teacher.is_some());
        }
    }

    /// Lecture for `group`, shared with the stream members of the same
    /// course whose plans require it too.
    fn push_lecture<'c>(
        &mut self,
        catalog: &'c Catalog,
        group: &'c Group,
        entry: &'c PlanEntry,
        semester: u32,
        shared: &mut HashSet<(&'c str, &'c str)>,
    ) {
        let teacher = catalog.first_linked_teacher(&entry.subject_id, ClassType::Lecture);

        if let Some(stream) = catalog.stream_of(&group.id) {
            let participants: Vec<&Group> = stream
                .group_ids
                .iter()
                .filter_map(|id| catalog.groups.iter().find(|g| &g.id == id))
                .filter(|g| g.course == group.course)
                .filter(|g| {
                    catalog
                        .plan_for(&g.specialty_id)
                        .and_then(|p| p.entry(&entry.subject_id, semester))
                        .is_some_and(|e| e.lecture_hours > 0)
                })
                .collect();

            if participants.len() >= 2 {
                for g in &participants {
                    shared.insert((entry.subject_id.as_str(), g.id.as_str()));
                }
                let full = participants.len() == stream.group_ids.len();
                let target = DemandTarget::Groups {
                    group_ids: participants.iter().map(|g| g.id.clone()).collect(),
                    stream_id: full.then(|| stream.id.clone()),
                };
                let students = participants.iter().map(|g| g.student_count).sum();
                self.push_many(entry, ClassType::Lecture, teacher, students, target);
                return;
            }
        }

        let target = DemandTarget::Group {
            group_id: group.id.clone(),
        };
        self.push_many(entry, ClassType::Lecture, teacher, group.student_count, target);
    }

    /// Practicals or labs, per subgroup when the entry is split.
    fn push_group_classes(&mut self, catalog: &Catalog, group: &Group, entry: &PlanEntry, class_type: ClassType) {
        if entry.hours_for(class_type) == 0 {
            return;
        }
        let linked = catalog.first_linked_teacher(&entry.subject_id, class_type);
        let subgroups: Vec<_> = catalog.subgroups_of(&group.id).collect();

        if entry.split_for_subgroups && !subgroups.is_empty() {
            for sg in subgroups {
                let teacher = sg.assigned_teacher(&entry.subject_id, class_type).or(linked);
                let target = DemandTarget::Subgroup {
                    group_id: group.id.clone(),
                    subgroup_id: sg.id.clone(),
                };
                self.push_many(entry, class_type, teacher, sg.student_count, target);
            }
        } else {
            let target = DemandTarget::Group {
                group_id: group.id.clone(),
            };
            self.push_many(entry, class_type, linked, group.student_count, target);
        }
    }

    /// Keeps only demands involving the target entity.
    ///
    /// A classroom target keeps the demands that room could host. Teacher
    /// and classroom targets drop unresolvable demands, which have neither.
    pub fn restrict_to(mut self, target: &Target, index: &CatalogIndex<'_>) -> Self {
        match target.kind {
            TargetKind::Group => {
                let involves = |groups: &[String], sg: Option<&str>| {
                    groups.iter().any(|g| *g == target.id) || sg == Some(target.id.as_str())
                };
                self.demands.retain(|d| involves(d.group_ids(), d.subgroup_id()));
                self.unresolvable
                    .retain(|u| involves(u.target.group_ids(), u.target.subgroup_id()));
            }
            TargetKind::Teacher => {
                self.demands.retain(|d| d.teacher_id == target.id);
                self.unresolvable.clear();
            }
            TargetKind::Classroom => {
                match index.room(&target.id) {
                    Some(room) => self.demands.retain(|d| index.room_fits(d, room)),
                    None => self.demands.clear(),
                }
                self.unresolvable.clear();
            }
        }
        debug!(
            event = "demand_pool_restricted",
            target = %target.id,
            demands = self.demands.len()
        );
        self
    }

    /// Drops demands already fulfilled by a retained session.
    pub fn skip_satisfied(mut self, existing: &[PlacedSession]) -> Self {
        let done: HashSet<&str> = existing
            .iter()
            .filter_map(|s| s.unscheduled_uid.as_deref())
            .collect();
        if !done.is_empty() {
            let before = self.demands.len();
            self.demands.retain(|d| !done.contains(d.uid.as_str()));
            debug!(event = "demand_pool_satisfied", skipped = before - self.demands.len());
        }
        self
    }

    /// Number of placeable demands.
    #[inline]
    pub fn len(&self) -> usize {
        self.demands.len()
    }

    /// Whether there is nothing to place.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.demands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttestationKind, CurriculumPlan, Elective, Room, Stream, Subgroup, TeacherSubjectLink};
    use chrono::NaiveDate;

    fn make_catalog() -> Catalog {
        let mut c = Catalog::new();
        c.groups = vec![
            Group::new("g1", 25).with_specialty("cs"),
            Group::new("g2", 20).with_specialty("cs"),
            Group::new("g3", 30).with_specialty("math"),
        ];
        c.plans = vec![
            CurriculumPlan::new("p-cs", "cs")
                .with_entry(PlanEntry::new("algo", 1, AttestationKind::Exam).with_hours(4, 0, 3).split())
                .with_entry(PlanEntry::new("history", 2, AttestationKind::Test).with_hours(2, 0, 0)),
            CurriculumPlan::new("p-math", "math")
                .with_entry(PlanEntry::new("algo", 1, AttestationKind::Exam).with_hours(2, 2, 0)),
        ];
        c.teacher_subject_links = vec![
            TeacherSubjectLink::new("t1", "algo", vec![ClassType::Lecture]),
            TeacherSubjectLink::new("t2", "algo", vec![ClassType::Lab]),
        ];
        c
    }

    #[test]
    fn test_single_group_demands() {
        let c = make_catalog();
        let pool = DemandPool::generate(&c, 1);

        let g1: Vec<_> = pool
            .demands
            .iter()
            .filter(|d| d.group_ids() == ["g1".to_string()])
            .collect();
        // ceil(4/2) lectures + ceil(3/2) labs, no subgroups so not split
        assert_eq!(g1.len(), 4);
        assert_eq!(g1[0].uid, "unsched-algo-g1-lecture-0");
        assert_eq!(g1[2].uid, "unsched-algo-g1-lab-0");
        assert_eq!(g1[2].teacher_id, "t2");
        // Semester 2 entry ignored
        assert!(pool.demands.iter().all(|d| d.subject_id == "algo"));
    }

    #[test]
    fn test_missing_teacher_is_unresolvable() {
        let c = make_catalog();
        let pool = DemandPool::generate(&c, 1);
        // g3 practical has no linked teacher
        assert_eq!(pool.unresolvable.len(), 1);
        let u = &pool.unresolvable[0];
        assert_eq!(u.class_type, ClassType::Practical);
        assert_eq!(u.reason, UnresolvableReason::NoTeacher);
        assert!(pool.demands.iter().all(|d| !d.teacher_id.is_empty()));
    }

    #[test]
    fn test_full_stream_lecture() {
        let mut c = make_catalog();
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
        let pool = DemandPool::generate(&c, 1);

        let lectures: Vec<_> = pool
            .demands
            .iter()
            .filter(|d| d.class_type == ClassType::Lecture && d.target.is_multi_group())
            .collect();
        assert_eq!(lectures.len(), 2);
        assert_eq!(lectures[0].uid, "unsched-algo-s1-lecture-0");
        assert_eq!(lectures[0].student_count, 45);
        assert_eq!(lectures[0].target.stream_id(), Some("s1"));
        // g2 gets no separate lecture
        assert!(!pool
            .demands
            .iter()
            .any(|d| d.class_type == ClassType::Lecture && d.group_ids() == ["g2".to_string()]));
    }

    #[test]
    fn test_partial_stream_lecture() {
        let mut c = make_catalog();
        c.groups.push(Group::new("g4", 10).with_specialty("none"));
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into(), "g4".into()])];
        let pool = DemandPool::generate(&c, 1);

        let shared = pool
            .demands
            .iter()
            .find(|d| d.target.is_multi_group())
            .unwrap();
        assert_eq!(shared.group_ids(), ["g1".to_string(), "g2".to_string()]);
        assert_eq!(shared.target.stream_id(), None);
        assert_eq!(shared.uid, "unsched-algo-g1+g2-lecture-0");
    }

    #[test]
    fn test_other_course_not_joined() {
        let mut c = make_catalog();
        c.groups[1].course = 2;
        c.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
        let pool = DemandPool::generate(&c, 1);
        assert!(pool.demands.iter().all(|d| !d.target.is_multi_group()));
    }

    #[test]
    fn test_subgroup_split() {
        let mut c = make_catalog();
        c.subgroups = vec![
            Subgroup::new("g1-a", "g1", 13).with_teacher_assignment("algo", ClassType::Lab, "t9"),
            Subgroup::new("g1-b", "g1", 12),
        ];
        let pool = DemandPool::generate(&c, 1);

        let labs: Vec<_> = pool
            .demands
            .iter()
            .filter(|d| d.class_type == ClassType::Lab && d.group_ids() == ["g1".to_string()])
            .collect();
        assert_eq!(labs.len(), 4);
        assert_eq!(labs[0].subgroup_id(), Some("g1-a"));
        assert_eq!(labs[0].teacher_id, "t9");
        assert_eq!(labs[0].student_count, 13);
        assert_eq!(labs[2].subgroup_id(), Some("g1-b"));
        assert_eq!(labs[2].teacher_id, "t2");
    }

    #[test]
    fn test_electives() {
        let mut c = make_catalog();
        c.electives = vec![Elective {
            id: "e1".into(),
            subject_id: "chess".into(),
            teacher_id: "t5".into(),
            group_id: "g2".into(),
            hours_per_semester: 3,
            ..Default::default()
        }];
        let pool = DemandPool::generate(&c, 1);
        let electives: Vec<_> = pool
            .demands
            .iter()
            .filter(|d| d.class_type == ClassType::Elective)
            .collect();
        assert_eq!(electives.len(), 2);
        assert_eq!(electives[1].uid, "unsched-elective-e1-1");
        assert_eq!(electives[0].student_count, 20);
    }

    #[test]
    fn test_restrict_to_targets() {
        let mut c = make_catalog();
        c.rooms = vec![Room::new("small", "lab", 22)];
        let index = CatalogIndex::new(&c);

        let by_group = DemandPool::generate(&c, 1).restrict_to(&Target::new(TargetKind::Group, "g3"), &index);
        assert_eq!(by_group.len(), 1);
        assert_eq!(by_group.unresolvable.len(), 1);

        let by_teacher =
            DemandPool::generate(&c, 1).restrict_to(&Target::new(TargetKind::Teacher, "t2"), &index);
        assert!(by_teacher.demands.iter().all(|d| d.class_type == ClassType::Lab));
        assert!(by_teacher.unresolvable.is_empty());

        let by_room =
            DemandPool::generate(&c, 1).restrict_to(&Target::new(TargetKind::Classroom, "small"), &index);
        assert!(by_room.demands.iter().all(|d| d.student_count <= 22));
        assert!(!by_room.is_empty());
    }

    #[test]
    fn test_skip_satisfied() {
        let c = make_catalog();
        let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let done = PlacedSession::new("s", date, "ts1", "r1", "t1", "algo", ClassType::Lecture)
            .with_group("g1")
            .with_source("unsched-algo-g1-lecture-0");
        let full = DemandPool::generate(&c, 1);
        let pool = full.clone().skip_satisfied(&[done]);
        assert_eq!(pool.len(), full.len() - 1);
        assert!(pool.demands.iter().all(|d| d.uid != "unsched-algo-g1-lecture-0"));
    }
}
