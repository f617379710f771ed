//! Catalog records supplied by the surrounding application.
//!
//! The catalog is a read-only snapshot: the engine never mutates it and
//! refers to every record by its string id. Field names follow the
//! application's camelCase wire format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::{AvailabilityGrid, CalendarDay, ClassDemand, Rule};
use crate::config::Settings;

/// Kind of class session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassType {
    #[serde(rename = "Лекция")]
    Lecture,
    #[serde(rename = "Практика")]
    Practical,
    #[serde(rename = "Лабораторная")]
    Lab,
    #[serde(rename = "Консультация")]
    Consultation,
    #[serde(rename = "Зачёт")]
    Test,
    #[serde(rename = "Экзамен")]
    Exam,
    #[serde(rename = "Факультатив")]
    Elective,
}

impl ClassType {
    /// Display label (same as the serialized form).
    pub fn label(self) -> &'static str {
        match self {
            ClassType::Lecture => "Лекция",
            ClassType::Practical => "Практика",
            ClassType::Lab => "Лабораторная",
            ClassType::Consultation => "Консультация",
            ClassType::Test => "Зачёт",
            ClassType::Exam => "Экзамен",
            ClassType::Elective => "Факультатив",
        }
    }

    /// ASCII code used inside generated demand ids.
    pub fn code(self) -> &'static str {
        match self {
            ClassType::Lecture => "lecture",
            ClassType::Practical => "practical",
            ClassType::Lab => "lab",
            ClassType::Consultation => "consultation",
            ClassType::Test => "test",
            ClassType::Exam => "exam",
            ClassType::Elective => "elective",
        }
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Final assessment kind of a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationKind {
    #[serde(rename = "Экзамен")]
    Exam,
    #[serde(rename = "Зачёт")]
    Test,
    #[serde(rename = "Диф. зачёт")]
    DifferentiatedTest,
}

impl AttestationKind {
    /// Whether this attestation is scheduled as a test event.
    pub fn is_test(self) -> bool {
        matches!(self, AttestationKind::Test | AttestationKind::DifferentiatedTest)
    }
}

/// A teacher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub department_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_grid: Option<AvailabilityGrid>,
    #[serde(default, rename = "pinnedClassroomId", skip_serializing_if = "Option::is_none")]
    pub pinned_room_id: Option<String>,
}

impl Teacher {
    /// Creates a teacher with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets the department.
    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = department_id.into();
        self
    }

    /// Sets the availability grid.
    pub fn with_availability(mut self, grid: AvailabilityGrid) -> Self {
        self.availability_grid = Some(grid);
        self
    }

    /// Pins the teacher to a room.
    pub fn with_pinned_room(mut self, room_id: impl Into<String>) -> Self {
        self.pinned_room_id = Some(room_id.into());
        self
    }
}

/// A student group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub department_id: String,
    pub student_count: u32,
    /// Academic year.
    #[serde(default = "default_course")]
    pub course: u32,
    #[serde(default)]
    pub specialty_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_grid: Option<AvailabilityGrid>,
    #[serde(default, rename = "pinnedClassroomId", skip_serializing_if = "Option::is_none")]
    pub pinned_room_id: Option<String>,
}

fn default_course() -> u32 {
    1
}

impl Group {
    /// Creates a first-year group.
    pub fn new(id: impl Into<String>, student_count: u32) -> Self {
        Self {
            id: id.into(),
            student_count,
            course: 1,
            ..Default::default()
        }
    }

    /// Sets the specialty (selects the curriculum plan).
    pub fn with_specialty(mut self, specialty_id: impl Into<String>) -> Self {
        self.specialty_id = specialty_id.into();
        self
    }

    /// Sets the academic year.
    pub fn with_course(mut self, course: u32) -> Self {
        self.course = course;
        self
    }

    /// Sets the availability grid.
    pub fn with_availability(mut self, grid: AvailabilityGrid) -> Self {
        self.availability_grid = Some(grid);
        self
    }

    /// Pins the group to a room.
    pub fn with_pinned_room(mut self, room_id: impl Into<String>) -> Self {
        self.pinned_room_id = Some(room_id.into());
        self
    }
}

/// Explicit teacher choice for one subject/class type of a subgroup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAssignment {
    pub subject_id: String,
    pub teacher_id: String,
    pub class_type: ClassType,
}

/// Part of a group that takes split practicals/labs separately.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subgroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub parent_group_id: String,
    pub student_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teacher_assignments: Vec<TeacherAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_grid: Option<AvailabilityGrid>,
    #[serde(default, rename = "pinnedClassroomId", skip_serializing_if = "Option::is_none")]
    pub pinned_room_id: Option<String>,
}

impl Subgroup {
    /// Creates a subgroup of `parent_group_id`.
    pub fn new(id: impl Into<String>, parent_group_id: impl Into<String>, student_count: u32) -> Self {
        Self {
            id: id.into(),
            parent_group_id: parent_group_id.into(),
            student_count,
            ..Default::default()
        }
    }

    /// Records an explicit teacher for a subject/class type.
    pub fn with_teacher_assignment(
        mut self,
        subject_id: impl Into<String>,
        class_type: ClassType,
        teacher_id: impl Into<String>,
    ) -> Self {
        self.teacher_assignments.push(TeacherAssignment {
            subject_id: subject_id.into(),
            teacher_id: teacher_id.into(),
            class_type,
        });
        self
    }

    /// Explicit teacher for a subject/class type, if any.
    pub fn assigned_teacher(&self, subject_id: &str, class_type: ClassType) -> Option<&str> {
        self.teacher_assignments
            .iter()
            .find(|a| a.subject_id == subject_id && a.class_type == class_type)
            .map(|a| a.teacher_id.as_str())
    }
}

/// A room (classroom).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    #[serde(default)]
    pub number: String,
    pub capacity: u32,
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_grid: Option<AvailabilityGrid>,
}

impl Room {
    /// Creates a room of the given type and capacity.
    pub fn new(id: impl Into<String>, type_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity,
            type_id: type_id.into(),
            ..Default::default()
        }
    }

    /// Adds a capability tag.
    pub fn with_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_ids.push(tag_id.into());
        self
    }

    /// Sets the availability grid.
    pub fn with_availability(mut self, grid: AvailabilityGrid) -> Self {
        self.availability_grid = Some(grid);
        self
    }

    /// Whether the room carries every tag in `required`.
    pub fn has_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tag_ids.contains(t))
    }
}

/// Room type (lecture hall, lab, computer class...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomType {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl RoomType {
    /// Label of the type used for exams when nothing else is configured.
    pub const LECTURE_HALL: &'static str = "Лекционная";

    /// Creates a room type.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A subject (discipline).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Acceptable room types per class type. Missing or empty = any type.
    #[serde(default, rename = "classroomTypeRequirements")]
    pub room_type_requirements: HashMap<ClassType, Vec<String>>,
    #[serde(default, rename = "requiredClassroomTagIds", skip_serializing_if = "Vec::is_empty")]
    pub required_tag_ids: Vec<String>,
    #[serde(default, rename = "pinnedClassroomId", skip_serializing_if = "Option::is_none")]
    pub pinned_room_id: Option<String>,
}

impl Subject {
    /// Creates a subject with no room requirements.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Restricts the room types acceptable for a class type.
    pub fn with_room_types(mut self, class_type: ClassType, type_ids: Vec<String>) -> Self {
        self.room_type_requirements.insert(class_type, type_ids);
        self
    }

    /// Requires a room tag.
    pub fn with_required_tag(mut self, tag_id: impl Into<String>) -> Self {
        self.required_tag_ids.push(tag_id.into());
        self
    }

    /// Pins the subject to a room.
    pub fn with_pinned_room(mut self, room_id: impl Into<String>) -> Self {
        self.pinned_room_id = Some(room_id.into());
        self
    }

    /// Explicit room types for a class type (`None` = any type).
    pub fn room_types_for(&self, class_type: ClassType) -> Option<&[String]> {
        self.room_type_requirements
            .get(&class_type)
            .filter(|types| !types.is_empty())
            .map(Vec::as_slice)
    }

    /// Whether `room` satisfies the type and tag requirements for `class_type`.
    pub fn accepts_room(&self, class_type: ClassType, room: &Room) -> bool {
        let type_ok = self
            .room_types_for(class_type)
            .map_or(true, |types| types.contains(&room.type_id));
        type_ok && room.has_tags(&self.required_tag_ids)
    }
}

/// A bell-schedule slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    /// Displayed time range, e.g. `"08:30-10:00"`.
    #[serde(default)]
    pub time: String,
}

impl TimeSlot {
    /// Creates a slot.
    pub fn new(id: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time: time.into(),
        }
    }
}

/// Same-year groups that attend lectures together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub group_ids: Vec<String>,
}

impl Stream {
    /// Creates a stream over the given groups.
    pub fn new(id: impl Into<String>, group_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            group_ids,
        }
    }
}

/// One subject line of a curriculum plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub subject_id: String,
    pub semester: u32,
    #[serde(default)]
    pub lecture_hours: u32,
    #[serde(default, rename = "practiceHours")]
    pub practical_hours: u32,
    #[serde(default)]
    pub lab_hours: u32,
    pub attestation: AttestationKind,
    #[serde(default)]
    pub split_for_subgroups: bool,
}

impl PlanEntry {
    /// Creates an entry with no hours.
    pub fn new(subject_id: impl Into<String>, semester: u32, attestation: AttestationKind) -> Self {
        Self {
            subject_id: subject_id.into(),
            semester,
            lecture_hours: 0,
            practical_hours: 0,
            lab_hours: 0,
            attestation,
            split_for_subgroups: false,
        }
    }

    /// Sets lecture, practical and lab hour totals.
    pub fn with_hours(mut self, lecture: u32, practical: u32, lab: u32) -> Self {
        self.lecture_hours = lecture;
        self.practical_hours = practical;
        self.lab_hours = lab;
        self
    }

    /// Splits practicals and labs per subgroup.
    pub fn split(mut self) -> Self {
        self.split_for_subgroups = true;
        self
    }

    /// Hours required for a class type.
    pub fn hours_for(&self, class_type: ClassType) -> u32 {
        match class_type {
            ClassType::Lecture => self.lecture_hours,
            ClassType::Practical => self.practical_hours,
            ClassType::Lab => self.lab_hours,
            _ => 0,
        }
    }
}

/// Curriculum plan of a specialty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumPlan {
    pub id: String,
    pub specialty_id: String,
    #[serde(default)]
    pub entries: Vec<PlanEntry>,
}

impl CurriculumPlan {
    /// Creates an empty plan.
    pub fn new(id: impl Into<String>, specialty_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            specialty_id: specialty_id.into(),
            entries: Vec::new(),
        }
    }

    /// Adds an entry.
    pub fn with_entry(mut self, entry: PlanEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Entry for a subject in a semester.
    pub fn entry(&self, subject_id: &str, semester: u32) -> Option<&PlanEntry> {
        self.entries
            .iter()
            .find(|e| e.subject_id == subject_id && e.semester == semester)
    }
}

/// Which class types a teacher can teach for a subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSubjectLink {
    #[serde(default)]
    pub id: String,
    pub teacher_id: String,
    pub subject_id: String,
    pub class_types: Vec<ClassType>,
}

impl TeacherSubjectLink {
    /// Creates a capability link.
    pub fn new(
        teacher_id: impl Into<String>,
        subject_id: impl Into<String>,
        class_types: Vec<ClassType>,
    ) -> Self {
        let teacher_id = teacher_id.into();
        let subject_id = subject_id.into();
        Self {
            id: format!("link-{teacher_id}-{subject_id}"),
            teacher_id,
            subject_id,
            class_types,
        }
    }

    /// Whether the link covers a subject/class type.
    #[inline]
    pub fn covers(&self, subject_id: &str, class_type: ClassType) -> bool {
        self.subject_id == subject_id && self.class_types.contains(&class_type)
    }
}

/// Optional course with a fixed teacher and group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Elective {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub subject_id: String,
    /// Empty when no teacher is assigned yet.
    #[serde(default)]
    pub teacher_id: String,
    pub group_id: String,
    pub hours_per_semester: u32,
}

/// Complete read-only input snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub subgroups: Vec<Subgroup>,
    #[serde(default, rename = "classrooms")]
    pub rooms: Vec<Room>,
    #[serde(default, rename = "classroomTypes")]
    pub room_types: Vec<RoomType>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub time_slots_shortened: Vec<TimeSlot>,
    #[serde(default)]
    pub streams: Vec<Stream>,
    #[serde(default, rename = "educationalPlans")]
    pub plans: Vec<CurriculumPlan>,
    #[serde(default)]
    pub teacher_subject_links: Vec<TeacherSubjectLink>,
    #[serde(default)]
    pub electives: Vec<Elective>,
    #[serde(default, rename = "schedulingRules")]
    pub rules: Vec<Rule>,
    #[serde(default, rename = "productionCalendar")]
    pub calendar: Vec<CalendarDay>,
    #[serde(default)]
    pub settings: Settings,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Curriculum plan for a specialty.
    pub fn plan_for(&self, specialty_id: &str) -> Option<&CurriculumPlan> {
        self.plans.iter().find(|p| p.specialty_id == specialty_id)
    }

    /// Subgroups of a group, in catalog order.
    pub fn subgroups_of<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a Subgroup> + 'a {
        self.subgroups
            .iter()
            .filter(move |sg| sg.parent_group_id == group_id)
    }

    /// Stream a group belongs to (first match).
    pub fn stream_of(&self, group_id: &str) -> Option<&Stream> {
        self.streams
            .iter()
            .find(|s| s.group_ids.iter().any(|g| g == group_id))
    }

    /// First teacher linked to a subject/class type.
    pub fn first_linked_teacher(&self, subject_id: &str, class_type: ClassType) -> Option<&str> {
        self.teacher_subject_links
            .iter()
            .find(|l| l.covers(subject_id, class_type))
            .map(|l| l.teacher_id.as_str())
    }

    /// Number of links covering a subject/class type.
    pub fn link_count(&self, subject_id: &str, class_type: ClassType) -> usize {
        self.teacher_subject_links
            .iter()
            .filter(|l| l.covers(subject_id, class_type))
            .count()
    }
}

/// Id-keyed lookups over a catalog.
#[derive(Debug, Clone)]
pub struct CatalogIndex<'a> {
    pub catalog: &'a Catalog,
    teachers: HashMap<&'a str, &'a Teacher>,
    groups: HashMap<&'a str, &'a Group>,
    subgroups: HashMap<&'a str, &'a Subgroup>,
    rooms: HashMap<&'a str, &'a Room>,
    room_types: HashMap<&'a str, &'a RoomType>,
    subjects: HashMap<&'a str, &'a Subject>,
}

impl<'a> CatalogIndex<'a> {
    /// Indexes a catalog. Later duplicates shadow earlier ones.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            teachers: catalog.teachers.iter().map(|t| (t.id.as_str(), t)).collect(),
            groups: catalog.groups.iter().map(|g| (g.id.as_str(), g)).collect(),
            subgroups: catalog.subgroups.iter().map(|s| (s.id.as_str(), s)).collect(),
            rooms: catalog.rooms.iter().map(|r| (r.id.as_str(), r)).collect(),
            room_types: catalog.room_types.iter().map(|t| (t.id.as_str(), t)).collect(),
            subjects: catalog.subjects.iter().map(|s| (s.id.as_str(), s)).collect(),
        }
    }

    #[inline]
    pub fn teacher(&self, id: &str) -> Option<&'a Teacher> {
        self.teachers.get(id).copied()
    }

    #[inline]
    pub fn group(&self, id: &str) -> Option<&'a Group> {
        self.groups.get(id).copied()
    }

    #[inline]
    pub fn subgroup(&self, id: &str) -> Option<&'a Subgroup> {
        self.subgroups.get(id).copied()
    }

    #[inline]
    pub fn room(&self, id: &str) -> Option<&'a Room> {
        self.rooms.get(id).copied()
    }

    #[inline]
    pub fn room_type(&self, id: &str) -> Option<&'a RoomType> {
        self.room_types.get(id).copied()
    }

    #[inline]
    pub fn subject(&self, id: &str) -> Option<&'a Subject> {
        self.subjects.get(id).copied()
    }

    /// Whether a room passes the capacity, type and tag checks for a demand.
    pub fn room_fits(&self, demand: &ClassDemand, room: &Room) -> bool {
        room.capacity >= demand.student_count
            && self
                .subject(&demand.subject_id)
                .map_or(true, |s| s.accepts_room(demand.class_type, room))
    }

    /// Departments of a teacher and a set of groups, deduplicated.
    pub fn departments(&self, teacher_id: &str, group_ids: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let teacher_dep = self.teacher(teacher_id).map(|t| t.department_id.as_str());
        let group_deps = group_ids
            .iter()
            .filter_map(|g| self.group(g))
            .map(|g| g.department_id.as_str());
        for dep in teacher_dep.into_iter().chain(group_deps) {
            if !dep.is_empty() && !out.iter().any(|d| d == dep) {
                out.push(dep.to_string());
            }
        }
        out
    }
}
