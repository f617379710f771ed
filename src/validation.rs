//! Input validation and result audits.
//!
//! [`validate_catalog`] checks referential integrity of a catalog before
//! scheduling. Detects:
//! - Duplicate IDs
//! - References to unknown teachers, groups, subjects, rooms or room types
//!
//! Streams mixing academic years are accepted with a warning; demand
//! generation only ever joins members of the same year.
//!
//! [`audit_sessions`] re-checks the hard constraints over a finished set of
//! sessions, counting the per-group copies of one multi-group lecture once.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::models::{availability_of, Availability, Catalog, PlacedSession, Violation, ViolationType, WorkCalendar};

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities of one kind share the same ID.
    DuplicateId,
    /// A reference to a teacher that doesn't exist.
    UnknownTeacher,
    /// A reference to a group that doesn't exist.
    UnknownGroup,
    /// A reference to a subject that doesn't exist.
    UnknownSubject,
    /// A reference to a room that doesn't exist.
    UnknownRoom,
    /// A room references a room type that doesn't exist.
    UnknownRoomType,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn collect_ids<'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a str>,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate {kind} ID: {id}"),
            ));
        }
    }
    seen
}

/// Validates the referential integrity of a catalog.
///
/// Checks:
/// 1. No duplicate ids within teachers, groups, subgroups, rooms, room
///    types, subjects, slots, streams and electives
/// 2. Subgroup parents, stream members and elective groups exist
/// 3. Plan entries, links and electives name existing subjects
/// 4. Links, electives and subgroup assignments name existing teachers
///    (an elective may leave its teacher empty)
/// 5. Pinned rooms exist; room types exist when the catalog lists any
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_catalog(catalog: &Catalog) -> ValidationResult {
    let mut errors = Vec::new();

    let teachers = collect_ids("teacher", catalog.teachers.iter().map(|t| t.id.as_str()), &mut errors);
    let groups = collect_ids("group", catalog.groups.iter().map(|g| g.id.as_str()), &mut errors);
    collect_ids("subgroup", catalog.subgroups.iter().map(|s| s.id.as_str()), &mut errors);
    let rooms = collect_ids("classroom", catalog.rooms.iter().map(|r| r.id.as_str()), &mut errors);
    let room_types = collect_ids(
        "classroom type",
        catalog.room_types.iter().map(|t| t.id.as_str()),
        &mut errors,
    );
    let subjects = collect_ids("subject", catalog.subjects.iter().map(|s| s.id.as_str()), &mut errors);
    collect_ids("time slot", catalog.time_slots.iter().map(|s| s.id.as_str()), &mut errors);
    collect_ids(
        "shortened time slot",
        catalog.time_slots_shortened.iter().map(|s| s.id.as_str()),
        &mut errors,
    );
    collect_ids("stream", catalog.streams.iter().map(|s| s.id.as_str()), &mut errors);
    collect_ids("elective", catalog.electives.iter().map(|e| e.id.as_str()), &mut errors);

    let mut check = |known: &HashSet<&str>, id: &str, kind: ValidationErrorKind, what: &str, owner: &str| {
        if !known.contains(id) {
            errors.push(ValidationError::new(kind, format!("{owner} references unknown {what} '{id}'")));
        }
    };

    for sg in &catalog.subgroups {
        let owner = format!("Subgroup '{}'", sg.id);
        check(&groups, &sg.parent_group_id, ValidationErrorKind::UnknownGroup, "group", &owner);
        for a in &sg.teacher_assignments {
            check(&teachers, &a.teacher_id, ValidationErrorKind::UnknownTeacher, "teacher", &owner);
            check(&subjects, &a.subject_id, ValidationErrorKind::UnknownSubject, "subject", &owner);
        }
        if let Some(room) = &sg.pinned_room_id {
            check(&rooms, room, ValidationErrorKind::UnknownRoom, "classroom", &owner);
        }
    }

    for stream in &catalog.streams {
        let owner = format!("Stream '{}'", stream.id);
        for g in &stream.group_ids {
            check(&groups, g, ValidationErrorKind::UnknownGroup, "group", &owner);
        }
    }

    for plan in &catalog.plans {
        let owner = format!("Plan '{}'", plan.id);
        for entry in &plan.entries {
            check(&subjects, &entry.subject_id, ValidationErrorKind::UnknownSubject, "subject", &owner);
        }
    }

    for link in &catalog.teacher_subject_links {
        let owner = format!("Link '{}'", link.id);
        check(&teachers, &link.teacher_id, ValidationErrorKind::UnknownTeacher, "teacher", &owner);
        check(&subjects, &link.subject_id, ValidationErrorKind::UnknownSubject, "subject", &owner);
    }

    for elective in &catalog.electives {
        let owner = format!("Elective '{}'", elective.id);
        if !elective.teacher_id.is_empty() {
            check(&teachers, &elective.teacher_id, ValidationErrorKind::UnknownTeacher, "teacher", &owner);
        }
        check(&groups, &elective.group_id, ValidationErrorKind::UnknownGroup, "group", &owner);
        check(&subjects, &elective.subject_id, ValidationErrorKind::UnknownSubject, "subject", &owner);
    }

    let pins = catalog
        .teachers
        .iter()
        .map(|t| ("Teacher", &t.id, &t.pinned_room_id))
        .chain(catalog.groups.iter().map(|g| ("Group", &g.id, &g.pinned_room_id)))
        .chain(catalog.subjects.iter().map(|s| ("Subject", &s.id, &s.pinned_room_id)));
    for (what, id, pin) in pins {
        if let Some(room) = pin {
            check(&rooms, room, ValidationErrorKind::UnknownRoom, "classroom", &format!("{what} '{id}'"));
        }
    }

    if !catalog.room_types.is_empty() {
        for room in &catalog.rooms {
            check(
                &room_types,
                &room.type_id,
                ValidationErrorKind::UnknownRoomType,
                "classroom type",
                &format!("Classroom '{}'", room.id),
            );
        }
    }

    let course_of: HashMap<&str, u32> = catalog.groups.iter().map(|g| (g.id.as_str(), g.course)).collect();
    for stream in &catalog.streams {
        let courses: HashSet<u32> = stream
            .group_ids
            .iter()
            .filter_map(|g| course_of.get(g.as_str()).copied())
            .collect();
        if courses.len() > 1 {
            warn!(
                event = "mixed_course_stream",
                stream = %stream.id,
                "stream members of different courses are scheduled apart"
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// One physical session: per-group copies merged.
struct MergedSession<'a> {
    first: &'a PlacedSession,
    groups: Vec<&'a str>,
}

fn merge_sessions(sessions: &[PlacedSession]) -> Vec<MergedSession<'_>> {
    let mut index: HashMap<_, usize> = HashMap::new();
    let mut merged: Vec<MergedSession<'_>> = Vec::new();
    for s in sessions {
        let key = (s.merge_key(), s.subgroup_id.as_deref());
        let slot = *index.entry(key).or_insert_with(|| {
            merged.push(MergedSession {
                first: s,
                groups: Vec::new(),
            });
            merged.len() - 1
        });
        for g in s.involved_groups() {
            if !merged[slot].groups.contains(&g.as_str()) {
                merged[slot].groups.push(g);
            }
        }
    }
    merged
}

/// Audits a set of sessions against the hard constraints.
///
/// Checks double booking beyond the overbooking limit, room capacity,
/// room type and tag requirements, and Forbidden availability (unless the
/// override setting is on).
pub fn audit_sessions(catalog: &Catalog, sessions: &[PlacedSession]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let limit = catalog.settings.overbooking_limit();
    let calendar = WorkCalendar::new(catalog);

    let teachers: HashMap<&str, _> = catalog.teachers.iter().map(|t| (t.id.as_str(), t)).collect();
    let groups: HashMap<&str, _> = catalog.groups.iter().map(|g| (g.id.as_str(), g)).collect();
    let subgroups: HashMap<&str, _> = catalog.subgroups.iter().map(|s| (s.id.as_str(), s)).collect();
    let rooms: HashMap<&str, _> = catalog.rooms.iter().map(|r| (r.id.as_str(), r)).collect();
    let subjects: HashMap<&str, _> = catalog.subjects.iter().map(|s| (s.id.as_str(), s)).collect();

    let merged = merge_sessions(sessions);
    let mut usage: BTreeMap<(String, chrono::NaiveDate, &str), u32> = BTreeMap::new();

    for m in &merged {
        let s = m.first;
        let mut resources = vec![format!("teacher {}", s.teacher_id), format!("classroom {}", s.room_id)];
        resources.extend(m.groups.iter().map(|g| format!("group {g}")));
        if let Some(sg) = &s.subgroup_id {
            resources.push(format!("subgroup {sg}"));
        }
        for r in resources {
            *usage.entry((r, s.date, s.time_slot_id.as_str())).or_insert(0) += 1;
        }

        let students: u32 = match s.subgroup_id.as_deref().and_then(|id| subgroups.get(id)) {
            Some(sg) => sg.student_count,
            None => m
                .groups
                .iter()
                .filter_map(|g| groups.get(g))
                .map(|g| g.student_count)
                .sum(),
        };

        if let Some(room) = rooms.get(s.room_id.as_str()) {
            if room.capacity < students {
                violations.push(Violation::capacity_exceeded(
                    &room.id,
                    format!(
                        "Session '{}' seats {} students in classroom '{}' of capacity {}",
                        s.id, students, room.id, room.capacity
                    ),
                ));
            }
            if let Some(subject) = subjects.get(s.subject_id.as_str()) {
                let type_ok = subject
                    .room_types_for(s.class_type)
                    .map_or(true, |types| types.contains(&room.type_id));
                if !type_ok {
                    violations.push(Violation::new(
                        ViolationType::RoomTypeMismatch,
                        &s.id,
                        format!("Classroom '{}' has a type not allowed for {} of '{}'", room.id, s.class_type, subject.id),
                    ));
                }
                if !room.has_tags(&subject.required_tag_ids) {
                    violations.push(Violation::new(
                        ViolationType::MissingRoomTag,
                        &s.id,
                        format!("Classroom '{}' lacks a tag required by '{}'", room.id, subject.id),
                    ));
                }
            }
        }

        if !catalog.settings.allow_manual_override_of_forbidden {
            let slot_id = calendar
                .slot_index(s.date, &s.time_slot_id)
                .and_then(|i| calendar.standard_slot_id(i))
                .unwrap_or(s.time_slot_id.as_str());
            let mut grids = vec![
                teachers.get(s.teacher_id.as_str()).and_then(|t| t.availability_grid.as_ref()),
                rooms.get(s.room_id.as_str()).and_then(|r| r.availability_grid.as_ref()),
            ];
            grids.extend(m.groups.iter().map(|g| groups.get(g).and_then(|g| g.availability_grid.as_ref())));
            if let Some(sg) = s.subgroup_id.as_deref() {
                grids.push(subgroups.get(sg).and_then(|sg| sg.availability_grid.as_ref()));
            }
            if grids
                .into_iter()
                .any(|g| availability_of(g, s.day, slot_id) == Availability::Forbidden)
            {
                violations.push(Violation::new(
                    ViolationType::ForbiddenSlot,
                    &s.id,
                    format!("Session '{}' sits on a forbidden slot {} {}", s.id, s.date, s.time_slot_id),
                ));
            }
        }
    }

    for ((resource, date, slot), count) in usage {
        if count > limit {
            violations.push(Violation::double_booking(
                resource.clone(),
                format!("{resource} is booked {count} times at {date} {slot}"),
            ));
        }
    }

    violations
}
