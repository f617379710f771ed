//! Resource booking ledger.
//!
//! Tracks, per resource, which `(date, slot)` keys are occupied and how
//! many times (up to the overbooking limit), together with per-day load,
//! per-day subject counts and the list of sessions booked on each date.
//! Every lookup is a hash lookup.
//!
//! Slots are addressed by their position in the day's active slot catalog
//! so that shortened pre-holiday days line up with standard days.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use u_timetable::ledger::{BookingLedger, ResourceKind, SlotKey};
//!
//! let mut ledger = BookingLedger::new(1);
//! let key = SlotKey::new(NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(), 0);
//! assert!(ledger.is_free(ResourceKind::Room, "r1", key));
//! ledger.book(ResourceKind::Room, "r1", key);
//! assert!(!ledger.is_free(ResourceKind::Room, "r1", key));
//! ```

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{CatalogIndex, ClassType, PlacedSession, SessionFacts, WorkCalendar};

/// Kind of bookable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Teacher,
    Group,
    Subgroup,
    Room,
}

/// A `(date, slot position)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub slot: usize,
}

impl SlotKey {
    /// Creates a key.
    pub fn new(date: NaiveDate, slot: usize) -> Self {
        Self { date, slot }
    }
}

/// A session as the ledger remembers it (per-group copies merged).
#[derive(Debug, Clone, PartialEq)]
pub struct BookedSession {
    pub slot: usize,
    pub teacher_id: String,
    pub group_ids: Vec<String>,
    pub subgroup_id: Option<String>,
    pub subject_id: String,
    pub room_id: String,
    pub class_type: ClassType,
    /// Departments of the teacher and the groups, resolved when booked.
    pub department_ids: Vec<String>,
}

impl BookedSession {
    /// Rule-matching view of the session.
    pub fn facts(&self) -> SessionFacts<'_> {
        SessionFacts {
            teacher_id: &self.teacher_id,
            group_ids: &self.group_ids,
            subgroup_id: self.subgroup_id.as_deref(),
            subject_id: &self.subject_id,
            room_id: &self.room_id,
            class_type: self.class_type,
            department_ids: &self.department_ids,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DayBookings {
    slots: HashMap<usize, u32>,
    subjects: HashMap<String, u32>,
    load: u32,
}

/// Occupancy index over teachers, groups, subgroups and rooms.
#[derive(Debug, Clone)]
pub struct BookingLedger {
    limit: u32,
    resources: HashMap<ResourceKind, HashMap<String, HashMap<NaiveDate, DayBookings>>>,
    sessions: HashMap<NaiveDate, Vec<BookedSession>>,
}

impl BookingLedger {
    /// Creates an empty ledger with the given per-key limit (1 or 2).
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            resources: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Per-key booking limit.
    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn day(&self, kind: ResourceKind, id: &str, date: NaiveDate) -> Option<&DayBookings> {
        self.resources.get(&kind)?.get(id)?.get(&date)
    }

    /// Bookings of a resource at a key.
    pub fn count(&self, kind: ResourceKind, id: &str, key: SlotKey) -> u32 {
        self.day(kind, id, key.date)
            .and_then(|d| d.slots.get(&key.slot))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the resource can take one more booking at `key`.
    #[inline]
    pub fn is_free(&self, kind: ResourceKind, id: &str, key: SlotKey) -> bool {
        self.count(kind, id, key) < self.limit
    }

    /// Books a resource at a key.
    pub fn book(&mut self, kind: ResourceKind, id: &str, key: SlotKey) {
        let day = self.day_mut(kind, id, key.date);
        *day.slots.entry(key.slot).or_insert(0) += 1;
        day.load += 1;
    }

    fn day_mut(&mut self, kind: ResourceKind, id: &str, date: NaiveDate) -> &mut DayBookings {
        self.resources
            .entry(kind)
            .or_default()
            .entry(id.to_string())
            .or_default()
            .entry(date)
            .or_default()
    }

    fn count_subject(&mut self, kind: ResourceKind, id: &str, date: NaiveDate, subject_id: &str) {
        let day = self.day_mut(kind, id, date);
        *day.subjects.entry(subject_id.to_string()).or_insert(0) += 1;
    }

    /// Books every resource of a session and remembers it for rule checks.
    ///
    /// The subgroup's parent group is expected among `group_ids`, so both
    /// are occupied under the same key.
    pub fn book_session(&mut self, date: NaiveDate, session: BookedSession) {
        let key = SlotKey::new(date, session.slot);
        self.book(ResourceKind::Teacher, &session.teacher_id, key);
        self.book(ResourceKind::Room, &session.room_id, key);
        for g in &session.group_ids {
            self.book(ResourceKind::Group, g, key);
            self.count_subject(ResourceKind::Group, g, date, &session.subject_id);
        }
        if let Some(sg) = &session.subgroup_id {
            self.book(ResourceKind::Subgroup, sg, key);
        }
        self.sessions.entry(date).or_default().push(session);
    }

    /// Sessions a resource holds on a date.
    pub fn day_load(&self, kind: ResourceKind, id: &str, date: NaiveDate) -> u32 {
        self.day(kind, id, date).map_or(0, |d| d.load)
    }

    /// Sessions of a subject a resource holds on a date.
    pub fn subject_count(&self, kind: ResourceKind, id: &str, date: NaiveDate, subject_id: &str) -> u32 {
        self.day(kind, id, date)
            .and_then(|d| d.subjects.get(subject_id))
            .copied()
            .unwrap_or(0)
    }

    /// Slot positions a resource occupies on a date, ascending.
    pub fn occupied_slots(&self, kind: ResourceKind, id: &str, date: NaiveDate) -> Vec<usize> {
        let mut slots: Vec<usize> = self
            .day(kind, id, date)
            .map(|d| d.slots.keys().copied().collect())
            .unwrap_or_default();
        slots.sort_unstable();
        slots
    }

    /// Sessions booked on a date, in booking order.
    pub fn sessions_on(&self, date: NaiveDate) -> &[BookedSession] {
        self.sessions.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates every booked session with its date.
    pub fn all_sessions(&self) -> impl Iterator<Item = (NaiveDate, &BookedSession)> {
        self.sessions
            .iter()
            .flat_map(|(date, list)| list.iter().map(move |s| (*date, s)))
    }

    /// Books pre-existing sessions.
    ///
    /// Per-group copies of one multi-group lecture (same date, slot,
    /// teacher, room, subject and class type) are merged and counted once.
    /// Sessions whose slot id is unknown on their date are skipped.
    pub fn seed(&mut self, sessions: &[PlacedSession], calendar: &WorkCalendar<'_>, index: &CatalogIndex<'_>) {
        let mut merged: Vec<(NaiveDate, BookedSession)> = Vec::new();
        let mut merge_index = HashMap::new();
        let mut skipped = 0usize;

        for s in sessions {
            let Some(slot) = calendar.slot_index(s.date, &s.time_slot_id) else {
                skipped += 1;
                continue;
            };
            let key = (s.merge_key(), s.subgroup_id.as_deref());
            let at = *merge_index.entry(key).or_insert_with(|| {
                merged.push((
                    s.date,
                    BookedSession {
                        slot,
                        teacher_id: s.teacher_id.clone(),
                        group_ids: Vec::new(),
                        subgroup_id: s.subgroup_id.clone(),
                        subject_id: s.subject_id.clone(),
                        room_id: s.room_id.clone(),
                        class_type: s.class_type,
                        department_ids: Vec::new(),
                    },
                ));
                merged.len() - 1
            });
            let groups = &mut merged[at].1.group_ids;
            for g in s.involved_groups() {
                if !groups.contains(g) {
                    groups.push(g.clone());
                }
            }
        }

        if skipped > 0 {
            warn!(event = "ledger_seed_skipped", skipped, "existing sessions with unknown slot ids ignored");
        }
        let count = merged.len();
        for (date, mut booked) in merged {
            booked.department_ids = index.departments(&booked.teacher_id, &booked.group_ids);
            self.book_session(date, booked);
        }
        debug!(event = "ledger_seeded", sessions = sessions.len(), merged = count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Catalog, Teacher, TimeSlot};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn booked(slot: usize, teacher: &str, room: &str, groups: &[&str]) -> BookedSession {
        BookedSession {
            slot,
            teacher_id: teacher.into(),
            group_ids: groups.iter().map(|g| g.to_string()).collect(),
            subgroup_id: None,
            subject_id: "math".into(),
            room_id: room.into(),
            class_type: ClassType::Lecture,
            department_ids: Vec::new(),
        }
    }

    fn catalog() -> Catalog {
        let mut c = Catalog::new();
        c.time_slots = vec![TimeSlot::new("ts1", "08:30"), TimeSlot::new("ts2", "10:10")];
        c
    }

    #[test]
    fn test_overbooking_limit() {
        let key = SlotKey::new(monday(), 0);
        let mut ledger = BookingLedger::new(2);
        ledger.book(ResourceKind::Teacher, "t1", key);
        assert!(ledger.is_free(ResourceKind::Teacher, "t1", key));
        ledger.book(ResourceKind::Teacher, "t1", key);
        assert!(!ledger.is_free(ResourceKind::Teacher, "t1", key));
        assert_eq!(ledger.count(ResourceKind::Teacher, "t1", key), 2);
        // Same id, other kind: independent
        assert!(ledger.is_free(ResourceKind::Room, "t1", key));
    }

    #[test]
    fn test_book_session_counts() {
        let mut ledger = BookingLedger::new(1);
        let mut s = booked(1, "t1", "r1", &["g1"]);
        s.subgroup_id = Some("g1-a".into());
        ledger.book_session(monday(), s);
        ledger.book_session(monday(), booked(0, "t2", "r2", &["g1"]));

        let key = SlotKey::new(monday(), 1);
        assert!(!ledger.is_free(ResourceKind::Group, "g1", key)); // parent occupied
        assert!(!ledger.is_free(ResourceKind::Subgroup, "g1-a", key));
        assert_eq!(ledger.day_load(ResourceKind::Group, "g1", monday()), 2);
        assert_eq!(ledger.subject_count(ResourceKind::Group, "g1", monday(), "math"), 2);
        assert_eq!(ledger.occupied_slots(ResourceKind::Group, "g1", monday()), vec![0, 1]);
        assert_eq!(ledger.sessions_on(monday()).len(), 2);
        assert!(ledger.sessions_on(monday().succ_opt().unwrap()).is_empty());
    }

    #[test]
    fn test_seed_merges_stream_copies() {
        let mut c = catalog();
        c.teachers = vec![Teacher::new("t1").with_department("d1")];
        let index = CatalogIndex::new(&c);
        let cal = WorkCalendar::new(&c);
        let sessions = vec![
            PlacedSession::new("a", monday(), "ts2", "r1", "t1", "math", ClassType::Lecture)
                .with_group("g1")
                .with_stream("s1"),
            PlacedSession::new("b", monday(), "ts2", "r1", "t1", "math", ClassType::Lecture)
                .with_group("g2")
                .with_stream("s1"),
            PlacedSession::new("c", monday(), "ts9", "r1", "t1", "math", ClassType::Lecture).with_group("g3"),
        ];

        let mut ledger = BookingLedger::new(1);
        ledger.seed(&sessions, &cal, &index);

        let key = SlotKey::new(monday(), 1);
        assert_eq!(ledger.count(ResourceKind::Teacher, "t1", key), 1);
        assert_eq!(ledger.count(ResourceKind::Room, "r1", key), 1);
        assert!(!ledger.is_free(ResourceKind::Group, "g2", key));
        assert_eq!(ledger.sessions_on(monday()).len(), 1);
        assert_eq!(ledger.sessions_on(monday())[0].group_ids, vec!["g1", "g2"]);
        assert_eq!(ledger.sessions_on(monday())[0].department_ids, vec!["d1"]);
        // Unknown slot id skipped
        assert_eq!(ledger.day_load(ResourceKind::Group, "g3", monday()), 0);
    }
}
