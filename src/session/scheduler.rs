//! First-fit placement of exam-session events.
//!
//! # Algorithm
//!
//! 1. Exams, then tests, each by descending student count (stable)
//! 2. Per event, walk working dates × active slots and take the first slot
//!    where teacher and groups are free, no group already sits an
//!    attestation that day or within the rest days, and nothing is
//!    Forbidden; then the first free room in ascending capacity order
//! 3. Consultations are pinned to `exam date − offset`; only slot and room
//!    are searched

use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, info};

use super::events::{EventKind, EventPool, SessionEvent};
use super::{SessionRequest, SessionResult};
use crate::config::{SessionConfig, TestMode};
use crate::error::{Result, TimetableError};
use crate::ledger::{BookedSession, BookingLedger, ResourceKind, SlotKey};
use crate::models::{
    availability_of, Availability, AvailabilityGrid, CatalogIndex, ClassType, Day, PlacedSession, Room, RoomType,
    WorkCalendar,
};
use crate::validation::validate_catalog;

/// Exam-session scheduler.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use u_timetable::config::SessionConfig;
/// use u_timetable::models::*;
/// use u_timetable::session::{SessionRequest, SessionScheduler};
///
/// let mut catalog = Catalog::new();
/// catalog.teachers = vec![Teacher::new("t1")];
/// catalog.groups = vec![Group::new("g1", 20).with_specialty("cs")];
/// catalog.subjects = vec![Subject::new("math")];
/// catalog.room_types = vec![RoomType::new("lh", "Лекционная")];
/// catalog.rooms = vec![Room::new("r1", "lh", 30)];
/// catalog.time_slots = vec![TimeSlot::new("ts1", "08:30")];
/// catalog.plans = vec![CurriculumPlan::new("p", "cs")
///     .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam))];
/// catalog.teacher_subject_links =
///     vec![TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture])];
///
/// let start = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();
/// let end = NaiveDate::from_ymd_opt(2025, 1, 18).unwrap();
/// let config = SessionConfig::new(DateWindow::new(start, end));
/// let result = SessionScheduler::new()
///     .run(&SessionRequest::new(&catalog, &config))
///     .unwrap();
///
/// // Exam on Tuesday 14th, consultation on Monday 13th
/// assert_eq!(result.sessions.len(), 2);
/// assert!(result.unplaced.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionScheduler;

impl SessionScheduler {
    /// Creates a scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Places the semester's exams, tests and consultations.
    ///
    /// # Errors
    /// `InvalidConfig` for a reversed window, an empty slot catalog or a
    /// window without working days; `InconsistentCatalog` for unresolved
    /// references.
    pub fn run(&self, request: &SessionRequest<'_>) -> Result<SessionResult> {
        let SessionRequest {
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
        let days = calendar.working_days(&config.time_frame);
        if days.is_empty() {
            return Err(TimetableError::InvalidConfig(format!(
                "no working day between {} and {}",
                config.time_frame.start, config.time_frame.end
            )));
        }

        let retained: Vec<PlacedSession> = existing
            .iter()
            .filter(|s| !(config.clear_existing && config.time_frame.contains(s.date) && s.is_attestation()))
            .cloned()
            .collect();
        let index = CatalogIndex::new(catalog);
        let mut state = Placement::new(&index, &calendar, config, &retained);

        let pool = EventPool::generate(catalog, config);
        info!(
            event = "session_run_started",
            events = pool.events.len(),
            unresolvable = pool.unresolvable.len(),
            working_days = days.len()
        );

        let by_size = |kind| {
            let mut events: Vec<&SessionEvent> = pool.of_kind(kind).collect();
            events.sort_by(|a, b| b.student_count.cmp(&a.student_count));
            events
        };

        let mut result = SessionResult::default();
        let mut exam_dates: HashMap<&str, NaiveDate> = HashMap::new();

        for event in by_size(EventKind::Exam).into_iter().chain(by_size(EventKind::Test)) {
            let placed = state
                .room_passes(event)
                .iter()
                .find_map(|rooms| state.first_fit(event, &days, rooms));
            match placed {
                Some(session) => {
                    exam_dates.insert(event.uid.as_str(), session.date);
                    result.sessions.push(session);
                }
                None => {
                    debug!(event = "session_event_unplaced", uid = %event.uid);
                    result.unplaced.push(event.clone());
                }
            }
        }

        for consult in pool.of_kind(EventKind::Consultation) {
            let date = consult
                .consultation_for
                .as_deref()
                .and_then(|exam| exam_dates.get(exam))
                .and_then(|d| d.checked_sub_days(Days::new(u64::from(config.consultation_offset))));
            let placed = date
                .filter(|d| calendar.is_working_day(*d))
                .and_then(|d| state.place_consultation(consult, d));
            match placed {
                Some(session) => result.sessions.push(session),
                None => {
                    debug!(event = "session_event_unplaced", uid = %consult.uid);
                    result.unplaced.push(consult.clone());
                }
            }
        }

        result.unresolvable = pool.unresolvable;
        info!(
            event = "session_run_finished",
            placed = result.sessions.len(),
            unplaced = result.unplaced.len(),
            unresolvable = result.unresolvable.len()
        );
        Ok(result)
    }
}

/// Mutable placement state of one session run.
struct Placement<'a> {
    index: &'a CatalogIndex<'a>,
    calendar: &'a WorkCalendar<'a>,
    config: &'a SessionConfig,
    ledger: BookingLedger,
    /// Dates of exams and tests per group.
    attestations: HashMap<String, Vec<NaiveDate>>,
    allow_forbidden: bool,
    lecture_type: Option<&'a str>,
}

impl<'a> Placement<'a> {
    fn new(
        index: &'a CatalogIndex<'a>,
        calendar: &'a WorkCalendar<'a>,
        config: &'a SessionConfig,
        retained: &[PlacedSession],
    ) -> Self {
        let catalog = index.catalog;
        let mut ledger = BookingLedger::new(catalog.settings.overbooking_limit());
        ledger.seed(retained, calendar, index);

        let mut attestations: HashMap<String, Vec<NaiveDate>> = HashMap::new();
        for s in retained
            .iter()
            .filter(|s| matches!(s.class_type, ClassType::Exam | ClassType::Test))
        {
            for g in s.involved_groups() {
                attestations.entry(g.clone()).or_default().push(s.date);
            }
        }

        let lecture_type = config.lecture_room_type_id.as_deref().or_else(|| {
            catalog
                .room_types
                .iter()
                .find(|t| t.name == RoomType::LECTURE_HALL)
                .map(|t| t.id.as_str())
        });

        Self {
            index,
            calendar,
            config,
            ledger,
            attestations,
            allow_forbidden: catalog.settings.allow_manual_override_of_forbidden,
            lecture_type,
        }
    }

    /// Candidate room lists tried in order, each by ascending capacity.
    ///
    /// Exams: the subject's Exam room types, else the lecture room type.
    /// Tests: the subject's Test room types, else non-lecture rooms, then
    /// any room.
    fn room_passes(&self, event: &SessionEvent) -> Vec<Vec<&'a Room>> {
        let class_type = event.kind.class_type();
        let explicit = self
            .index
            .subject(&event.subject_id)
            .and_then(|s| s.room_types_for(class_type));

        let lecture = |r: &Room| Some(r.type_id.as_str()) == self.lecture_type;
        let passes = match (explicit, event.kind) {
            (Some(types), _) => vec![self.rooms_where(event, |r| types.contains(&r.type_id))],
            (None, EventKind::Exam) => vec![self.rooms_where(event, lecture)],
            (None, _) => vec![
                self.rooms_where(event, |r| !lecture(r)),
                self.rooms_where(event, |_| true),
            ],
        };
        passes.into_iter().filter(|rooms| !rooms.is_empty()).collect()
    }

    /// Rooms seating the event and carrying the subject's tags, by
    /// ascending capacity.
    fn rooms_where(&self, event: &SessionEvent, accepts: impl Fn(&Room) -> bool) -> Vec<&'a Room> {
        let tags: &[String] = self
            .index
            .subject(&event.subject_id)
            .map(|s| s.required_tag_ids.as_slice())
            .unwrap_or_default();
        let mut rooms: Vec<&'a Room> = self
            .index
            .catalog
            .rooms
            .iter()
            .filter(|r| r.capacity >= event.student_count && r.has_tags(tags) && accepts(r))
            .collect();
        rooms.sort_by_key(|r| r.capacity);
        rooms
    }

    fn first_fit(&mut self, event: &SessionEvent, days: &[NaiveDate], rooms: &[&'a Room]) -> Option<PlacedSession> {
        for &date in days {
            if !self.date_allowed(event, date) {
                continue;
            }
            if let Some(session) = self.place_on(event, date, rooms) {
                return Some(session);
            }
        }
        None
    }

    fn place_consultation(&mut self, event: &SessionEvent, date: NaiveDate) -> Option<PlacedSession> {
        let explicit = self
            .index
            .subject(&event.subject_id)
            .and_then(|s| s.room_types_for(ClassType::Consultation));
        let rooms = self.rooms_where(event, |r| explicit.map_or(true, |types| types.contains(&r.type_id)));
        self.place_on(event, date, &rooms)
    }

    /// Same-day and rest-day limits for exams and tests.
    fn date_allowed(&self, event: &SessionEvent, date: NaiveDate) -> bool {
        let rest = match event.kind {
            EventKind::Exam => self.config.rest_days,
            EventKind::Test if self.config.schedule_tests == TestMode::LikeExams => self.config.rest_days,
            _ => 0,
        };
        event.group_ids.iter().all(|g| {
            self.attestations.get(g).map_or(true, |dates| {
                dates
                    .iter()
                    .all(|d| (date - *d).num_days().unsigned_abs() > u64::from(rest))
            })
        })
    }

    /// First free `(slot, room)` on a fixed date.
    fn place_on(&mut self, event: &SessionEvent, date: NaiveDate, rooms: &[&'a Room]) -> Option<PlacedSession> {
        let day = Day::of(date);
        for (position, slot) in self.calendar.slots_for(date).iter().enumerate() {
            let key = SlotKey::new(date, position);
            let standard_id = self.calendar.standard_slot_id(position).unwrap_or(slot.id.as_str());

            if !self.ledger.is_free(ResourceKind::Teacher, &event.teacher_id, key)
                || event
                    .group_ids
                    .iter()
                    .any(|g| !self.ledger.is_free(ResourceKind::Group, g, key))
            {
                continue;
            }
            let teacher_grid = self
                .index
                .teacher(&event.teacher_id)
                .and_then(|t| t.availability_grid.as_ref());
            let group_grids = event
                .group_ids
                .iter()
                .map(|g| self.index.group(g).and_then(|g| g.availability_grid.as_ref()));
            if std::iter::once(teacher_grid)
                .chain(group_grids)
                .any(|grid| self.forbidden(grid, day, standard_id))
            {
                continue;
            }

            let room = rooms.iter().copied().find(|r| {
                self.ledger.is_free(ResourceKind::Room, &r.id, key)
                    && !self.forbidden(r.availability_grid.as_ref(), day, standard_id)
            });
            if let Some(room) = room {
                return Some(self.commit(event, date, position, &slot.id, room));
            }
        }
        None
    }

    fn forbidden(&self, grid: Option<&AvailabilityGrid>, day: Day, slot_id: &str) -> bool {
        !self.allow_forbidden && availability_of(grid, day, slot_id) == Availability::Forbidden
    }

    fn commit(
        &mut self,
        event: &SessionEvent,
        date: NaiveDate,
        position: usize,
        slot_id: &str,
        room: &Room,
    ) -> PlacedSession {
        let class_type = event.kind.class_type();
        self.ledger.book_session(
            date,
            BookedSession {
                slot: position,
                teacher_id: event.teacher_id.clone(),
                group_ids: event.group_ids.clone(),
                subgroup_id: None,
                subject_id: event.subject_id.clone(),
                room_id: room.id.clone(),
                class_type,
                department_ids: self.index.departments(&event.teacher_id, &event.group_ids),
            },
        );
        if event.is_attestation() {
            for g in &event.group_ids {
                self.attestations.entry(g.clone()).or_default().push(date);
            }
        }

        let session = PlacedSession::new(
            format!("session-{}", event.uid),
            date,
            slot_id,
            &room.id,
            &event.teacher_id,
            &event.subject_id,
            class_type,
        )
        .with_groups(event.group_ids.clone())
        .with_source(&event.uid);
        match &event.stream_id {
            Some(stream) => session.with_stream(stream),
            None => session,
        }
    }
}
