//! Date windows and the production calendar.
//!
//! Resolves which dates of a planning window are working days and which
//! bell schedule (standard or shortened) applies on each of them.
//!
//! # Precedence
//! When the production calendar is respected, an explicit calendar entry
//! decides whether a date is a working day (a special workday may fall on
//! a Sunday). Without an entry, or when the calendar is ignored, every day
//! except Sunday is a working day.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Catalog, TimeSlot};
use crate::config::Settings;

/// An inclusive date range `[start, end]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    /// First date (inclusive).
    pub start: NaiveDate,
    /// Last date (inclusive).
    pub end: NaiveDate,
}

impl DateWindow {
    /// Creates a new date window.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whether the window contains at least one date.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Whether a date falls within this window.
    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days in the window.
    pub fn len_days(&self) -> u64 {
        if self.is_valid() {
            (self.end - self.start).num_days() as u64 + 1
        } else {
            0
        }
    }

    /// Iterates every date of the window in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len_days()).filter_map(move |offset| start.checked_add_days(Days::new(offset)))
    }
}

/// Kind of production calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalendarEventKind {
    #[serde(rename = "Государственный праздник")]
    Holiday,
    #[serde(rename = "Предпраздничный день")]
    PreHoliday,
    #[serde(rename = "Перенесенный выходной")]
    MovedHoliday,
    #[serde(rename = "Региональный праздник")]
    RegionalHoliday,
    #[serde(rename = "Особый рабочий день")]
    SpecialWorkday,
}

/// One production calendar entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub name: String,
    pub is_work_day: bool,
    #[serde(rename = "type")]
    pub kind: CalendarEventKind,
}

impl CalendarDay {
    /// Creates a calendar entry.
    pub fn new(date: NaiveDate, kind: CalendarEventKind, is_work_day: bool) -> Self {
        Self {
            id: format!("cal-{date}"),
            date,
            name: String::new(),
            is_work_day,
            kind,
        }
    }

    /// A non-working public holiday.
    pub fn holiday(date: NaiveDate) -> Self {
        Self::new(date, CalendarEventKind::Holiday, false)
    }

    /// A shortened working day before a holiday.
    pub fn pre_holiday(date: NaiveDate) -> Self {
        Self::new(date, CalendarEventKind::PreHoliday, true)
    }
}

/// Working-day and bell-schedule resolver over a catalog.
#[derive(Debug, Clone)]
pub struct WorkCalendar<'a> {
    entries: HashMap<NaiveDate, &'a CalendarDay>,
    respect_calendar: bool,
    use_shortened: bool,
    standard: &'a [TimeSlot],
    shortened: &'a [TimeSlot],
}

impl<'a> WorkCalendar<'a> {
    /// Creates a resolver from the catalog's calendar, slots and settings.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_settings(catalog, &catalog.settings)
    }

    /// Creates a resolver with explicit settings.
    pub fn with_settings(catalog: &'a Catalog, settings: &Settings) -> Self {
        Self {
            entries: catalog.calendar.iter().map(|d| (d.date, d)).collect(),
            respect_calendar: settings.respect_production_calendar,
            use_shortened: settings.use_shortened_pre_holiday_schedule,
            standard: &catalog.time_slots,
            shortened: &catalog.time_slots_shortened,
        }
    }

    /// Calendar entry for a date, if any.
    pub fn entry(&self, date: NaiveDate) -> Option<&'a CalendarDay> {
        self.entries.get(&date).copied()
    }

    /// Whether sessions may be placed on `date`.
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if self.respect_calendar {
            if let Some(entry) = self.entry(date) {
                return entry.is_work_day;
            }
        }
        date.weekday() != Weekday::Sun
    }

    /// Working days of a window, in date order.
    pub fn working_days(&self, window: &DateWindow) -> Vec<NaiveDate> {
        window.dates().filter(|d| self.is_working_day(*d)).collect()
    }

    /// Whether `date` runs on the shortened bell schedule.
    pub fn is_shortened(&self, date: NaiveDate) -> bool {
        self.use_shortened
            && !self.shortened.is_empty()
            && self
                .entry(date)
                .is_some_and(|e| e.kind == CalendarEventKind::PreHoliday)
    }

    /// Slot catalog active on `date`.
    pub fn slots_for(&self, date: NaiveDate) -> &'a [TimeSlot] {
        if self.is_shortened(date) {
            self.shortened
        } else {
            self.standard
        }
    }

    /// Standard slot id at the same position as a (possibly shortened) slot.
    ///
    /// Availability grids and rules are keyed by the standard catalog.
    pub fn standard_slot_id(&self, index: usize) -> Option<&'a str> {
        self.standard.get(index).map(|s| s.id.as_str())
    }

    /// Position of a slot id within the catalog active on `date`.
    pub fn slot_index(&self, date: NaiveDate, slot_id: &str) -> Option<usize> {
        self.slots_for(date)
            .iter()
            .position(|s| s.id == slot_id)
            .or_else(|| self.standard.iter().position(|s| s.id == slot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.time_slots = vec![TimeSlot::new("ts1", "08:30-10:00"), TimeSlot::new("ts2", "10:10-11:40")];
        catalog.time_slots_shortened = vec![TimeSlot::new("sh1", "08:30-09:30"), TimeSlot::new("sh2", "09:40-10:40")];
        catalog.calendar = vec![
            CalendarDay::holiday(date(2024, 11, 4)),
            CalendarDay::pre_holiday(date(2024, 11, 2)),
            CalendarDay::new(date(2024, 11, 3), CalendarEventKind::SpecialWorkday, true),
        ];
        catalog
    }

    #[test]
    fn test_date_window() {
        let w = DateWindow::new(date(2024, 9, 2), date(2024, 9, 8));
        assert_eq!(w.len_days(), 7);
        assert!(w.contains(date(2024, 9, 8)));
        assert!(!w.contains(date(2024, 9, 9)));
        assert_eq!(w.dates().count(), 7);

        let inverted = DateWindow::new(date(2024, 9, 8), date(2024, 9, 2));
        assert!(!inverted.is_valid());
        assert_eq!(inverted.dates().count(), 0);
    }

    #[test]
    fn test_sunday_is_not_working() {
        let catalog = Catalog::new();
        let cal = WorkCalendar::new(&catalog);
        let week = DateWindow::new(date(2024, 9, 2), date(2024, 9, 8));
        let days = cal.working_days(&week);
        assert_eq!(days.len(), 6); // Monday..Saturday
        assert!(!days.contains(&date(2024, 9, 8)));
    }

    #[test]
    fn test_calendar_respected() {
        let mut catalog = make_catalog();
        catalog.settings.respect_production_calendar = true;
        let cal = WorkCalendar::new(&catalog);
        assert!(!cal.is_working_day(date(2024, 11, 4))); // holiday
        assert!(cal.is_working_day(date(2024, 11, 3))); // special Sunday workday
        assert!(cal.is_working_day(date(2024, 11, 5)));
    }

    #[test]
    fn test_calendar_ignored() {
        let catalog = make_catalog();
        let cal = WorkCalendar::new(&catalog);
        assert!(cal.is_working_day(date(2024, 11, 4)));
        assert!(!cal.is_working_day(date(2024, 11, 3)));
    }

    #[test]
    fn test_shortened_schedule() {
        let mut catalog = make_catalog();
        let pre = date(2024, 11, 2);
        assert_eq!(WorkCalendar::new(&catalog).slots_for(pre)[0].id, "ts1");

        catalog.settings.use_shortened_pre_holiday_schedule = true;
        let cal = WorkCalendar::new(&catalog);
        assert!(cal.is_shortened(pre));
        assert_eq!(cal.slots_for(pre)[0].id, "sh1");
        assert_eq!(cal.slots_for(date(2024, 11, 5))[0].id, "ts1");
        assert_eq!(cal.slot_index(pre, "sh2"), Some(1));
        assert_eq!(cal.standard_slot_id(1), Some("ts2"));
    }

    #[test]
    fn test_shortened_needs_catalog() {
        let mut catalog = make_catalog();
        catalog.settings.use_shortened_pre_holiday_schedule = true;
        catalog.time_slots_shortened.clear();
        let cal = WorkCalendar::new(&catalog);
        assert!(!cal.is_shortened(date(2024, 11, 2)));
    }
}
