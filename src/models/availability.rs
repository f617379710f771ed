//! Weekdays and per-(day, slot) availability grids.
//!
//! Teachers, groups, subgroups and rooms may carry an availability grid.
//! A missing entry means [`Availability::Allowed`].
//!
//! # Wire Format
//! Day and availability labels are the application's display strings and
//! must round-trip verbatim:
//!
//! ```
//! use u_timetable::models::{Availability, Day};
//!
//! let json = serde_json::to_string(&Day::Monday).unwrap();
//! assert_eq!(json, "\"Понедельник\"");
//! let a: Availability = serde_json::from_str("\"Запрещено\"").unwrap();
//! assert_eq!(a, Availability::Forbidden);
//! ```

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    #[serde(rename = "Понедельник")]
    Monday,
    #[serde(rename = "Вторник")]
    Tuesday,
    #[serde(rename = "Среда")]
    Wednesday,
    #[serde(rename = "Четверг")]
    Thursday,
    #[serde(rename = "Пятница")]
    Friday,
    #[serde(rename = "Суббота")]
    Saturday,
    #[serde(rename = "Воскресенье")]
    Sunday,
}

impl Day {
    /// Day of the week for a calendar date.
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => Day::Monday,
            Weekday::Tue => Day::Tuesday,
            Weekday::Wed => Day::Wednesday,
            Weekday::Thu => Day::Thursday,
            Weekday::Fri => Day::Friday,
            Weekday::Sat => Day::Saturday,
            Weekday::Sun => Day::Sunday,
        }
    }

    /// Display label (same as the serialized form).
    pub fn label(self) -> &'static str {
        match self {
            Day::Monday => "Понедельник",
            Day::Tuesday => "Вторник",
            Day::Wednesday => "Среда",
            Day::Thursday => "Четверг",
            Day::Friday => "Пятница",
            Day::Saturday => "Суббота",
            Day::Sunday => "Воскресенье",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Availability of an entity at a (day, slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Availability {
    /// Hard exclusion (unless the override setting is on).
    #[serde(rename = "Запрещено")]
    Forbidden,
    /// Soft penalty.
    #[serde(rename = "Нежелательно")]
    Undesirable,
    /// Neutral.
    #[default]
    #[serde(rename = "Разрешено")]
    Allowed,
    /// Soft bonus.
    #[serde(rename = "Желательно")]
    Desirable,
}

/// Availability grid: day → slot id → availability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityGrid(pub HashMap<Day, HashMap<String, Availability>>);

impl AvailabilityGrid {
    /// Creates an empty grid (everything allowed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one cell.
    pub fn with(mut self, day: Day, slot_id: impl Into<String>, value: Availability) -> Self {
        self.0.entry(day).or_default().insert(slot_id.into(), value);
        self
    }

    /// Looks up a cell, defaulting to `Allowed`.
    #[inline]
    pub fn get(&self, day: Day, slot_id: &str) -> Availability {
        self.0
            .get(&day)
            .and_then(|slots| slots.get(slot_id))
            .copied()
            .unwrap_or_default()
    }
}

/// Looks up an optional grid, defaulting to `Allowed`.
#[inline]
pub(crate) fn availability_of(grid: Option<&AvailabilityGrid>, day: Day, slot_id: &str) -> Availability {
    grid.map(|g| g.get(day, slot_id)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_of_date() {
        // 2024-09-02 was a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        assert_eq!(Day::of(monday), Day::Monday);
        assert_eq!(Day::of(monday + chrono::Days::new(5)), Day::Saturday);
        assert_eq!(Day::of(monday + chrono::Days::new(6)), Day::Sunday);
    }

    #[test]
    fn test_grid_defaults_to_allowed() {
        let grid = AvailabilityGrid::new().with(Day::Monday, "ts1", Availability::Forbidden);
        assert_eq!(grid.get(Day::Monday, "ts1"), Availability::Forbidden);
        assert_eq!(grid.get(Day::Monday, "ts2"), Availability::Allowed);
        assert_eq!(grid.get(Day::Tuesday, "ts1"), Availability::Allowed);
        assert_eq!(availability_of(None, Day::Monday, "ts1"), Availability::Allowed);
    }

    #[test]
    fn test_grid_wire_format() {
        let json = r#"{"Понедельник": {"ts1": "Нежелательно"}}"#;
        let grid: AvailabilityGrid = serde_json::from_str(json).unwrap();
        assert_eq!(grid.get(Day::Monday, "ts1"), Availability::Undesirable);
    }
}
