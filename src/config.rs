//! Run configuration.
//!
//! [`Settings`] travel with the catalog and describe the institution;
//! [`HeuristicConfig`] and [`SessionConfig`] describe one run. Both run
//! configs load from TOML and are checked with `validate()` before any
//! placement starts.
//!
//! ```
//! use u_timetable::config::HeuristicConfig;
//!
//! let config = HeuristicConfig::from_toml_str(r#"
//!     strictness = 7
//!     iterations = 20
//!     seed = 42
//!     [timeFrame]
//!     start = "2024-09-02"
//!     end = "2024-09-07"
//! "#).unwrap();
//! assert_eq!(config.iterations, 20);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TimetableError};
use crate::models::DateWindow;

/// Institution-wide scheduling settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Allow gaps between a resource's sessions on one day.
    pub allow_windows: bool,
    /// Use the production calendar to decide working days.
    pub respect_production_calendar: bool,
    /// Switch to the shortened bell schedule on pre-holiday days.
    pub use_shortened_pre_holiday_schedule: bool,
    /// Allow two sessions per resource per `(date, slot)`.
    pub allow_overbooking: bool,
    /// Treat Forbidden availability as a large soft penalty.
    pub allow_manual_override_of_forbidden: bool,
}

impl Settings {
    /// Sessions a single resource may hold at one `(date, slot)`.
    #[inline]
    pub fn overbooking_limit(&self) -> u32 {
        if self.allow_overbooking {
            2
        } else {
            1
        }
    }
}

/// Kind of entity a run is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    Group,
    Teacher,
    Classroom,
}

/// Restricts a run to the demands of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    /// Creates a target.
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

/// Configuration of a semester timetabling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeuristicConfig {
    /// Soft-cost multiplier scale, 1..=10 (5 = neutral).
    #[serde(default = "default_strictness")]
    pub strictness: u8,
    /// Optional restriction to one group, teacher or room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    /// Planning window.
    pub time_frame: DateWindow,
    /// Drop existing class sessions inside the window before the run.
    #[serde(default = "default_true")]
    pub clear_existing: bool,
    /// Multi-start attempts.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Curriculum semester to schedule.
    #[serde(default = "default_semester")]
    pub semester: u32,
    /// Base seed for randomised attempts.
    #[serde(default)]
    pub seed: u64,
    /// Run attempts in parallel batches.
    #[serde(default)]
    pub parallel: bool,
    /// Wall-clock budget for the whole run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_budget_secs: Option<u64>,
    /// Annealing steps per chain applied to the best attempt (0 = off).
    #[serde(default)]
    pub refine_iterations: u32,
}

fn default_strictness() -> u8 {
    5
}

fn default_true() -> bool {
    true
}

fn default_iterations() -> u32 {
    1
}

fn default_semester() -> u32 {
    1
}

impl HeuristicConfig {
    /// Creates a config with defaults for the given window.
    pub fn new(time_frame: DateWindow) -> Self {
        Self {
            strictness: default_strictness(),
            target: None,
            time_frame,
            clear_existing: true,
            iterations: default_iterations(),
            semester: default_semester(),
            seed: 0,
            parallel: false,
            time_budget_secs: None,
            refine_iterations: 0,
        }
    }

    /// Sets the strictness.
    pub fn with_strictness(mut self, strictness: u8) -> Self {
        self.strictness = strictness;
        self
    }

    /// Sets the target restriction.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the number of attempts.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables parallel attempts.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables annealing refinement of the best attempt.
    pub fn with_refinement(mut self, iterations: u32) -> Self {
        self.refine_iterations = iterations;
        self
    }

    /// Sets the semester.
    pub fn with_semester(mut self, semester: u32) -> Self {
        self.semester = semester;
        self
    }

    /// Sets whether existing sessions in the window are discarded.
    pub fn with_clear_existing(mut self, clear: bool) -> Self {
        self.clear_existing = clear;
        self
    }

    /// Multiplier applied to the total soft cost.
    #[inline]
    pub fn strictness_factor(&self) -> f64 {
        f64::from(self.strictness) / 5.0
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.strictness) {
            return Err(TimetableError::InvalidConfig(format!(
                "strictness must be within 1..=10, got {}",
                self.strictness
            )));
        }
        if self.iterations == 0 {
            return Err(TimetableError::InvalidConfig(
                "iterations must be at least 1".into(),
            ));
        }
        if !self.time_frame.is_valid() {
            return Err(TimetableError::InvalidConfig(format!(
                "time frame ends ({}) before it starts ({})",
                self.time_frame.end, self.time_frame.start
            )));
        }
        Ok(())
    }

    /// Loads a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses a config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// How test attestations are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMode {
    /// Tests obey rest days like exams.
    #[default]
    LikeExams,
    /// Tests ignore rest days.
    NoRestDays,
    /// Tests are not scheduled.
    None,
}

/// Configuration of an exam-session run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Days between a consultation and its exam; 0 disables consultations.
    #[serde(default = "default_consultation_offset")]
    pub consultation_offset: u32,
    /// Minimum free days between attestations of one group.
    #[serde(default = "default_rest_days")]
    pub rest_days: u32,
    /// Drop existing attestation sessions inside the window before the run.
    #[serde(default = "default_true")]
    pub clear_existing: bool,
    /// Session period.
    pub time_frame: DateWindow,
    #[serde(default)]
    pub schedule_tests: TestMode,
    /// Curriculum semester whose attestations are scheduled.
    #[serde(default = "default_semester")]
    pub semester: u32,
    /// Room type used for exams without explicit requirements.
    /// Defaults to the type named `"Лекционная"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lecture_room_type_id: Option<String>,
}

fn default_consultation_offset() -> u32 {
    1
}

fn default_rest_days() -> u32 {
    2
}

impl SessionConfig {
    /// Creates a config with defaults for the given window.
    pub fn new(time_frame: DateWindow) -> Self {
        Self {
            consultation_offset: default_consultation_offset(),
            rest_days: default_rest_days(),
            clear_existing: true,
            time_frame,
            schedule_tests: TestMode::default(),
            semester: default_semester(),
            lecture_room_type_id: None,
        }
    }

    /// Sets the consultation offset.
    pub fn with_consultation_offset(mut self, days: u32) -> Self {
        self.consultation_offset = days;
        self
    }

    /// Sets the rest days.
    pub fn with_rest_days(mut self, days: u32) -> Self {
        self.rest_days = days;
        self
    }

    /// Sets the test mode.
    pub fn with_test_mode(mut self, mode: TestMode) -> Self {
        self.schedule_tests = mode;
        self
    }

    /// Sets the designated lecture room type.
    pub fn with_lecture_room_type(mut self, type_id: impl Into<String>) -> Self {
        self.lecture_room_type_id = Some(type_id.into());
        self
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !self.time_frame.is_valid() {
            return Err(TimetableError::InvalidConfig(format!(
                "session window ends ({}) before it starts ({})",
                self.time_frame.end, self.time_frame.start
            )));
        }
        Ok(())
    }

    /// Loads a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses a config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}
