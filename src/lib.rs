//! University timetabling engine.
//!
//! Expands curriculum plans into class demands and places them on
//! concrete `(date, time slot, room)` triples under hard resource-conflict
//! constraints and weighted soft preferences. A separate pipeline places
//! exam-session events (exams, tests, consultations).
//!
//! # Modules
//!
//! - **`models`**: Catalog snapshot, demands, placed sessions, calendar
//! - **`config`**: Run configurations (TOML-loadable) and institution settings
//! - **`validation`**: Catalog integrity checks and hard-constraint audits
//! - **`pool`**: Demand generation from plans and electives
//! - **`ledger`**: Resource booking index over `(date, slot)` keys
//! - **`cost`**: Slot cost evaluation (conflicts, availability, rules, windows)
//! - **`priority`**: Composable demand ordering rules
//! - **`scheduler`**: Greedy placement, multi-start control, annealing refinement, KPIs
//! - **`session`**: Exam-session event pool and first-fit placement
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use u_timetable::config::HeuristicConfig;
//! use u_timetable::models::*;
//! use u_timetable::scheduler::{MultiStartScheduler, TimetableRequest};
//! use u_timetable::validation::audit_sessions;
//!
//! let mut catalog = Catalog::new();
//! catalog.teachers = vec![Teacher::new("t1"), Teacher::new("t2")];
//! catalog.groups = vec![
//!     Group::new("g1", 25).with_specialty("cs"),
//!     Group::new("g2", 20).with_specialty("cs"),
//! ];
//! catalog.streams = vec![Stream::new("s1", vec!["g1".into(), "g2".into()])];
//! catalog.subjects = vec![Subject::new("math")];
//! catalog.rooms = vec![Room::new("hall", "lh", 60), Room::new("r1", "std", 30)];
//! catalog.time_slots = vec![TimeSlot::new("ts1", "08:30"), TimeSlot::new("ts2", "10:10")];
//! catalog.plans = vec![CurriculumPlan::new("p", "cs")
//!     .with_entry(PlanEntry::new("math", 1, AttestationKind::Exam).with_hours(4, 2, 0))];
//! catalog.teacher_subject_links = vec![
//!     TeacherSubjectLink::new("t1", "math", vec![ClassType::Lecture]),
//!     TeacherSubjectLink::new("t2", "math", vec![ClassType::Practical]),
//! ];
//!
//! let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
//! let friday = NaiveDate::from_ymd_opt(2024, 9, 6).unwrap();
//! let config = HeuristicConfig::new(DateWindow::new(monday, friday))
//!     .with_iterations(4)
//!     .with_seed(7);
//!
//! let result = MultiStartScheduler::new()
//!     .run(&TimetableRequest::new(&catalog, &config))
//!     .unwrap();
//! assert!(result.unplaced.is_empty());
//! assert!(audit_sessions(&catalog, &result.sessions).is_empty());
//! ```

pub mod config;
pub mod cost;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pool;
pub mod priority;
pub mod scheduler;
pub mod session;
pub mod validation;

pub use error::{Result, TimetableError};
