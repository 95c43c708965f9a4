//! Record types shared between the store and its callers.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Raw student row as stored, encoding text unparsed.
#[derive(Debug, Clone)]
pub struct StudentRow {
    pub student_id: String,
    pub name: String,
    pub encoding: String,
}

/// A scheduled class interval during which attendance capture is active.
///
/// Resolved fresh each scheduling tick; never cached across ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassWindow {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

/// One logical attendance record per (student, class) pair.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    pub class_id: i64,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

/// A proposed attendance state change awaiting application to the store.
#[derive(Debug, Clone)]
pub struct TransitionIntent {
    pub student_id: String,
    pub class_id: i64,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

/// Outcome of applying a transition intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
}
