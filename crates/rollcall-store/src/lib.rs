//! rollcall-store — SQLite-backed persistence for the attendance system.
//!
//! Record types, the schedule resolver, and the idempotent attendance
//! writer. All access flows through [`Store`], a handle to a background
//! SQLite connection.

pub mod records;
pub mod schedule;
pub mod store;
pub mod writer;

pub use records::{
    Applied, AttendanceRecord, AttendanceStatus, ClassWindow, StudentRow, TransitionIntent,
};
pub use store::{Store, StoreError};
