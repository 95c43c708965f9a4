//! SQLite store handle and queries.
//!
//! One live connection per process, driven on a background thread by
//! `tokio-rusqlite`. Reconnecting after failure means dropping the handle
//! and opening a fresh one; a broken handle is never reused.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::records::{
    Applied, AttendanceRecord, AttendanceStatus, ClassWindow, StudentRow, TransitionIntent,
};
use crate::schedule;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    face_encoding TEXT
);
CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    class_name TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time NOT NULL,
    end_time NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL,
    class_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    marked_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_student_class
    ON attendance (student_id, class_id, marked_at);
CREATE TABLE IF NOT EXISTS activity_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    activity TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed {field} in row: {detail}")]
    MalformedRow {
        field: &'static str,
        detail: String,
    },
    #[error("store operation timed out")]
    Timeout,
}

/// Handle to the record store. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and create if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.to_path_buf()).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                tracing::warn!(error = %err, "could not enable WAL journal mode");
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// All students that have a non-empty encoding payload.
    pub async fn students_with_encoding(&self) -> Result<Vec<StudentRow>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT student_id, name, face_encoding FROM students
                     WHERE face_encoding IS NOT NULL AND face_encoding != ''",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(StudentRow {
                        student_id: row.get(0)?,
                        name: row.get(1)?,
                        encoding: row.get(2)?,
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    /// The class window containing `time` on `date`, if any.
    ///
    /// Time cells are normalized per [`schedule`]; a row with a malformed
    /// time is skipped with a warning, never failing the whole lookup.
    pub async fn active_class_window(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<ClassWindow>, StoreError> {
        let date_text = date.format("%Y-%m-%d").to_string();
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, class_name, start_time, end_time FROM classes WHERE date = ?1",
                )?;
                let mut rows = stmt.query(params![date_text])?;
                let mut out: Vec<(i64, String, Value, Value)> = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?));
                }
                Ok(out)
            })
            .await?;

        let mut windows = Vec::new();
        for (id, name, start, end) in raw {
            match (
                schedule::normalize_time(&start),
                schedule::normalize_time(&end),
            ) {
                (Ok(start_time), Ok(end_time)) => windows.push(ClassWindow {
                    id,
                    name,
                    date,
                    start_time,
                    end_time,
                }),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!(class = id, error = %err, "skipping class window with malformed time");
                }
            }
        }

        Ok(schedule::resolve_active(&windows, time).cloned())
    }

    /// Most recent attendance record for (student, class), if any.
    pub async fn latest_attendance(
        &self,
        student_id: &str,
        class_id: i64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let student = student_id.to_string();
        let raw = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, student_id, class_id, status, marked_at FROM attendance
                         WHERE student_id = ?1 AND class_id = ?2
                         ORDER BY marked_at DESC LIMIT 1",
                        params![student, class_id],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, i64>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        match raw {
            None => Ok(None),
            Some((id, student_id, class_id, status, marked_at)) => Ok(Some(AttendanceRecord {
                id,
                student_id,
                class_id,
                status: parse_status(&status)?,
                marked_at: parse_timestamp(&marked_at)?,
            })),
        }
    }

    /// Apply a transition as a single transaction: update the latest
    /// existing record for (student, class) in place, or insert the first
    /// one. At most one logical record per pair.
    pub async fn apply_transition(&self, intent: &TransitionIntent) -> Result<Applied, StoreError> {
        let intent = intent.clone();
        let applied = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM attendance
                         WHERE student_id = ?1 AND class_id = ?2
                         ORDER BY marked_at DESC LIMIT 1",
                        params![intent.student_id, intent.class_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let applied = match existing {
                    Some(id) => {
                        tx.execute(
                            "UPDATE attendance SET status = ?1, marked_at = ?2 WHERE id = ?3",
                            params![
                                intent.status.as_str(),
                                intent.marked_at.to_rfc3339(),
                                id
                            ],
                        )?;
                        Applied::Updated
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO attendance (student_id, class_id, status, marked_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![
                                intent.student_id,
                                intent.class_id,
                                intent.status.as_str(),
                                intent.marked_at.to_rfc3339()
                            ],
                        )?;
                        Applied::Inserted
                    }
                };

                tx.commit()?;
                Ok(applied)
            })
            .await?;
        Ok(applied)
    }

    /// Append one immutable activity-log line.
    pub async fn append_activity_log(&self, activity: &str) -> Result<(), StoreError> {
        let activity = activity.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO activity_logs (activity, created_at) VALUES (?1, ?2)",
                    params![activity, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent activity-log lines, newest first.
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let limit = limit as i64;
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT activity FROM activity_logs ORDER BY id DESC LIMIT ?1",
                )?;
                let mut rows = stmt.query(params![limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get(0)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    /// Insert or replace a student record.
    pub async fn insert_student(
        &self,
        student_id: &str,
        name: &str,
        encoding: Option<&str>,
    ) -> Result<(), StoreError> {
        let student_id = student_id.to_string();
        let name = name.to_string();
        let encoding = encoding.map(str::to_string);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO students (student_id, name, face_encoding)
                     VALUES (?1, ?2, ?3)",
                    params![student_id, name, encoding],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove a class window.
    pub async fn delete_class(&self, class_id: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM classes WHERE id = ?1", params![class_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert a class window; returns its id. Times are stored as
    /// `"HH:MM:SS"` text.
    pub async fn insert_class(
        &self,
        name: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<i64, StoreError> {
        let name = name.to_string();
        let date_text = date.format("%Y-%m-%d").to_string();
        let start_text = start_time.format("%H:%M:%S").to_string();
        let end_text = end_time.format("%H:%M:%S").to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO classes (class_name, date, start_time, end_time)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![name, date_text, start_text, end_text],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::MalformedRow {
            field: "marked_at",
            detail: format!("{value:?}: {err}"),
        })
}

fn parse_status(value: &str) -> Result<AttendanceStatus, StoreError> {
    AttendanceStatus::parse(value).ok_or_else(|| StoreError::MalformedRow {
        field: "status",
        detail: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn intent(student: &str, class_id: i64) -> TransitionIntent {
        TransitionIntent {
            student_id: student.to_string(),
            class_id,
            status: AttendanceStatus::Present,
            marked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn students_query_filters_empty_encodings() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_student("S001", "Ada", Some("0.1,0.2")).await.unwrap();
        store.insert_student("S002", "Grace", Some("")).await.unwrap();
        store.insert_student("S003", "Edsger", None).await.unwrap();

        let rows = store.students_with_encoding().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, "S001");
    }

    #[tokio::test]
    async fn window_active_at_inclusive_bounds() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_class("Algorithms", date(), at(10, 0, 0), at(11, 0, 0))
            .await
            .unwrap();

        assert!(store
            .active_class_window(date(), at(10, 0, 0))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .active_class_window(date(), at(11, 0, 0))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .active_class_window(date(), at(9, 59, 59))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .active_class_window(date(), at(11, 0, 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn overlapping_windows_pick_latest_start() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_class("Morning block", date(), at(9, 0, 0), at(12, 0, 0))
            .await
            .unwrap();
        let late_id = store
            .insert_class("Lab", date(), at(10, 0, 0), at(11, 0, 0))
            .await
            .unwrap();

        let active = store
            .active_class_window(date(), at(10, 30, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, late_id);
    }

    #[tokio::test]
    async fn integer_time_cells_are_normalized() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO classes (class_name, date, start_time, end_time)
                     VALUES ('Seminar', '2026-03-02', ?1, ?2)",
                    params![10 * 3600, 11 * 3600],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let active = store
            .active_class_window(date(), at(10, 30, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.name, "Seminar");
        assert_eq!(active.start_time, at(10, 0, 0));
    }

    #[tokio::test]
    async fn malformed_time_row_is_skipped_not_fatal() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO classes (class_name, date, start_time, end_time)
                     VALUES ('Broken', '2026-03-02', 'whenever', 'later')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        store
            .insert_class("Valid", date(), at(10, 0, 0), at(11, 0, 0))
            .await
            .unwrap();

        let active = store
            .active_class_window(date(), at(10, 30, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.name, "Valid");
    }

    #[tokio::test]
    async fn apply_inserts_then_updates_in_place() {
        let store = Store::open_in_memory().await.unwrap();

        let first = intent("S001", 7);
        assert_eq!(
            store.apply_transition(&first).await.unwrap(),
            Applied::Inserted
        );

        let second = intent("S001", 7);
        assert_eq!(
            store.apply_transition(&second).await.unwrap(),
            Applied::Updated
        );

        let record = store.latest_attendance("S001", 7).await.unwrap().unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        // Exactly one logical row for the pair.
        let count: i64 = store
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM attendance WHERE student_id = 'S001' AND class_id = 7",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn update_keeps_latest_timestamp() {
        let store = Store::open_in_memory().await.unwrap();

        let mut first = intent("S001", 7);
        first.marked_at = "2026-03-02T10:00:00Z".parse().unwrap();
        store.apply_transition(&first).await.unwrap();

        let mut second = intent("S001", 7);
        second.marked_at = "2026-03-02T10:05:00Z".parse().unwrap();
        store.apply_transition(&second).await.unwrap();

        let record = store.latest_attendance("S001", 7).await.unwrap().unwrap();
        assert_eq!(record.marked_at, second.marked_at);
    }

    #[tokio::test]
    async fn distinct_pairs_get_distinct_records() {
        let store = Store::open_in_memory().await.unwrap();
        store.apply_transition(&intent("S001", 7)).await.unwrap();
        store.apply_transition(&intent("S001", 8)).await.unwrap();
        store.apply_transition(&intent("S002", 7)).await.unwrap();

        assert!(store.latest_attendance("S001", 7).await.unwrap().is_some());
        assert!(store.latest_attendance("S001", 8).await.unwrap().is_some());
        assert!(store.latest_attendance("S002", 7).await.unwrap().is_some());
        assert!(store.latest_attendance("S002", 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activity_log_appends() {
        let store = Store::open_in_memory().await.unwrap();
        store.append_activity_log("class started").await.unwrap();
        store.append_activity_log("camera up").await.unwrap();

        let lines = store.recent_activity(10).await.unwrap();
        assert_eq!(lines, vec!["camera up".to_string(), "class started".to_string()]);
    }
}
