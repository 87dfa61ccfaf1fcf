use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;
use tracing::debug;

use crate::model::attendance::{AttendanceRecord, AttendanceType, NewAttendance};
use crate::model::student::Student;
use crate::utils::{qr_code_filter, student_cache};

/// What the scan pipeline needs from persistence: read students, append attendance.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>>;

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>>;

    async fn insert_attendance(&self, row: NewAttendance) -> Result<AttendanceRecord>;

    /// Number of rows of `attendance_type` the student already has on `date`.
    async fn count_attendance(
        &self,
        student_id: u64,
        date: NaiveDate,
        attendance_type: AttendanceType,
    ) -> Result<i64>;
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub(crate) const STUDENT_COLUMNS: &str = "id, name, email, qr_code, contact, created_at";

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>> {
        if let Some(student) = student_cache::get(qr_code).await {
            debug!(student_id = student.id, "Student cache hit");
            return Ok(Some(student));
        }

        // Negative answers are only trustworthy once the filter holds every code.
        if qr_code_filter::is_warm() && !qr_code_filter::might_exist(qr_code) {
            debug!("QR code rejected by filter");
            return Ok(None);
        }

        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE qr_code = ? LIMIT 1"
        ))
        .bind(qr_code)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(student) = &student {
            student_cache::put(student.clone()).await;
        }

        Ok(student)
    }

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }

    async fn insert_attendance(&self, row: NewAttendance) -> Result<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance (student_id, date, time, `type`, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.student_id)
        .bind(row.date)
        .bind(row.time)
        .bind(row.attendance_type.as_ref())
        .bind(row.status.as_ref())
        .execute(&self.pool)
        .await?;

        Ok(row.into_record(result.last_insert_id()))
    }

    async fn count_attendance(
        &self,
        student_id: u64,
        date: NaiveDate,
        attendance_type: AttendanceType,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND date = ? AND `type` = ?",
        )
        .bind(student_id)
        .bind(date)
        .bind(attendance_type.as_ref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
