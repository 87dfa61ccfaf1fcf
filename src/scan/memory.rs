//! In-memory `AttendanceStore` for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::model::attendance::{AttendanceRecord, AttendanceType, NewAttendance};
use crate::model::student::Student;
use crate::scan::store::AttendanceStore;

pub fn student(id: u64, name: &str, qr_code: &str) -> Student {
    Student {
        id,
        name: name.to_string(),
        email: format!("{}@school.edu", name.to_lowercase()),
        qr_code: qr_code.to_string(),
        contact: String::new(),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    students: Mutex<Vec<Student>>,
    records: Mutex<Vec<AttendanceRecord>>,
    next_id: AtomicU64,
    lookups: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn with_students(students: Vec<Student>) -> Self {
        Self {
            students: Mutex::new(students),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_student_by_qr(&self, qr_code: &str) -> Result<Option<Student>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            bail!("connection reset");
        }
        let students = self.students.lock().unwrap();
        Ok(students.iter().find(|s| s.qr_code == qr_code).cloned())
    }

    async fn find_student(&self, student_id: u64) -> Result<Option<Student>> {
        let students = self.students.lock().unwrap();
        Ok(students.iter().find(|s| s.id == student_id).cloned())
    }

    async fn insert_attendance(&self, row: NewAttendance) -> Result<AttendanceRecord> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("insert rejected");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = row.into_record(id);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn count_attendance(
        &self,
        student_id: u64,
        date: NaiveDate,
        attendance_type: AttendanceType,
    ) -> Result<i64> {
        let count = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.student_id == student_id && r.date == date && r.attendance_type == attendance_type
            })
            .count();
        // A real round trip lets other writers run between the count and the insert.
        tokio::task::yield_now().await;
        Ok(count as i64)
    }
}
