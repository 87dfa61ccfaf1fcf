use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::model::attendance::{AttendanceRecord, AttendanceType, NewAttendance};
use crate::scan::error::ScanError;
use crate::scan::session::ScanSession;
use crate::scan::store::AttendanceStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanReport {
    /// The code was handled earlier in this session; nothing was done.
    AlreadyProcessed,
    Recorded(AttendanceRecord),
}

/// Student lookup followed by the attendance write.
pub struct ScanPipeline {
    store: Arc<dyn AttendanceStore>,
    daily_guard: bool,
    /// Held from the guard's count through the insert.
    guarded_write: Mutex<()>,
}

impl ScanPipeline {
    pub fn new(store: Arc<dyn AttendanceStore>, daily_guard: bool) -> Self {
        Self {
            store,
            daily_guard,
            guarded_write: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    /// Runs one dispatched scan against `session`.
    ///
    /// Once a student is identified the code stays processed and the student
    /// stays displayed, even when the write fails.
    #[instrument(
        name = "scan",
        skip_all,
        fields(session_id = %session.id(), attendance_type = %attendance_type)
    )]
    pub async fn handle_scan(
        &self,
        session: &ScanSession,
        code: Option<&str>,
        attendance_type: AttendanceType,
    ) -> Result<ScanReport, ScanError> {
        let Some(code) = code.filter(|c| !c.is_empty()) else {
            let err = ScanError::NoCode;
            session.show_error_over_student(err.to_string());
            return Err(err);
        };

        if session.is_processed(code) {
            debug!(code, "QR code has already been processed");
            return Ok(ScanReport::AlreadyProcessed);
        }

        let student = match self.store.find_student_by_qr(code).await {
            Ok(Some(student)) => student,
            Ok(None) => {
                warn!(code, "No student found for QR code");
                return Err(self.not_found(session, code));
            }
            Err(e) => {
                error!(error = %e, code, "Failed to fetch student");
                return Err(self.not_found(session, code));
            }
        };

        info!(student_id = student.id, "Student identified");
        let student_id = student.id;
        session.mark_found(code, student);

        match self.write_attendance(student_id, attendance_type).await {
            Ok(record) => {
                session.attach_attendance(student_id, record.clone());
                Ok(ScanReport::Recorded(record))
            }
            Err(err) => {
                session.attach_error(student_id, err.to_string());
                Err(err)
            }
        }
    }

    fn not_found(&self, session: &ScanSession, code: &str) -> ScanError {
        let err = ScanError::NotFound {
            code: code.to_string(),
        };
        session.show_not_found(err.to_string());
        err
    }

    /// Appends a `Present` row for today, applying the daily guard when enabled.
    pub async fn write_attendance(
        &self,
        student_id: u64,
        attendance_type: AttendanceType,
    ) -> Result<AttendanceRecord, ScanError> {
        let row = NewAttendance::present_now(student_id, attendance_type);

        let _serialized = if self.daily_guard {
            let held = self.guarded_write.lock().await;
            self.check_daily_guard(&row).await?;
            Some(held)
        } else {
            None
        };

        let record = self.store.insert_attendance(row).await.map_err(|e| {
            error!(error = %e, student_id, "Failed to record attendance");
            ScanError::Persistence {
                message: e.to_string(),
            }
        })?;

        info!(
            student_id,
            attendance_id = record.id,
            attendance_type = %record.attendance_type,
            "Attendance recorded"
        );
        Ok(record)
    }

    /// At most one `time_in` and one `time_out` per student per day, and no
    /// `time_out` before a `time_in`.
    async fn check_daily_guard(&self, row: &NewAttendance) -> Result<(), ScanError> {
        let count = |attendance_type| {
            self.store
                .count_attendance(row.student_id, row.date, attendance_type)
        };
        let persistence = |e: anyhow::Error| {
            error!(error = %e, student_id = row.student_id, "Failed to check existing attendance");
            ScanError::Persistence {
                message: e.to_string(),
            }
        };

        if count(row.attendance_type).await.map_err(persistence)? > 0 {
            info!(student_id = row.student_id, "Attendance already recorded today");
            return Err(ScanError::AlreadyRecorded {
                attendance_type: row.attendance_type,
            });
        }

        if row.attendance_type == AttendanceType::TimeOut
            && count(AttendanceType::TimeIn).await.map_err(persistence)? == 0
        {
            info!(student_id = row.student_id, "Time out without time in");
            return Err(ScanError::MissingTimeIn);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::memory::{MemoryStore, student};
    use crate::scan::session::ScanOutcome;

    fn setup(daily_guard: bool) -> (Arc<MemoryStore>, ScanPipeline, ScanSession) {
        let store = Arc::new(MemoryStore::with_students(vec![
            student(1, "Ana", "A"),
            student(2, "Ben", "B"),
        ]));
        let pipeline = ScanPipeline::new(store.clone(), daily_guard);
        let session = ScanSession::new(AttendanceType::TimeIn, 1);
        (store, pipeline, session)
    }

    #[tokio::test]
    async fn first_scan_records_selected_type() {
        let (store, pipeline, session) = setup(false);

        let report = pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeOut)
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, 1);
        assert_eq!(records[0].attendance_type, AttendanceType::TimeOut);
        assert_eq!(records[0].date, records[0].time.date_naive());
        assert_eq!(report, ScanReport::Recorded(records[0].clone()));

        match session.outcome() {
            ScanOutcome::Found {
                student,
                attendance,
                error,
            } => {
                assert_eq!(student.name, "Ana");
                assert_eq!(attendance, Some(records[0].clone()));
                assert_eq!(error, None);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(session.is_processed("A"));
        assert_eq!(session.cue_seq(), 1);
    }

    #[tokio::test]
    async fn repeated_code_is_not_recorded_twice() {
        let (store, pipeline, session) = setup(false);

        pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap();
        let second = pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap();

        assert_eq!(second, ScanReport::AlreadyProcessed);
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.lookups(), 1);
        assert_eq!(session.cue_seq(), 1);
    }

    #[tokio::test]
    async fn empty_payload_never_reaches_lookup() {
        let (store, pipeline, session) = setup(false);

        for payload in [None, Some("")] {
            let err = pipeline
                .handle_scan(&session, payload, AttendanceType::TimeIn)
                .await
                .unwrap_err();
            assert_eq!(err, ScanError::NoCode);
        }

        assert_eq!(store.lookups(), 0);
        assert_eq!(
            session.outcome(),
            ScanOutcome::Error {
                message: "No QR code data found.".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_payload_keeps_displayed_student() {
        let (store, pipeline, session) = setup(false);
        pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap();

        let err = pipeline
            .handle_scan(&session, Some(""), AttendanceType::TimeIn)
            .await
            .unwrap_err();

        assert_eq!(err, ScanError::NoCode);
        let outcome = session.outcome();
        assert_eq!(outcome.student().map(|s| s.name.as_str()), Some("Ana"));
        assert_eq!(outcome.error_message(), Some("No QR code data found."));
        assert_eq!(store.lookups(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn unknown_code_clears_student_and_writes_nothing() {
        let (store, pipeline, session) = setup(false);
        pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap();

        let err = pipeline
            .handle_scan(&session, Some("Z"), AttendanceType::TimeIn)
            .await
            .unwrap_err();

        assert_eq!(err, ScanError::NotFound { code: "Z".into() });
        assert!(session.outcome().student().is_none());
        assert_eq!(session.outcome().error_message(), Some("Student not found"));
        assert!(!session.is_processed("Z"));
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_reads_as_not_found() {
        let (store, pipeline, session) = setup(false);
        store.fail_lookups(true);

        let err = pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap_err();

        assert_eq!(err, ScanError::NotFound { code: "A".into() });
        assert!(!session.is_processed("A"));

        // A later scan of the same code is retried.
        store.fail_lookups(false);
        pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn selection_change_between_scans_is_honoured() {
        let (store, pipeline, session) = setup(false);

        pipeline
            .handle_scan(&session, Some("A"), session.selection().get())
            .await
            .unwrap();
        session.selection().set(AttendanceType::TimeOut);
        pipeline
            .handle_scan(&session, Some("B"), session.selection().get())
            .await
            .unwrap();

        let types: Vec<_> = store
            .records()
            .iter()
            .map(|r| (r.student_id, r.attendance_type))
            .collect();
        assert_eq!(
            types,
            vec![(1, AttendanceType::TimeIn), (2, AttendanceType::TimeOut)]
        );
    }

    #[tokio::test]
    async fn insert_failure_keeps_student_and_processed_marking() {
        let (store, pipeline, session) = setup(false);
        store.fail_inserts(true);

        let err = pipeline
            .handle_scan(&session, Some("A"), AttendanceType::TimeIn)
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Persistence { .. }));
        let outcome = session.outcome();
        assert_eq!(outcome.student().map(|s| s.id), Some(1));
        assert_eq!(outcome.error_message(), Some("Error recording attendance"));
        assert!(session.is_processed("A"));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn daily_guard_rejects_second_time_in() {
        let (store, pipeline, _) = setup(true);

        pipeline
            .write_attendance(1, AttendanceType::TimeIn)
            .await
            .unwrap();
        let err = pipeline
            .write_attendance(1, AttendanceType::TimeIn)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ScanError::AlreadyRecorded {
                attendance_type: AttendanceType::TimeIn
            }
        );
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn daily_guard_holds_for_concurrent_writes() {
        let (store, pipeline, _) = setup(true);

        let (first, second) = tokio::join!(
            pipeline.write_attendance(1, AttendanceType::TimeIn),
            pipeline.write_attendance(1, AttendanceType::TimeIn),
        );

        assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn daily_guard_requires_time_in_before_time_out() {
        let (store, pipeline, _) = setup(true);

        let err = pipeline
            .write_attendance(2, AttendanceType::TimeOut)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::MissingTimeIn);

        pipeline
            .write_attendance(2, AttendanceType::TimeIn)
            .await
            .unwrap();
        pipeline
            .write_attendance(2, AttendanceType::TimeOut)
            .await
            .unwrap();
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn without_guard_duplicates_are_written() {
        let (store, pipeline, _) = setup(false);

        pipeline
            .write_attendance(1, AttendanceType::TimeOut)
            .await
            .unwrap();
        pipeline
            .write_attendance(1, AttendanceType::TimeOut)
            .await
            .unwrap();

        assert_eq!(store.records().len(), 2);
    }
}
