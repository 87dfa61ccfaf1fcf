use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::attendance::{AttendanceRecord, AttendanceType};
use crate::model::student::Student;

pub const CAMERA_BLOCKED_NOTICE: &str =
    "Camera is blocked or not accessible. Please allow camera in your browser permissions and Reload.";

/// Attendance type chosen on the scanner page.
///
/// The dispatcher reads it when a scan fires, so a change made while a code is
/// still settling applies to that scan.
#[derive(Debug, Default)]
pub struct SelectionCell(RwLock<AttendanceType>);

impl SelectionCell {
    pub fn new(initial: AttendanceType) -> Self {
        Self(RwLock::new(initial))
    }

    pub fn get(&self) -> AttendanceType {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, attendance_type: AttendanceType) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = attendance_type;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CameraStatus {
    #[default]
    Pending,
    Ready,
    Blocked,
}

/// What the scanner page shows for the latest dispatched scan.
#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    #[default]
    Idle,
    /// Student identified. `error` carries a failed write; the student stays on screen.
    Found {
        student: Student,
        attendance: Option<AttendanceRecord>,
        error: Option<String>,
    },
    NotFound {
        message: String,
    },
    Error {
        message: String,
    },
}

impl ScanOutcome {
    pub fn student(&self) -> Option<&Student> {
        match self {
            ScanOutcome::Found { student, .. } => Some(student),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ScanOutcome::Idle => None,
            ScanOutcome::Found { error, .. } => error.as_deref(),
            ScanOutcome::NotFound { message } | ScanOutcome::Error { message } => Some(message),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    last_scanned: Option<String>,
    outcome: ScanOutcome,
    processed: HashSet<String>,
    cue_seq: u64,
    camera: CameraStatus,
}

/// Server-side state of one open scanner page.
///
/// Every mutation is dropped once the session is closed, so a scan still in
/// flight at teardown cannot write into a dead view.
#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    /// User who opened the scanner.
    owner: u64,
    selection: SelectionCell,
    state: Mutex<SessionState>,
    closed: AtomicBool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    pub attendance_type: AttendanceType,
    #[schema(example = "STU-2024-0001")]
    pub last_scanned: Option<String>,
    pub outcome: ScanOutcome,
    pub processed_count: usize,
    /// Grows by one per identified student; play `cue_url` when it changes.
    pub cue_seq: u64,
    #[schema(example = "/beep.mp3")]
    pub cue_url: String,
    pub camera: CameraStatus,
    pub notice: Option<String>,
}

impl ScanSession {
    pub fn new(attendance_type: AttendanceType, owner: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            selection: SelectionCell::new(attendance_type),
            state: Mutex::new(SessionState::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }

    pub fn selection(&self) -> &SelectionCell {
        &self.selection
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        if self.is_closed() {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut state))
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn is_processed(&self, code: &str) -> bool {
        self.read(|s| s.processed.contains(code))
    }

    pub fn processed_count(&self) -> usize {
        self.read(|s| s.processed.len())
    }

    pub fn outcome(&self) -> ScanOutcome {
        self.read(|s| s.outcome.clone())
    }

    pub fn cue_seq(&self) -> u64 {
        self.read(|s| s.cue_seq)
    }

    pub fn record_decoded(&self, payload: Option<String>) {
        self.update(|s| s.last_scanned = payload);
    }

    /// Sets the error, keeping a displayed student on screen.
    pub fn show_error_over_student(&self, message: String) {
        self.update(|s| match &mut s.outcome {
            ScanOutcome::Found { error, .. } => *error = Some(message),
            outcome => *outcome = ScanOutcome::Error { message },
        });
    }

    pub fn show_not_found(&self, message: String) {
        self.update(|s| s.outcome = ScanOutcome::NotFound { message });
    }

    /// Displays the student, remembers the code and bumps the audio cue.
    pub fn mark_found(&self, code: &str, student: Student) {
        self.update(|s| {
            s.outcome = ScanOutcome::Found {
                student,
                attendance: None,
                error: None,
            };
            s.processed.insert(code.to_string());
            s.cue_seq += 1;
        });
    }

    pub fn attach_attendance(&self, student_id: u64, record: AttendanceRecord) {
        self.update(|s| {
            if let ScanOutcome::Found {
                student, attendance, ..
            } = &mut s.outcome
            {
                if student.id == student_id {
                    *attendance = Some(record);
                }
            }
        });
    }

    pub fn attach_error(&self, student_id: u64, message: String) {
        self.update(|s| {
            if let ScanOutcome::Found { student, error, .. } = &mut s.outcome {
                if student.id == student_id {
                    *error = Some(message);
                }
            }
        });
    }

    pub fn set_camera(&self, camera: CameraStatus) {
        self.update(|s| s.camera = camera);
    }

    pub fn view(&self, cue_url: &str) -> SessionView {
        let attendance_type = self.selection.get();
        self.read(|s| SessionView {
            id: self.id,
            attendance_type,
            last_scanned: s.last_scanned.clone(),
            outcome: s.outcome.clone(),
            processed_count: s.processed.len(),
            cue_seq: s.cue_seq,
            cue_url: cue_url.to_string(),
            camera: s.camera,
            notice: (s.camera == CameraStatus::Blocked).then(|| CAMERA_BLOCKED_NOTICE.to_string()),
        })
    }
}
