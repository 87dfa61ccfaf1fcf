use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::{Display, Error};
use serde_json::json;

use crate::model::attendance::AttendanceType;

/// Why a scan (or a manual entry) did not produce an attendance row.
///
/// None of these end the scan session; the message is shown to the operator
/// and the scanner keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ScanError {
    #[display(fmt = "No QR code data found.")]
    NoCode,

    #[display(fmt = "Student not found")]
    NotFound { code: String },

    #[display(fmt = "Error recording attendance")]
    Persistence { message: String },

    #[display(fmt = "Attendance already recorded as {} today", attendance_type)]
    AlreadyRecorded { attendance_type: AttendanceType },

    #[display(fmt = "No time in recorded today")]
    MissingTimeIn,
}

impl ResponseError for ScanError {
    fn status_code(&self) -> StatusCode {
        match self {
            ScanError::NoCode => StatusCode::BAD_REQUEST,
            ScanError::NotFound { .. } => StatusCode::NOT_FOUND,
            ScanError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ScanError::AlreadyRecorded { .. } | ScanError::MissingTimeIn => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string()
        }))
    }
}
