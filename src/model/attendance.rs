use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Check-in (`time_in`) or check-out (`time_out`).
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceType {
    #[default]
    TimeIn,
    TimeOut,
}

impl TryFrom<String> for AttendanceType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum AttendanceStatus {
    #[default]
    Present,
}

impl TryFrom<String> for AttendanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub student_id: u64,

    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub date: NaiveDate,

    #[schema(example = "2026-01-01T07:45:12.250Z", format = "date-time", value_type = String)]
    pub time: DateTime<Utc>,

    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub attendance_type: AttendanceType,

    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
}

/// A row about to be written; `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub student_id: u64,
    pub date: NaiveDate,
    pub time: DateTime<Utc>,
    pub attendance_type: AttendanceType,
    pub status: AttendanceStatus,
}

impl NewAttendance {
    /// Stamps a `Present` record with today's UTC date and the current time.
    pub fn present_now(student_id: u64, attendance_type: AttendanceType) -> Self {
        let time = Utc::now();
        Self {
            student_id,
            date: time.date_naive(),
            time,
            attendance_type,
            status: AttendanceStatus::Present,
        }
    }

    pub fn into_record(self, id: u64) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id: self.student_id,
            date: self.date,
            time: self.time,
            attendance_type: self.attendance_type,
            status: self.status,
        }
    }
}
