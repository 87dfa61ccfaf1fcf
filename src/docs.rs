use crate::api::attendance::{AttendanceListResponse, ManualAttendance};
use crate::api::scan::{OpenSession, ScanEvent, SelectAttendanceType};
use crate::api::student::{CreateStudent, StudentListResponse};
use crate::auth::auth::AuthUser;
use crate::auth::handlers::LoginResponse;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceType};
use crate::model::role::Role;
use crate::model::student::Student;
use crate::models::{LoginReqDto, UserReq};
use crate::scan::{CameraStatus, ScanOutcome, SessionView};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Smart Scan API",
        version = "1.0.0",
        description = r#"
## QR Attendance Scanner

Records student attendance from QR codes read by a browser scanner.

### Key Features
- **Scan Sessions**
  - Open a scanner, pick time in / time out, submit decoded QR payloads and poll the result
  - Bursts of decodes are debounced; each student is recorded once per session
- **Roster**
  - Create, update, list and remove students with their QR codes
- **Attendance**
  - Browse records and enter attendance manually

### Security
Every `/api` endpoint expects a **JWT Bearer** access token from `/auth/login`.
Roster changes require the **Admin** role.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::scan::open_session,
        crate::api::scan::get_session,
        crate::api::scan::close_session,
        crate::api::scan::set_attendance_type,
        crate::api::scan::submit_event,

        crate::api::student::create_student,
        crate::api::student::list_students,
        crate::api::student::get_student,
        crate::api::student::update_student,
        crate::api::student::delete_student,

        crate::api::attendance::list_attendance,
        crate::api::attendance::record_attendance
    ),
    components(
        schemas(
            UserReq,
            LoginReqDto,
            LoginResponse,
            AuthUser,
            Role,
            OpenSession,
            SelectAttendanceType,
            ScanEvent,
            SessionView,
            ScanOutcome,
            CameraStatus,
            Student,
            CreateStudent,
            StudentListResponse,
            AttendanceRecord,
            AttendanceType,
            AttendanceStatus,
            AttendanceListResponse,
            ManualAttendance
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Login and token APIs"),
        (name = "Scan", description = "QR scanner session APIs"),
        (name = "Student", description = "Student roster APIs"),
        (name = "Attendance", description = "Attendance record APIs"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_with_bearer_scheme() {
        let doc = ApiDoc::openapi();

        for path in [
            "/auth/login",
            "/api/me",
            "/api/scan/sessions",
            "/api/scan/sessions/{session_id}/events",
            "/api/students/{student_id}",
            "/api/attendance",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("SessionView"));
    }
}
