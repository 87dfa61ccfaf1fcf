use crate::auth::auth::AuthUser;
use crate::model::attendance::AttendanceType;
use crate::model::role::Role;
use crate::scan::{CameraStatus, ScanService, ScanSession, SessionView};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OpenSession {
    /// Initial selection; `time_in` when omitted
    #[serde(default)]
    pub attendance_type: AttendanceType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectAttendanceType {
    pub attendance_type: AttendanceType,
}

/// Something the scanner page observed.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    /// The decoder produced a payload (possibly empty).
    Decoded {
        #[serde(default)]
        data: Option<String>,
    },
    /// A frame had no readable code.
    DecodeFailed {
        #[serde(default)]
        reason: Option<String>,
    },
    CameraReady,
    /// Camera permission denied or no device.
    CameraBlocked,
}

/// Sessions are visible to the user who opened them and to admins.
async fn session_for(scans: &ScanService, id: &Uuid, auth: &AuthUser) -> Option<Arc<ScanSession>> {
    scans
        .get(id)
        .await
        .filter(|session| session.owner() == auth.user_id || auth.role == Role::Admin)
}

fn session_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "message": "Scan session not found"
    }))
}

/// Open a scan session
#[utoipa::path(
    post,
    path = "/api/scan/sessions",
    request_body(content = OpenSession, description = "Optional; defaults to time_in"),
    responses(
        (status = 201, description = "Session opened", body = SessionView),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn open_session(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    body: Option<web::Json<OpenSession>>,
) -> HttpResponse {
    let attendance_type = body.map(|b| b.into_inner()).unwrap_or_default().attendance_type;
    let session = scans.open(attendance_type, auth.user_id).await;

    info!(session_id = %session.id(), by = %auth.username, "Scanner opened");
    HttpResponse::Created().json(scans.view(&session))
}

/// Current state of a scan session
#[utoipa::path(
    get,
    path = "/api/scan/sessions/{session_id}",
    params(("session_id", Path, description = "Scan session ID")),
    responses(
        (status = 200, description = "Session state", body = SessionView),
        (status = 404, description = "Scan session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn get_session(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    match session_for(&scans, &path.into_inner(), &auth).await {
        Some(session) => HttpResponse::Ok().json(scans.view(&session)),
        None => session_not_found(),
    }
}

/// Close a scan session
#[utoipa::path(
    delete,
    path = "/api/scan/sessions/{session_id}",
    params(("session_id", Path, description = "Scan session ID")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Scan session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn close_session(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let id = path.into_inner();
    if session_for(&scans, &id, &auth).await.is_none() {
        return session_not_found();
    }

    if scans.close(&id).await {
        HttpResponse::NoContent().finish()
    } else {
        session_not_found()
    }
}

/// Change the attendance type used by upcoming scans
#[utoipa::path(
    put,
    path = "/api/scan/sessions/{session_id}/attendance-type",
    params(("session_id", Path, description = "Scan session ID")),
    request_body = SelectAttendanceType,
    responses(
        (status = 200, description = "Selection changed", body = SessionView),
        (status = 404, description = "Scan session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn set_attendance_type(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    path: web::Path<Uuid>,
    body: web::Json<SelectAttendanceType>,
) -> HttpResponse {
    let Some(session) = session_for(&scans, &path.into_inner(), &auth).await else {
        return session_not_found();
    };

    session.selection().set(body.attendance_type);
    debug!(session_id = %session.id(), attendance_type = %body.attendance_type, "Attendance type selected");

    HttpResponse::Ok().json(scans.view(&session))
}

/// Submit a scanner event
///
/// Decoded payloads are debounced; poll the session to see the result.
#[utoipa::path(
    post,
    path = "/api/scan/sessions/{session_id}/events",
    params(("session_id", Path, description = "Scan session ID")),
    request_body(content = ScanEvent, example = json!({ "event": "decoded", "data": "STU-2024-0001" })),
    responses(
        (status = 202, description = "Event accepted"),
        (status = 404, description = "Scan session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn submit_event(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    path: web::Path<Uuid>,
    event: web::Json<ScanEvent>,
) -> HttpResponse {
    let id = path.into_inner();
    let Some(session) = session_for(&scans, &id, &auth).await else {
        return session_not_found();
    };

    let accepted = match event.into_inner() {
        ScanEvent::Decoded { data } => scans.submit(&id, data).await,
        ScanEvent::DecodeFailed { reason } => {
            debug!(session_id = %id, reason = ?reason, "Decode failed");
            true
        }
        ScanEvent::CameraReady => {
            session.set_camera(CameraStatus::Ready);
            true
        }
        ScanEvent::CameraBlocked => {
            info!(session_id = %id, "Camera blocked");
            session.set_camera(CameraStatus::Blocked);
            true
        }
    };

    if accepted {
        HttpResponse::Accepted().json(json!({ "message": "Accepted" }))
    } else {
        session_not_found()
    }
}
