use crate::auth::auth::AuthUser;
use crate::model::attendance::{AttendanceRecord, AttendanceType};
use crate::scan::{ScanError, ScanService};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceFilter {
    /// Filter by student ID
    pub student_id: Option<u64>,
    /// Filter by calendar day (UTC), e.g. 2026-01-01
    #[param(value_type = Option<String>)]
    pub date: Option<NaiveDate>,
    /// Filter by attendance type
    #[serde(rename = "type")]
    pub attendance_type: Option<AttendanceType>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceRecord>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualAttendance {
    #[schema(example = 1)]
    pub student_id: u64,
    pub attendance_type: AttendanceType,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Date(NaiveDate),
    Str(&'static str),
}

/// List attendance records, newest first
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    if let Some(student_id) = query.student_id {
        conditions.push("student_id = ?");
        bindings.push(FilterValue::U64(student_id));
    }
    if let Some(date) = query.date {
        conditions.push("date = ?");
        bindings.push(FilterValue::Date(date));
    }
    if let Some(attendance_type) = query.attendance_type {
        conditions.push("`type` = ?");
        bindings.push(FilterValue::Str(match attendance_type {
            AttendanceType::TimeIn => "time_in",
            AttendanceType::TimeOut => "time_out",
        }));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM attendance {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = match b {
            FilterValue::U64(v) => count_query.bind(*v),
            FilterValue::Date(v) => count_query.bind(*v),
            FilterValue::Str(v) => count_query.bind(*v),
        };
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count attendance");
        ErrorInternalServerError("Database error")
    })?;

    let data_sql = format!(
        r#"
        SELECT id, student_id, date, time, `type`, status
        FROM attendance {}
        ORDER BY time DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching attendance");

    let mut data_query = sqlx::query_as::<_, AttendanceRecord>(&data_sql);
    for b in &bindings {
        data_query = match b {
            FilterValue::U64(v) => data_query.bind(*v),
            FilterValue::Date(v) => data_query.bind(*v),
            FilterValue::Str(v) => data_query.bind(*v),
        };
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let data = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch attendance");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Record attendance without a scan (e.g. an unreadable card)
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = ManualAttendance,
    responses(
        (status = 201, description = "Attendance recorded", body = AttendanceRecord),
        (status = 404, description = "Student not found", body = Object, example = json!({
            "message": "Student not found"
        })),
        (status = 409, description = "Rejected by the daily guard", body = Object, example = json!({
            "message": "Attendance already recorded as time_in today"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn record_attendance(
    auth: AuthUser,
    scans: web::Data<ScanService>,
    payload: web::Json<ManualAttendance>,
) -> actix_web::Result<impl Responder> {
    let ManualAttendance {
        student_id,
        attendance_type,
    } = payload.into_inner();
    let pipeline = scans.pipeline();

    let student = pipeline.store().find_student(student_id).await.map_err(|e| {
        error!(error = %e, student_id, "Failed to fetch student");
        ErrorInternalServerError("Internal Server Error")
    })?;
    if student.is_none() {
        return Err(ScanError::NotFound {
            code: student_id.to_string(),
        }
        .into());
    }

    let record = pipeline.write_attendance(student_id, attendance_type).await?;

    info!(student_id, by = %auth.username, %attendance_type, "Manual attendance recorded");
    Ok(HttpResponse::Created().json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use crate::config::Config;
    use crate::model::role::Role;
    use crate::scan::ScanPipeline;
    use crate::scan::memory::{MemoryStore, student};
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    fn scans(store: Arc<MemoryStore>, daily_guard: bool) -> ScanService {
        ScanService::new(
            Arc::new(ScanPipeline::new(store, daily_guard)),
            Duration::from_millis(500),
            Duration::from_secs(3600),
            "/beep.mp3",
        )
    }

    fn bearer(config: &Config) -> (&'static str, String) {
        let token =
            generate_access_token(1, "gate-1".into(), Role::Operator.id(), &config.jwt_secret, 60)
                .unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn manual_entry_records_and_guards() {
        let config = Config::for_tests();
        let store = Arc::new(MemoryStore::with_students(vec![student(1, "Ana", "A")]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(scans(store.clone(), true)))
                .route("/attendance", web::post().to(record_attendance)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/attendance")
            .insert_header(bearer(&config))
            .set_json(json!({ "student_id": 1, "attendance_type": "time_in" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["type"], "time_in");
        assert_eq!(body["student_id"], 1);

        let req = test::TestRequest::post()
            .uri("/attendance")
            .insert_header(bearer(&config))
            .set_json(json!({ "student_id": 1, "attendance_type": "time_in" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        assert_eq!(store.records().len(), 1);
    }

    #[actix_web::test]
    async fn manual_entry_for_unknown_student() {
        let config = Config::for_tests();
        let store = Arc::new(MemoryStore::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(scans(store.clone(), false)))
                .route("/attendance", web::post().to(record_attendance)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/attendance")
            .insert_header(bearer(&config))
            .set_json(json!({ "student_id": 42, "attendance_type": "time_out" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(store.records().is_empty());
    }

    #[actix_web::test]
    async fn manual_entry_requires_token() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(scans(Arc::new(MemoryStore::default()), false)))
                .route("/attendance", web::post().to(record_attendance)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/attendance")
            .set_json(json!({ "student_id": 1, "attendance_type": "time_in" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
