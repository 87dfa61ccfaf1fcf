use crate::{
    auth::auth::AuthUser,
    model::student::Student,
    scan::store::STUDENT_COLUMNS,
    utils::{
        db_utils::{build_update_sql, execute_update},
        qr_code_filter, student_cache,
    },
};
use actix_web::{
    HttpResponse, Responder,
    error::{ErrorBadRequest, ErrorInternalServerError},
    web,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

/// Columns a roster edit may touch.
const EDITABLE_COLUMNS: &[&str] = &["name", "email", "qr_code", "contact"];

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateStudent {
    #[schema(example = "Juan Dela Cruz")]
    pub name: String,
    #[schema(example = "juan@school.edu", format = "email")]
    #[serde(default)]
    pub email: String,
    #[schema(example = "STU-2024-0001")]
    pub qr_code: String,
    #[schema(example = "+639171234567")]
    #[serde(default)]
    pub contact: String,
}

impl CreateStudent {
    fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            qr_code: self.qr_code.trim().to_string(),
            contact: self.contact.trim().to_string(),
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("Name is required");
        }
        if self.qr_code.is_empty() {
            return Err("QR code is required");
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            return Err("Email is invalid");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StudentQuery {
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Matches name, email or QR code
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StudentListResponse {
    pub data: Vec<Student>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

fn qr_code_taken() -> HttpResponse {
    HttpResponse::Conflict().json(json!({
        "message": "QR code already assigned to another student"
    }))
}

/// true  => QR code AVAILABLE
/// false => QR code TAKEN
pub async fn is_qr_code_available(qr_code: &str, pool: &MySqlPool) -> Result<bool, sqlx::Error> {
    // 1️⃣ Cuckoo filter: fast negative
    if qr_code_filter::is_warm() && !qr_code_filter::might_exist(qr_code) {
        return Ok(true);
    }

    // 2️⃣ Moka cache: fast positive
    if student_cache::is_taken(qr_code) {
        return Ok(false);
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM students WHERE qr_code = ? LIMIT 1)",
    )
    .bind(qr_code)
    .fetch_one(pool)
    .await?;

    Ok(exists == 0)
}

async fn fetch_student(pool: &MySqlPool, student_id: u64) -> actix_web::Result<Option<Student>> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, student_id, "Failed to fetch student");
        ErrorInternalServerError("Internal Server Error")
    })
}

fn student_not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "message": "Student not found"
    }))
}

/// Create Student
#[utoipa::path(
    post,
    path = "/api/students",
    request_body = CreateStudent,
    responses(
        (status = 201, description = "Student created", body = Student),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "QR code already assigned"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Student",
    security(("bearer_auth" = []))
)]
pub async fn create_student(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateStudent>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let payload = payload.normalized();
    payload.validate().map_err(ErrorBadRequest)?;

    let available = is_qr_code_available(&payload.qr_code, pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to check QR code availability");
            ErrorInternalServerError("Internal Server Error")
        })?;
    if !available {
        return Ok(qr_code_taken());
    }

    let result = sqlx::query(
        r#"
        INSERT INTO students (name, email, qr_code, contact)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.qr_code)
    .bind(&payload.contact)
    .execute(pool.get_ref())
    .await;

    let student_id = match result {
        Ok(res) => res.last_insert_id(),
        Err(e) if is_duplicate_key(&e) => return Ok(qr_code_taken()),
        Err(e) => {
            error!(error = %e, "Failed to create student");
            return Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Something went wrong, Contact with system admin"
            })));
        }
    };

    qr_code_filter::insert(&payload.qr_code);

    let Some(student) = fetch_student(pool.get_ref(), student_id).await? else {
        return Ok(student_not_found());
    };
    student_cache::put(student.clone()).await;

    info!(student_id, by = %auth.username, "Student created");
    Ok(HttpResponse::Created().json(student))
}

/// List Students
#[utoipa::path(
    get,
    path = "/api/students",
    params(StudentQuery),
    responses(
        (status = 200, description = "Paginated student list", body = StudentListResponse)
    ),
    tag = "Student",
    security(("bearer_auth" = []))
)]
pub async fn list_students(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StudentQuery>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause ----------
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));

    let where_clause = if search.is_some() {
        "WHERE (name LIKE ? OR email LIKE ? OR qr_code LIKE ?)"
    } else {
        ""
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) AS total FROM students {}", where_clause);
    debug!(sql = %count_sql, search = ?search, "Counting students");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(like) = &search {
        count_query = count_query.bind(like).bind(like).bind(like);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count students");
        ErrorInternalServerError("Database error")
    })?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students {} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching students");

    let mut data_query = sqlx::query_as::<_, Student>(&data_sql);
    if let Some(like) = &search {
        data_query = data_query.bind(like).bind(like).bind(like);
    }
    data_query = data_query.bind(per_page as i64).bind(offset as i64);

    let students = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch students");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(StudentListResponse {
        data: students,
        page,
        per_page,
        total,
    }))
}

/// Get Student by ID
#[utoipa::path(
    get,
    path = "/api/students/{student_id}",
    params(("student_id", Path, description = "Student ID")),
    responses(
        (status = 200, description = "Student found", body = Student),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Student",
    security(("bearer_auth" = []))
)]
pub async fn get_student(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let student_id = path.into_inner();

    match fetch_student(pool.get_ref(), student_id).await? {
        Some(student) => Ok(HttpResponse::Ok().json(student)),
        None => Ok(student_not_found()),
    }
}

/// Rejects non-string values and trims the ones that must not be blank.
fn sanitize_update(body: Value) -> actix_web::Result<Value> {
    let Value::Object(mut obj) = body else {
        return Err(ErrorBadRequest("Payload must be a JSON object"));
    };

    for (key, value) in obj.iter_mut() {
        let Value::String(s) = value else {
            return Err(ErrorBadRequest(format!("Field `{}` must be a string", key)));
        };
        let trimmed = s.trim().to_string();
        if (key == "name" || key == "qr_code") && trimmed.is_empty() {
            return Err(ErrorBadRequest(format!("Field `{}` must not be empty", key)));
        }
        if key == "email" && !trimmed.is_empty() && !trimmed.contains('@') {
            return Err(ErrorBadRequest("Email is invalid"));
        }
        *s = trimmed;
    }

    Ok(Value::Object(obj))
}

/// Update Student
#[utoipa::path(
    put,
    path = "/api/students/{student_id}",
    params(("student_id", Path, description = "Student ID")),
    request_body(
        content = Object,
        description = "Any of name, email, qr_code, contact",
        example = json!({ "contact": "+639181112222" })
    ),
    responses(
        (status = 200, description = "Student updated", body = Student),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Student not found"),
        (status = 409, description = "QR code already assigned"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Student",
    security(("bearer_auth" = []))
)]
pub async fn update_student(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let student_id = path.into_inner();

    let body = sanitize_update(body.into_inner())?;
    let update = build_update_sql("students", &body, EDITABLE_COLUMNS, "id", student_id)?;

    let Some(before) = fetch_student(pool.get_ref(), student_id).await? else {
        return Ok(student_not_found());
    };

    match execute_update(pool.get_ref(), update).await {
        Ok(_) => {}
        Err(e) if is_duplicate_key(&e) => return Ok(qr_code_taken()),
        Err(e) => {
            error!(error = %e, student_id, "Failed to update student");
            return Err(ErrorInternalServerError("Internal Server Error"));
        }
    }

    student_cache::invalidate(&before.qr_code).await;

    let Some(after) = fetch_student(pool.get_ref(), student_id).await? else {
        return Ok(student_not_found());
    };

    if after.qr_code != before.qr_code {
        qr_code_filter::remove(&before.qr_code);
        qr_code_filter::insert(&after.qr_code);
    }
    student_cache::put(after.clone()).await;

    info!(student_id, by = %auth.username, "Student updated");
    Ok(HttpResponse::Ok().json(after))
}

/// Delete Student
#[utoipa::path(
    delete,
    path = "/api/students/{student_id}",
    params(("student_id", Path, description = "Student ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Student not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Student",
    security(("bearer_auth" = []))
)]
pub async fn delete_student(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let student_id = path.into_inner();

    let Some(student) = fetch_student(pool.get_ref(), student_id).await? else {
        return Ok(student_not_found());
    };

    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student_id)
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(res) if res.rows_affected() == 0 => Ok(student_not_found()),
        Ok(_) => {
            qr_code_filter::remove(&student.qr_code);
            student_cache::invalidate(&student.qr_code).await;

            info!(student_id, by = %auth.username, "Student deleted");
            Ok(HttpResponse::Ok().json(json!({
                "message": "Successfully deleted"
            })))
        }
        Err(e) => {
            error!(error = %e, student_id, "Failed to delete student");

            Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            })))
        }
    }
}
