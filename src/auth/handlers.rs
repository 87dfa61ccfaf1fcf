use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::{AdminBootstrap, Config},
    model::role::Role,
    models::{Claims, LoginReqDto, TokenType, UserReq, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, Responder, get, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

// auth end points

/// Inserts a new operator account
async fn insert_user(username: &str, password: &str, pool: &MySqlPool) -> Result<(), HttpResponse> {
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        HttpResponse::InternalServerError().json(json!({
            "error": "Failed to register user"
        }))
    })?;

    let result = sqlx::query(r#"INSERT INTO users (username, password, role_id) VALUES (?, ?, ?)"#)
        .bind(username)
        .bind(hashed)
        .bind(Role::Operator.id())
        .execute(pool)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return Err(HttpResponse::Conflict().json(json!({
                        "error": "Username already exists"
                    })));
                }
            }

            error!(error = %e, "Failed to insert user");
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to register user"
            })))
        }
    }
}

/// Ensures the configured admin account exists with the admin role.
///
/// An existing user of that name is promoted; its password is left alone.
pub async fn bootstrap_admin(pool: &MySqlPool, admin: &AdminBootstrap) -> anyhow::Result<()> {
    let hashed = hash_password(&admin.password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password, role_id)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE role_id = VALUES(role_id)
        "#,
    )
    .bind(&admin.username)
    .bind(hashed)
    .bind(Role::Admin.id())
    .execute(pool)
    .await?;

    // 1 = inserted, 2 = promoted, 0 = already admin
    info!(
        username = %admin.username,
        rows_affected = result.rows_affected(),
        "Admin account ensured"
    );
    Ok(())
}

/// Register an operator account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserReq,
    responses(
        (status = 201, description = "User registered successfully"),
        (status = 400, description = "Username or password empty"),
        (status = 409, description = "Username already exists")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, user), fields(username = %user.username))]
pub async fn register(user: web::Json<UserReq>, pool: web::Data<MySqlPool>) -> impl Responder {
    let username = user.username.trim().to_lowercase();
    let password = &user.password;

    if username.is_empty() || password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Username and password must not be empty"
        }));
    }

    // The unique key on users.username settles races between registrations.
    match insert_user(&username, password, pool.get_ref()).await {
        Ok(_) => {
            info!("User registered");
            HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            }))
        }
        Err(err_resp) => err_resp,
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

fn issue_tokens(
    user_id: u64,
    username: &str,
    role_id: u8,
    config: &Config,
) -> Result<(LoginResponse, Claims), jsonwebtoken::errors::Error> {
    let access_token = generate_access_token(
        user_id,
        username.to_string(),
        role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        username.to_string(),
        role_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )?;

    Ok((
        LoginResponse {
            access_token,
            refresh_token,
        },
        refresh_claims,
    ))
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Log in and receive an access/refresh token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Username or password required"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    debug!("Fetching user from database");

    // 2️⃣ Fetch user
    let db_user = match sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, role_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(user)) if user.is_active => {
            debug!(user_id = user.id, "User found");
            user
        }
        Ok(Some(_)) => {
            info!("Invalid credentials: user inactive");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    // 4️⃣ Generate tokens
    let (tokens, refresh_claims) =
        match issue_tokens(db_user.id, &db_user.username, db_user.role_id, &config) {
            Ok(issued) => issued,
            Err(e) => {
                error!(error = %e, "Failed to sign tokens");
                return HttpResponse::InternalServerError().finish();
            }
        };

    // 5️⃣ Store refresh token
    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");

    if let Err(e) = store_refresh_token(pool.get_ref(), &refresh_claims).await {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    // 6️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");

    HttpResponse::Ok().json(tokens)
}

/// The authenticated caller
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = AuthUser),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[get("/me")]
pub async fn me(auth: AuthUser) -> impl Responder {
    HttpResponse::Ok().json(auth)
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Revokes a refresh token only if it is still live; exactly one caller wins.
const REVOKE_REFRESH_TOKEN: &str =
    "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE";

/// Rotate a refresh token (send it as the bearer token)
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Invalid, revoked or non-refresh token")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<HttpResponse> {
    let Some(token) = bearer(&req) else {
        return Ok(HttpResponse::Unauthorized().body("No token"));
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return Ok(HttpResponse::Unauthorized().finish()),
    };

    let db_error = |e: sqlx::Error| {
        error!(error = %e, "Refresh token rotation failed");
        actix_web::error::ErrorInternalServerError("Internal Server Error")
    };

    // 🔥 revoke the presented token; a concurrent rotation of the same token gets 0 rows
    let revoked = sqlx::query(REVOKE_REFRESH_TOKEN)
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
        .map_err(db_error)?;

    if revoked.rows_affected() == 0 {
        info!(jti = %claims.jti, "Refresh token unknown or already used");
        return Ok(HttpResponse::Unauthorized().finish());
    }

    // 🔄 issue new pair
    let (tokens, new_claims) = issue_tokens(claims.user_id, &claims.sub, claims.role, &config)
        .map_err(|e| {
            error!(error = %e, "Failed to sign tokens");
            actix_web::error::ErrorInternalServerError("Internal Server Error")
        })?;

    store_refresh_token(pool.get_ref(), &new_claims)
        .await
        .map_err(db_error)?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Revoke a refresh token (send it as the bearer token)
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    // 1️⃣ extract Authorization header
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    // 2️⃣ only valid refresh tokens can logout
    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    // 3️⃣ revoke refresh token (idempotent)
    if let Err(e) = sqlx::query(REVOKE_REFRESH_TOKEN)
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    // 4️⃣ success (even if token didn't exist)
    HttpResponse::NoContent().finish()
}
