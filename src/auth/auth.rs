use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    dev::Payload,
    error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized},
    web::Data,
};
use futures::future::{Ready, ready};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    /// Validates a bearer access token.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, &'static str> {
        let claims = verify_token(token, secret).map_err(|_| "Invalid or expired token")?;

        if claims.token_type != TokenType::Access {
            return Err("Access token required");
        }

        let role = Role::from_id(claims.role).ok_or("Invalid role")?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
        })
    }

    fn extract(req: &HttpRequest) -> actix_web::Result<Self> {
        // Already validated by the middleware on protected scopes.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ErrorUnauthorized("Missing token"))?;

        let config = req
            .app_data::<Data<Config>>()
            .ok_or_else(|| ErrorInternalServerError("Config missing"))?;

        AuthUser::from_token(token, &config.jwt_secret).map_err(ErrorUnauthorized)
    }

    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ErrorForbidden("Admin only"))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(AuthUser::extract(req))
    }
}
