//! Bearer session authentication
//!
//! Sessions are issued by the account subsystem and stored in the `session`
//! table. The middleware resolves the bearer token into an [`AuthUser`] and
//! places it in the request extensions; handlers read it back through the
//! [`CurrentUser`] extractor.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Authenticated caller of an API request
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AuthUser {
    pub user_id: i64,
    /// Device the request comes from; `None` means no device attribution
    pub device_id: Option<String>,
}

impl AuthUser {
    pub fn new(user_id: i64, device_id: Option<&str>) -> Self {
        Self {
            user_id,
            device_id: normalize_device(device_id),
        }
    }

    pub fn device(&self) -> Option<&str> {
        self.device_id.as_deref()
    }
}

fn normalize_device(device_id: Option<&str>) -> Option<String> {
    device_id
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Extractor for the user injected by [`authenticate`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::MissingAuthContext)
    }
}

/// Auth middleware: resolves the bearer token on every API request
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?
        .to_string();

    let user = SessionRepository::new(state.db())
        .resolve(&token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown or revoked session".to_string()))?;

    tracing::trace!(user_id = user.user_id, device_id = ?user.device_id, "Authenticated request");

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Session repository
pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue a session token for a user on a device
    pub async fn issue(&self, user_id: i64, device_id: Option<&str>) -> Result<String> {
        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO session (token, user_id, device_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&token)
        .bind(user_id)
        .bind(normalize_device(device_id))
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(token)
    }

    /// Look up the user behind a token
    pub async fn resolve(&self, token: &str) -> Result<Option<AuthUser>> {
        let user = sqlx::query_as::<_, AuthUser>(
            "SELECT user_id, device_id FROM session WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Revoke a session
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM session WHERE token = ?")
            .bind(token)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
