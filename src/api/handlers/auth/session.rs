//! Session endpoints for cookie auth: login, logout, introspection.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::storage::{
    SessionRecord, delete_session, insert_session, lookup_login_record, lookup_session,
};
use super::types::{ErrorResponse, LoginRequest, SessionResponse};
use super::utils::{hash_session_token, normalize_email, verify_password};

const SESSION_COOKIE_NAME: &str = "wayfarer_session";

/// Password login; sets the session cookie on success.
///
/// Unverified accounts are rejected until the email is confirmed.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookie set", body = SessionResponse),
        (status = 401, description = "Unknown email or wrong password", body = ErrorResponse),
        (status = 403, description = "Email not verified yet", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let record = match lookup_login_record(&pool, &email).await {
        Ok(Some(record)) => record,
        Ok(None) => return invalid_credentials(),
        Err(err) => {
            error!("Failed to lookup login record: {err}");
            return login_error();
        }
    };

    match verify_password(&request.password, &record.password_hash) {
        Ok(true) => {}
        Ok(false) => return invalid_credentials(),
        Err(err) => {
            error!("Failed to verify password: {err}");
            return login_error();
        }
    }

    if !record.verified {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "Verify your email address before signing in".to_string(),
            }),
        )
            .into_response();
    }

    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let token = match insert_session(&pool, record.user_id, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to insert session: {err}");
            return login_error();
        }
    };

    // Resolve the fresh session so the response mirrors what the guard
    // will see on subsequent requests.
    let token_hash = hash_session_token(&token);
    let session = match lookup_session(&pool, &token_hash).await {
        Ok(Some(session)) => session,
        Ok(None) | Err(_) => {
            error!("Fresh session did not resolve");
            return login_error();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(&auth_state, &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return login_error();
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(session_response(&session)),
    )
        .into_response()
}

/// Return the caller's session, or 204 when none is active.
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    match lookup_session(&pool, &token_hash).await {
        Ok(Some(record)) => (StatusCode::OK, Json(session_response(&record))).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&auth_state) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Resolve a session cookie into a session record, if present.
///
/// Returns `Ok(None)` when the cookie is missing or invalid.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<SessionRecord>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    let token_hash = hash_session_token(&token);
    match lookup_session(pool, &token_hash).await {
        Ok(record) => Ok(record),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn session_response(record: &SessionRecord) -> SessionResponse {
    SessionResponse {
        user_id: record.user_id.to_string(),
        email: record.email.clone(),
        name: record.name.clone(),
        role: record.role,
    }
}

fn invalid_credentials() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Invalid email or password".to_string(),
        }),
    )
        .into_response()
}

fn login_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Login failed".to_string(),
        }),
    )
        .into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
fn session_cookie(auth_state: &AuthState, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_state: &AuthState) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_state.config().session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}
