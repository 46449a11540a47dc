//! Password reset endpoints: request a token, then consume it.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::EmailMessage;

use super::state::AuthState;
use super::storage::{
    ConsumeOutcome, consume_password_reset_token, issue_password_reset_token, user_exists,
};
use super::types::{
    ErrorResponse, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
    ValidationErrorResponse,
};
use super::utils::{build_reset_url, hash_password, normalize_email, valid_email};

/// Issue a reset token and request the reset email.
///
/// Always returns 204 (for unknown addresses, invalid input, and even
/// delivery failures) so the endpoint cannot be used to probe for accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset accepted"),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return StatusCode::NO_CONTENT.into_response();
    }

    match user_exists(&pool, &email).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to check account for reset: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    }

    let token = match issue_password_reset_token(
        &pool,
        &email,
        auth_state.config().token_ttl_seconds(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue password reset token: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
    let dispatch = EmailMessage::password_reset(&email, &reset_url)
        .and_then(|message| auth_state.sender().send(&message));
    if let Err(err) = dispatch {
        // Token stays committed; the user can request another link.
        error!("Failed to send password reset email: {err}");
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Consume a reset token and set the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid payload or token", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing token".to_string(),
            }),
        )
            .into_response();
    }

    if request.password.chars().count() < auth_state.config().password_min_length() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse {
                error: "Invalid reset details".to_string(),
                fields: vec!["password".to_string()],
            }),
        )
            .into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Password reset failed".to_string(),
                }),
            )
                .into_response();
        }
    };

    match consume_password_reset_token(&pool, token, &password_hash).await {
        Ok(ConsumeOutcome::Consumed { .. }) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated. You can now sign in with your new password."
                    .to_string(),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::NotFound) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Reset token does not exist".to_string(),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::Expired) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Reset token has expired".to_string(),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::UserNotFound) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No account matches this reset token".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to reset password: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Password reset failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{ResetPasswordRequest, forgot_password, reset_password};
    use crate::api::email::LogEmailSender;
    use anyhow::Result;
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://wayfarer.travel".to_string());
        Arc::new(AuthState::new(config, Arc::new(LogEmailSender)))
    }

    #[tokio::test]
    async fn forgot_password_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot_password(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_invalid_email_is_opaque() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = forgot_password(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(super::ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_empty_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = reset_password(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ResetPasswordRequest {
                token: " ".to_string(),
                password: "longenoughpassword".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_short_password() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = reset_password(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ResetPasswordRequest {
                token: "sometoken".to_string(),
                password: "short".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
