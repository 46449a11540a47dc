//! Registration endpoint.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::EmailMessage;

use super::state::AuthState;
use super::storage::{SignupOutcome, insert_user, issue_verification_token};
use super::types::{ErrorResponse, MessageResponse, RegisterRequest, ValidationErrorResponse};
use super::utils::{build_verify_url, hash_password, normalize_email, validation_failures};

/// Create an unverified account and send the verification email.
///
/// If the email dispatch fails the account and token are kept; the caller is
/// told delivery failed and can request a resend.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email requested", body = MessageResponse),
        (status = 400, description = "Invalid payload", body = ValidationErrorResponse),
        (status = 409, description = "An account with this email already exists", body = ErrorResponse),
        (status = 500, description = "Unexpected failure or email delivery failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    let failures = validation_failures(
        &email,
        &request.password,
        &request.name,
        auth_state.config().password_min_length(),
    );
    if !failures.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse {
                error: "Invalid registration details".to_string(),
                fields: failures.iter().map(ToString::to_string).collect(),
            }),
        )
            .into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return internal_error();
        }
    };

    match insert_user(&pool, &email, &password_hash, request.name.trim()).await {
        Ok(SignupOutcome::Created) => {}
        Ok(SignupOutcome::Conflict) => {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "An account with this email already exists".to_string(),
                }),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to insert user: {err}");
            return internal_error();
        }
    }

    let token = match issue_verification_token(
        &pool,
        &email,
        auth_state.config().token_ttl_seconds(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue verification token: {err}");
            return internal_error();
        }
    };

    let verify_url = build_verify_url(auth_state.config().frontend_base_url(), &token);
    let dispatch = EmailMessage::verification(&email, &verify_url)
        .and_then(|message| auth_state.sender().send(&message));
    if let Err(err) = dispatch {
        // The account and token stay committed; only delivery failed.
        error!("Failed to send verification email: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Account created but the verification email could not be delivered"
                    .to_string(),
            }),
        )
            .into_response();
    }

    (
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Account created. Check your email to verify your address.".to_string(),
        }),
    )
        .into_response()
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Registration failed".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{RegisterRequest, register};
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
    async fn register_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_fields_before_any_write() -> Result<()> {
        // connect_lazy never opens a connection; reaching the database would fail
        // the test, which is the point: validation must run first.
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = register(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(RegisterRequest {
                email: "not-an-email".to_string(),
                password: "short".to_string(),
                name: " ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
