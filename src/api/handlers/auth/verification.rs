//! Email verification endpoint.

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::EmailMessage;

use super::state::AuthState;
use super::storage::{
    ConsumeOutcome, consume_verification_token, issue_verification_token, unverified_user_exists,
};
use super::types::{ErrorResponse, MessageResponse, ResendVerificationRequest};
use super::utils::{build_verify_url, normalize_email, valid_email};

#[derive(Deserialize, Debug)]
pub struct VerifyEmailQuery {
    token: Option<String>,
}

/// Consume the emailed token and mark the account verified.
///
/// The token arrives as a URL query parameter because the emailed link is
/// followed directly by the browser.
#[utoipa::path(
    get,
    path = "/v1/auth/verify-email",
    params(
        ("token" = Option<String>, Query, description = "Verification token from the emailed link")
    ),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Missing, unknown, or expired token", body = ErrorResponse),
        (status = 500, description = "Unexpected failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    query: Query<VerifyEmailQuery>,
) -> impl IntoResponse {
    let token = query.token.as_deref().unwrap_or("").trim();
    if token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Missing token".to_string(),
            }),
        )
            .into_response();
    }

    match consume_verification_token(&pool, token).await {
        Ok(ConsumeOutcome::Consumed { email }) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: format!("Email {email} verified. You can now sign in."),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::NotFound) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Verification token does not exist".to_string(),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::Expired) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Verification token has expired".to_string(),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::UserNotFound) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No account matches this verification token".to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to verify email: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Verification failed".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Re-issue the verification token for an unverified account.
///
/// Always returns 204 (for unknown addresses, already-verified accounts, and
/// delivery failures) so the endpoint cannot be used to probe for accounts.
/// This is the recovery path when the registration email never arrived.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 204, description = "Resend accepted"),
        (status = 400, description = "Missing payload", body = String)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let request: ResendVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return StatusCode::NO_CONTENT.into_response();
    }

    match unverified_user_exists(&pool, &email).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to check account for resend: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    }

    // Issuing supersedes any live token for the address.
    let token = match issue_verification_token(
        &pool,
        &email,
        auth_state.config().token_ttl_seconds(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to re-issue verification token: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let verify_url = build_verify_url(auth_state.config().frontend_base_url(), &token);
    let dispatch = EmailMessage::verification(&email, &verify_url)
        .and_then(|message| auth_state.sender().send(&message));
    if let Err(err) = dispatch {
        // Token stays committed; the user can request another link.
        error!("Failed to send verification email: {err}");
    }

    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::{AuthConfig, AuthState};
    use super::{ResendVerificationRequest, VerifyEmailQuery, resend_verification, verify_email};
    use crate::api::email::LogEmailSender;
    use anyhow::Result;
    use axum::Json;
    use axum::extract::{Extension, Query};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://wayfarer.travel".to_string());
        Arc::new(AuthState::new(config, Arc::new(LogEmailSender)))
    }

    #[tokio::test]
    async fn verify_email_missing_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_email(Extension(pool), Query(VerifyEmailQuery { token: None }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn verify_email_blank_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = verify_email(
            Extension(pool),
            Query(VerifyEmailQuery {
                token: Some("  ".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn resend_verification_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = resend_verification(Extension(pool), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn resend_verification_invalid_email_is_opaque() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = resend_verification(
            Extension(pool),
            Extension(auth_state()),
            Some(Json(ResendVerificationRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }
}
