//! Authenticated self-service endpoints.
//!
//! The route guard resolves the session and threads a [`Caller`] through
//! request extensions before any handler here runs.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{Instrument, error, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::principal::{Caller, Role};

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub created_at: String,
}

#[utoipa::path(
    get,
    path = "/v1/account/me",
    responses(
        (status = 200, description = "Return the authenticated account profile.", body = AccountResponse),
        (status = 404, description = "Account no longer exists."),
    ),
    tag = "account"
)]
pub async fn get_me(
    Extension(caller): Extension<Caller>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    match fetch_profile(&pool, caller.user_id).await {
        Ok(Some(profile)) => {
            let response = AccountResponse {
                id: caller.user_id.to_string(),
                email: caller.email,
                name: caller.name,
                role: caller.role,
                verified: profile.verified,
                created_at: profile.created_at,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch account profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

struct Profile {
    verified: bool,
    created_at: String,
}

async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
    let query = "SELECT email_verified_at IS NOT NULL AS verified, created_at::text AS created_at \
                 FROM users WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.map(|row| Profile {
        verified: row.get("verified"),
        created_at: row.get("created_at"),
    }))
}
