//! Admin-only user management endpoints.
//!
//! The route guard already enforced the admin role for the /v1/admin prefix;
//! handlers here only read and present data.

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::{Instrument, error, info_span};
use utoipa::ToSchema;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub verified: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListUsersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, capped at 100"),
        ("offset" = Option<i64>, Query, description = "Rows to skip")
    ),
    responses(
        (status = 200, description = "List accounts, newest first.", body = [UserSummary]),
    ),
    tag = "admin"
)]
pub async fn list_users(
    query: Query<ListUsersQuery>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    match fetch_user_summaries(&pool, limit, offset).await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fetch_user_summaries(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<UserSummary>> {
    let query = "SELECT id::text AS id, email, name, role, \
                 email_verified_at IS NOT NULL AS verified, created_at::text AS created_at \
                 FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| UserSummary {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            role: row.get("role"),
            verified: row.get("verified"),
            created_at: row.get("created_at"),
        })
        .collect())
}
