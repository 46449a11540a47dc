use axum::{
    http::{StatusCode, header},
    response::IntoResponse,
};

/// Undocumented liveness endpoint; returns the service banner.
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")),
    )
}
