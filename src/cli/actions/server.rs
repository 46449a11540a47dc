use crate::api::{
    self,
    handlers::auth::{AuthConfig, RouteTable},
};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub password_min_length: usize,
    pub login_destination: String,
    pub unauthorized_destination: String,
}

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_password_min_length(args.password_min_length);

    let route_table = RouteTable::new(args.login_destination, args.unauthorized_destination);

    api::new(args.port, args.dsn, auth_config, route_table).await
}
