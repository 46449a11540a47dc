//! Role-gated route guard.
//!
//! A static table maps path prefixes to the roles permitted behind them.
//! Adding a protected prefix is a table entry; the guard logic itself never
//! changes. The decision is a pure function of `(path, role)` so it can be
//! tested without a server.
//!
//! The caller's role is re-derived from the authoritative session store on
//! every check; a cookie carries only the opaque session token, never a role
//! claim that could go stale or be forged.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use super::principal::{Caller, Role};
use super::session::authenticate_session;

/// What the guard does with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectLogin,
    RedirectUnauthorized,
}

#[derive(Debug)]
struct RouteRule {
    prefix: String,
    permitted: Vec<Role>,
}

/// Static mapping from path prefix to permitted roles, plus the redirect
/// destinations for denials.
#[derive(Debug)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    login_destination: String,
    unauthorized_destination: String,
}

impl RouteTable {
    /// Build the default table: the admin area requires the admin role, the
    /// account area any authenticated user.
    #[must_use]
    pub fn new(login_destination: String, unauthorized_destination: String) -> Self {
        Self {
            rules: Vec::new(),
            login_destination,
            unauthorized_destination,
        }
        .with_rule("/v1/admin", &[Role::Admin])
        .with_rule("/v1/account", &[Role::Admin, Role::Customer])
    }

    /// Add a protected prefix with its permitted role set.
    #[must_use]
    pub fn with_rule(mut self, prefix: &str, permitted: &[Role]) -> Self {
        self.rules.push(RouteRule {
            prefix: prefix.to_string(),
            permitted: permitted.to_vec(),
        });
        self
    }

    /// Decide what to do with a request for `path` made by an optional role.
    ///
    /// Unprotected paths always pass through. Protected paths redirect to the
    /// login destination when no session exists, and to the unauthorized
    /// destination when the role is not in the permitted set.
    #[must_use]
    pub fn decide(&self, path: &str, role: Option<Role>) -> RouteDecision {
        let Some(rule) = self.matching_rule(path) else {
            return RouteDecision::Allow;
        };

        match role {
            None => RouteDecision::RedirectLogin,
            Some(role) if rule.permitted.contains(&role) => RouteDecision::Allow,
            Some(_) => RouteDecision::RedirectUnauthorized,
        }
    }

    /// Whether any rule protects the path.
    #[must_use]
    pub fn protects(&self, path: &str) -> bool {
        self.matching_rule(path).is_some()
    }

    #[must_use]
    pub fn login_destination(&self) -> &str {
        &self.login_destination
    }

    #[must_use]
    pub fn unauthorized_destination(&self) -> &str {
        &self.unauthorized_destination
    }

    fn matching_rule(&self, path: &str) -> Option<&RouteRule> {
        self.rules
            .iter()
            .find(|rule| prefix_matches(&rule.prefix, path))
    }
}

/// Prefix match on path segment boundaries, so `/v1/admin` does not
/// accidentally protect `/v1/administrivia`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// State threaded into the guard middleware.
#[derive(Clone)]
pub struct GuardState {
    pool: PgPool,
    table: Arc<RouteTable>,
}

impl GuardState {
    #[must_use]
    pub fn new(pool: PgPool, table: Arc<RouteTable>) -> Self {
        Self { pool, table }
    }
}

/// Request-time authorization check.
///
/// Resolves the caller from the session store once, applies the table
/// decision, and threads the resolved [`Caller`] through request extensions
/// for downstream handlers.
pub async fn guard(State(state): State<GuardState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !state.table.protects(&path) {
        return next.run(request).await;
    }

    let caller = match resolve_caller(request.headers(), &state.pool).await {
        Ok(caller) => caller,
        Err(status) => return status.into_response(),
    };

    match state.table.decide(&path, caller.as_ref().map(|c| c.role)) {
        RouteDecision::Allow => {
            if let Some(caller) = caller {
                request.extensions_mut().insert(caller);
            }
            next.run(request).await
        }
        RouteDecision::RedirectLogin => {
            Redirect::to(state.table.login_destination()).into_response()
        }
        RouteDecision::RedirectUnauthorized => {
            Redirect::to(state.table.unauthorized_destination()).into_response()
        }
    }
}

async fn resolve_caller(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<Caller>, StatusCode> {
    let record = authenticate_session(headers, pool).await?;
    Ok(record.map(|record| Caller {
        user_id: record.user_id,
        email: record.email,
        name: record.name,
        role: record.role,
    }))
}

#[cfg(test)]
mod tests {
    use super::{RouteDecision, RouteTable, prefix_matches};
    use crate::api::handlers::auth::principal::Role;

    fn table() -> RouteTable {
        RouteTable::new("/login".to_string(), "/unauthorized".to_string())
    }

    #[test]
    fn unprotected_path_passes_without_session() {
        assert_eq!(table().decide("/v1/auth/login", None), RouteDecision::Allow);
        assert_eq!(table().decide("/", None), RouteDecision::Allow);
        assert_eq!(table().decide("/health", None), RouteDecision::Allow);
    }

    #[test]
    fn admin_prefix_redirects_customer_to_unauthorized() {
        assert_eq!(
            table().decide("/v1/admin/users", Some(Role::Customer)),
            RouteDecision::RedirectUnauthorized
        );
    }

    #[test]
    fn admin_prefix_redirects_anonymous_to_login() {
        assert_eq!(
            table().decide("/v1/admin/users", None),
            RouteDecision::RedirectLogin
        );
    }

    #[test]
    fn admin_prefix_allows_admin() {
        assert_eq!(
            table().decide("/v1/admin/users", Some(Role::Admin)),
            RouteDecision::Allow
        );
    }

    #[test]
    fn account_prefix_allows_any_authenticated_role() {
        assert_eq!(
            table().decide("/v1/account/me", Some(Role::Customer)),
            RouteDecision::Allow
        );
        assert_eq!(
            table().decide("/v1/account/me", Some(Role::Admin)),
            RouteDecision::Allow
        );
        assert_eq!(
            table().decide("/v1/account/me", None),
            RouteDecision::RedirectLogin
        );
    }

    #[test]
    fn custom_rule_extends_table() {
        let table = table().with_rule("/v1/partners", &[Role::Admin]);
        assert_eq!(
            table.decide("/v1/partners/settlements", Some(Role::Customer)),
            RouteDecision::RedirectUnauthorized
        );
    }

    #[test]
    fn prefix_matches_only_on_segment_boundary() {
        assert!(prefix_matches("/v1/admin", "/v1/admin"));
        assert!(prefix_matches("/v1/admin", "/v1/admin/users"));
        assert!(!prefix_matches("/v1/admin", "/v1/administrivia"));
        assert!(!prefix_matches("/v1/admin", "/v1"));
    }

    #[test]
    fn destinations_are_exposed() {
        let table = table();
        assert_eq!(table.login_destination(), "/login");
        assert_eq!(table.unauthorized_destination(), "/unauthorized");
    }
}
