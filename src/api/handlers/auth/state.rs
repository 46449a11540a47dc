//! Auth configuration and shared handler state.

use std::sync::Arc;

use crate::api::email::EmailSender;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    session_ttl_seconds: i64,
    password_min_length: usize,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared state for the auth handlers: configuration plus the email
/// dispatch collaborator.
pub struct AuthState {
    config: AuthConfig,
    sender: Arc<dyn EmailSender>,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, sender: Arc<dyn EmailSender>) -> Self {
        Self { config, sender }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn sender(&self) -> &dyn EmailSender {
        self.sender.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};
    use crate::api::email::LogEmailSender;
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://wayfarer.travel".to_string());

        assert_eq!(config.frontend_base_url(), "https://wayfarer.travel");
        assert_eq!(config.token_ttl_seconds(), super::DEFAULT_TOKEN_TTL_SECONDS);
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.password_min_length(),
            super::DEFAULT_PASSWORD_MIN_LENGTH
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_token_ttl_seconds(120)
            .with_session_ttl_seconds(3600)
            .with_password_min_length(12);

        assert_eq!(config.token_ttl_seconds(), 120);
        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.password_min_length(), 12);
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_exposes_config() {
        let config = AuthConfig::new("https://wayfarer.travel".to_string());
        let state = AuthState::new(config, Arc::new(LogEmailSender));
        assert_eq!(state.config().frontend_base_url(), "https://wayfarer.travel");
    }
}
