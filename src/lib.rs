//! # Wayfarer (Accounts & Access Control)
//!
//! `wayfarer` is the account service of the Wayfarer travel booking platform.
//! It owns user registration, email verification, password reset, session
//! login/logout, and role-gated access to protected path prefixes such as the
//! admin dashboard area.
//!
//! ## Verification & Reset Tokens
//!
//! Both flows use single-use opaque tokens: 32 bytes of OS randomness,
//! hex-encoded, valid for a fixed window (one hour by default). At most one
//! live token exists per identifier; issuing a new one deletes any
//! predecessor. Consumption is an atomic check-then-delete, so two concurrent
//! attempts on the same token can never both succeed.
//!
//! ## Sessions & Route Guard
//!
//! Sessions are server-side rows keyed by a SHA-256 hash of the cookie value.
//! The route guard maps path prefixes to permitted roles (`admin`,
//! `customer`) and resolves the caller from the session store once per
//! request; protected requests without a session redirect to the login
//! destination, wrong-role requests to the unauthorized destination.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
