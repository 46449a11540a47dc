//! API handlers for Wayfarer.
//!
//! Route handlers are grouped by surface: `auth` for registration,
//! verification, reset, and sessions; `account` for the signed-in user;
//! `admin` for the back-office area behind the role guard.

pub mod account;
pub mod admin;
pub mod auth;
pub mod health;
pub mod root;
