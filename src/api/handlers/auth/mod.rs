//! Account and access-control handlers.
//!
//! Registration, email verification, password reset, and cookie sessions all
//! live here, together with the route guard that gates protected path
//! prefixes by role. Handlers stay thin: they parse and validate input, call
//! into [`storage`], and map outcomes onto HTTP responses.

pub mod guard;
pub mod principal;
pub mod register;
pub mod reset;
pub mod session;
pub mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;
pub mod verification;

pub use guard::{GuardState, RouteDecision, RouteTable, guard};
pub use principal::{Caller, Role};
pub use state::{AuthConfig, AuthState};
