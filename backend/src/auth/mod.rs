//! Authentication module
//!
//! JWT access tokens, the session ledger that makes them revocable, and the
//! request pipeline that enforces both.

mod identity;
mod jwt;
mod ledger;
mod middleware;
mod password;
mod refresh;

pub use identity::{CurrentUser, Identity};
pub use jwt::{
    AccessClaim, Claims, JwtKeys, TokenConfig, TokenError, TokenIssuer, MAX_TTL_SECS,
};
pub use ledger::{LedgerError, LedgerResult, SessionLedger};
pub use middleware::{bearer_token, enforce, AuthGate, Pipeline, RoleGate, Stage};
pub use password::{CredentialHasher, PasswordService};
pub use refresh::generate_refresh_token;
