//! Business logic services
//!
//! Services encapsulate business logic and coordinate between
//! the auth core and the storage collaborators.

pub mod auth;
pub mod user;

pub use auth::AuthService;
pub use user::UserService;
