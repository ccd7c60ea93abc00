//! Authgate Shared Library
//!
//! Wire types, roles and authentication reason codes shared between the
//! backend and any client of its API.

pub mod errors;
pub mod models;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use models::{Role, User};
pub use types::*;
