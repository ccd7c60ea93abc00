//! Authgate Backend Library
//!
//! Authentication and session lifecycle: access token issuance, the session
//! ledger behind revocation and refresh rotation, and the request pipeline
//! that gates protected routes. Exposed as a library for tests and tooling.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;
