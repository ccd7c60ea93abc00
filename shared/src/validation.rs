//! Input validation functions
//!
//! Format checks on email are left to the `validator` crate on the backend;
//! these helpers cover normalisation and the password policy.

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum password length
pub const MAX_PASSWORD_LEN: usize = 128;

/// Normalise an email for lookup and storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err("Password too long".to_string());
    }
    Ok(())
}

/// Clamp a page size into `1..=100`, defaulting to 10
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(10).clamp(1, 100)
}

/// Clamp an offset to be non-negative
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
