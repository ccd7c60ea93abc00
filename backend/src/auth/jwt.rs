//! Access token issuance and verification
//!
//! Access tokens are HS256 JWTs with pre-computed keys. Expiry is checked
//! against the injected [`Clock`] rather than inside the JWT library, so the
//! clock is the only source of time for the whole auth core.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique per token; keeps two logins in the same second from colliding
    pub jti: String,
}

/// Verified contents of an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessClaim {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("invalid token configuration: {0}")]
    Config(String),
}

/// Pre-computed JWT keys for efficient token operations
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl JwtKeys {
    /// Create new JWT keys from secret
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret)),
            decoding: Arc::new(DecodingKey::from_secret(secret)),
        }
    }

    pub fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Longest accepted lifetime for either token (ten years)
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 3600;

/// Token lifetimes
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// Out-of-range values are pinned just outside `1..=MAX_TTL_SECS`, so
    /// [`TokenIssuer::new`] still rejects them.
    pub fn from_secs(access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        let pin = |secs: i64| Duration::seconds(secs.clamp(0, MAX_TTL_SECS + 1));
        Self {
            access_ttl: pin(access_ttl_secs),
            refresh_ttl: pin(refresh_ttl_secs),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::days(7),
            refresh_ttl: Duration::days(14),
        }
    }
}

/// Mints and verifies access tokens
///
/// Stateless apart from the key material and lifetimes, which never change
/// after construction. Cloning is cheap.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: JwtKeys,
    config: TokenConfig,
    validation: Arc<Validation>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Build an issuer. Call once at startup.
    pub fn new(
        secret: &[u8],
        config: TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config("signing secret is empty".into()));
        }
        if config.access_ttl <= Duration::zero() {
            return Err(TokenError::Config("access ttl must be positive".into()));
        }
        if config.refresh_ttl <= config.access_ttl {
            return Err(TokenError::Config(
                "refresh ttl must outlive access ttl".into(),
            ));
        }
        if config.refresh_ttl > Duration::seconds(MAX_TTL_SECS) {
            return Err(TokenError::Config(format!(
                "ttl must not exceed {MAX_TTL_SECS} seconds"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the injected clock in `verify`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            keys: JwtKeys::new(secret),
            config,
            validation: Arc::new(validation),
            clock,
        })
    }

    /// Issue an access token expiring one access TTL from now
    #[inline]
    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        let (access, _) = self.issue_expiries()?;
        self.issue_until(user_id, access)
    }

    /// Issue an access token with an explicit expiry
    pub fn issue_until(
        &self,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: self.clock.now().timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, self.keys.encoding())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature, then expiry
    pub fn verify(&self, token: &str) -> Result<AccessClaim, TokenError> {
        let data = decode::<Claims>(token, self.keys.decoding(), &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        let claims = data.claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Invalid("token expired".into()));
        }

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::Invalid("subject is not a user id".into()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Invalid("expiry out of range".into()))?;

        Ok(AccessClaim {
            user_id,
            expires_at,
        })
    }

    /// `(now + access_ttl, now + refresh_ttl)`
    pub fn issue_expiries(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), TokenError> {
        let now = self.clock.now();
        let after = |ttl: Duration| {
            now.checked_add_signed(ttl)
                .ok_or_else(|| TokenError::Config("token expiry out of range".into()))
        };
        Ok((after(self.config.access_ttl)?, after(self.config.refresh_ttl)?))
    }

    #[inline]
    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }
}
