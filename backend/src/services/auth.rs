//! Login, refresh and logout
//!
//! `AuthService` is the only writer of the session ledger. Everything that
//! fails after the credential check is reported as an internal error, never
//! as a credential failure.

use crate::auth::{
    generate_refresh_token, CredentialHasher, LedgerError, SessionLedger, TokenIssuer,
};
use crate::error::ApiError;
use crate::observability;
use crate::repositories::{NewSession, UserDirectory};
use authgate_shared::{validation::normalize_email, AuthError, TokenPair};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn, Span};

/// Plaintext behind the decoy hash; never matches a real account
const DECOY_PASSWORD: &str = "authgate-decoy-credential";

#[derive(Clone)]
pub struct AuthService {
    directory: Arc<dyn UserDirectory>,
    hasher: Arc<dyn CredentialHasher>,
    issuer: TokenIssuer,
    ledger: SessionLedger,
    /// Hashed once with the configured hasher, verified against on unknown emails
    decoy_hash: Arc<OnceCell<String>>,
    log: Span,
}

/// Freshly minted pair, not yet recorded
struct Minted {
    access_token: String,
    refresh_token: String,
    access_expires_at: DateTime<Utc>,
    refresh_expires_at: DateTime<Utc>,
}

impl AuthService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        hasher: Arc<dyn CredentialHasher>,
        issuer: TokenIssuer,
        ledger: SessionLedger,
        log: Span,
    ) -> Self {
        Self {
            directory,
            hasher,
            issuer,
            ledger,
            decoy_hash: Arc::new(OnceCell::new()),
            log,
        }
    }

    /// Exchange credentials for a new session
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .directory
            .find_by_email(&email)
            .await
            .map_err(|e| self.internal("user lookup", e))?;
        let Some(user) = user else {
            // Pay the same hashing cost as a wrong password.
            self.verify_decoy(password).await;
            return Err(self.reject(AuthError::UnknownEmail));
        };

        let matches = self
            .hasher
            .verify(password.to_string(), user.password_hash)
            .await
            .map_err(|e| self.internal("password verification", e))?;
        if !matches {
            return Err(self.reject(AuthError::WrongPassword));
        }

        let minted = self.mint(user.id)?;
        self.ledger
            .create(
                user.id,
                &minted.access_token,
                &minted.refresh_token,
                minted.access_expires_at,
                minted.refresh_expires_at,
            )
            .await
            .map_err(|e| self.internal("session create", e))?;

        observability::session_created();
        info!(parent: &self.log, user_id = user.id, "session created");

        Ok(self.token_pair(minted))
    }

    /// Exchange a refresh token for a new pair; the old pair stops working
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        if refresh_token.is_empty() {
            return Err(ApiError::Validation("refresh_token is required".to_string()));
        }

        let session = match self.ledger.get_by_refresh_token(refresh_token).await {
            Ok(session) => session,
            Err(LedgerError::NotFound) => return Err(self.reject(AuthError::RefreshNotFound)),
            Err(LedgerError::Expired) => {
                if let Err(e) = self.ledger.delete_by_refresh_token(refresh_token).await {
                    warn!(parent: &self.log, error = %e, "failed to drop expired session");
                }
                return Err(self.reject(AuthError::RefreshExpired));
            }
            Err(e) => return Err(self.internal("refresh lookup", e)),
        };

        let minted = self.mint(session.user_id)?;
        let replacement = NewSession {
            user_id: session.user_id,
            access_token: minted.access_token.clone(),
            access_expires_at: minted.access_expires_at,
            refresh_token: minted.refresh_token.clone(),
            refresh_expires_at: minted.refresh_expires_at,
        };

        match self.ledger.rotate(refresh_token, replacement).await {
            Ok(_) => {}
            // Another request consumed the token first, or it expired meanwhile.
            Err(LedgerError::NotFound) => return Err(self.reject(AuthError::RefreshNotFound)),
            Err(e) => return Err(self.internal("session rotate", e)),
        }

        observability::refresh_rotated();
        info!(parent: &self.log, user_id = session.user_id, "session rotated");

        Ok(self.token_pair(minted))
    }

    /// Revoke the session behind `access_token`. Idempotent.
    pub async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        self.ledger
            .delete_by_access_token(access_token)
            .await
            .map_err(|e| self.internal("session delete", e))?;

        observability::logged_out();
        info!(parent: &self.log, "session revoked");
        Ok(())
    }

    async fn verify_decoy(&self, password: &str) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.hasher.hash(DECOY_PASSWORD.to_string()))
            .await;

        match decoy {
            Ok(hash) => {
                let _ = self.hasher.verify(password.to_string(), hash.clone()).await;
            }
            Err(e) => warn!(parent: &self.log, error = %e, "decoy hash unavailable"),
        }
    }

    fn mint(&self, user_id: i64) -> Result<Minted, ApiError> {
        let (access_expires_at, refresh_expires_at) = self
            .issuer
            .issue_expiries()
            .map_err(|e| self.internal("token expiry", e))?;
        let access_token = self
            .issuer
            .issue_until(user_id, access_expires_at)
            .map_err(|e| self.internal("token signing", e))?;

        Ok(Minted {
            access_token,
            refresh_token: generate_refresh_token(),
            access_expires_at,
            refresh_expires_at,
        })
    }

    fn token_pair(&self, minted: Minted) -> TokenPair {
        TokenPair {
            access_token: minted.access_token,
            refresh_token: minted.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.access_ttl().num_seconds(),
        }
    }

    fn reject(&self, reason: AuthError) -> ApiError {
        warn!(parent: &self.log, reason = reason.code(), "authentication failed");
        observability::auth_rejected(reason.code());
        ApiError::Unauthorized(reason)
    }

    fn internal<E>(&self, during: &'static str, err: E) -> ApiError
    where
        E: Into<anyhow::Error>,
    {
        let err = err.into();
        error!(parent: &self.log, during, error = %err, "auth operation failed");
        ApiError::Internal(err.context(during))
    }
}
