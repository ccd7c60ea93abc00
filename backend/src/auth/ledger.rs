//! Session ledger
//!
//! Durable record of live access/refresh pairs and the source of truth for
//! revocation: a signed access token is only honoured while its row exists.
//! AuthService is the only writer; the gates only call [`SessionLedger::is_valid`].

use crate::clock::Clock;
use crate::repositories::{NewSession, Session, SessionStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{warn, Span};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("session not found")]
    NotFound,
    #[error("refresh token expired")]
    Expired,
    #[error("token collision: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => LedgerError::NotFound,
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::Unexpected(e) => LedgerError::Store(e),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    log: Span,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, log: Span) -> Self {
        Self { store, clock, log }
    }

    /// Record a freshly issued pair. Either token already present is a `Conflict`.
    pub async fn create(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: &str,
        access_expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> LedgerResult<Session> {
        let session = NewSession {
            user_id,
            access_token: access_token.to_string(),
            access_expires_at,
            refresh_token: refresh_token.to_string(),
            refresh_expires_at,
        };
        check_windows(&session)?;

        Ok(self.store.insert(session).await?)
    }

    /// True iff a row matches both fields and its access window is still open.
    ///
    /// Store failures count as invalid.
    pub async fn is_valid(&self, user_id: i64, access_token: &str) -> bool {
        match self.store.find_by_access_token(access_token).await {
            Ok(Some(session)) => {
                session.user_id == user_id && session.access_expires_at > self.clock.now()
            }
            Ok(None) => false,
            Err(e) => {
                warn!(parent: &self.log, error = %e, "session lookup failed, treating as invalid");
                false
            }
        }
    }

    /// `Expired` is reported separately from `NotFound` when the row exists
    /// but its refresh window has closed.
    pub async fn get_by_refresh_token(&self, refresh_token: &str) -> LedgerResult<Session> {
        let session = self
            .store
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(LedgerError::NotFound)?;

        if session.refresh_expires_at <= self.clock.now() {
            return Err(LedgerError::Expired);
        }

        Ok(session)
    }

    /// Idempotent.
    pub async fn delete_by_access_token(&self, access_token: &str) -> LedgerResult<()> {
        self.store.delete_by_access_token(access_token).await?;
        Ok(())
    }

    /// Idempotent.
    pub async fn delete_by_refresh_token(&self, refresh_token: &str) -> LedgerResult<()> {
        self.store.delete_by_refresh_token(refresh_token).await?;
        Ok(())
    }

    /// Exchange `old_refresh_token` for `replacement` in one atomic unit.
    ///
    /// Of several concurrent calls with the same token at most one succeeds;
    /// the rest get `NotFound`.
    pub async fn rotate(
        &self,
        old_refresh_token: &str,
        replacement: NewSession,
    ) -> LedgerResult<Session> {
        check_windows(&replacement)?;

        Ok(self
            .store
            .rotate(old_refresh_token, self.clock.now(), replacement)
            .await?)
    }

    /// Remove rows whose refresh window has closed. Live sessions are untouched.
    pub async fn purge_expired(&self) -> LedgerResult<u64> {
        Ok(self.store.delete_expired(self.clock.now()).await?)
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        Ok(self.store.health_check().await?)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

fn check_windows(session: &NewSession) -> LedgerResult<()> {
    if session.refresh_expires_at <= session.access_expires_at {
        return Err(LedgerError::Store(anyhow::anyhow!(
            "refresh window must outlive access window"
        )));
    }
    Ok(())
}
