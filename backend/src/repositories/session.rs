//! Session repository
//!
//! One row per live access/refresh token pair.

use super::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Session record
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Input for inserting a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Durable keyed store backing the session ledger
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a row. Either token already present is a `Conflict`.
    async fn insert(&self, session: NewSession) -> StoreResult<Session>;

    async fn find_by_access_token(&self, token: &str) -> StoreResult<Option<Session>>;

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Session>>;

    /// Returns the number of rows removed.
    async fn delete_by_access_token(&self, token: &str) -> StoreResult<u64>;

    /// Returns the number of rows removed.
    async fn delete_by_refresh_token(&self, token: &str) -> StoreResult<u64>;

    /// Consume `old_refresh_token` and insert `replacement` as one atomic unit.
    ///
    /// The old row is only consumed if it belongs to `replacement.user_id` and
    /// its refresh window is still open at `now`. `NotFound` when nothing was
    /// consumed; in that case nothing is inserted either.
    async fn rotate(
        &self,
        old_refresh_token: &str,
        now: DateTime<Utc>,
        replacement: NewSession,
    ) -> StoreResult<Session>;

    /// Remove rows whose refresh window closed at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}

const SESSION_COLUMNS: &str =
    "id, user_id, access_token, access_expires_at, refresh_token, refresh_expires_at";

/// PostgreSQL session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_with<'e, E>(executor: E, session: &NewSession) -> StoreResult<Session>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions
                (user_id, access_token, access_expires_at, refresh_token, refresh_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.user_id)
        .bind(&session.access_token)
        .bind(session.access_expires_at)
        .bind(&session.refresh_token)
        .bind(session.refresh_expires_at)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: NewSession) -> StoreResult<Session> {
        Self::insert_with(&self.pool, &session).await
    }

    async fn find_by_access_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE access_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete_by_access_token(&self, token: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE access_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_refresh_token(&self, token: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old_refresh_token: &str,
        now: DateTime<Utc>,
        replacement: NewSession,
    ) -> StoreResult<Session> {
        let mut tx = self.pool.begin().await?;

        // A concurrent rotation of the same token blocks on the row lock here
        // and then sees the row gone, so only one caller ever consumes it.
        let consumed = sqlx::query_scalar::<_, i64>(
            r#"
            DELETE FROM sessions
            WHERE refresh_token = $1 AND user_id = $2 AND refresh_expires_at > $3
            RETURNING id
            "#,
        )
        .bind(old_refresh_token)
        .bind(replacement.user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if consumed.is_none() {
            tx.rollback().await?;
            return Err(StoreError::NotFound("refresh token".into()));
        }

        let session = Self::insert_with(&mut *tx, &replacement).await?;
        tx.commit().await?;

        Ok(session)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
