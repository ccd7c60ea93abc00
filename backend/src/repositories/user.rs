//! User repository for database operations

use super::{StoreError, StoreResult};
use async_trait::async_trait;
use authgate_shared::{Role, User};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// User record as held by the directory
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            role: record.role,
            created_at: record.created_at,
        }
    }
}

/// Lookup and registration of user accounts
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<UserRecord>>;

    async fn role_of(&self, id: i64) -> StoreResult<Option<Role>>;

    /// Duplicate email is a `Conflict`.
    async fn create(&self, email: &str, password_hash: &str, role: Role)
        -> StoreResult<UserRecord>;

    /// Ordered by id.
    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>>;
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Unexpected(anyhow::anyhow!(e)))?;

        Ok(Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL user directory
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn role_of(&self, id: i64) -> StoreResult<Option<Role>> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        role.map(|r| {
            r.parse::<Role>()
                .map_err(|e| StoreError::Unexpected(anyhow::anyhow!(e)))
        })
        .transpose()
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> StoreResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, role, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, created_at
            FROM users
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> UserRow {
        UserRow {
            id: 7,
            email: "a@x.com".to_string(),
            password_hash: "hash".to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_with_known_role_converts() {
        let record = UserRecord::try_from(row("admin")).unwrap();
        assert_eq!(record.role, Role::Admin);
        assert_eq!(record.id, 7);
    }

    #[test]
    fn test_row_with_unknown_role_is_unexpected() {
        let err = UserRecord::try_from(row("superuser")).unwrap_err();
        assert!(matches!(err, StoreError::Unexpected(_)));
    }

    #[test]
    fn test_user_conversion_drops_hash() {
        let user: User = UserRecord::try_from(row("user")).unwrap().into();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("hash"));
    }
}
