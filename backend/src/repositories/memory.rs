//! In-memory implementations of the storage collaborators.
//!
//! # Purpose
//! Local development and tests, without a database. All state is lost on
//! restart and is private to one process.
//!
//! # Consistency
//! Every mutation takes the single write lock for its structure, so the
//! delete-then-insert inside [`SessionStore::rotate`] is atomic with respect
//! to every other operation on the same store.

use super::session::{NewSession, Session, SessionStore};
use super::user::{UserDirectory, UserRecord};
use super::{StoreError, StoreResult};
use async_trait::async_trait;
use authgate_shared::Role;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct SessionTable {
    next_id: i64,
    rows: HashMap<i64, Session>,
    by_access: HashMap<String, i64>,
    by_refresh: HashMap<String, i64>,
}

impl SessionTable {
    fn insert(&mut self, new: NewSession) -> StoreResult<Session> {
        if self.by_access.contains_key(&new.access_token) {
            return Err(StoreError::Conflict("access token already exists".into()));
        }
        if self.by_refresh.contains_key(&new.refresh_token) {
            return Err(StoreError::Conflict("refresh token already exists".into()));
        }

        self.next_id += 1;
        let session = Session {
            id: self.next_id,
            user_id: new.user_id,
            access_token: new.access_token,
            access_expires_at: new.access_expires_at,
            refresh_token: new.refresh_token,
            refresh_expires_at: new.refresh_expires_at,
        };

        self.by_access
            .insert(session.access_token.clone(), session.id);
        self.by_refresh
            .insert(session.refresh_token.clone(), session.id);
        self.rows.insert(session.id, session.clone());

        Ok(session)
    }

    fn remove(&mut self, id: i64) -> Option<Session> {
        let session = self.rows.remove(&id)?;
        self.by_access.remove(&session.access_token);
        self.by_refresh.remove(&session.refresh_token);
        Some(session)
    }
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    table: RwLock<SessionTable>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: NewSession) -> StoreResult<Session> {
        self.table.write().await.insert(session)
    }

    async fn find_by_access_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let table = self.table.read().await;
        Ok(table
            .by_access
            .get(token)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let table = self.table.read().await;
        Ok(table
            .by_refresh
            .get(token)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn delete_by_access_token(&self, token: &str) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let removed = match table.by_access.get(token).copied() {
            Some(id) => table.remove(id).map_or(0, |_| 1),
            None => 0,
        };
        Ok(removed)
    }

    async fn delete_by_refresh_token(&self, token: &str) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let removed = match table.by_refresh.get(token).copied() {
            Some(id) => table.remove(id).map_or(0, |_| 1),
            None => 0,
        };
        Ok(removed)
    }

    async fn rotate(
        &self,
        old_refresh_token: &str,
        now: DateTime<Utc>,
        replacement: NewSession,
    ) -> StoreResult<Session> {
        let mut table = self.table.write().await;

        let id = table
            .by_refresh
            .get(old_refresh_token)
            .copied()
            .filter(|id| {
                table.rows.get(id).is_some_and(|s| {
                    s.user_id == replacement.user_id && s.refresh_expires_at > now
                })
            })
            .ok_or_else(|| StoreError::NotFound("refresh token".into()))?;

        let old = table.remove(id);
        match table.insert(replacement) {
            Ok(session) => Ok(session),
            Err(err) => {
                // Put the consumed row back so a failed rotation changes nothing.
                if let Some(old) = old {
                    table.by_access.insert(old.access_token.clone(), old.id);
                    table.by_refresh.insert(old.refresh_token.clone(), old.id);
                    table.rows.insert(old.id, old);
                }
                Err(err)
            }
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let expired: Vec<i64> = table
            .rows
            .values()
            .filter(|s| s.refresh_expires_at <= now)
            .map(|s| s.id)
            .collect();

        for id in &expired {
            table.remove(*id);
        }
        Ok(expired.len() as u64)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Debug, Default)]
struct UserTable {
    next_id: i64,
    rows: BTreeMap<i64, UserRecord>,
    by_email: HashMap<String, i64>,
}

/// In-memory user directory
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    table: RwLock<UserTable>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let table = self.table.read().await;
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<UserRecord>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn role_of(&self, id: i64) -> StoreResult<Option<Role>> {
        Ok(self.table.read().await.rows.get(&id).map(|u| u.role))
    }

    async fn create(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> StoreResult<UserRecord> {
        let mut table = self.table.write().await;
        if table.by_email.contains_key(email) {
            return Err(StoreError::Conflict("email already exists".into()));
        }

        table.next_id += 1;
        let record = UserRecord {
            id: table.next_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: Utc::now(),
        };
        table.by_email.insert(record.email.clone(), record.id);
        table.rows.insert(record.id, record.clone());

        Ok(record)
    }

    async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<UserRecord>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_session(user_id: i64, access: &str, refresh: &str, now: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id,
            access_token: access.to_string(),
            access_expires_at: now + Duration::days(7),
            refresh_token: refresh.to_string(),
            refresh_expires_at: now + Duration::days(14),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_tokens() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        let dup_access = store.insert(new_session(2, "a1", "r2", now)).await;
        assert!(matches!(dup_access, Err(StoreError::Conflict(_))));

        let dup_refresh = store.insert(new_session(2, "a2", "r1", now)).await;
        assert!(matches!(dup_refresh, Err(StoreError::Conflict(_))));

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_both_indexes() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        assert_eq!(store.delete_by_access_token("a1").await.unwrap(), 1);
        assert!(store.find_by_refresh_token("r1").await.unwrap().is_none());
        assert_eq!(store.delete_by_access_token("a1").await.unwrap(), 0);
        assert_eq!(store.delete_by_refresh_token("r1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rotate_replaces_pair() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        let rotated = store
            .rotate("r1", now, new_session(1, "a2", "r2", now))
            .await
            .unwrap();
        assert_eq!(rotated.refresh_token, "r2");
        assert!(store.find_by_access_token("a1").await.unwrap().is_none());
        assert!(store.find_by_refresh_token("r1").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rotate_refuses_other_users_token() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        let result = store.rotate("r1", now, new_session(2, "a2", "r2", now)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.find_by_refresh_token("r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rotate_refuses_closed_refresh_window() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let session = store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        let result = store
            .rotate(
                "r1",
                session.refresh_expires_at,
                new_session(1, "a2", "r2", now),
            )
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_rotation_restores_old_row() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();
        store.insert(new_session(2, "b1", "s1", now)).await.unwrap();

        // Replacement collides with user 2's access token.
        let result = store.rotate("r1", now, new_session(1, "b1", "r2", now)).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert!(store.find_by_refresh_token("r1").await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotations_consume_token_once() {
        let store = Arc::new(MemorySessionStore::new());
        let now = Utc::now();
        store.insert(new_session(1, "a1", "r1", now)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .rotate(
                            "r1",
                            now,
                            new_session(1, &format!("a-next-{i}"), &format!("r-next-{i}"), now),
                        )
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_expired_uses_refresh_window() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let session = store.insert(new_session(1, "a1", "r1", now)).await.unwrap();
        store
            .insert(NewSession {
                refresh_expires_at: now + Duration::days(30),
                ..new_session(2, "a2", "r2", now)
            })
            .await
            .unwrap();

        // Access window closed, refresh window still open: kept.
        assert_eq!(store.delete_expired(session.access_expires_at).await.unwrap(), 0);
        assert_eq!(store.delete_expired(session.refresh_expires_at).await.unwrap(), 1);
        assert!(store.find_by_refresh_token("r2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_directory_create_and_lookup() {
        let directory = MemoryUserDirectory::new();
        let user = directory
            .create("a@x.com", "hash", Role::Admin)
            .await
            .unwrap();

        let by_email = directory.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(directory.role_of(user.id).await.unwrap(), Some(Role::Admin));
        assert_eq!(directory.role_of(user.id + 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_directory_rejects_duplicate_email() {
        let directory = MemoryUserDirectory::new();
        directory.create("a@x.com", "h", Role::User).await.unwrap();
        let result = directory.create("a@x.com", "h", Role::User).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_directory_list_pages_by_id() {
        let directory = MemoryUserDirectory::new();
        for i in 0..5 {
            directory
                .create(&format!("u{i}@x.com"), "h", Role::User)
                .await
                .unwrap();
        }

        let page = directory.list(2, 1).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
