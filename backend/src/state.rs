//! Application state management
//!
//! This module provides the shared application state that is passed
//! to all request handlers via Axum's state extraction.
//!
//! # Design Principles
//!
//! 1. **Pre-compute expensive resources**: JWT keys and the DB pool are created once
//! 2. **Cheap cloning**: All fields use Arc or are already Clone-cheap
//! 3. **Immutable after creation**: State is read-only during request handling

use crate::auth::{
    AuthGate, CredentialHasher, PasswordService, Pipeline, RoleGate, SessionLedger, Stage,
    TokenConfig, TokenIssuer,
};
use crate::clock::Clock;
use crate::config::{AppConfig, StorageBackend};
use crate::db;
use crate::repositories::{
    MemorySessionStore, MemoryUserDirectory, PgSessionStore, PgUserDirectory, SessionStore,
    UserDirectory,
};
use crate::services::{AuthService, UserService};
use anyhow::Result;
use authgate_shared::Role;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, Span};

/// Storage and hashing collaborators
#[derive(Clone)]
pub struct Backend {
    pub sessions: Arc<dyn SessionStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl Backend {
    /// Process-local stores, Argon2 hashing
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            directory: Arc::new(MemoryUserDirectory::new()),
            hasher: Arc::new(PasswordService),
        }
    }

    /// PostgreSQL stores sharing one pool, Argon2 hashing
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            directory: Arc::new(PgUserDirectory::new(pool)),
            hasher: Arc::new(PasswordService),
        }
    }

    /// Swap the password hasher
    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }
}

/// Shared application state
///
/// # Performance
///
/// - `config`: Wrapped in Arc, cloning is O(1)
/// - `issuer`: Pre-computed keys wrapped in Arc, cloning is O(1)
/// - everything else is a handle over Arc'd collaborators
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    pub issuer: TokenIssuer,
    pub ledger: SessionLedger,
    pub directory: Arc<dyn UserDirectory>,
    pub auth: AuthService,
    pub users: UserService,
    log: Span,
}

impl AppState {
    /// Build the state from already-constructed collaborators
    ///
    /// # Note
    /// This pre-computes JWT keys from the config secret and should only
    /// be called once at application startup.
    pub fn new(
        config: AppConfig,
        backend: Backend,
        clock: Arc<dyn Clock>,
        log: Span,
    ) -> Result<Self> {
        let issuer = TokenIssuer::new(
            config.jwt.secret.expose_secret().as_bytes(),
            TokenConfig::from_secs(
                config.jwt.access_token_ttl_secs,
                config.jwt.refresh_token_ttl_secs,
            ),
            clock.clone(),
        )?;
        let ledger = SessionLedger::new(backend.sessions, clock, log.clone());

        let auth = AuthService::new(
            backend.directory.clone(),
            backend.hasher.clone(),
            issuer.clone(),
            ledger.clone(),
            log.clone(),
        );
        let users = UserService::new(backend.directory.clone(), backend.hasher, log.clone());

        Ok(Self {
            config: Arc::new(config),
            issuer,
            ledger,
            directory: backend.directory,
            auth,
            users,
            log,
        })
    }

    /// Build the state for the configured storage backend
    ///
    /// Connects and migrates when the backend is PostgreSQL.
    pub async fn connect(config: AppConfig, clock: Arc<dyn Clock>, log: Span) -> Result<Self> {
        let backend = match config.database.backend {
            StorageBackend::Memory => {
                info!(parent: &log, "Using in-memory storage; sessions do not survive restarts");
                Backend::in_memory()
            }
            StorageBackend::Postgres => {
                info!(parent: &log, "Connecting to database...");
                let pool = db::create_pool(&config.database).await?;
                if !AppConfig::is_production() {
                    db::run_migrations(&pool).await?;
                }
                Backend::postgres(pool)
            }
        };

        Self::new(config, backend, clock, log)
    }

    /// Get a reference to the configuration
    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[inline]
    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    #[inline]
    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    #[inline]
    pub fn users(&self) -> &UserService {
        &self.users
    }

    fn auth_gate(&self) -> Arc<dyn Stage> {
        Arc::new(AuthGate::new(
            self.issuer.clone(),
            self.ledger.clone(),
            self.log.clone(),
        ))
    }

    /// Pipeline for routes that need a logged-in user
    pub fn authenticated(&self) -> Pipeline {
        Pipeline::new(vec![self.auth_gate()])
    }

    /// Pipeline for routes restricted to `role`
    pub fn requires_role(&self, role: Role) -> Pipeline {
        self.authenticated().then(Arc::new(RoleGate::new(
            role,
            self.directory.clone(),
            self.log.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::test_support::FastHasher;
    use secrecy::SecretString;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.jwt.secret = SecretString::new("state-test-secret".to_string());
        config
    }

    #[test]
    fn test_state_clone_is_cheap() {
        let state = AppState::new(
            test_config(),
            Backend::in_memory().with_hasher(Arc::new(FastHasher)),
            Arc::new(SystemClock),
            Span::none(),
        )
        .unwrap();

        // Clone should be O(1) - just Arc increments
        let _cloned = state.clone();
        assert_eq!(state.ledger().backend_name(), "memory");
    }

    #[test]
    fn test_missing_secret_fails_construction() {
        let result = AppState::new(
            AppConfig::default(),
            Backend::in_memory(),
            Arc::new(SystemClock),
            Span::none(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_with_memory_backend() {
        let mut config = test_config();
        config.database.backend = StorageBackend::Memory;

        let state = AppState::connect(config, Arc::new(SystemClock), Span::none())
            .await
            .unwrap();
        assert!(state.ledger().health_check().await.is_ok());
        assert_eq!(state.config().database.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_config_is_shared_between_clones() {
        let mut config = test_config();
        config.session.purge_interval_secs = 60;
        let state = AppState::new(
            config,
            Backend::in_memory(),
            Arc::new(SystemClock),
            Span::none(),
        )
        .unwrap();

        let cloned = state.clone();
        assert!(std::ptr::eq(state.config(), cloned.config()));
        assert_eq!(cloned.config().session.purge_interval_secs, 60);
    }
}
