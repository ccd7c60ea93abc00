//! User service for registration and account queries
//!
//! # Performance
//!
//! Password hashing runs through the [`CredentialHasher`], which keeps the
//! CPU-heavy work off the async runtime.

use crate::auth::CredentialHasher;
use crate::error::ApiError;
use crate::repositories::{StoreError, UserDirectory};
use authgate_shared::validation::{clamp_limit, clamp_offset, normalize_email, validate_password};
use authgate_shared::{ListUsersQuery, Role, User};
use std::sync::Arc;
use tracing::{info, warn, Span};
use validator::ValidateEmail;

#[derive(Clone)]
pub struct UserService {
    directory: Arc<dyn UserDirectory>,
    hasher: Arc<dyn CredentialHasher>,
    log: Span,
}

impl UserService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        hasher: Arc<dyn CredentialHasher>,
        log: Span,
    ) -> Self {
        Self {
            directory,
            hasher,
            log,
        }
    }

    /// Register a new account with the `user` role
    pub async fn signup(&self, email: &str, password: &str) -> Result<User, ApiError> {
        self.register(email, password, Role::User).await
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<User, ApiError> {
        self.directory
            .find_by_id(user_id)
            .await
            .map_err(store_error)?
            .map(User::from)
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Page through accounts ordered by id
    pub async fn list_users(&self, query: &ListUsersQuery) -> Result<Vec<User>, ApiError> {
        let limit = clamp_limit(query.limit);
        let offset = clamp_offset(query.offset);

        let users = self
            .directory
            .list(limit, offset)
            .await
            .map_err(store_error)?;

        Ok(users.into_iter().map(User::from).collect())
    }

    /// Make sure an administrator account exists for `email`
    ///
    /// An existing account is left as it is.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let normalized = normalize_email(email);
        if let Some(existing) = self
            .directory
            .find_by_email(&normalized)
            .await
            .map_err(store_error)?
        {
            if existing.role != Role::Admin {
                warn!(
                    parent: &self.log,
                    user_id = existing.id,
                    "bootstrap admin email belongs to a non-admin account"
                );
            }
            return Ok(existing.into());
        }

        let user = self.register(email, password, Role::Admin).await?;
        info!(parent: &self.log, user_id = user.id, "admin account created");
        Ok(user)
    }

    async fn register(&self, email: &str, password: &str, role: Role) -> Result<User, ApiError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(ApiError::Validation("Invalid email format".to_string()));
        }
        validate_password(password).map_err(ApiError::Validation)?;

        let password_hash = self
            .hasher
            .hash(password.to_string())
            .await
            .map_err(ApiError::Internal)?;

        let user = self
            .directory
            .create(&email, &password_hash, role)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    ApiError::Conflict("Email already registered".to_string())
                }
                other => store_error(other),
            })?;

        info!(parent: &self.log, user_id = user.id, role = %role, "user registered");
        Ok(user.into())
    }
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(what) => ApiError::NotFound(what),
        StoreError::Conflict(what) => ApiError::Conflict(what),
        StoreError::Unexpected(e) => ApiError::Internal(e),
    }
}
