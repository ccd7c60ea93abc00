//! Authentication middleware
//!
//! Protected routes run an ordered [`Pipeline`] of [`Stage`]s before the
//! handler. Each stage takes the identity established so far and either
//! returns a (possibly enriched) identity or rejects the request. The final
//! identity is stored in the request extensions for [`CurrentUser`].
//!
//! [`CurrentUser`]: super::CurrentUser

use super::identity::Identity;
use super::jwt::TokenIssuer;
use super::ledger::SessionLedger;
use crate::error::ApiError;
use crate::observability;
use crate::repositories::UserDirectory;
use async_trait::async_trait;
use authgate_shared::{AuthError, Role};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn, Span};

/// Pull the bearer token out of the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?
        .trim();

    if value.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let (scheme, token) = match value.split_once(' ') {
        Some((scheme, token)) => (scheme, token.trim()),
        None => (value, ""),
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token)
}

/// One capability check in a request pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    async fn check(&self, identity: Identity, parts: &Parts) -> Result<Identity, ApiError>;
}

/// Ordered list of stages, applied with [`enforce`]
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Append a stage
    pub fn then(self, stage: Arc<dyn Stage>) -> Self {
        let mut stages = self.stages.to_vec();
        stages.push(stage);
        Self::new(stages)
    }

    /// Run every stage in order, stopping at the first rejection
    pub async fn run(&self, parts: &Parts) -> Result<Identity, ApiError> {
        let mut identity = Identity::Anonymous;
        for stage in self.stages.iter() {
            identity = stage.check(identity, parts).await?;
        }
        Ok(identity)
    }
}

/// Middleware entry point
///
/// ```ignore
/// router.route_layer(axum::middleware::from_fn_with_state(pipeline, enforce))
/// ```
pub async fn enforce(
    State(pipeline): State<Pipeline>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let identity = pipeline.run(&parts).await?;
    parts.extensions.insert(identity);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

fn reject(log: &Span, reason: AuthError) -> ApiError {
    warn!(parent: log, reason = reason.code(), "request rejected");
    observability::auth_rejected(reason.code());
    ApiError::Unauthorized(reason)
}

/// Authenticates the bearer token against the issuer and the session ledger
pub struct AuthGate {
    issuer: TokenIssuer,
    ledger: SessionLedger,
    log: Span,
}

impl AuthGate {
    pub fn new(issuer: TokenIssuer, ledger: SessionLedger, log: Span) -> Self {
        Self {
            issuer,
            ledger,
            log,
        }
    }
}

#[async_trait]
impl Stage for AuthGate {
    async fn check(&self, _identity: Identity, parts: &Parts) -> Result<Identity, ApiError> {
        let token = bearer_token(&parts.headers).map_err(|reason| reject(&self.log, reason))?;

        let claim = self.issuer.verify(token).map_err(|e| {
            debug!(parent: &self.log, error = %e, "token verification failed");
            reject(&self.log, AuthError::InvalidToken)
        })?;

        // Signature is fine; the ledger decides whether the session still exists.
        if !self.ledger.is_valid(claim.user_id, token).await {
            return Err(reject(&self.log, AuthError::SessionInvalid));
        }

        Ok(Identity::Authenticated {
            user_id: claim.user_id,
            role: None,
        })
    }
}

/// Requires the authenticated user to hold `required`
///
/// Must run after [`AuthGate`].
pub struct RoleGate {
    required: Role,
    directory: Arc<dyn UserDirectory>,
    log: Span,
}

impl RoleGate {
    pub fn new(required: Role, directory: Arc<dyn UserDirectory>, log: Span) -> Self {
        Self {
            required,
            directory,
            log,
        }
    }
}

#[async_trait]
impl Stage for RoleGate {
    async fn check(&self, identity: Identity, _parts: &Parts) -> Result<Identity, ApiError> {
        let Identity::Authenticated { user_id, .. } = identity else {
            error!(parent: &self.log, "role check reached without an identity");
            return Err(reject(&self.log, AuthError::MissingIdentity));
        };

        let role = self.directory.role_of(user_id).await.map_err(|e| {
            error!(parent: &self.log, user_id, error = %e, "role lookup failed");
            ApiError::Internal(anyhow::Error::new(e))
        })?;

        match role {
            Some(role) if role == self.required => Ok(Identity::Authenticated {
                user_id,
                role: Some(role),
            }),
            _ => {
                warn!(parent: &self.log, user_id, required = %self.required, "role check failed");
                observability::auth_rejected("forbidden");
                Err(ApiError::Forbidden(format!("{} role required", self.required)))
            }
        }
    }
}
