//! Authenticated identity threaded through the request

use crate::error::ApiError;
use authgate_shared::{AuthError, Role};
use axum::{extract::FromRequestParts, http::request::Parts};

/// Who is making the request, as established by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated {
        user_id: i64,
        /// Filled in once a stage has looked the role up
        role: Option<Role>,
    },
}

impl Identity {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated { user_id, .. } => Some(*user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated { .. })
    }
}

/// Extractor for handlers behind an authenticating pipeline
///
/// Rejects with 401 when no pipeline ran or it left the request anonymous.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: i64,
    pub role: Option<Role>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Identity>() {
            Some(Identity::Authenticated { user_id, role }) => Ok(CurrentUser {
                user_id: *user_id,
                role: *role,
            }),
            _ => Err(AuthError::MissingIdentity.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_identity_accessors() {
        assert_eq!(Identity::Anonymous.user_id(), None);
        assert!(!Identity::default().is_authenticated());

        let id = Identity::Authenticated {
            user_id: 3,
            role: None,
        };
        assert_eq!(id.user_id(), Some(3));
        assert!(id.is_authenticated());
    }

    #[tokio::test]
    async fn test_extractor_reads_authenticated_identity() {
        let (mut parts, _) = Request::new(()).into_parts();
        parts.extensions.insert(Identity::Authenticated {
            user_id: 9,
            role: Some(Role::Admin),
        });

        let user = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.user_id, 9);
        assert_eq!(user.role, Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_extractor_rejects_anonymous() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::MissingIdentity));

        parts.extensions.insert(Identity::Anonymous);
        let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.auth_reason(), Some(AuthError::MissingIdentity));
    }
}
