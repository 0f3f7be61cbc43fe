//! Authorization gates.
//!
//! Each gate includes the checks of the one before it: activated implies
//! authenticated, a permission implies activated.

use async_trait::async_trait;
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::{identity_of, Interceptor, Next};
use crate::{
    api::error::ApiError,
    data::{with_deadline, Identity, PermissionStore, User},
};

fn authenticated(request: &Request) -> Result<Arc<User>, ApiError> {
    match identity_of(request) {
        Identity::User(user) => Ok(user),
        Identity::Anonymous => Err(ApiError::AuthenticationRequired),
    }
}

fn activated(request: &Request) -> Result<Arc<User>, ApiError> {
    let user = authenticated(request)?;
    if user.activated {
        Ok(user)
    } else {
        Err(ApiError::InactiveAccount)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequireAuthenticatedUser;

#[async_trait]
impl Interceptor for RequireAuthenticatedUser {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        match authenticated(&request) {
            Ok(_) => next.run(request).await,
            Err(err) => err.into_response(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequireActivatedUser;

#[async_trait]
impl Interceptor for RequireActivatedUser {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        match activated(&request) {
            Ok(_) => next.run(request).await,
            Err(err) => err.into_response(),
        }
    }
}

/// Admits activated users holding `code`.
#[derive(Clone)]
pub struct RequirePermission {
    code: &'static str,
    permissions: Arc<dyn PermissionStore>,
}

impl std::fmt::Debug for RequirePermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequirePermission")
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl RequirePermission {
    pub fn new(code: &'static str, permissions: Arc<dyn PermissionStore>) -> Self {
        Self { code, permissions }
    }

    async fn check(&self, user: &User) -> Result<(), ApiError> {
        let held = with_deadline(self.permissions.get_all_for_user(user.id)).await?;
        if held.includes(self.code) {
            Ok(())
        } else {
            debug!(user_id = user.id, code = self.code, "permission denied");
            Err(ApiError::Forbidden)
        }
    }
}

#[async_trait]
impl Interceptor for RequirePermission {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let user = match activated(&request) {
            Ok(user) => user,
            Err(err) => return err.into_response(),
        };
        match self.check(&user).await {
            Ok(()) => next.run(request).await,
            Err(err) => err.into_response(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        api::interceptor::Chain,
        data::{MemoryStore, PERMISSION_ADMIN_WRITE},
    };
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn user(id: i64, activated: bool) -> Identity {
        let mut user = User::new(1, "Erin".to_string(), "erin@example.com".to_string());
        user.id = id;
        user.activated = activated;
        Identity::User(Arc::new(user))
    }

    async fn call(chain: Chain, identity: Option<Identity>) -> StatusCode {
        let router = chain.layer(Router::new().route("/", get(|| async { "ok" })));
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        if let Some(identity) = identity {
            request.extensions_mut().insert(identity);
        }
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn authenticated_gate() {
        let chain = || Chain::new().with(RequireAuthenticatedUser);
        assert_eq!(
            call(chain(), Some(Identity::Anonymous)).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(call(chain(), None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(call(chain(), Some(user(1, false))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn activated_gate() {
        let chain = || Chain::new().with(RequireActivatedUser);
        assert_eq!(
            call(chain(), Some(Identity::Anonymous)).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            call(chain(), Some(user(1, false))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(call(chain(), Some(user(1, true))).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn permission_gate_admits_after_grant() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed_user("frank@example.com", true).await;
        let chain = || {
            Chain::new().with(RequirePermission::new(
                PERMISSION_ADMIN_WRITE,
                store.clone(),
            ))
        };

        assert_eq!(call(chain(), Some(user(id, true))).await, StatusCode::FORBIDDEN);
        assert_eq!(
            call(chain(), Some(user(id, false))).await,
            StatusCode::FORBIDDEN
        );

        store.add_for_user(id, &[PERMISSION_ADMIN_WRITE]).await.unwrap();
        assert_eq!(call(chain(), Some(user(id, true))).await, StatusCode::OK);
    }
}
