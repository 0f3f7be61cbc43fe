//! Request interceptors.
//!
//! An [`Interceptor`] sees a request before the handler does and decides whether
//! to pass it on. Interceptors are grouped into a [`Chain`], an ordered list run
//! front to back; each link either calls [`Next::run`] or answers on its own, in
//! which case nothing after it runs.
//!
//! A chain is mounted on a router as a single axum middleware, either over every
//! route ([`Chain::layer`]) or only over matched routes of a group
//! ([`Chain::route_layer`]).

pub mod authenticate;
pub mod authorize;
pub mod metrics;
pub mod rate_limit;
pub mod recover;

pub use self::authenticate::Authenticate;
pub use self::authorize::{RequireActivatedUser, RequireAuthenticatedUser, RequirePermission};
pub use self::metrics::{Metrics, RequestMetrics};
pub use self::rate_limit::{RateLimit, RateLimitConfig, RateLimiter};
pub use self::recover::RecoverPanic;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
    Router,
};
use std::{fmt, sync::Arc};

use crate::data::Identity;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response;
}

/// The remainder of a chain, ending in the wrapped handler.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    endpoint: middleware::Next,
}

impl Next<'_> {
    pub async fn run(self, request: Request) -> Response {
        match self.rest.split_first() {
            Some((head, rest)) => {
                head.intercept(
                    request,
                    Next {
                        rest,
                        endpoint: self.endpoint,
                    },
                )
                .await
            }
            None => self.endpoint.run(request).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl Chain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it runs after every one added before it.
    #[must_use]
    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn run(&self, request: Request, endpoint: middleware::Next) -> Response {
        Next {
            rest: &self.interceptors,
            endpoint,
        }
        .run(request)
        .await
    }

    /// Wrap every route of `router`, including fallbacks.
    pub fn layer<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(Arc::new(self), run_chain))
    }

    /// Wrap only the routes already added to `router`.
    pub fn route_layer<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(Arc::new(self), run_chain))
    }
}

async fn run_chain(
    State(chain): State<Arc<Chain>>,
    request: Request,
    next: middleware::Next,
) -> Response {
    chain.run(request, next).await
}

/// Identity attached by [`Authenticate`]; anonymous when nothing was attached.
#[must_use]
pub fn identity_of(request: &Request) -> Identity {
    request
        .extensions()
        .get::<Identity>()
        .cloned()
        .unwrap_or(Identity::Anonymous)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::get};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for Record {
        async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
            self.log.lock().unwrap().push(self.name);
            next.run(request).await
        }
    }

    struct Refuse;

    #[async_trait]
    impl Interceptor for Refuse {
        async fn intercept(&self, _request: Request, _next: Next<'_>) -> Response {
            StatusCode::IM_A_TEAPOT.into_response()
        }
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn chain_runs_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = log.clone();
        let chain = Chain::new()
            .with(Record {
                name: "first",
                log: log.clone(),
            })
            .with(Record {
                name: "second",
                log: log.clone(),
            });
        assert_eq!(chain.len(), 2);

        let router = chain.layer(Router::new().route(
            "/",
            get(move || async move {
                handler_log.lock().unwrap().push("handler");
                "ok"
            }),
        ));

        let response = router.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_rest_of_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = log.clone();
        let chain = Chain::new().with(Refuse).with(Record {
            name: "after",
            log: log.clone(),
        });

        let router = chain.layer(Router::new().route(
            "/",
            get(move || async move {
                handler_log.lock().unwrap().push("handler");
                "ok"
            }),
        ));

        let response = router.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_identity_reads_as_anonymous() {
        assert!(identity_of(&request()).is_anonymous());
    }
}
