//! Bearer token authentication.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, Instrument};

use super::{Interceptor, Next};
use crate::{
    api::error::ApiError,
    data::{
        validator::{validate_token_plaintext, Validator},
        DataError, Identity, Scope, TokenStore,
    },
};

/// Outcome of reading the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
pub enum Bearer<'a> {
    Missing,
    Malformed,
    Token(&'a str),
}

/// Parse `Authorization: Bearer <token>`.
///
/// Anything other than exactly two space-separated fields with the `Bearer`
/// scheme is malformed.
#[must_use]
pub fn parse_bearer(headers: &HeaderMap) -> Bearer<'_> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Bearer::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Bearer::Malformed;
    };

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Bearer::Token(token),
        _ => Bearer::Malformed,
    }
}

/// Resolves the bearer token into an [`Identity`] stored in request extensions.
///
/// A request without an `Authorization` header continues as
/// [`Identity::Anonymous`]. Every response passing through here carries
/// `Vary: Authorization`.
#[derive(Clone, Debug)]
pub struct Authenticate {
    tokens: TokenStore,
}

impl Authenticate {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    async fn identify(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let token = match parse_bearer(headers) {
            Bearer::Missing => return Ok(Identity::Anonymous),
            Bearer::Malformed => return Err(ApiError::InvalidAuthenticationToken),
            Bearer::Token(token) => token,
        };

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, token);
        if !v.valid() {
            return Err(ApiError::InvalidAuthenticationToken);
        }

        match self.tokens.resolve(Scope::Authentication, token).await {
            Ok(user) => Ok(Identity::User(Arc::new(user))),
            Err(DataError::NotFound) => Err(ApiError::InvalidCredentials),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl Interceptor for Authenticate {
    async fn intercept(&self, mut request: Request, next: Next<'_>) -> Response {
        let span = tracing::debug_span!("authenticate");
        let identity = self.identify(request.headers()).instrument(span).await;

        let mut response = match identity {
            Ok(identity) => {
                if let Identity::User(user) = &identity {
                    debug!(user_id = user.id, tenant_id = user.tenant_id, "authenticated");
                }
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(err) => err.into_response(),
        };

        response
            .headers_mut()
            .append(header::VARY, HeaderValue::from_static("Authorization"));
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parse_bearer_cases() {
        assert_eq!(parse_bearer(&HeaderMap::new()), Bearer::Missing);
        assert_eq!(parse_bearer(&headers("Bearer abc")), Bearer::Token("abc"));
        assert_eq!(parse_bearer(&headers("Basic abc")), Bearer::Malformed);
        assert_eq!(parse_bearer(&headers("bearer abc")), Bearer::Malformed);
        assert_eq!(parse_bearer(&headers("Bearer")), Bearer::Malformed);
        assert_eq!(parse_bearer(&headers("Bearer a b")), Bearer::Malformed);
        assert_eq!(parse_bearer(&headers("Bearer  abc")), Bearer::Malformed);
    }
}
