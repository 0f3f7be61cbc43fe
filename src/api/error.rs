//! Error responses.
//!
//! Every failure leaves the service as JSON: `{"error": "<message>"}`, or
//! `{"error": {"<field>": "<message>"}}` for validation failures.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::error;

use crate::data::DataError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("failed validation")]
    Validation(BTreeMap<String, String>),
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    Forbidden,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("the server encountered a problem and could not process your request")]
    Fault(#[source] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidAuthenticationToken
            | Self::InvalidCredentials
            | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Single-field validation failure.
    #[must_use]
    pub fn field(key: &str, message: &str) -> Self {
        Self::Validation(BTreeMap::from([(key.to_string(), message.to_string())]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(errors) => json!({ "error": errors }),
            Self::Fault(err) => {
                error!("request failed: {err:#}");
                json!({ "error": self.to_string() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, Self::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound => Self::NotFound,
            DataError::EditConflict => Self::EditConflict,
            DataError::DuplicateEmail => {
                Self::field("email", "a user with this email address already exists")
            }
            DataError::DuplicateTenant => Self::field("name", "tenant with this name already exists"),
            DataError::InvalidTenant => Self::field("tenant_id", "the specified tenant does not exist"),
            DataError::InvalidLeadStatus => Self::BadRequest(err.to_string()),
            DataError::Timeout(_) | DataError::Internal(_) => Self::Fault(err.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rate_limit_body_carries_message() {
        let response = ApiError::RateLimitExceeded.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["error"], "rate limit exceeded");
    }

    #[tokio::test]
    async fn fault_hides_details() {
        let response = ApiError::Fault(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn validation_errors_are_a_field_map() {
        let response = ApiError::field("email", "must be provided").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["error"]["email"], "must be provided");
    }

    #[test]
    fn invalid_token_sets_www_authenticate() {
        let response = ApiError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn inactive_and_forbidden_share_status_but_not_message() {
        assert_eq!(ApiError::InactiveAccount.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_ne!(
            ApiError::InactiveAccount.to_string(),
            ApiError::Forbidden.to_string()
        );
    }

    #[test]
    fn data_errors_map_to_statuses() {
        assert_eq!(ApiError::from(DataError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(DataError::EditConflict).status(), StatusCode::CONFLICT);
        let status = ApiError::from(DataError::InvalidLeadStatus);
        assert_eq!(status.status(), StatusCode::BAD_REQUEST);
        assert_eq!(status.to_string(), "invalid trade lead status");
        assert_eq!(
            ApiError::from(DataError::Timeout(std::time::Duration::from_secs(5))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
