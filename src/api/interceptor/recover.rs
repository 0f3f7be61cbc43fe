//! Outermost interceptor: a panic below it becomes a `500`.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use std::{any::Any, panic::AssertUnwindSafe};
use tracing::error;

use super::{Interceptor, Next};
use crate::api::error::ApiError;

/// Catches panics from the rest of the chain and the handler.
///
/// The response carries `Connection: close` so the client does not reuse a
/// connection that was being served when the fault happened.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecoverPanic;

#[async_trait]
impl Interceptor for RecoverPanic {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let method = request.method().clone();
        let uri = request.uri().clone();

        match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%method, %uri, "recovered from panic: {message}");

                let mut response =
                    ApiError::Fault(anyhow::anyhow!("panic: {message}")).into_response();
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                response
            }
        }
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
