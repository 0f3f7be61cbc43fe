use axum::{extract::Extension, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{api::AppState, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    status: String,
    environment: String,
    name: String,
    version: String,
    commit: String,
}

#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service is available", body = Health),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "health"
)]
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "available".to_string(),
        environment: state.config.env.clone(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
    })
}
