pub mod health;
pub mod tenants;
pub mod trade_leads;
pub mod users;

use axum::{extract::rejection::JsonRejection, Json};

use super::error::ApiError;
use crate::data::Validator;

/// Unwrap a JSON body, turning a rejection into a JSON `400`.
pub(crate) fn read_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Parse an optional query value as an integer, recording a field error on failure.
pub(crate) fn read_int(value: Option<&str>, default: i64, key: &str, v: &mut Validator) -> i64 {
    match value {
        None | Some("") => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

/// Parse `/:id/:version` path segments. `what` names the record in the error.
pub(crate) fn read_path_ids(id: &str, version: &str, what: &str) -> Result<(i64, i32), ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what} id parameter")))?;
    if id < 1 {
        return Err(ApiError::field("id", "must be a positive integer"));
    }

    let version: i64 = version
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid version parameter".to_string()))?;
    let version = i32::try_from(version)
        .map_err(|_| ApiError::BadRequest("version ID out of range".to_string()))?;
    Ok((id, version))
}

/// Reject a request that failed validation.
pub(crate) fn ensure_valid(v: Validator) -> Result<(), ApiError> {
    if v.valid() {
        Ok(())
    } else {
        Err(ApiError::Validation(v.into_errors()))
    }
}
