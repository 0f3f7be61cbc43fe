//! Registration, activation and login.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use super::{ensure_valid, read_json};
use crate::{
    api::{
        error::ApiError,
        mail::{EmailMessage, TEMPLATE_USER_ACTIVATED, TEMPLATE_USER_WELCOME},
        AppState,
    },
    data::{
        tokens::{ACTIVATION_TTL, AUTHENTICATION_TTL},
        users::validate_user,
        validator::{
            validate_email, validate_name, validate_password_plaintext, validate_token_plaintext,
        },
        with_deadline, DataError, Scope, Token, User, UserSummary, Validator,
    },
};

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    tenant_id: i64,
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    user: User,
}

#[utoipa::path(
    post,
    path = "/v1/api",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "User created, activation mail queued", body = UserResponse),
        (status = 400, description = "Malformed body"),
        (status = 422, description = "Validation failed")
    ),
    tag = "users"
)]
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let request = read_json(payload)?;
    let password = SecretString::from(request.password);
    let mut user = User::new(request.tenant_id, request.name, request.email);

    // reject bad passwords before paying for a hash
    let mut v = Validator::new();
    validate_password_plaintext(&mut v, password.expose_secret());
    if !v.valid() {
        validate_name(&mut v, &user.name);
        validate_email(&mut v, &user.email);
        return Err(ApiError::Validation(v.into_errors()));
    }

    user.password.set(password).await?;
    validate_user(&mut v, &user);
    ensure_valid(v)?;

    with_deadline(state.models.users.insert(&mut user)).await?;
    info!(user_id = user.id, tenant_id = user.tenant_id, "registered user");

    let token = state
        .models
        .tokens
        .issue(user.id, ACTIVATION_TTL, Scope::Activation)
        .await?;

    let message = EmailMessage::new(user.email.clone(), TEMPLATE_USER_WELCOME)
        .with(
            "activationURL",
            format!(
                "{}{}",
                state.config.activation_url,
                token.plaintext.expose_secret()
            ),
        )
        .with("activationToken", token.plaintext.expose_secret())
        .with("userID", user.id);
    send_in_background(&state, "welcome_email", message);

    Ok((StatusCode::ACCEPTED, Json(UserResponse { user })))
}

#[derive(Deserialize, ToSchema)]
pub struct ActivateRequest {
    token: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserSummaryResponse {
    user: UserSummary,
}

#[utoipa::path(
    put,
    path = "/v1/api/activated",
    request_body = ActivateRequest,
    responses(
        (status = 202, description = "User activated", body = UserSummaryResponse),
        (status = 409, description = "User changed concurrently"),
        (status = 422, description = "Invalid or expired activation token")
    ),
    tag = "users"
)]
pub async fn activate(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserSummaryResponse>), ApiError> {
    let request = read_json(payload)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &request.token);
    ensure_valid(v)?;

    let mut user = match state
        .models
        .tokens
        .resolve(Scope::Activation, &request.token)
        .await
    {
        Ok(user) => user,
        Err(DataError::NotFound) => {
            return Err(ApiError::field(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    with_deadline(state.models.users.update(&mut user)).await?;
    state
        .models
        .tokens
        .revoke_all(Scope::Activation, user.id)
        .await?;
    info!(user_id = user.id, "activated user");

    let message = EmailMessage::new(user.email.clone(), TEMPLATE_USER_ACTIVATED)
        .with("loginURL", state.config.authentication_url.clone())
        .with("userName", user.name.clone());
    send_in_background(&state, "activation_email", message);

    Ok((
        StatusCode::ACCEPTED,
        Json(UserSummaryResponse {
            user: user.summary(),
        }),
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct AuthenticationRequest {
    email: String,
    password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthenticationResponse {
    api_key: Token,
    user: UserSummary,
}

#[utoipa::path(
    post,
    path = "/v1/api/authentication",
    request_body = AuthenticationRequest,
    responses(
        (status = 201, description = "Bearer token issued", body = AuthenticationResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 422, description = "Validation failed")
    ),
    tag = "users"
)]
pub async fn authenticate(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<AuthenticationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthenticationResponse>), ApiError> {
    let request = read_json(payload)?;
    let password = SecretString::from(request.password);

    let mut v = Validator::new();
    validate_email(&mut v, &request.email);
    validate_password_plaintext(&mut v, password.expose_secret());
    ensure_valid(v)?;

    let user = match with_deadline(state.models.users.get_by_email(&request.email)).await {
        Ok(user) => user,
        Err(DataError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };

    if !user.password.matches(password).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let api_key = state
        .models
        .tokens
        .issue(user.id, AUTHENTICATION_TTL, Scope::Authentication)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationResponse {
            api_key,
            user: user.summary(),
        }),
    ))
}

fn send_in_background(state: &Arc<AppState>, name: &'static str, message: EmailMessage) {
    let mailer = state.mailer.clone();
    state.background.run(name, async move {
        let to_email = message.to_email.clone();
        let template = message.template;
        if let Err(err) = mailer.send(message).await {
            error!(%to_email, template, "failed to send email: {err:#}");
        }
    });
}
