//! Users, their password hashes and the request identity.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{
    validator::{validate_email, validate_name, validate_password_plaintext, Validator},
    DataError,
};

// Argon2id: 19 MiB, two passes, single lane.
const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

fn argon2() -> Result<Argon2<'static>, DataError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, None)
        .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC string.
///
/// # Errors
/// Returns [`DataError::Internal`] if hashing fails.
pub fn hash_password(plaintext: &str) -> Result<String, DataError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()?
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Check a plaintext password against a stored PHC string.
///
/// A mismatch and an unparseable hash both yield `Ok(false)`.
///
/// # Errors
/// Any other verifier failure is returned as [`DataError::Internal`].
pub fn verify_password(hash: &str, plaintext: &str) -> Result<bool, DataError> {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return Ok(false);
    };
    match argon2()?.verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow!("failed to verify password: {err}").into()),
    }
}

/// Password of a user: the plaintext while a request holds it, and the stored hash.
#[derive(Clone, Debug, Default)]
pub struct Password {
    pub plaintext: Option<SecretString>,
    pub hash: Option<String>,
}

impl Password {
    /// Hash `plaintext` off the async runtime and keep both values.
    ///
    /// # Errors
    /// Returns [`DataError::Internal`] if hashing fails or the blocking task dies.
    pub async fn set(&mut self, plaintext: SecretString) -> Result<(), DataError> {
        let input = plaintext.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(input.expose_secret()))
            .await
            .context("password hashing task failed")??;
        self.plaintext = Some(plaintext);
        self.hash = Some(hash);
        Ok(())
    }

    /// # Errors
    /// Returns [`DataError::Internal`] when verification fails for a reason other
    /// than a mismatch or a malformed hash.
    pub async fn matches(&self, plaintext: SecretString) -> Result<bool, DataError> {
        let Some(hash) = self.hash.clone() else {
            return Ok(false);
        };
        tokio::task::spawn_blocking(move || verify_password(&hash, plaintext.expose_secret()))
            .await
            .context("password verification task failed")?
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A not yet persisted, inactive user.
    #[must_use]
    pub fn new(tenant_id: i64, name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id,
            name,
            email,
            password: Password::default(),
            activated: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            name: self.name.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public subset of a user returned after activation and login.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Validate a user about to be persisted.
///
/// # Panics
/// Panics if the password hash is missing. That is a construction bug in the
/// caller, not bad input.
pub fn validate_user(v: &mut Validator, user: &User) {
    validate_name(v, &user.name);
    validate_email(v, &user.email);
    v.check(user.tenant_id > 0, "tenant_id", "must be provided");

    if let Some(plaintext) = &user.password.plaintext {
        validate_password_plaintext(v, plaintext.expose_secret());
    }

    assert!(
        user.password.hash.is_some(),
        "missing password hash for user"
    );
}

/// Who is making the current request.
#[derive(Clone, Debug)]
pub enum Identity {
    Anonymous,
    User(Arc<User>),
}

impl Identity {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user, filling in its id and timestamps.
    async fn insert(&self, user: &mut User) -> Result<(), DataError>;

    async fn get_by_id(&self, id: i64) -> Result<User, DataError>;

    async fn get_by_email(&self, email: &str) -> Result<User, DataError>;

    /// Store `user` if its version is still current, then bump the version.
    async fn update(&self, user: &mut User) -> Result<(), DataError>;
}
