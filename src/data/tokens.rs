//! Opaque bearer tokens.
//!
//! A token's plaintext is 32 random bytes, unpadded base64url, returned to the
//! caller exactly once. The store only ever sees the SHA-256 digest of it, and
//! lookups hash the presented plaintext before comparing.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, sync::Arc, time::Duration};
use utoipa::ToSchema;

use super::{users::User, with_deadline, DataError};

/// Lifetime of an activation token.
pub const ACTIVATION_TTL: Duration = Duration::from_secs(72 * 60 * 60);
/// Lifetime of an authentication (bearer) token.
pub const AUTHENTICATION_TTL: Duration = Duration::from_secs(72 * 60 * 60);

const TOKEN_BYTES: usize = 32;

/// What a token may be used for. A token never resolves under another scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token. Carries the plaintext; never stored as is.
#[derive(Clone, Serialize, ToSchema)]
pub struct Token {
    #[serde(rename = "token", serialize_with = "expose")]
    #[schema(value_type = String)]
    pub plaintext: SecretString,
    pub expiry: DateTime<Utc>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// What the store persists for a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: [u8; 32],
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

/// Generate a new token plaintext.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Digest of a token plaintext; the only form that reaches storage.
#[must_use]
pub fn hash_token(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Persistence backend for [`TokenStore`].
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), DataError>;

    /// Owner of the record matching `scope` and `hash` whose expiry is after `now`.
    async fn get_user_for_token(
        &self,
        scope: Scope,
        hash: [u8; 32],
        now: DateTime<Utc>,
    ) -> Result<User, DataError>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), DataError>;
}

/// Issues, resolves and revokes tokens on top of a [`TokenRepository`].
#[derive(Clone)]
pub struct TokenStore {
    repository: Arc<dyn TokenRepository>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(repository: Arc<dyn TokenRepository>) -> Self {
        Self { repository }
    }

    /// Create and persist a token for `user_id` valid for `ttl`.
    ///
    /// # Errors
    /// Returns [`DataError`] if generation or persistence fails.
    pub async fn issue(&self, user_id: i64, ttl: Duration, scope: Scope) -> Result<Token, DataError> {
        let plaintext = generate_token()?;
        let ttl = chrono::Duration::from_std(ttl).map_err(|err| anyhow!("invalid ttl: {err}"))?;
        let expiry = Utc::now() + ttl;

        let record = TokenRecord {
            hash: hash_token(&plaintext),
            user_id,
            expiry,
            scope,
        };
        with_deadline(self.repository.insert_token(record)).await?;

        Ok(Token {
            plaintext: SecretString::from(plaintext),
            expiry,
        })
    }

    /// Owner of a live token.
    ///
    /// # Errors
    /// Returns [`DataError::NotFound`] for an unknown, expired or wrong-scope token.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<User, DataError> {
        let hash = hash_token(plaintext);
        with_deadline(self.repository.get_user_for_token(scope, hash, Utc::now())).await
    }

    /// Delete every `scope` token belonging to `user_id`.
    ///
    /// # Errors
    /// Returns [`DataError`] if the repository fails.
    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> Result<(), DataError> {
        with_deadline(self.repository.delete_all_for_user(scope, user_id)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::data::{memory::MemoryStore, validator::TOKEN_PLAINTEXT_LEN};

    async fn store_with_user() -> (TokenStore, i64) {
        let store = Arc::new(MemoryStore::new());
        let user_id = store.seed_user("alice@example.com", true).await;
        (TokenStore::new(store), user_id)
    }

    #[test]
    fn generated_tokens_are_unique_and_url_safe() {
        let first = generate_token().unwrap();
        let second = generate_token().unwrap();
        assert_ne!(first, second);
        assert_eq!(first.len(), TOKEN_PLAINTEXT_LEN);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn token_debug_redacts_plaintext() {
        let token = Token {
            plaintext: SecretString::from("super-secret".to_string()),
            expiry: Utc::now(),
        };
        assert!(!format!("{token:?}").contains("super-secret"));
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["token"], "super-secret");
    }

    #[tokio::test]
    async fn issue_then_resolve_returns_owner() {
        let (tokens, user_id) = store_with_user().await;
        let token = tokens
            .issue(user_id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();
        let user = tokens
            .resolve(Scope::Authentication, token.plaintext.expose_secret())
            .await
            .unwrap();
        assert_eq!(user.id, user_id);
    }

    #[tokio::test]
    async fn expired_token_is_not_found() {
        let (tokens, user_id) = store_with_user().await;
        let token = tokens
            .issue(user_id, Duration::ZERO, Scope::Authentication)
            .await
            .unwrap();
        let result = tokens
            .resolve(Scope::Authentication, token.plaintext.expose_secret())
            .await;
        assert!(matches!(result, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn token_does_not_resolve_under_other_scope() {
        let (tokens, user_id) = store_with_user().await;
        let token = tokens
            .issue(user_id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();
        let result = tokens
            .resolve(Scope::Authentication, token.plaintext.expose_secret())
            .await;
        assert!(matches!(result, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn revoke_all_invalidates_scope_only() {
        let (tokens, user_id) = store_with_user().await;
        let activation = tokens
            .issue(user_id, ACTIVATION_TTL, Scope::Activation)
            .await
            .unwrap();
        let bearer = tokens
            .issue(user_id, AUTHENTICATION_TTL, Scope::Authentication)
            .await
            .unwrap();

        tokens.revoke_all(Scope::Activation, user_id).await.unwrap();

        assert!(matches!(
            tokens
                .resolve(Scope::Activation, activation.plaintext.expose_secret())
                .await,
            Err(DataError::NotFound)
        ));
        assert!(tokens
            .resolve(Scope::Authentication, bearer.plaintext.expose_secret())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (tokens, _) = store_with_user().await;
        let result = tokens.resolve(Scope::Authentication, "nope").await;
        assert!(matches!(result, Err(DataError::NotFound)));
    }
}
