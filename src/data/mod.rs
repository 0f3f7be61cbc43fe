//! Data collaborators consumed by the request pipeline.
//!
//! Storage itself sits behind async traits ([`UserStore`], [`TokenRepository`],
//! [`PermissionStore`], [`TenantStore`], [`TradeLeadStore`]). The service ships with
//! [`MemoryStore`], a single-process implementation of all of them.
//!
//! Every collaborator call made from a request goes through [`with_deadline`] so a
//! stuck backend turns into an error instead of a hung request.

pub mod filters;
pub mod memory;
pub mod permissions;
pub mod tenants;
pub mod tokens;
pub mod trade_leads;
pub mod users;
pub mod validator;

pub use self::filters::{Filters, Metadata};
pub use self::memory::MemoryStore;
pub use self::permissions::{PermissionStore, Permissions, PERMISSION_ADMIN_WRITE};
pub use self::tenants::{Tenant, TenantStore};
pub use self::tokens::{Scope, Token, TokenRecord, TokenRepository, TokenStore};
pub use self::trade_leads::{LeadStatus, TradeLead, TradeLeadStore, TradeStats};
pub use self::users::{Identity, Password, User, UserStore, UserSummary};
pub use self::validator::Validator;

use std::{future::Future, sync::Arc, time::Duration};

/// Deadline applied to each collaborator call.
pub const DB_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email address")]
    DuplicateEmail,
    #[error("tenant already exists")]
    DuplicateTenant,
    #[error("invalid tenant reference")]
    InvalidTenant,
    #[error("invalid trade lead status")]
    InvalidLeadStatus,
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Run a collaborator call bounded by [`DB_TIMEOUT`].
///
/// # Errors
/// Returns [`DataError::Timeout`] when the deadline elapses, otherwise the call's own result.
pub async fn with_deadline<T, F>(operation: F) -> Result<T, DataError>
where
    F: Future<Output = Result<T, DataError>>,
{
    tokio::time::timeout(DB_TIMEOUT, operation)
        .await
        .map_err(|_| DataError::Timeout(DB_TIMEOUT))?
}

/// Handles to every data collaborator, cloned into request state.
#[derive(Clone)]
pub struct Models {
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenStore,
    pub permissions: Arc<dyn PermissionStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub trade_leads: Arc<dyn TradeLeadStore>,
}

impl Models {
    /// Wire all collaborators to one backing store.
    #[must_use]
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore + TokenRepository + PermissionStore + TenantStore + TradeLeadStore + 'static,
    {
        Self {
            users: store.clone(),
            tokens: TokenStore::new(store.clone()),
            permissions: store.clone(),
            tenants: store.clone(),
            trade_leads: store,
        }
    }
}

impl std::fmt::Debug for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Models").finish_non_exhaustive()
    }
}
