use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{
    filters::{Filters, Metadata},
    validator::{validate_email, Validator},
    DataError,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub contact_email: String,
    pub description: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    #[must_use]
    pub fn new(name: String, contact_email: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            contact_email,
            description,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn validate_tenant(v: &mut Validator, tenant: &Tenant) {
    v.check(!tenant.name.is_empty(), "name", "must be provided");
    validate_email(v, &tenant.contact_email);
    v.check(
        tenant.description.len() <= 500,
        "description",
        "must not be more than 500 bytes long",
    );
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant_by_id(&self, id: i64) -> Result<Tenant, DataError>;

    /// Tenants whose name contains `name` (case-insensitive; empty matches all),
    /// ordered by id. An empty page is [`DataError::NotFound`].
    async fn list(&self, name: &str, filters: &Filters) -> Result<(Vec<Tenant>, Metadata), DataError>;

    /// # Errors
    /// [`DataError::DuplicateTenant`] when the name is taken.
    async fn insert_tenant(&self, tenant: &mut Tenant) -> Result<(), DataError>;

    /// Store `tenant` if the stored version equals `expected_version`, then bump it.
    ///
    /// # Errors
    /// [`DataError::EditConflict`] on a version mismatch or a vanished record.
    async fn update_tenant(&self, tenant: &mut Tenant, expected_version: i32) -> Result<(), DataError>;
}
