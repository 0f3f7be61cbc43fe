//! Trade leads: priced sales opportunities owned by exactly one tenant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use super::{
    filters::{Filters, Metadata},
    validator::Validator,
    DataError,
};

const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl LeadStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            _ => Err(DataError::InvalidLeadStatus),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct TradeLead {
    pub id: i64,
    pub tenant_id: i64,
    pub title: String,
    pub description: String,
    pub status: LeadStatus,
    #[schema(value_type = String, example = "1500.00")]
    pub value: Decimal,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeLead {
    /// A pending lead not yet bound to a tenant; the store assigns `tenant_id` and `id`.
    #[must_use]
    pub fn new(title: String, description: String, value: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            tenant_id: 0,
            title,
            description,
            status: LeadStatus::Pending,
            value,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn validate_trade_lead(v: &mut Validator, lead: &TradeLead) {
    v.check(!lead.title.trim().is_empty(), "title", "must be provided");
    v.check(
        lead.description.chars().count() <= MAX_DESCRIPTION_LEN,
        "description",
        "must not be more than 1000 characters long",
    );
    v.check(
        lead.value > Decimal::ZERO,
        "value",
        "must be a non-negative or non-zero number",
    );
}

/// Totals across every tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TradeStats {
    pub total_leads: i64,
    #[schema(value_type = String, example = "0")]
    pub total_verified_value: Decimal,
    pub verified_leads: i64,
}

#[async_trait]
pub trait TradeLeadStore: Send + Sync {
    /// Store `lead` under `tenant_id`, filling in its id, version and timestamps.
    ///
    /// # Errors
    /// [`DataError::InvalidTenant`] when the tenant does not exist.
    async fn insert_trade_lead(&self, tenant_id: i64, lead: &mut TradeLead) -> Result<(), DataError>;

    async fn get_trade_lead_by_id(&self, id: i64) -> Result<TradeLead, DataError>;

    /// Leads of one tenant whose title contains `title` (case-insensitive; empty
    /// matches all), ordered by id. An empty page is [`DataError::NotFound`].
    async fn list_for_tenant(
        &self,
        tenant_id: i64,
        title: &str,
        filters: &Filters,
    ) -> Result<(Vec<TradeLead>, Metadata), DataError>;

    /// Like [`list_for_tenant`](Self::list_for_tenant) across every tenant.
    async fn list_all(&self, title: &str, filters: &Filters) -> Result<(Vec<TradeLead>, Metadata), DataError>;

    /// Set the stored status to `lead.status` if its version equals
    /// `expected_version`, then bump it.
    ///
    /// # Errors
    /// [`DataError::EditConflict`] on a version mismatch or a vanished record.
    async fn update_status(&self, lead: &mut TradeLead, expected_version: i32) -> Result<(), DataError>;

    async fn stats(&self) -> Result<TradeStats, DataError>;
}
