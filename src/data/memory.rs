//! Single-process store backing every data collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use super::{
    filters::{Filters, Metadata},
    permissions::{PermissionStore, Permissions},
    tenants::{Tenant, TenantStore},
    tokens::{Scope, TokenRecord, TokenRepository},
    trade_leads::{LeadStatus, TradeLead, TradeLeadStore, TradeStats},
    users::{User, UserStore},
    DataError,
};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    tokens: HashMap<[u8; 32], TokenRecord>,
    permissions: HashMap<i64, HashSet<String>>,
    tenants: BTreeMap<i64, Tenant>,
    trade_leads: BTreeMap<i64, TradeLead>,
    next_user_id: i64,
    next_tenant_id: i64,
    next_lead_id: i64,
}

impl Inner {
    fn next_user_id(&mut self) -> i64 {
        self.next_user_id += 1;
        self.next_user_id
    }

    fn next_tenant_id(&mut self) -> i64 {
        self.next_tenant_id += 1;
        self.next_tenant_id
    }

    fn next_lead_id(&mut self) -> i64 {
        self.next_lead_id += 1;
        self.next_lead_id
    }

    fn email_taken(&self, email: &str, except: i64) -> bool {
        self.users
            .values()
            .any(|user| user.id != except && user.email.eq_ignore_ascii_case(email))
    }

    fn tenant_name_taken(&self, name: &str, except: i64) -> bool {
        self.tenants
            .values()
            .any(|tenant| tenant.id != except && tenant.name.eq_ignore_ascii_case(name))
    }
}

/// One page of `matching`, which is already in id order. An empty page is
/// [`DataError::NotFound`].
fn paginate<'a, T, I>(matching: I, filters: &Filters) -> Result<(Vec<T>, Metadata), DataError>
where
    T: Clone + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let matching: Vec<&T> = matching.into_iter().collect();
    let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
    let page: Vec<T> = matching
        .into_iter()
        .skip(filters.offset())
        .take(filters.limit())
        .cloned()
        .collect();
    if page.is_empty() {
        return Err(DataError::NotFound);
    }

    Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
}

fn title_matches(lead: &TradeLead, needle: &str) -> bool {
    needle.is_empty() || lead.title.to_lowercase().contains(needle)
}

/// In-memory implementation of the store traits.
///
/// Each call takes the lock for the duration of a map operation only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tenant directly, bypassing validation. Returns its id.
    pub async fn seed_tenant(&self, name: &str) -> i64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_tenant_id();
        let mut tenant = Tenant::new(
            name.to_string(),
            format!("contact@{}.test", name.to_lowercase()),
            String::new(),
        );
        tenant.id = id;
        inner.tenants.insert(id, tenant);
        id
    }

    /// Create a user in a fresh tenant, bypassing password hashing. The user can
    /// only authenticate with a token. Returns its id.
    pub async fn seed_user(&self, email: &str, activated: bool) -> i64 {
        let tenant_id = self.seed_tenant(&format!("tenant-{email}")).await;
        let mut inner = self.inner.lock().await;
        let id = inner.next_user_id();
        let mut user = User::new(tenant_id, email.to_string(), email.to_string());
        user.id = id;
        user.activated = activated;
        user.password.hash = Some(String::from("!"));
        inner.users.insert(id, user);
        id
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if !inner.tenants.contains_key(&user.tenant_id) {
            return Err(DataError::InvalidTenant);
        }
        if inner.email_taken(&user.email, 0) {
            return Err(DataError::DuplicateEmail);
        }

        let now = Utc::now();
        user.id = inner.next_user_id();
        user.version = 1;
        user.created_at = now;
        user.updated_at = now;

        // the plaintext never reaches storage
        let mut stored = user.clone();
        stored.password.plaintext = None;
        inner.users.insert(user.id, stored);
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<User, DataError> {
        let inner = self.inner.lock().await;
        inner.users.get(&id).cloned().ok_or(DataError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DataError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(DataError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email, user.id) {
            return Err(DataError::DuplicateEmail);
        }
        let Some(stored) = inner.users.get_mut(&user.id) else {
            return Err(DataError::EditConflict);
        };
        if stored.version != user.version {
            return Err(DataError::EditConflict);
        }

        user.version += 1;
        user.updated_at = Utc::now();
        *stored = user.clone();
        stored.password.plaintext = None;
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn insert_token(&self, record: TokenRecord) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&record.user_id) {
            return Err(DataError::NotFound);
        }
        let now = Utc::now();
        inner.tokens.retain(|_, stored| stored.expiry > now);
        inner.tokens.insert(record.hash, record);
        Ok(())
    }

    async fn get_user_for_token(
        &self,
        scope: Scope,
        hash: [u8; 32],
        now: DateTime<Utc>,
    ) -> Result<User, DataError> {
        let mut inner = self.inner.lock().await;
        let record = inner.tokens.get(&hash).ok_or(DataError::NotFound)?;
        if record.expiry <= now {
            inner.tokens.remove(&hash);
            return Err(DataError::NotFound);
        }
        if record.scope != scope {
            return Err(DataError::NotFound);
        }
        inner
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or(DataError::NotFound)
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        inner
            .tokens
            .retain(|_, record| !(record.scope == scope && record.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DataError> {
        let inner = self.inner.lock().await;
        let mut codes: Vec<String> = inner
            .permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default();
        codes.sort();
        Ok(Permissions(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&user_id) {
            return Err(DataError::NotFound);
        }
        inner
            .permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(ToString::to_string));
        Ok(())
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn get_tenant_by_id(&self, id: i64) -> Result<Tenant, DataError> {
        let inner = self.inner.lock().await;
        inner.tenants.get(&id).cloned().ok_or(DataError::NotFound)
    }

    async fn list(&self, name: &str, filters: &Filters) -> Result<(Vec<Tenant>, Metadata), DataError> {
        let inner = self.inner.lock().await;
        let needle = name.to_lowercase();
        paginate(
            inner
                .tenants
                .values()
                .filter(|tenant| needle.is_empty() || tenant.name.to_lowercase().contains(&needle)),
            filters,
        )
    }

    async fn insert_tenant(&self, tenant: &mut Tenant) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if inner.tenant_name_taken(&tenant.name, 0) {
            return Err(DataError::DuplicateTenant);
        }
        let now = Utc::now();
        tenant.id = inner.next_tenant_id();
        tenant.version = 1;
        tenant.created_at = now;
        tenant.updated_at = now;
        inner.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn update_tenant(&self, tenant: &mut Tenant, expected_version: i32) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if inner.tenant_name_taken(&tenant.name, tenant.id) {
            return Err(DataError::DuplicateTenant);
        }
        let Some(stored) = inner.tenants.get_mut(&tenant.id) else {
            return Err(DataError::EditConflict);
        };
        if stored.version != expected_version {
            return Err(DataError::EditConflict);
        }

        tenant.version = expected_version + 1;
        tenant.updated_at = Utc::now();
        *stored = tenant.clone();
        Ok(())
    }
}

#[async_trait]
impl TradeLeadStore for MemoryStore {
    async fn insert_trade_lead(&self, tenant_id: i64, lead: &mut TradeLead) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if !inner.tenants.contains_key(&tenant_id) {
            return Err(DataError::InvalidTenant);
        }

        let now = Utc::now();
        lead.id = inner.next_lead_id();
        lead.tenant_id = tenant_id;
        lead.status = LeadStatus::Pending;
        lead.version = 1;
        lead.created_at = now;
        lead.updated_at = now;
        inner.trade_leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get_trade_lead_by_id(&self, id: i64) -> Result<TradeLead, DataError> {
        let inner = self.inner.lock().await;
        inner.trade_leads.get(&id).cloned().ok_or(DataError::NotFound)
    }

    async fn list_for_tenant(
        &self,
        tenant_id: i64,
        title: &str,
        filters: &Filters,
    ) -> Result<(Vec<TradeLead>, Metadata), DataError> {
        let inner = self.inner.lock().await;
        let needle = title.to_lowercase();
        paginate(
            inner
                .trade_leads
                .values()
                .filter(|lead| lead.tenant_id == tenant_id && title_matches(lead, &needle)),
            filters,
        )
    }

    async fn list_all(&self, title: &str, filters: &Filters) -> Result<(Vec<TradeLead>, Metadata), DataError> {
        let inner = self.inner.lock().await;
        let needle = title.to_lowercase();
        paginate(
            inner
                .trade_leads
                .values()
                .filter(|lead| title_matches(lead, &needle)),
            filters,
        )
    }

    async fn update_status(&self, lead: &mut TradeLead, expected_version: i32) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.trade_leads.get_mut(&lead.id) else {
            return Err(DataError::EditConflict);
        };
        if stored.version != expected_version {
            return Err(DataError::EditConflict);
        }

        stored.status = lead.status;
        stored.version = expected_version + 1;
        stored.updated_at = Utc::now();
        *lead = stored.clone();
        Ok(())
    }

    async fn stats(&self) -> Result<TradeStats, DataError> {
        let inner = self.inner.lock().await;
        let mut stats = TradeStats::default();
        for lead in inner.trade_leads.values() {
            stats.total_leads += 1;
            if lead.status == LeadStatus::Verified {
                stats.verified_leads += 1;
                stats.total_verified_value += lead.value;
            }
        }
        Ok(stats)
    }
}
