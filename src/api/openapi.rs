//! OpenAPI document. Title, version, description, contact and license come from
//! the package metadata in `Cargo.toml`.

use super::handlers::{health, tenants, trade_leads, users};
use crate::data::{LeadStatus, Metadata, Scope, Tenant, Token, TradeLead, TradeStats, User, UserSummary};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        users::register,
        users::activate,
        users::authenticate,
        tenants::get_own_tenant,
        tenants::create_tenant,
        tenants::list_tenants,
        tenants::update_tenant,
        trade_leads::create_trade_lead,
        trade_leads::list_own_trade_leads,
        trade_leads::list_trade_leads,
        trade_leads::trade_lead_stats,
        trade_leads::update_trade_lead_status,
    ),
    components(schemas(
        User,
        UserSummary,
        Token,
        Scope,
        Tenant,
        Metadata,
        TradeLead,
        LeadStatus,
        TradeStats
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Liveness"),
        (name = "users", description = "Registration, activation and login"),
        (name = "tenants", description = "Tenant lookup and administration"),
        (name = "trade_leads", description = "Tenant-scoped trade leads and their review")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
