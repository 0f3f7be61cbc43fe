//! Trade lead endpoints.
//!
//! Tenant routes act on the caller's own tenant, taken from the authenticated
//! user; no route accepts a tenant id from the client. The `admin` routes see
//! every tenant and require `admin:write`.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{ensure_valid, read_int, read_json, read_path_ids};
use crate::{
    api::{error::ApiError, AppState},
    data::{
        filters::validate_filters, trade_leads::validate_trade_lead, with_deadline, Filters,
        Identity, LeadStatus, Metadata, TradeLead, TradeStats, Validator,
    },
};

#[derive(Serialize, ToSchema)]
pub struct TradeLeadResponse {
    trade_lead: TradeLead,
}

#[derive(Serialize, ToSchema)]
pub struct TradeLeadListResponse {
    trade_leads: Vec<TradeLead>,
    metadata: Metadata,
}

#[derive(Serialize, ToSchema)]
pub struct TradeStatsResponse {
    trade_lead_stats: TradeStats,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTradeLeadRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[schema(value_type = String, example = "1500.00")]
    value: Decimal,
}

#[utoipa::path(
    post,
    path = "/v1/trade_leads",
    request_body = CreateTradeLeadRequest,
    responses(
        (status = 201, description = "Lead created for the caller's tenant", body = TradeLeadResponse),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Account not activated"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "trade_leads"
)]
pub async fn create_trade_lead(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<CreateTradeLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TradeLeadResponse>), ApiError> {
    let user = identity.user().ok_or(ApiError::AuthenticationRequired)?;
    let request = read_json(payload)?;
    let mut trade_lead = TradeLead::new(request.title, request.description, request.value);

    let mut v = Validator::new();
    validate_trade_lead(&mut v, &trade_lead);
    ensure_valid(v)?;

    with_deadline(
        state
            .models
            .trade_leads
            .insert_trade_lead(user.tenant_id, &mut trade_lead),
    )
    .await?;
    info!(
        lead_id = trade_lead.id,
        tenant_id = trade_lead.tenant_id,
        "created trade lead"
    );

    Ok((StatusCode::CREATED, Json(TradeLeadResponse { trade_lead })))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTradeLeadsQuery {
    /// Case-insensitive substring of the lead title.
    title: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

impl ListTradeLeadsQuery {
    fn into_parts(self) -> Result<(String, Filters), ApiError> {
        let defaults = Filters::default();
        let mut v = Validator::new();
        let filters = Filters {
            page: read_int(self.page.as_deref(), defaults.page, "page", &mut v),
            page_size: read_int(
                self.page_size.as_deref(),
                defaults.page_size,
                "page_size",
                &mut v,
            ),
        };
        validate_filters(&mut v, &filters);
        ensure_valid(v)?;
        Ok((self.title.unwrap_or_default(), filters))
    }
}

#[utoipa::path(
    get,
    path = "/v1/trade_leads",
    params(ListTradeLeadsQuery),
    responses(
        (status = 200, description = "A page of the caller's tenant leads", body = TradeLeadListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Account not activated"),
        (status = 404, description = "No lead matched"),
        (status = 422, description = "Invalid paging parameters")
    ),
    security(("bearer" = [])),
    tag = "trade_leads"
)]
pub async fn list_own_trade_leads(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListTradeLeadsQuery>,
) -> Result<Json<TradeLeadListResponse>, ApiError> {
    let user = identity.user().ok_or(ApiError::AuthenticationRequired)?;
    let (title, filters) = query.into_parts()?;

    let (trade_leads, metadata) = with_deadline(
        state
            .models
            .trade_leads
            .list_for_tenant(user.tenant_id, &title, &filters),
    )
    .await?;
    Ok(Json(TradeLeadListResponse {
        trade_leads,
        metadata,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/trade_leads/admin",
    params(ListTradeLeadsQuery),
    responses(
        (status = 200, description = "A page of leads across tenants", body = TradeLeadListResponse),
        (status = 403, description = "Missing admin:write"),
        (status = 404, description = "No lead matched"),
        (status = 422, description = "Invalid paging parameters")
    ),
    security(("bearer" = [])),
    tag = "trade_leads"
)]
pub async fn list_trade_leads(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListTradeLeadsQuery>,
) -> Result<Json<TradeLeadListResponse>, ApiError> {
    let (title, filters) = query.into_parts()?;
    let (trade_leads, metadata) =
        with_deadline(state.models.trade_leads.list_all(&title, &filters)).await?;
    Ok(Json(TradeLeadListResponse {
        trade_leads,
        metadata,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/trade_leads/admin/stats",
    responses(
        (status = 200, description = "Lead totals across tenants", body = TradeStatsResponse),
        (status = 403, description = "Missing admin:write")
    ),
    security(("bearer" = [])),
    tag = "trade_leads"
)]
pub async fn trade_lead_stats(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<TradeStatsResponse>, ApiError> {
    let trade_lead_stats = with_deadline(state.models.trade_leads.stats()).await?;
    Ok(Json(TradeStatsResponse { trade_lead_stats }))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTradeLeadStatusRequest {
    /// One of `pending`, `verified` or `rejected`.
    status: String,
}

#[utoipa::path(
    patch,
    path = "/v1/trade_leads/admin/{lead_id}/{version}",
    params(
        ("lead_id" = i64, Path, description = "Trade lead id"),
        ("version" = i32, Path, description = "Version the caller last saw")
    ),
    request_body = UpdateTradeLeadStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = TradeLeadResponse),
        (status = 400, description = "Malformed path, body or status"),
        (status = 403, description = "Missing admin:write"),
        (status = 404, description = "Lead not found"),
        (status = 409, description = "Version mismatch")
    ),
    security(("bearer" = [])),
    tag = "trade_leads"
)]
pub async fn update_trade_lead_status(
    Extension(state): Extension<Arc<AppState>>,
    Path((lead_id, version)): Path<(String, String)>,
    payload: Result<Json<UpdateTradeLeadStatusRequest>, JsonRejection>,
) -> Result<Json<TradeLeadResponse>, ApiError> {
    let (lead_id, version) = read_path_ids(&lead_id, &version, "trade lead")?;
    let request = read_json(payload)?;
    let status: LeadStatus = request.status.parse()?;

    let mut trade_lead =
        with_deadline(state.models.trade_leads.get_trade_lead_by_id(lead_id)).await?;
    trade_lead.status = status;
    with_deadline(
        state
            .models
            .trade_leads
            .update_status(&mut trade_lead, version),
    )
    .await?;
    info!(
        lead_id = trade_lead.id,
        status = %trade_lead.status,
        version = trade_lead.version,
        "updated trade lead status"
    );

    Ok(Json(TradeLeadResponse { trade_lead }))
}
