//! Tenant endpoints. Every route here sits behind the activated-user gate; the
//! `admin` routes additionally require `admin:write`.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{ensure_valid, read_int, read_json, read_path_ids};
use crate::{
    api::{error::ApiError, AppState},
    data::{
        filters::validate_filters, tenants::validate_tenant, with_deadline, Filters, Identity,
        Metadata, Tenant, Validator,
    },
};

#[derive(Serialize, ToSchema)]
pub struct TenantResponse {
    tenant: Tenant,
}

#[utoipa::path(
    get,
    path = "/v1/tenants",
    responses(
        (status = 200, description = "The caller's tenant", body = TenantResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Account not activated"),
        (status = 404, description = "Tenant not found")
    ),
    security(("bearer" = [])),
    tag = "tenants"
)]
pub async fn get_own_tenant(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<TenantResponse>, ApiError> {
    let user = identity.user().ok_or(ApiError::AuthenticationRequired)?;
    let tenant = with_deadline(state.models.tenants.get_tenant_by_id(user.tenant_id)).await?;
    Ok(Json(TenantResponse { tenant }))
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTenantRequest {
    name: String,
    contact_email: String,
    #[serde(default)]
    description: String,
}

#[utoipa::path(
    post,
    path = "/v1/tenants/admin",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = TenantResponse),
        (status = 403, description = "Missing admin:write"),
        (status = 422, description = "Validation failed or name taken")
    ),
    security(("bearer" = [])),
    tag = "tenants"
)]
pub async fn create_tenant(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TenantResponse>), ApiError> {
    let request = read_json(payload)?;
    let mut tenant = Tenant::new(request.name, request.contact_email, request.description);

    let mut v = Validator::new();
    validate_tenant(&mut v, &tenant);
    ensure_valid(v)?;

    with_deadline(state.models.tenants.insert_tenant(&mut tenant)).await?;
    info!(tenant_id = tenant.id, "created tenant");

    Ok((StatusCode::CREATED, Json(TenantResponse { tenant })))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTenantsQuery {
    /// Case-insensitive substring of the tenant name.
    name: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct TenantListResponse {
    tenants: Vec<Tenant>,
    metadata: Metadata,
}

#[utoipa::path(
    get,
    path = "/v1/tenants/admin",
    params(ListTenantsQuery),
    responses(
        (status = 200, description = "A page of tenants", body = TenantListResponse),
        (status = 403, description = "Missing admin:write"),
        (status = 404, description = "No tenant matched"),
        (status = 422, description = "Invalid paging parameters")
    ),
    security(("bearer" = [])),
    tag = "tenants"
)]
pub async fn list_tenants(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListTenantsQuery>,
) -> Result<Json<TenantListResponse>, ApiError> {
    let defaults = Filters::default();
    let mut v = Validator::new();
    let filters = Filters {
        page: read_int(query.page.as_deref(), defaults.page, "page", &mut v),
        page_size: read_int(
            query.page_size.as_deref(),
            defaults.page_size,
            "page_size",
            &mut v,
        ),
    };
    validate_filters(&mut v, &filters);
    ensure_valid(v)?;

    let name = query.name.unwrap_or_default();
    let (tenants, metadata) = with_deadline(state.models.tenants.list(&name, &filters)).await?;
    Ok(Json(TenantListResponse { tenants, metadata }))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateTenantRequest {
    name: Option<String>,
    contact_email: Option<String>,
    description: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/v1/tenants/admin/{tenant_id}/{version}",
    params(
        ("tenant_id" = i64, Path, description = "Tenant id"),
        ("version" = i32, Path, description = "Version the caller last saw")
    ),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Tenant updated", body = TenantResponse),
        (status = 400, description = "Malformed path or body"),
        (status = 404, description = "Tenant not found"),
        (status = 409, description = "Version mismatch"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer" = [])),
    tag = "tenants"
)]
pub async fn update_tenant(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, version)): Path<(String, String)>,
    payload: Result<Json<UpdateTenantRequest>, JsonRejection>,
) -> Result<Json<TenantResponse>, ApiError> {
    let (tenant_id, version) = read_path_ids(&tenant_id, &version, "tenant")?;
    let request = read_json(payload)?;

    let mut tenant = with_deadline(state.models.tenants.get_tenant_by_id(tenant_id)).await?;
    if let Some(name) = request.name {
        tenant.name = name;
    }
    if let Some(contact_email) = request.contact_email {
        tenant.contact_email = contact_email;
    }
    if let Some(description) = request.description {
        tenant.description = description;
    }

    let mut v = Validator::new();
    validate_tenant(&mut v, &tenant);
    ensure_valid(v)?;

    with_deadline(state.models.tenants.update_tenant(&mut tenant, version)).await?;
    info!(tenant_id = tenant.id, version = tenant.version, "updated tenant");

    Ok(Json(TenantResponse { tenant }))
}
