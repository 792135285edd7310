//! Tenant endpoints.
//!
//! - GET `/{tenant_id}` - Tenant snapshot (admins, and managers of that tenant)
//! - PUT `/{tenant_id}/status` - Enable, disable or extend a tenant (admins only)

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::Deserialize;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AllowedRoles, AuthState, protect};
use crate::db::Tenant;

pub fn router(auth: AuthState) -> Router {
    let read = protect(
        Router::new().route("/{tenant_id}", get(get_tenant)),
        &auth,
        AllowedRoles::ADMIN_OR_MANAGER,
    );
    let write = protect(
        Router::new().route("/{tenant_id}/status", put(set_tenant_status)),
        &auth,
        AllowedRoles::ADMIN,
    );

    read.merge(write).with_state(auth)
}

async fn get_tenant(
    State(auth): State<AuthState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = auth
        .db
        .tenants()
        .get(&tenant_id)
        .await
        .db_err("Failed to load tenant")?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;
    Ok(Json(tenant))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantStatusRequest {
    enabled: bool,
    subscription_end: Option<i64>,
}

async fn set_tenant_status(
    State(auth): State<AuthState>,
    Path(tenant_id): Path<String>,
    Json(payload): Json<TenantStatusRequest>,
) -> Result<Json<Tenant>, ApiError> {
    let tenants = auth.db.tenants();
    let updated = tenants
        .set_status(&tenant_id, payload.enabled, payload.subscription_end)
        .await
        .db_err("Failed to update tenant")?;
    if !updated {
        return Err(ApiError::not_found("Tenant not found"));
    }

    info!(
        tenant_id = %tenant_id,
        enabled = payload.enabled,
        subscription_end = ?payload.subscription_end,
        "Tenant status updated"
    );

    let tenant = tenants
        .get(&tenant_id)
        .await
        .db_err("Failed to load tenant")?
        .ok_or_else(|| ApiError::not_found("Tenant not found"))?;
    Ok(Json(tenant))
}
