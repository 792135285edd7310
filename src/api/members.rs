//! Member endpoints.
//!
//! - GET `/{member_id}` - Member summary
//! - PUT `/{member_id}/status` - Enable or disable a member (admins and managers)

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AllowedRoles, AuthState, Principal, protect};
use crate::db::{Account, Role};

pub fn router(auth: AuthState) -> Router {
    let read = protect(
        Router::new().route("/{member_id}", get(get_member)),
        &auth,
        AllowedRoles::ANY,
    );
    let write = protect(
        Router::new().route("/{member_id}/status", put(set_member_status)),
        &auth,
        AllowedRoles::ADMIN_OR_MANAGER,
    );

    read.merge(write).with_state(auth)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberSummary {
    id: String,
    username: String,
    display_name: String,
    role: Role,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_category_id: Option<String>,
}

impl From<Account> for MemberSummary {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            display_name: account.display_name,
            role: account.role,
            enabled: account.status,
            tenant_id: account.tenant_id,
            job_category_id: account.job_category_id,
        }
    }
}

async fn load_member(auth: &AuthState, member_id: &str) -> Result<Account, ApiError> {
    auth.db
        .users()
        .find_by_id(member_id)
        .await
        .db_err("Failed to load member")?
        .ok_or_else(|| ApiError::not_found("Member not found"))
}

async fn get_member(
    State(auth): State<AuthState>,
    Path(member_id): Path<String>,
) -> Result<Json<MemberSummary>, ApiError> {
    let member = load_member(&auth, &member_id).await?;
    Ok(Json(member.into()))
}

#[derive(Deserialize)]
struct MemberStatusRequest {
    status: bool,
}

async fn set_member_status(
    State(auth): State<AuthState>,
    Extension(principal): Extension<Principal>,
    Path(member_id): Path<String>,
    Json(payload): Json<MemberStatusRequest>,
) -> Result<Json<MemberSummary>, ApiError> {
    let member = load_member(&auth, &member_id).await?;

    // Managers only manage plain members of their own tenant
    if principal.role == Role::TenantManager && member.role != Role::TenantMember {
        return Err(ApiError::forbidden("Managers can only change member accounts"));
    }
    if member.id == principal.id {
        return Err(ApiError::bad_request("Cannot change your own status"));
    }

    auth.db
        .users()
        .set_status(&member.id, payload.status)
        .await
        .db_err("Failed to update member status")?;

    info!(
        member_id = %member.id,
        status = payload.status,
        changed_by = %principal.id,
        "Member status updated"
    );

    let member = load_member(&auth, &member_id).await?;
    Ok(Json(member.into()))
}
