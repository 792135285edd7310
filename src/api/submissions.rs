//! Submission endpoints.
//!
//! - GET `/{submission_id}` - Submission summary. Members see their own,
//!   managers see their tenant's, admins see all.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::error::{ApiError, ResultExt};
use crate::auth::{AllowedRoles, AuthState, protect};
use crate::db::Submission;

pub fn router(auth: AuthState) -> Router {
    protect(
        Router::new().route("/{submission_id}", get(get_submission)),
        &auth,
        AllowedRoles::ANY,
    )
    .with_state(auth)
}

async fn get_submission(
    State(auth): State<AuthState>,
    Path(submission_id): Path<String>,
) -> Result<Json<Submission>, ApiError> {
    let submission = auth
        .db
        .submissions()
        .find(&submission_id)
        .await
        .db_err("Failed to load submission")?
        .ok_or_else(|| ApiError::not_found("Submission not found"))?;
    Ok(Json(submission))
}
