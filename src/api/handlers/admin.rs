use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::types::ResetResponse;
use crate::auth::{Error, ErrorBody, SessionService};

#[utoipa::path(
    delete,
    path = "/admin/reset",
    responses(
        (status = 200, description = "All users and sessions deleted", body = ResetResponse),
        (status = 403, description = "Process is not running in admin mode", body = ErrorBody),
    ),
    tag = "admin"
)]
pub async fn reset(service: Extension<Arc<SessionService>>) -> Result<Json<ResetResponse>, Error> {
    let removed = service.reset().await?;
    Ok(Json(ResetResponse {
        message: "Reset users table, successfully completed".to_string(),
        removed,
    }))
}
