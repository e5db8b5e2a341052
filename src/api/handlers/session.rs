//! Refresh-token endpoints. Both take the refresh token as a bearer credential.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::types::TokenResponse;
use crate::auth::{extract, Error, ErrorBody, SessionService};

#[utoipa::path(
    post,
    path = "/api/refresh",
    responses(
        (status = 200, description = "New access token", body = TokenResponse),
        (status = 400, description = "Missing or malformed authorization header", body = ErrorBody),
        (status = 401, description = "Refresh token unknown, expired or revoked", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
) -> Result<Json<TokenResponse>, Error> {
    let refresh_token = extract::bearer_token(&headers)?;
    let token = service.refresh(refresh_token).await?;
    Ok(Json(TokenResponse { token }))
}

#[utoipa::path(
    post,
    path = "/api/revoke",
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 400, description = "Missing header or unknown refresh token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn revoke(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
) -> Result<StatusCode, Error> {
    let refresh_token = extract::bearer_token(&headers)?;
    service.revoke(refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
