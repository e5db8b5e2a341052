//! Account endpoints: register, login, change credentials, current user.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    authenticated, json_body,
    types::{CredentialsRequest, LoginRequest},
};
use crate::{
    auth::{Error, ErrorBody, LoginGrant, SessionService},
    storage::Principal,
};

#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "User created", body = Principal),
        (status = 400, description = "Malformed body, email or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn register(
    service: Extension<Arc<SessionService>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let request = json_body(payload)?;
    let principal = service.register(&request.email, &request.password).await?;
    Ok((StatusCode::CREATED, Json(principal)))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 202, description = "Access and refresh tokens issued", body = LoginGrant),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 401, description = "Invalid email or password", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn login(
    service: Extension<Arc<SessionService>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let request = json_body(payload)?;
    let grant = service
        .login(&request.email, &request.password, request.expires_in_seconds)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(grant)))
}

#[utoipa::path(
    put,
    path = "/api/users/change",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Credentials updated", body = Principal),
        (status = 400, description = "Missing authorization header or malformed body", body = ErrorBody),
        (status = 401, description = "Invalid access token", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn change(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let principal_id = authenticated(&headers, &service)?;
    let request = json_body(payload)?;
    let principal = service
        .change_credentials(principal_id, &request.email, &request.password)
        .await?;
    Ok(Json(principal))
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "The authenticated user", body = Principal),
        (status = 400, description = "Missing authorization header", body = ErrorBody),
        (status = 401, description = "Invalid access token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn me(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
) -> Result<Json<Principal>, Error> {
    let principal_id = authenticated(&headers, &service)?;
    Ok(Json(service.principal(principal_id).await?))
}
