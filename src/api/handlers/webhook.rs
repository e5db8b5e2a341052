use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{json_body, types::WebhookRequest};
use crate::auth::{extract, Error, ErrorBody, SessionService};

#[utoipa::path(
    post,
    path = "/api/webhooks",
    request_body = WebhookRequest,
    responses(
        (status = 204, description = "Event applied or ignored"),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody),
    ),
    security(("api_key" = [])),
    tag = "webhooks"
)]
#[instrument(skip_all)]
pub async fn webhook(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
    payload: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<StatusCode, Error> {
    // Any problem with the key is a 401 here, including a missing header.
    let key = extract::api_key(&headers).map_err(|_| Error::InvalidApiKey)?;
    service.verify_service_key(key)?;

    let request = json_body(payload)?;
    service
        .handle_event(&request.event, request.data.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
