//! Status probe: build metadata plus a database round trip.

use crate::{auth::SessionService, GIT_COMMIT_HASH};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

const STATUS_DB_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Status {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path= "/status",
    responses (
        (status = 200, description = "Database connection is healthy", body = Status),
        (status = 503, description = "Database connection is unhealthy", body = Status)
    ),
    tag = "status",
)]
/// Report build metadata and whether the store answers.
pub async fn status(service: Extension<Arc<SessionService>>) -> impl IntoResponse {
    let db_healthy = match timeout(
        Duration::from_secs(STATUS_DB_TIMEOUT_SECONDS),
        service.ping(),
    )
    .await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping database: {err:#}");
            false
        }
        Err(_) => {
            warn!("Database status check timed out");
            false
        }
    };

    let status = Status {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if db_healthy {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    let short_hash = status.commit.get(..7).unwrap_or_default();
    let headers = format!("{}:{}:{}", status.name, status.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    let code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, headers, Json(status))
}
