//! HTTP handlers.
//!
//! Handlers stay thin: they pull credentials and bodies off the request and
//! hand them to [`SessionService`], whose [`Error`] renders the response.

pub mod admin;
pub mod health;
pub mod session;
pub mod types;
pub mod users;
pub mod webhook;

use axum::{extract::rejection::JsonRejection, http::HeaderMap, Json};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{extract, Error, SessionService};

/// Unwrap a JSON body, turning every rejection into a 400 with our error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            debug!("rejected body: {rejection}");
            Err(Error::MalformedInput(format!(
                "can't decode the body: {}",
                rejection.body_text()
            )))
        }
    }
}

/// Resolve the principal behind `Authorization: Bearer <access token>`.
pub(crate) fn authenticated(headers: &HeaderMap, service: &SessionService) -> Result<Uuid, Error> {
    let token = extract::bearer_token(headers)?;
    service.authenticate(token)
}
