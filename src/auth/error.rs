use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use utoipa::ToSchema;

use super::{extract, password, refresh, token};

/// JSON body of every error response.
#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Extract(#[from] extract::Error),
    #[error(transparent)]
    Token(#[from] token::Error),
    #[error(transparent)]
    Refresh(#[from] refresh::Error),
    #[error(transparent)]
    Hashing(#[from] password::Error),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("{0}")]
    MalformedInput(String),
    #[error("email already registered")]
    Conflict,
    #[error("user not found")]
    NotFound,
    #[error("unknown refresh token")]
    UnknownSession,
    #[error("reset only allowed in admin environment")]
    Forbidden,
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Extract(_) | Self::MalformedInput(_) | Self::UnknownSession => {
                StatusCode::BAD_REQUEST
            }
            Self::Token(token::Error::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Token(_) | Self::InvalidCredentials | Self::InvalidApiKey => {
                StatusCode::UNAUTHORIZED
            }
            Self::Refresh(err) => match err {
                refresh::Error::NotFound | refresh::Error::Expired | refresh::Error::Revoked => {
                    StatusCode::UNAUTHORIZED
                }
                refresh::Error::AlreadyRevoked => StatusCode::BAD_REQUEST,
                refresh::Error::Entropy | refresh::Error::StoreUnavailable(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Conflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Hashing(_) | Self::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Token(token::Error::Signing(_)) => "internal error".to_string(),
            Self::Token(_) => "unauthorized".to_string(),
            Self::Refresh(
                refresh::Error::NotFound | refresh::Error::Expired | refresh::Error::Revoked,
            ) => "unauthorized".to_string(),
            Self::Refresh(refresh::Error::Entropy | refresh::Error::StoreUnavailable(_))
            | Self::Hashing(_)
            | Self::StoreUnavailable(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}: {}", chain(&self));
        } else {
            debug!("request rejected: {self}");
        }
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

fn chain(err: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    if parts.is_empty() {
        "no further detail".to_string()
    } else {
        parts.join(": ")
    }
}
