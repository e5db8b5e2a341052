//! Credential extraction from request headers.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;

const BEARER_PREFIX: &str = "Bearer ";
const API_KEY_PREFIX: &str = "ApiKey ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("malformed authorization header")]
    MalformedHeader,
}

/// Read a user token from `Authorization: Bearer <token>`.
///
/// # Errors
/// `MissingHeader` when the header is absent, `MalformedHeader` when the
/// scheme is not exactly `Bearer ` or nothing follows it.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    scheme_value(headers, BEARER_PREFIX)
}

/// Read the service key from `Authorization: ApiKey <key>`.
///
/// # Errors
/// Same rules as [`bearer_token`].
pub fn api_key(headers: &HeaderMap) -> Result<&str, Error> {
    scheme_value(headers, API_KEY_PREFIX)
}

fn scheme_value<'a>(headers: &'a HeaderMap, prefix: &str) -> Result<&'a str, Error> {
    let value = headers.get(AUTHORIZATION).ok_or(Error::MissingHeader)?;
    let value = value.to_str().map_err(|_| Error::MalformedHeader)?;
    let credential = value
        .strip_prefix(prefix)
        .ok_or(Error::MalformedHeader)?
        .trim();
    if credential.is_empty() {
        Err(Error::MalformedHeader)
    } else {
        Ok(credential)
    }
}
