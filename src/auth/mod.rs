//! Credential and session core.
//!
//! - [`password`]: Argon2id hashing of user passwords.
//! - [`token`]: short-lived, stateless HS256 access tokens.
//! - [`extract`]: `Authorization` header parsing (`Bearer`, `ApiKey`).
//! - [`refresh`]: long-lived, persisted, revocable refresh sessions.
//! - [`service`]: login, refresh, revoke and the account flows built on top.
//!
//! Access tokens cannot be revoked individually; logging out revokes the
//! refresh session, and outstanding access tokens die with their `exp`.
//! There is no brute-force protection on login.

pub mod config;
mod error;
pub mod extract;
pub mod password;
pub mod refresh;
pub mod service;
pub mod token;

pub use config::AuthConfig;
pub use error::{Error, ErrorBody};
pub use service::{LoginGrant, SessionService};
