//! # Postgate
//!
//! Session and credential service for a web API. Users authenticate with a
//! password and receive two credentials:
//!
//! - a short-lived, stateless HS256 **access token** (at most one hour) sent as
//!   `Authorization: Bearer <token>` on protected endpoints;
//! - a long-lived, persisted **refresh token** (60 days by default) that mints
//!   new access tokens until it expires or is revoked.
//!
//! Service-to-service webhooks authenticate with a static key sent as
//! `Authorization: ApiKey <key>`.
//!
//! Passwords are stored as Argon2id PHC strings and refresh tokens only as
//! SHA-256 digests.

pub mod api;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
