//! Refresh sessions: long-lived, persisted, revocable bearer secrets.
//!
//! The raw token is returned to the caller exactly once. Storage only ever
//! sees its SHA-256 digest, so a leaked table does not leak usable tokens.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::storage::{InsertOutcome, RefreshRow, RevokeOutcome, Storage};

pub const DEFAULT_TTL_DAYS: i64 = 60;
const TOKEN_BYTES: usize = 32;
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token revoked")]
    Revoked,
    #[error("refresh token already revoked")]
    AlreadyRevoked,
    #[error("failed to generate refresh token")]
    Entropy,
    #[error("session store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

/// Generate a fresh opaque token from the OS RNG.
pub(crate) fn generate_token() -> Result<String, Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|_| Error::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[derive(Clone)]
pub struct RefreshSessions {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl std::fmt::Debug for RefreshSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshSessions")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RefreshSessions {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist a new session for `principal_id` and return its raw token.
    ///
    /// # Errors
    /// `Entropy` if the RNG fails, `StoreUnavailable` if storage fails.
    pub async fn create(&self, principal_id: Uuid) -> Result<String, Error> {
        self.create_at(principal_id, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub(crate) async fn create_at(
        &self,
        principal_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, Error> {
        for _ in 0..CREATE_ATTEMPTS {
            let token = generate_token()?;
            let row = RefreshRow {
                token_hash: hash_token(&token),
                user_id: principal_id,
                created_at: now,
                expires_at: now + self.ttl,
                revoked_at: None,
            };
            match self
                .storage
                .create_refresh_row(&row)
                .await
                .map_err(Error::StoreUnavailable)?
            {
                InsertOutcome::Created => return Ok(token),
                InsertOutcome::Conflict => debug!("refresh token digest collision, retrying"),
            }
        }
        Err(Error::Entropy)
    }

    /// Resolve a presented token to its owning principal.
    ///
    /// # Errors
    /// `NotFound`, `Revoked`, `Expired`, or `StoreUnavailable`.
    pub async fn resolve(&self, token: &str) -> Result<Uuid, Error> {
        self.resolve_at(token, Utc::now()).await
    }

    #[instrument(skip_all)]
    pub(crate) async fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, Error> {
        let row = self
            .storage
            .find_refresh_row(&hash_token(token))
            .await
            .map_err(Error::StoreUnavailable)?
            .ok_or(Error::NotFound)?;

        if row.revoked_at.is_some() {
            return Err(Error::Revoked);
        }
        if now >= row.expires_at {
            return Err(Error::Expired);
        }
        Ok(row.user_id)
    }

    /// Mark a session revoked.
    ///
    /// # Errors
    /// `NotFound`, `AlreadyRevoked`, or `StoreUnavailable`.
    pub async fn revoke(&self, token: &str) -> Result<(), Error> {
        self.revoke_at(token, Utc::now()).await
    }

    #[instrument(skip_all)]
    pub(crate) async fn revoke_at(&self, token: &str, now: DateTime<Utc>) -> Result<(), Error> {
        match self
            .storage
            .mark_refresh_revoked(&hash_token(token), now)
            .await
            .map_err(Error::StoreUnavailable)?
        {
            RevokeOutcome::Revoked => Ok(()),
            RevokeOutcome::AlreadyRevoked => Err(Error::AlreadyRevoked),
            RevokeOutcome::NotFound => Err(Error::NotFound),
        }
    }
}
