//! Storage collaborator for principals and refresh sessions.
//!
//! The auth core only talks to [`Storage`]; `postgres` is the production
//! implementation and `memory` backs tests and local experiments.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// A registered user. The password hash never leaves the server.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted refresh session, keyed by the SHA-256 digest of its token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRow {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Created,
    Conflict,
}

#[derive(Debug)]
pub enum CreatePrincipalOutcome {
    Created(Principal),
    Conflict,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(Principal),
    NotFound,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
    NotFound,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>>;

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>>;

    async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreatePrincipalOutcome>;

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<UpdateOutcome>;

    /// Returns `false` when no principal has this id.
    async fn upgrade_to_premium(&self, id: Uuid) -> Result<bool>;

    async fn create_refresh_row(&self, row: &RefreshRow) -> Result<InsertOutcome>;

    async fn find_refresh_row(&self, token_hash: &[u8]) -> Result<Option<RefreshRow>>;

    /// Set `revoked_at` once. Must be a single atomic conditional update.
    async fn mark_refresh_revoked(
        &self,
        token_hash: &[u8],
        at: DateTime<Utc>,
    ) -> Result<RevokeOutcome>;

    /// Delete every principal and refresh session; returns deleted principals.
    async fn reset(&self) -> Result<u64>;

    /// Cheap liveness probe used by the status endpoint.
    async fn ping(&self) -> Result<()>;
}
