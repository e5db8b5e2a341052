//! In-process storage used by tests and local runs without a database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CreatePrincipalOutcome, InsertOutcome, Principal, RefreshRow, RevokeOutcome, Storage,
    UpdateOutcome,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, Principal>,
    refresh_tokens: HashMap<Vec<u8>, RefreshRow>,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreatePrincipalOutcome> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|user| user.email == email) {
            return Ok(CreatePrincipalOutcome::Conflict);
        }
        let now = Utc::now();
        let principal = Principal {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_premium: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(principal.id, principal.clone());
        Ok(CreatePrincipalOutcome::Created(principal))
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<UpdateOutcome> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .values()
            .any(|user| user.email == email && user.id != id)
        {
            return Ok(UpdateOutcome::Conflict);
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        user.email = email.to_string();
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(UpdateOutcome::Updated(user.clone()))
    }

    async fn upgrade_to_premium(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&id).map_or(false, |user| {
            user.is_premium = true;
            user.updated_at = Utc::now();
            true
        }))
    }

    async fn create_refresh_row(&self, row: &RefreshRow) -> Result<InsertOutcome> {
        let mut tables = self.tables.lock().await;
        if tables.refresh_tokens.contains_key(&row.token_hash) {
            return Ok(InsertOutcome::Conflict);
        }
        tables
            .refresh_tokens
            .insert(row.token_hash.clone(), row.clone());
        Ok(InsertOutcome::Created)
    }

    async fn find_refresh_row(&self, token_hash: &[u8]) -> Result<Option<RefreshRow>> {
        let tables = self.tables.lock().await;
        Ok(tables.refresh_tokens.get(token_hash).cloned())
    }

    async fn mark_refresh_revoked(
        &self,
        token_hash: &[u8],
        at: DateTime<Utc>,
    ) -> Result<RevokeOutcome> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.refresh_tokens.get_mut(token_hash) else {
            return Ok(RevokeOutcome::NotFound);
        };
        if row.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        row.revoked_at = Some(at);
        Ok(RevokeOutcome::Revoked)
    }

    async fn reset(&self) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let removed = tables.users.len() as u64;
        tables.users.clear();
        tables.refresh_tokens.clear();
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
