//! PostgreSQL storage backed by `sqlx`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    CreatePrincipalOutcome, InsertOutcome, Principal, RefreshRow, RevokeOutcome, Storage,
    UpdateOutcome,
};

const PRINCIPAL_COLUMNS: &str = "id, email, password_hash, is_premium, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn principal_from_row(row: &PgRow) -> Result<Principal, sqlx::Error> {
    Ok(Principal {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_premium: row.try_get("is_premium")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn refresh_from_row(row: &PgRow) -> Result<RefreshRow, sqlx::Error> {
    Ok(RefreshRow {
        token_hash: row.try_get("token_hash")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn find_principal_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let query = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;

        row.as_ref()
            .map(principal_from_row)
            .transpose()
            .context("failed to decode user row")
    }

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        let query = format!("SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;

        row.as_ref()
            .map(principal_from_row)
            .transpose()
            .context("failed to decode user row")
    }

    async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<CreatePrincipalOutcome> {
        let query = format!(
            "INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3) RETURNING {PRINCIPAL_COLUMNS}"
        );
        let result = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await;

        match result {
            Ok(row) => Ok(CreatePrincipalOutcome::Created(
                principal_from_row(&row).context("failed to decode user row")?,
            )),
            Err(err) if is_unique_violation(&err) => Ok(CreatePrincipalOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<UpdateOutcome> {
        let query = format!(
            r"
            UPDATE users
            SET email = $2, password_hash = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRINCIPAL_COLUMNS}
            "
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(email)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await;

        match result {
            Ok(Some(row)) => Ok(UpdateOutcome::Updated(
                principal_from_row(&row).context("failed to decode user row")?,
            )),
            Ok(None) => Ok(UpdateOutcome::NotFound),
            Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::Conflict),
            Err(err) => Err(err).context("failed to update user credentials"),
        }
    }

    async fn upgrade_to_premium(&self, id: Uuid) -> Result<bool> {
        let query = "UPDATE users SET is_premium = TRUE, updated_at = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to upgrade user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_refresh_row(&self, row: &RefreshRow) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO refresh_tokens (token_hash, user_id, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let result = sqlx::query(query)
            .bind(&row.token_hash)
            .bind(row.user_id)
            .bind(row.created_at)
            .bind(row.expires_at)
            .bind(row.revoked_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert refresh token"),
        }
    }

    async fn find_refresh_row(&self, token_hash: &[u8]) -> Result<Option<RefreshRow>> {
        let query = r"
            SELECT token_hash, user_id, created_at, expires_at, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;

        row.as_ref()
            .map(refresh_from_row)
            .transpose()
            .context("failed to decode refresh token row")
    }

    async fn mark_refresh_revoked(
        &self,
        token_hash: &[u8],
        at: DateTime<Utc>,
    ) -> Result<RevokeOutcome> {
        // The `revoked_at IS NULL` guard makes concurrent revokes race on the
        // row lock; exactly one of them updates.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2, updated_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke refresh token")?;

        if result.rows_affected() > 0 {
            return Ok(RevokeOutcome::Revoked);
        }

        let query = "SELECT 1 FROM refresh_tokens WHERE token_hash = $1";
        let exists = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?
            .is_some();

        Ok(if exists {
            RevokeOutcome::AlreadyRevoked
        } else {
            RevokeOutcome::NotFound
        })
    }

    async fn reset(&self) -> Result<u64> {
        // refresh_tokens rows go with their users (ON DELETE CASCADE).
        let query = "DELETE FROM users";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to reset users")?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .context("failed to acquire database connection")?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .context("failed to ping database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
        message: &'static str,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
            message: "duplicate key value violates unique constraint",
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23503"),
            message: "insert or update violates foreign key constraint",
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
