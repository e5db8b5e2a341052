use chrono::Duration;
use secrecy::SecretString;

use super::{refresh::DEFAULT_TTL_DAYS, token::MAX_TTL_SECONDS};

/// Process status label that enables destructive admin operations.
pub const ADMIN_STATUS: &str = "ADMIN";

/// Immutable configuration of the session service, built once at startup.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    webhook_key: SecretString,
    refresh_ttl_days: i64,
    access_ttl_seconds: i64,
    admin_mode: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString, webhook_key: SecretString) -> Self {
        Self {
            jwt_secret,
            webhook_key,
            refresh_ttl_days: DEFAULT_TTL_DAYS,
            access_ttl_seconds: MAX_TTL_SECONDS,
            admin_mode: false,
        }
    }

    #[must_use]
    pub fn with_refresh_ttl_days(mut self, days: i64) -> Self {
        self.refresh_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    /// Admin mode is on only for the exact status label `ADMIN`.
    #[must_use]
    pub fn with_status(mut self, status: Option<&str>) -> Self {
        self.admin_mode = status == Some(ADMIN_STATUS);
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn webhook_key(&self) -> &SecretString {
        &self.webhook_key
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_ttl_days)
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn admin_mode(&self) -> bool {
        self.admin_mode
    }
}
