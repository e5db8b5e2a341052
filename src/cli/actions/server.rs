use crate::{api, auth::AuthConfig};
use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub webhook_key: SecretString,
    pub status: Option<String>,
    pub refresh_ttl_days: i64,
    pub access_ttl_seconds: i64,
}

impl Args {
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.jwt_secret.clone(), self.webhook_key.clone())
            .with_refresh_ttl_days(self.refresh_ttl_days)
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_status(self.status.as_deref())
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.auth_config();
    debug!("Auth config: {:?}", config);

    if config.admin_mode() {
        tracing::warn!("Running in admin mode, DELETE /admin/reset is enabled");
    }

    api::new(args.port, &args.dsn, config).await
}
