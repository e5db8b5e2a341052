//! Session orchestration: composes the hasher, the token codec and the
//! refresh store into the flows the HTTP layer exposes.

use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    config::AuthConfig, password, password::CredentialHasher, refresh, refresh::RefreshSessions,
    token, Error,
};
use crate::storage::{CreatePrincipalOutcome, Principal, Storage, UpdateOutcome};

/// Webhook event that grants the premium flag.
pub const EVENT_USER_UPGRADED: &str = "user.upgraded";

/// Result of a successful login.
#[derive(ToSchema, Serialize, Debug)]
pub struct LoginGrant {
    #[serde(flatten)]
    pub principal: Principal,
    pub token: String,
    pub refresh_token: String,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

pub(crate) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

pub struct SessionService {
    storage: Arc<dyn Storage>,
    config: AuthConfig,
    hasher: CredentialHasher,
    sessions: RefreshSessions,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, config: AuthConfig) -> Self {
        let sessions = RefreshSessions::new(storage.clone(), config.refresh_ttl());
        Self {
            storage,
            config,
            hasher: CredentialHasher::default(),
            sessions,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn jwt_secret(&self) -> &[u8] {
        self.config.jwt_secret().expose_secret().as_bytes()
    }

    // Argon2 runs on the blocking pool, never on a runtime worker.
    async fn hash_password(&self, plaintext: &str) -> Result<String, Error> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        Ok(spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|_| password::Error::Hash)??)
    }

    async fn verify_password(&self, plaintext: &str, digest: &str) -> Result<bool, Error> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();
        Ok(spawn_blocking(move || hasher.verify(&plaintext, &digest))
            .await
            .map_err(|_| password::Error::Hash)??)
    }

    async fn verify_decoy(&self, plaintext: &str) -> Result<(), Error> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        Ok(spawn_blocking(move || hasher.verify_decoy(&plaintext))
            .await
            .map_err(|_| password::Error::Hash)??)
    }

    fn validate_input(email: &str, password: &str) -> Result<String, Error> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(Error::MalformedInput("invalid email".to_string()));
        }
        if password.is_empty() {
            return Err(Error::MalformedInput("password must not be empty".to_string()));
        }
        Ok(email)
    }

    /// Create a principal with a freshly hashed password.
    ///
    /// # Errors
    /// `MalformedInput` for a bad email or empty password, `Conflict` when the
    /// email is taken, `Hashing` or `StoreUnavailable` on internal failure.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<Principal, Error> {
        let email = Self::validate_input(email, password)?;
        let password_hash = self.hash_password(password).await?;

        match self
            .storage
            .create_principal(&email, &password_hash)
            .await
            .map_err(Error::StoreUnavailable)?
        {
            CreatePrincipalOutcome::Created(principal) => {
                info!(user_id = %principal.id, "user registered");
                Ok(principal)
            }
            CreatePrincipalOutcome::Conflict => Err(Error::Conflict),
        }
    }

    /// Verify credentials, then mint an access token and a fresh refresh session.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    ///
    /// # Errors
    /// `InvalidCredentials` on any credential mismatch; internal errors otherwise.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ttl_seconds: Option<i64>,
    ) -> Result<LoginGrant, Error> {
        let email = normalize_email(email);
        let Some(principal) = self
            .storage
            .find_principal_by_email(&email)
            .await
            .map_err(Error::StoreUnavailable)?
        else {
            debug!("login for unknown email");
            self.verify_decoy(password).await?;
            return Err(Error::InvalidCredentials);
        };

        if !self.verify_password(password, &principal.password_hash).await? {
            debug!(user_id = %principal.id, "login with wrong password");
            return Err(Error::InvalidCredentials);
        }

        let ttl = token::clamp_ttl(ttl_seconds.or(Some(self.config.access_ttl_seconds())));
        let access_token = token::issue(principal.id, self.jwt_secret(), ttl)?;
        let refresh_token = self.sessions.create(principal.id).await?;

        info!(user_id = %principal.id, "user logged in");
        Ok(LoginGrant {
            principal,
            token: access_token,
            refresh_token,
        })
    }

    /// Exchange a live refresh token for a one hour access token. The refresh
    /// token itself is not rotated.
    ///
    /// # Errors
    /// `Refresh(NotFound | Expired | Revoked)` or internal errors.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, Error> {
        let principal_id = self.sessions.resolve(refresh_token).await?;
        Ok(token::issue(
            principal_id,
            self.jwt_secret(),
            token::MAX_TTL_SECONDS,
        )?)
    }

    /// Revoke a refresh session. Revoking twice succeeds.
    ///
    /// # Errors
    /// `UnknownSession` if the token was never issued, or internal errors.
    #[instrument(skip_all)]
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), Error> {
        match self.sessions.revoke(refresh_token).await {
            Ok(()) => Ok(()),
            Err(refresh::Error::AlreadyRevoked) => {
                debug!("refresh token already revoked");
                Ok(())
            }
            Err(refresh::Error::NotFound) => Err(Error::UnknownSession),
            Err(err) => Err(err.into()),
        }
    }

    /// Validate an access token and return its subject. No I/O.
    ///
    /// # Errors
    /// `Token(_)` for any signature, expiry, issuer or format problem.
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, Error> {
        Ok(token::verify(access_token, self.jwt_secret())?)
    }

    /// Load the principal behind an authenticated request.
    ///
    /// # Errors
    /// `NotFound` if the principal no longer exists.
    pub async fn principal(&self, principal_id: Uuid) -> Result<Principal, Error> {
        self.storage
            .find_principal_by_id(principal_id)
            .await
            .map_err(Error::StoreUnavailable)?
            .ok_or(Error::NotFound)
    }

    /// Replace the email and password of the authenticated principal.
    ///
    /// # Errors
    /// `MalformedInput`, `Conflict` if the email belongs to someone else,
    /// `NotFound` if the principal is gone.
    #[instrument(skip(self, password))]
    pub async fn change_credentials(
        &self,
        principal_id: Uuid,
        email: &str,
        password: &str,
    ) -> Result<Principal, Error> {
        let email = Self::validate_input(email, password)?;
        let password_hash = self.hash_password(password).await?;

        match self
            .storage
            .update_credentials(principal_id, &email, &password_hash)
            .await
            .map_err(Error::StoreUnavailable)?
        {
            UpdateOutcome::Updated(principal) => {
                info!(user_id = %principal.id, "credentials changed");
                Ok(principal)
            }
            UpdateOutcome::NotFound => Err(Error::NotFound),
            UpdateOutcome::Conflict => Err(Error::Conflict),
        }
    }

    /// Check a presented service key against the configured one.
    ///
    /// # Errors
    /// `InvalidApiKey` on mismatch.
    pub fn verify_service_key(&self, presented: &str) -> Result<(), Error> {
        if digest(presented) == digest(self.config.webhook_key().expose_secret()) {
            Ok(())
        } else {
            Err(Error::InvalidApiKey)
        }
    }

    /// Apply an inbound webhook event. Events other than `user.upgraded` are
    /// acknowledged and ignored.
    ///
    /// # Errors
    /// `NotFound` if the upgraded user does not exist.
    #[instrument(skip(self))]
    pub async fn handle_event(&self, event: &str, principal_id: Uuid) -> Result<(), Error> {
        if event != EVENT_USER_UPGRADED {
            debug!("ignoring webhook event");
            return Ok(());
        }
        self.upgrade_to_premium(principal_id).await
    }

    /// # Errors
    /// `NotFound` if no principal has this id.
    pub async fn upgrade_to_premium(&self, principal_id: Uuid) -> Result<(), Error> {
        if self
            .storage
            .upgrade_to_premium(principal_id)
            .await
            .map_err(Error::StoreUnavailable)?
        {
            info!(user_id = %principal_id, "user upgraded to premium");
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Delete every principal and refresh session.
    ///
    /// # Errors
    /// `Forbidden` unless the process runs in admin mode.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<u64, Error> {
        if !self.config.admin_mode() {
            return Err(Error::Forbidden);
        }
        let removed = self.storage.reset().await.map_err(Error::StoreUnavailable)?;
        info!(removed, "reset users");
        Ok(removed)
    }

    /// # Errors
    /// Returns the storage error when the backing store is unreachable.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.storage.ping().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SECRET: &str = "test-jwt-secret";

    fn service_with(config: AuthConfig) -> SessionService {
        SessionService::new(Arc::new(MemoryStorage::new()), config)
            .with_hasher(CredentialHasher::with_params(1024, 1, 1).unwrap())
    }

    fn config() -> AuthConfig {
        AuthConfig::new(SecretString::from(SECRET), SecretString::from("hook-key"))
    }

    fn service() -> SessionService {
        service_with(config())
    }

    fn lifetime(access_token: &str) -> i64 {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<token::AccessClaims>(
            access_token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap();
        data.claims.exp - data.claims.iat
    }

    #[test]
    fn email_validation() {
        assert!(valid_email("user@example.com"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("user example.com"));
        assert!(!valid_email(""));
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[tokio::test]
    async fn register_then_login() {
        let service = service();
        let principal = service.register("a@x.com", "pw").await.unwrap();
        assert!(!principal.is_premium);
        assert_ne!(principal.password_hash, "pw");

        let grant = service.login("a@x.com", "pw", None).await.unwrap();
        assert_eq!(grant.principal.id, principal.id);
        assert_eq!(service.authenticate(&grant.token).unwrap(), principal.id);
        assert!(!grant.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_bad_input_and_duplicates() {
        let service = service();
        assert!(matches!(
            service.register("nope", "pw").await,
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            service.register("a@x.com", "").await,
            Err(Error::MalformedInput(_))
        ));
        service.register("a@x.com", "pw").await.unwrap();
        assert!(matches!(
            service.register("A@X.com", "pw").await,
            Err(Error::Conflict)
        ));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let service = service();
        service.register("a@x.com", "pw").await.unwrap();

        let unknown = service.login("b@x.com", "pw", None).await.unwrap_err();
        let wrong = service.login("a@x.com", "nope", None).await.unwrap_err();
        assert!(matches!(unknown, Error::InvalidCredentials));
        assert!(matches!(wrong, Error::InvalidCredentials));
        assert_eq!(unknown.status(), wrong.status());
        assert_eq!(unknown.public_message(), wrong.public_message());
    }

    #[tokio::test]
    async fn unknown_email_still_runs_argon2() {
        let service = service();
        assert!(!service.hasher.decoy_ready());

        let err = service.login("nobody@x.com", "pw", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert!(service.hasher.decoy_ready());
    }

    #[tokio::test]
    async fn wrong_password_skips_the_decoy() {
        let service = service();
        service.register("a@x.com", "pw").await.unwrap();
        let err = service.login("a@x.com", "nope", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert!(!service.hasher.decoy_ready());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn login_yields_while_argon2_runs() {
        let service = Arc::new(service());
        service.register("a@x.com", "pw").await.unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let login = tokio::spawn({
            let (service, done) = (service.clone(), done.clone());
            async move {
                let grant = service.login("a@x.com", "pw", None).await;
                done.store(true, Ordering::SeqCst);
                grant
            }
        });
        // Polled after the login task's first poll on this single worker.
        let neighbour = tokio::spawn({
            let done = done.clone();
            async move { done.load(Ordering::SeqCst) }
        });

        assert!(!neighbour.await.unwrap());
        assert!(login.await.unwrap().is_ok());
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn refresh_mints_one_hour_tokens() {
        let service = service_with(config().with_access_ttl_seconds(600));
        service.register("a@x.com", "pw").await.unwrap();

        let grant = service.login("a@x.com", "pw", None).await.unwrap();
        assert_eq!(lifetime(&grant.token), 600);

        let access = service.refresh(&grant.refresh_token).await.unwrap();
        assert_eq!(lifetime(&access), token::MAX_TTL_SECONDS);
    }

    #[tokio::test]
    async fn login_clamps_requested_ttl() {
        let service = service();
        service.register("a@x.com", "pw").await.unwrap();

        for (requested, expected) in [
            (Some(60), 60),
            (Some(0), 3600),
            (Some(-5), 3600),
            (Some(7200), 3600),
            (None, 3600),
        ] {
            let grant = service.login("a@x.com", "pw", requested).await.unwrap();
            assert_eq!(lifetime(&grant.token), expected);
        }
    }

    #[tokio::test]
    async fn refresh_then_revoke() {
        let service = service();
        let principal = service.register("a@x.com", "pw").await.unwrap();
        let grant = service.login("a@x.com", "pw", None).await.unwrap();

        let access = service.refresh(&grant.refresh_token).await.unwrap();
        assert_eq!(service.authenticate(&access).unwrap(), principal.id);

        service.revoke(&grant.refresh_token).await.unwrap();
        let err = service.refresh(&grant.refresh_token).await.unwrap_err();
        assert!(matches!(err, Error::Refresh(refresh::Error::Revoked)));

        // logout twice is fine
        service.revoke(&grant.refresh_token).await.unwrap();
        assert!(matches!(
            service.revoke("never-issued").await,
            Err(Error::UnknownSession)
        ));
    }

    #[tokio::test]
    async fn each_login_gets_its_own_session() {
        let service = service();
        service.register("a@x.com", "pw").await.unwrap();
        let first = service.login("a@x.com", "pw", None).await.unwrap();
        let second = service.login("a@x.com", "pw", None).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        service.revoke(&first.refresh_token).await.unwrap();
        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn change_credentials_swaps_password() {
        let service = service();
        let alice = service.register("a@x.com", "pw").await.unwrap();
        service.register("b@x.com", "pw").await.unwrap();

        assert!(matches!(
            service.change_credentials(alice.id, "b@x.com", "new").await,
            Err(Error::Conflict)
        ));

        let updated = service
            .change_credentials(alice.id, "c@x.com", "new")
            .await
            .unwrap();
        assert_eq!(updated.email, "c@x.com");
        assert!(service.login("c@x.com", "new", None).await.is_ok());
        assert!(matches!(
            service.login("c@x.com", "pw", None).await,
            Err(Error::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn service_key_and_webhook() {
        let service = service();
        let alice = service.register("a@x.com", "pw").await.unwrap();

        assert!(service.verify_service_key("hook-key").is_ok());
        assert!(matches!(
            service.verify_service_key("hook-kez"),
            Err(Error::InvalidApiKey)
        ));

        service.handle_event("user.created", alice.id).await.unwrap();
        assert!(!service.principal(alice.id).await.unwrap().is_premium);

        service
            .handle_event(EVENT_USER_UPGRADED, alice.id)
            .await
            .unwrap();
        assert!(service.principal(alice.id).await.unwrap().is_premium);

        assert!(matches!(
            service.handle_event(EVENT_USER_UPGRADED, Uuid::new_v4()).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn reset_requires_admin_mode() {
        let service = service();
        service.register("a@x.com", "pw").await.unwrap();
        assert!(matches!(service.reset().await, Err(Error::Forbidden)));
        assert!(service.login("a@x.com", "pw", None).await.is_ok());

        let admin = service_with(config().with_status(Some("ADMIN")));
        admin.register("a@x.com", "pw").await.unwrap();
        let grant = admin.login("a@x.com", "pw", None).await.unwrap();
        assert_eq!(admin.reset().await.unwrap(), 1);
        assert!(matches!(
            admin.refresh(&grant.refresh_token).await,
            Err(Error::Refresh(refresh::Error::NotFound))
        ));
    }
}
