//! Password hashing with Argon2id.
//!
//! Digests are PHC strings (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`), so the
//! algorithm, cost parameters and salt travel with the hash and verification
//! never needs a separate salt table.

use argon2::{
    password_hash::{self, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;

const DECOY_PLAINTEXT: &str = "postgate-decoy-password";

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argon2 parameters")]
    Params,
    #[error("failed to hash password")]
    Hash,
    #[error("malformed password digest")]
    MalformedDigest,
}

/// Salted one-way password hasher.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    // Digest with this hasher's costs, verified against when no account matches.
    decoy: Arc<OnceCell<String>>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::from_params(Params::default())
    }
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher").finish_non_exhaustive()
    }
}

impl CredentialHasher {
    /// Build a hasher with explicit Argon2id cost parameters.
    ///
    /// # Errors
    /// Returns `Error::Params` if argon2 rejects the parameter combination.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, Error> {
        let params =
            Params::new(memory_kib, iterations, parallelism, None).map_err(|_| Error::Params)?;
        Ok(Self::from_params(params))
    }

    fn from_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: Arc::new(OnceCell::new()),
        }
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    /// Returns `Error::Hash` if the salt cannot be generated or argon2 fails.
    pub fn hash(&self, plaintext: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|_| Error::Hash)?;
        Ok(digest.to_string())
    }

    /// Check a plaintext password against a stored digest.
    ///
    /// Parameters are taken from the digest, not from this hasher, so digests
    /// created with older cost settings keep verifying.
    ///
    /// # Errors
    /// Returns `Error::MalformedDigest` if `digest` is not a valid PHC string.
    pub fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, Error> {
        let parsed = PasswordHash::new(digest).map_err(|_| Error::MalformedDigest)?;
        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(Error::MalformedDigest),
        }
    }

    /// Spend one full verification without a stored digest, so a lookup miss
    /// costs the same as a wrong password. The outcome is discarded.
    ///
    /// # Errors
    /// Returns `Error::Hash` if the decoy digest cannot be built.
    pub fn verify_decoy(&self, plaintext: &str) -> Result<(), Error> {
        let digest = self.decoy.get_or_try_init(|| self.hash(DECOY_PLAINTEXT))?;
        self.verify(plaintext, digest).map(|_| ())
    }

    #[cfg(test)]
    pub(crate) fn decoy_ready(&self) -> bool {
        self.decoy.get().is_some()
    }
}
