//! Stateless access tokens (HS256 JWT).
//!
//! Tokens carry `sub`, `iat`, `exp` and a fixed `iss`. Nothing is persisted;
//! validity is decided by the signature, the issuer label and the clock.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Issuer label distinguishing our tokens from any other signer.
pub const ISSUER: &str = "postgate";

/// Upper bound (and default) for access token lifetimes, in seconds.
pub const MAX_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("invalid issuer")]
    WrongIssuer,
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Clamp a caller-requested lifetime to `(0, MAX_TTL_SECONDS]`.
///
/// Absent, zero, negative and oversized requests all fall back to the maximum.
#[must_use]
pub fn clamp_ttl(requested_seconds: Option<i64>) -> i64 {
    match requested_seconds {
        Some(seconds) if seconds > 0 && seconds <= MAX_TTL_SECONDS => seconds,
        _ => MAX_TTL_SECONDS,
    }
}

/// Mint a signed access token for `principal_id`.
///
/// # Errors
/// Returns `Error::Signing` if the claims cannot be encoded.
pub fn issue(principal_id: Uuid, secret: &[u8], ttl_seconds: i64) -> Result<String, Error> {
    issue_at(principal_id, secret, ttl_seconds, Utc::now().timestamp())
}

/// Mint a token as if the current time were `now_unix_seconds`.
///
/// # Errors
/// Returns `Error::Signing` if the claims cannot be encoded.
pub fn issue_at(
    principal_id: Uuid,
    secret: &[u8],
    ttl_seconds: i64,
    now_unix_seconds: i64,
) -> Result<String, Error> {
    let claims = AccessClaims {
        iss: ISSUER.to_string(),
        sub: principal_id.to_string(),
        iat: now_unix_seconds,
        exp: now_unix_seconds.saturating_add(ttl_seconds),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(Error::Signing)
}

/// Verify a token and return the principal it was issued for.
///
/// # Errors
/// See [`verify_at`].
pub fn verify(token: &str, secret: &[u8]) -> Result<Uuid, Error> {
    verify_at(token, secret, Utc::now().timestamp())
}

/// Verify a token against an explicit clock.
///
/// # Errors
/// - `Error::Malformed` if the token is not a well formed HS256 JWT with our claims
/// - `Error::InvalidSignature` if the signature does not match `secret`
/// - `Error::WrongIssuer` if `iss` is not [`ISSUER`]
/// - `Error::Expired` if `now_unix_seconds >= exp`
pub fn verify_at(token: &str, secret: &[u8], now_unix_seconds: i64) -> Result<Uuid, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // exp and iss are checked below so the clock is injectable and the
    // boundary is `now >= exp`.
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|err| match err.kind() {
            ErrorKind::InvalidSignature => Error::InvalidSignature,
            _ => Error::Malformed,
        })?;
    let claims = data.claims;

    if claims.iss != ISSUER {
        return Err(Error::WrongIssuer);
    }
    if now_unix_seconds >= claims.exp {
        return Err(Error::Expired);
    }

    Uuid::parse_str(&claims.sub).map_err(|_| Error::Malformed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const SECRET: &[u8] = b"server-secret";

    #[test]
    fn issue_and_verify_returns_subject() {
        let id = Uuid::new_v4();
        let token = issue_at(id, SECRET, 120, NOW).unwrap();
        assert_eq!(verify_at(&token, SECRET, NOW).unwrap(), id);
    }

    #[test]
    fn issue_and_verify_with_wall_clock() {
        let id = Uuid::new_v4();
        let token = issue(id, SECRET, 60).unwrap();
        assert_eq!(verify(&token, SECRET).unwrap(), id);
    }

    #[test]
    fn other_secret_fails_signature() {
        let token = issue_at(Uuid::new_v4(), SECRET, 120, NOW).unwrap();
        let result = verify_at(&token, b"another-secret", NOW);
        assert!(matches!(result, Err(Error::InvalidSignature)));
    }

    #[test]
    fn one_second_token_expires() {
        let token = issue_at(Uuid::new_v4(), SECRET, 1, NOW).unwrap();
        assert!(verify_at(&token, SECRET, NOW).is_ok());
        assert!(matches!(
            verify_at(&token, SECRET, NOW + 1),
            Err(Error::Expired)
        ));
        assert!(matches!(
            verify_at(&token, SECRET, NOW + 2),
            Err(Error::Expired)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        for token in ["", "abc", "a.b.c", "a.b.c.d"] {
            assert!(
                matches!(verify_at(token, SECRET, NOW), Err(Error::Malformed)),
                "token {token:?}"
            );
        }
    }

    #[test]
    fn foreign_issuer_rejected() {
        let claims = AccessClaims {
            iss: "someone-else".to_string(),
            sub: Uuid::new_v4().to_string(),
            iat: NOW,
            exp: NOW + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(
            verify_at(&token, SECRET, NOW),
            Err(Error::WrongIssuer)
        ));
    }

    #[test]
    fn non_uuid_subject_is_malformed() {
        let claims = AccessClaims {
            iss: ISSUER.to_string(),
            sub: "not-a-uuid".to_string(),
            iat: NOW,
            exp: NOW + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(
            verify_at(&token, SECRET, NOW),
            Err(Error::Malformed)
        ));
    }

    #[test]
    fn other_algorithm_is_malformed() {
        let claims = AccessClaims {
            iss: ISSUER.to_string(),
            sub: Uuid::new_v4().to_string(),
            iat: NOW,
            exp: NOW + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(
            verify_at(&token, SECRET, NOW),
            Err(Error::Malformed)
        ));
    }

    #[test]
    fn clamp_ttl_bounds() {
        assert_eq!(clamp_ttl(None), MAX_TTL_SECONDS);
        assert_eq!(clamp_ttl(Some(0)), MAX_TTL_SECONDS);
        assert_eq!(clamp_ttl(Some(-5)), MAX_TTL_SECONDS);
        assert_eq!(clamp_ttl(Some(1)), 1);
        assert_eq!(clamp_ttl(Some(3600)), 3600);
        assert_eq!(clamp_ttl(Some(3601)), MAX_TTL_SECONDS);
    }
}
