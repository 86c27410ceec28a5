//! Domain-scoped JSON Web Tokens.
//!
//! Mint and verify share one secret-resolution path through the
//! [`SecretStore`]; a token is only meaningful paired with the domain
//! whose secret signed it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::secrets::SecretStore;
use crate::user::{AuthUser, Role};

/// Signature scheme, pinned on both mint and verify. A token carrying any
/// other `alg` header is rejected.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the expiration time on or after which the JWT must not
    /// be accepted for processing.
    pub exp: u64,
}

/// Mints and verifies tokens against per-domain secrets.
#[derive(Clone)]
pub struct TokenCodec {
    secrets: Arc<SecretStore>,
    ttl: u64,
}

impl TokenCodec {
    /// Create a new [`TokenCodec`] with a token lifetime in seconds.
    pub fn new(secrets: Arc<SecretStore>, ttl: u64) -> Self {
        Self { secrets, ttl }
    }

    /// Lifetime of minted tokens, in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Sign identity claims for `user` with the secret of `domain`.
    pub fn mint(&self, user: &AuthUser, domain: &str) -> Result<String> {
        let secret = self.secrets.resolve(domain)?;
        let now = unix_now()?;

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl,
        };

        encode(
            &Header::new(ALGORITHM),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|err| ServerError::internal("cannot sign token", err))
    }

    /// Decode and check a token against the secret of `domain`.
    ///
    /// Malformed, expired, bad signature and wrong algorithm all collapse
    /// into [`ServerError::TokenInvalid`].
    pub fn verify(&self, token: &str, domain: &str) -> Result<Claims> {
        let secret = self
            .secrets
            .resolve(domain)
            .map_err(|_| ServerError::TokenInvalid)?;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(ALGORITHM),
        )
        .map(|data| data.claims)
        .map_err(|_| ServerError::TokenInvalid)
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .map_err(|err| {
            ServerError::internal("system clock before unix epoch", err)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 3600;

    fn codec() -> (TokenCodec, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let secrets =
            Arc::new(SecretStore::new(dir.path(), false).unwrap());
        (TokenCodec::new(secrets, TTL), dir)
    }

    fn user() -> AuthUser {
        AuthUser {
            id: "u-1".into(),
            email: "a@x.com".into(),
            google_id: None,
            password_hash: None,
            name: "A".into(),
            avatar_url: None,
            role: Role::User,
            created_at: chrono::Utc::now(),
            last_login_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_mint_verify_roundtrip() {
        let (codec, dir) = codec();
        std::fs::write(dir.path().join("app.example.com"), "s3cret").unwrap();

        let token = codec.mint(&user(), "app.example.com").unwrap();
        let claims = codec.verify(&token, "app.example.com").unwrap();

        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.exp, claims.iat + TTL);
    }

    #[test]
    fn test_token_bound_to_domain() {
        let (codec, dir) = codec();
        std::fs::write(dir.path().join("app.example.com"), "secret-a").unwrap();
        std::fs::write(dir.path().join("other.example.com"), "secret-b")
            .unwrap();

        let token = codec.mint(&user(), "app.example.com").unwrap();
        assert!(codec.verify(&token, "app.example.com").is_ok());
        assert!(matches!(
            codec.verify(&token, "other.example.com"),
            Err(ServerError::TokenInvalid)
        ));
    }

    #[test]
    fn test_mint_requires_secret() {
        let (codec, _dir) = codec();

        assert!(matches!(
            codec.mint(&user(), "unknown.example.com"),
            Err(ServerError::SecretNotFound)
        ));
        assert!(matches!(
            codec.verify("whatever", "unknown.example.com"),
            Err(ServerError::TokenInvalid)
        ));
    }

    #[test]
    fn test_rotation_invalidates_tokens() {
        let (codec, _dir) = codec();
        codec.secrets.provision_or_get("app.example.com").unwrap();

        let token = codec.mint(&user(), "app.example.com").unwrap();
        assert!(codec.verify(&token, "app.example.com").is_ok());

        codec.secrets.rotate("app.example.com").unwrap();
        assert!(codec.verify(&token, "app.example.com").is_err());
    }

    #[test]
    fn test_rejects_foreign_algorithm() {
        let (codec, dir) = codec();
        std::fs::write(dir.path().join("app.example.com"), "s3cret").unwrap();

        let claims = codec
            .verify(
                &codec.mint(&user(), "app.example.com").unwrap(),
                "app.example.com",
            )
            .unwrap();

        // same secret, same claims, different `alg` header.
        let forged = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        assert!(codec.verify(&forged, "app.example.com").is_err());
    }

    #[test]
    fn test_rejects_expired() {
        let (codec, dir) = codec();
        std::fs::write(dir.path().join("app.example.com"), "s3cret").unwrap();

        let now = unix_now().unwrap();
        let stale = Claims {
            sub: "u-1".into(),
            email: "a@x.com".into(),
            role: Role::User,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(ALGORITHM),
            &stale,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        assert!(codec.verify(&token, "app.example.com").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        let (codec, dir) = codec();
        std::fs::write(dir.path().join("app.example.com"), "s3cret").unwrap();

        for token in ["", "not-a-jwt", "a.b.c"] {
            assert!(codec.verify(token, "app.example.com").is_err());
        }
    }
}
