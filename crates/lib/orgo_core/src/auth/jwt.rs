//! JWT token signing and verification (HS256).
//!
//! Both session and project access tokens go through [`TokenCodec`]. The
//! codec is a pure function of the signing secret: it never touches a store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use super::AuthError;
use crate::models::auth::{ProjectClaims, SessionClaims, TokenKind};

/// Decode failures. Deliberately coarse: no algorithm internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,
}

/// Claim sets the codec knows how to sign and check.
pub trait SignedClaims: Serialize + DeserializeOwned {
    const KIND: TokenKind;

    fn kind(&self) -> TokenKind;

    /// Expiry as a unix timestamp.
    fn expires_at(&self) -> i64;
}

impl SignedClaims for SessionClaims {
    const KIND: TokenKind = TokenKind::Session;

    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl SignedClaims for ProjectClaims {
    const KIND: TokenKind = TokenKind::ProjectAccess;

    fn kind(&self) -> TokenKind {
        self.typ
    }

    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// HS256 signer/verifier bound to one process-wide secret.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `decode`.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a claim set into a `header.claims.signature` string.
    pub fn issue<C: SignedClaims>(&self, claims: &C) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature, structure, token kind and expiry, in that order.
    ///
    /// Claims are only returned once every check has passed.
    pub fn decode<C: SignedClaims>(&self, token: &str, now: DateTime<Utc>) -> Result<C, CodecError> {
        let data = decode::<C>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => CodecError::InvalidSignature,
                ErrorKind::ExpiredSignature => CodecError::Expired,
                _ => CodecError::Malformed,
            }
        })?;
        let claims = data.claims;
        if claims.kind() != C::KIND {
            return Err(CodecError::Malformed);
        }
        if claims.expires_at() <= now.timestamp() {
            return Err(CodecError::Expired);
        }
        Ok(claims)
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
///
/// A freshly generated secret is written back so restarts keep accepting
/// tokens issued before them. If the write fails the secret only lives as
/// long as this process.
pub fn resolve_jwt_secret() -> String {
    for var in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    match persist_secret(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %secret_path.display(),
            error = %e,
            "generated JWT secret could not be saved; tokens will not survive a restart"
        ),
    }
    secret
}

fn persist_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("orgolink")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::models::auth::ProjectRole;

    fn session_claims(now: DateTime<Utc>, ttl: Duration) -> SessionClaims {
        SessionClaims {
            sub: "alice".into(),
            uid: Uuid::new_v4(),
            roles: vec!["USER".into()],
            permissions: vec!["READ".into()],
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4(),
            typ: TokenKind::Session,
        }
    }

    #[test]
    fn persist_secret_writes_and_reports_failure() {
        let dir = std::env::temp_dir().join(format!("orgo-secret-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("jwt-secret");
        persist_secret(&path, "s3cret").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cret");

        // A regular file where a directory is expected.
        let blocked = path.join("jwt-secret");
        assert!(persist_secret(&blocked, "s3cret").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn issued_token_decodes_to_same_claims() {
        let codec = TokenCodec::new(b"secret");
        let now = Utc::now();
        let claims = session_claims(now, Duration::hours(1));
        let token = codec.issue(&claims).unwrap();
        assert_eq!(token.split('.').count(), 3);
        let decoded: SessionClaims = codec.decode(&token, now).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let now = Utc::now();
        let token = TokenCodec::new(b"secret-a")
            .issue(&session_claims(now, Duration::hours(1)))
            .unwrap();
        let err = TokenCodec::new(b"secret-b")
            .decode::<SessionClaims>(&token, now)
            .unwrap_err();
        assert_eq!(err, CodecError::InvalidSignature);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let codec = TokenCodec::new(b"secret");
        let now = Utc::now();
        let token = codec.issue(&session_claims(now, Duration::hours(1))).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        // Escalate roles in the payload while keeping the original signature.
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let mut json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        json["roles"] = serde_json::json!(["ADMIN"]);
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json).unwrap());
        let forged_token = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert!(codec.decode::<SessionClaims>(&forged_token, now).is_err());

        // Flip one bit of the signature.
        let mut sig = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        sig[0] ^= 0x01;
        let bad_sig = format!("{}.{}.{}", parts[0], parts[1], URL_SAFE_NO_PAD.encode(sig));
        assert_eq!(
            codec.decode::<SessionClaims>(&bad_sig, now).unwrap_err(),
            CodecError::InvalidSignature
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = TokenCodec::new(b"secret");
        let err = codec.decode::<SessionClaims>("not-a-token", Utc::now()).unwrap_err();
        assert_eq!(err, CodecError::Malformed);
    }

    #[test]
    fn expiry_is_exclusive() {
        let codec = TokenCodec::new(b"secret");
        let now = Utc::now();
        let claims = session_claims(now, Duration::seconds(60));
        let token = codec.issue(&claims).unwrap();
        let at_expiry = DateTime::from_timestamp(claims.exp, 0).unwrap();
        assert!(codec.decode::<SessionClaims>(&token, at_expiry - Duration::seconds(1)).is_ok());
        assert_eq!(
            codec.decode::<SessionClaims>(&token, at_expiry).unwrap_err(),
            CodecError::Expired
        );
    }

    #[test]
    fn project_token_is_not_a_session_token() {
        let codec = TokenCodec::new(b"secret");
        let now = Utc::now();
        let claims = ProjectClaims {
            sub: "project_access".into(),
            uid: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            role: ProjectRole::User,
            iat: now.timestamp(),
            exp: (now + Duration::days(1)).timestamp(),
            jti: Uuid::new_v4(),
            typ: TokenKind::ProjectAccess,
        };
        let token = codec.issue(&claims).unwrap();
        assert_eq!(
            codec.decode::<SessionClaims>(&token, now).unwrap_err(),
            CodecError::Malformed
        );
        assert!(codec.decode::<ProjectClaims>(&token, now).is_ok());
    }
}
