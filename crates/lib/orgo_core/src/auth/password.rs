//! Password hashing via bcrypt.

use std::sync::LazyLock;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Reject empty passwords. Any other policy belongs to the caller.
pub fn require_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::ValidationError("Password must not be empty".into()));
    }
    Ok(())
}

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
///
/// A corrupt stored hash counts as a mismatch rather than an error, so
/// callers cannot distinguish it from a wrong password.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Hash checked against when the username is unknown, so a miss costs one
/// bcrypt verification like a wrong password does.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("orgolink-unknown-principal").ok());

/// Run a verification against [`DUMMY_HASH`] and discard the result.
pub fn verify_dummy_password(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn corrupt_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            require_password(""),
            Err(AuthError::ValidationError(_))
        ));
        assert!(require_password("pw1").is_ok());
    }

    #[test]
    fn dummy_hash_has_login_cost() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(hash.starts_with(&format!("$2b${BCRYPT_COST}$")));
        assert!(verify_password("orgolink-unknown-principal", hash));
        verify_dummy_password("whatever");
    }
}
