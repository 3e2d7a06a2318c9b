use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Settings;

pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    TooShort,
    #[error("incorrect password")]
    Incorrect,
    #[error("no password has been set")]
    NotSet,
}

/// SHA-256 hex digest of a password. Only the digest is ever stored.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Set (or replace) the gate password.
pub fn set_password(settings: &mut Settings, password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::TooShort);
    }
    settings.password_hash = Some(hash_password(password));
    Ok(())
}

/// Check a password attempt against the stored hash.
pub fn verify_password(settings: &Settings, password: &str) -> Result<(), AuthError> {
    match settings.password_hash.as_deref() {
        None => Err(AuthError::NotSet),
        Some(stored) if stored == hash_password(password) => Ok(()),
        Some(_) => Err(AuthError::Incorrect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        // Well-known SHA-256 of "password".
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn set_then_verify() {
        let mut settings = Settings::default();
        assert_eq!(set_password(&mut settings, "abc"), Err(AuthError::TooShort));
        set_password(&mut settings, "sesame").unwrap();
        assert_eq!(verify_password(&settings, "sesame"), Ok(()));
        assert_eq!(
            verify_password(&settings, "sesame!"),
            Err(AuthError::Incorrect)
        );
    }

    #[test]
    fn verify_without_password() {
        let settings = Settings::default();
        assert_eq!(verify_password(&settings, "x"), Err(AuthError::NotSet));
    }
}
