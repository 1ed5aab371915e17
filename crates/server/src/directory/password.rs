//! Stored account credentials and the password format policy.
//!
//! Stored values are PHC strings from Argon2id v19. A PHC string carries its own cost
//! parameters, so hashes written with other settings keep verifying.

use crate::config::PasswordPolicy;
use crate::error::DirectoryError;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Characters allowed in a password besides ASCII letters and digits.
const PASSWORD_SYMBOLS: &str = "-_!$*=^`{|}~.@";

fn argon2id() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

pub fn hash_password(password: &str) -> Result<String, DirectoryError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2id()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DirectoryError::Hash(e.to_string()))
}

/// `false` for anything stored that is not a PHC hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|hash| {
        argon2id()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    })
}

/// Length is counted in characters; only ASCII alphanumerics and [`PASSWORD_SYMBOLS`] pass.
pub fn is_valid_password(password: &str, policy: &PasswordPolicy) -> bool {
    let len = password.chars().count();
    (policy.min_length..=policy.max_length).contains(&len)
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_value_is_argon2id_phc() {
        let stored = hash_password("password1").unwrap();
        assert!(stored.starts_with("$argon2id$v=19$"));
        assert!(verify_password("password1", &stored));
        assert!(!verify_password("Password1", &stored));
    }

    #[test]
    fn accounts_sharing_a_password_store_different_values() {
        let alice = hash_password("password1").unwrap();
        let bob = hash_password("password1").unwrap();
        assert_ne!(alice, bob);
        assert!(verify_password("password1", &bob));
    }

    #[test]
    fn non_phc_values_never_match() {
        for stored in ["", "password1", "$argon2id$broken"] {
            assert!(!verify_password("password1", stored));
        }
    }

    #[test]
    fn policy_length_bounds() {
        let policy = PasswordPolicy::default();
        assert!(is_valid_password("abc123", &policy));
        assert!(!is_valid_password("abc12", &policy));
        assert!(is_valid_password(&"x".repeat(32), &policy));
        assert!(!is_valid_password(&"x".repeat(33), &policy));

        let strict = PasswordPolicy {
            min_length: 8,
            max_length: 64,
        };
        assert!(!is_valid_password("abc123", &strict));
    }

    #[test]
    fn policy_character_set() {
        let policy = PasswordPolicy::default();
        assert!(is_valid_password("a-b_c!$*=^`{|}~.@", &policy));
        assert!(!is_valid_password("has space", &policy));
        assert!(!is_valid_password("pässwort", &policy));
        assert!(!is_valid_password("semi;colon", &policy));
    }
}
