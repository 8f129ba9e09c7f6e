//! Authentication validator
//!
//! Defines the credential-validation contract the PASS handler consumes and the
//! basic input sanitation shared by all providers.

use async_trait::async_trait;

use crate::error::AuthError;

/// The identity a session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub anonymous: bool,
}

/// Credential validation provider.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validates a username/password pair and returns who logged in.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError>;
}

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
pub fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

/// Rejects usernames the USER handler should not even ask a password for.
pub fn validate_username(username: &str, max_length: usize) -> Result<(), AuthError> {
    if !is_valid_input(username, max_length) {
        return Err(AuthError::MalformedInput("Invalid username format".into()));
    }
    if username.contains(['#', ',', '%']) {
        return Err(AuthError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_sanitation() {
        assert!(is_valid_input("alice", 32));
        assert!(!is_valid_input("   ", 32));
        assert!(!is_valid_input("a\0b", 32));
        assert!(!is_valid_input("abcdef", 3));
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("anonymous", 32).is_ok());
        assert!(matches!(
            validate_username("bad#name", 32),
            Err(AuthError::InvalidUsername(_))
        ));
    }
}
