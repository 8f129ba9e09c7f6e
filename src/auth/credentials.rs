//! Credential storage and management
//!
//! In-memory credential store with optional anonymous access.

use async_trait::async_trait;
use std::collections::HashMap;

use super::validator::{Authenticator, Principal, is_valid_input};
use crate::error::AuthError;

const MAX_CREDENTIAL_LENGTH: usize = 256;
const ANONYMOUS_NAMES: [&str; 2] = ["anonymous", "ftp"];

/// Authenticates against a fixed user table loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuthenticator {
    users: HashMap<String, String>,
    allow_anonymous: bool,
}

impl MemoryAuthenticator {
    pub fn new(users: HashMap<String, String>, allow_anonymous: bool) -> Self {
        Self {
            users,
            allow_anonymous,
        }
    }

    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users.insert(username.to_string(), password.to_string());
        self
    }

    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        if ANONYMOUS_NAMES.iter().any(|n| n.eq_ignore_ascii_case(username)) {
            if !self.allow_anonymous {
                return Err(AuthError::AnonymousDisabled);
            }
            // The password is conventionally the client's e-mail address.
            return Ok(Principal {
                name: username.to_ascii_lowercase(),
                anonymous: true,
            });
        }

        if !is_valid_input(password, MAX_CREDENTIAL_LENGTH) {
            return Err(AuthError::MalformedInput("Invalid password format".into()));
        }

        match self.users.get(username) {
            Some(stored) if stored == password => Ok(Principal {
                name: username.to_string(),
                anonymous: false,
            }),
            Some(_) => Err(AuthError::InvalidPassword(username.to_string())),
            None => Err(AuthError::UserNotFound(username.to_string())),
        }
    }
}
