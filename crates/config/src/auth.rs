//! Basic-auth credential

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, SettingsError};

/// Credential parsed from `SHUNT_BASIC_AUTH` (`user:password`)
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    /// Parse a `user:password` pair
    ///
    /// The password may itself contain `:`; only the first one splits.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((user, password)) = raw.split_once(':') else {
            return Err(SettingsError::invalid_value(
                "SHUNT_BASIC_AUTH",
                "expected user:password",
            ));
        };

        if user.is_empty() {
            return Err(SettingsError::invalid_value(
                "SHUNT_BASIC_AUTH",
                "user must not be empty",
            ));
        }

        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// User part of the credential
    pub fn user(&self) -> &str {
        &self.user
    }

    /// `Basic <base64>` value for an Authorization header
    pub fn authorization_value(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {encoded}")
    }
}

// The password must never end up in logs.
impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
