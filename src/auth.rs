//! Admin authorization capability.
//!
//! Callers prove an administrator identity once, at the boundary, through an
//! [`Authorizer`]. The resulting [`AdminIdentity`] is passed into every
//! engine entry point; the engine logs it but never re-checks it.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::AuthConfig;

/// An identity that has passed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    email: String,
}

impl AdminIdentity {
    /// The operator of a local CLI session. Shell access to the config and
    /// database is the authorization.
    pub fn local_operator() -> Self {
        Self {
            email: "local-operator".to_string(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing admin identity")]
    Missing,
    #[error("{0} is not an administrator")]
    Forbidden(String),
}

/// Decides whether a claimed identity is an administrator.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, claimed: Option<&str>) -> Result<AdminIdentity, AuthError>;
}

/// Case-insensitive email allowlist.
#[derive(Debug, Clone, Default)]
pub struct AllowlistAuthorizer {
    emails: HashSet<String>,
}

impl AllowlistAuthorizer {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.admin_emails)
    }
}

impl Authorizer for AllowlistAuthorizer {
    fn authorize(&self, claimed: Option<&str>) -> Result<AdminIdentity, AuthError> {
        let email = claimed
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::Missing)?;
        if self.emails.contains(&email) {
            Ok(AdminIdentity { email })
        } else {
            Err(AuthError::Forbidden(email))
        }
    }
}
