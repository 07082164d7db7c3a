//! Credentials for remote operations
//!
//! Callers hand the repository a [`CredentialProvider`]; it is resolved once
//! and the resulting [`Credentials`] travel with every fetch and push. Only the
//! `bit://` transport sends them; local remotes ignore them.

use crate::artifacts::core::errors::BitError;
use std::fmt;

pub const USERNAME_ENV: &str = "BIT_USERNAME";
pub const PASSWORD_ENV: &str = "BIT_PASSWORD";
pub const TOKEN_ENV: &str = "BIT_TOKEN";

#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    NoAuth,
    UsernamePassword {
        username: String,
        password: String,
    },
    Token(String),
    SshKey {
        private_key_path: std::path::PathBuf,
        passphrase: Option<String>,
    },
}

impl Credentials {
    /// Value of the `auth=` field of a service request, if any
    pub fn to_request_field(&self) -> anyhow::Result<Option<String>> {
        match self {
            Credentials::NoAuth => Ok(None),
            Credentials::Token(token) => Ok(Some(format!("token:{token}"))),
            Credentials::UsernamePassword { username, password } => {
                Ok(Some(format!("basic:{username}:{password}")))
            }
            Credentials::SshKey { .. } => Err(BitError::TransportFailure(
                "ssh keys are not supported by the bit:// transport".to_string(),
            )
            .into()),
        }
    }

    pub fn from_request_field(field: &str) -> Option<Self> {
        if let Some(token) = field.strip_prefix("token:") {
            return Some(Credentials::Token(token.to_string()));
        }

        let (username, password) = field.strip_prefix("basic:")?.split_once(':')?;
        Some(Credentials::UsernamePassword {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// The secret a daemon compares against its access token
    pub fn secret(&self) -> Option<&str> {
        match self {
            Credentials::Token(token) => Some(token),
            Credentials::UsernamePassword { password, .. } => Some(password),
            Credentials::NoAuth | Credentials::SshKey { .. } => None,
        }
    }
}

// secrets stay out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::NoAuth => write!(f, "NoAuth"),
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Token(_) => write!(f, "Token(..)"),
            Credentials::SshKey {
                private_key_path, ..
            } => f
                .debug_struct("SshKey")
                .field("private_key_path", private_key_path)
                .finish_non_exhaustive(),
        }
    }
}

pub trait CredentialProvider {
    fn resolve(&self) -> anyhow::Result<Credentials>;
}

impl CredentialProvider for Credentials {
    fn resolve(&self) -> anyhow::Result<Credentials> {
        Ok(self.clone())
    }
}

/// Reads `BIT_TOKEN`, or `BIT_USERNAME` with `BIT_PASSWORD`, from the environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn resolve(&self) -> anyhow::Result<Credentials> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            return Ok(Credentials::Token(token));
        }

        match (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV)) {
            (Ok(username), Ok(password)) => Ok(Credentials::UsernamePassword { username, password }),
            (Ok(_), Err(_)) => Err(BitError::InvalidName(format!(
                "{USERNAME_ENV} is set but {PASSWORD_ENV} is not"
            ))
            .into()),
            _ => Ok(Credentials::NoAuth),
        }
    }
}
