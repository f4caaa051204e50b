//! Recipient identifiers (`user@server`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxrelayError};

/// Server half of a bare phone-number recipient.
pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";

/// A fully qualified chat identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    /// A user identifier on [`DEFAULT_USER_SERVER`].
    pub fn on_default_server(user: impl Into<String>) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

/// Parse an operator-supplied recipient string.
///
/// A leading `+` is stripped. Input without an `@` is treated as a bare user
/// on the default server; `user@server` is split as written. An identifier
/// with an empty user or server part is rejected.
pub fn parse_recipient(input: &str) -> Result<Jid> {
    let trimmed = input.strip_prefix('+').unwrap_or(input);

    let invalid = |reason: &str| VoxrelayError::InvalidRecipient {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    match trimmed.split_once('@') {
        None => {
            if trimmed.is_empty() {
                return Err(invalid("empty identifier"));
            }
            Ok(Jid::on_default_server(trimmed))
        }
        Some((user, server)) => {
            if user.is_empty() {
                return Err(invalid("no user part specified"));
            }
            if server.is_empty() {
                return Err(invalid("no server specified"));
            }
            Ok(Jid::new(user, server))
        }
    }
}
