//! Errors raised while delivering mail.

use std::{io, path::PathBuf, time::Duration};

use json2mail_common::address_parser::AddressError;
use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The TCP connection to the server could not be opened.
    #[error("Failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: ClientError,
    },

    /// The connection failed after it was established.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The server did not answer a command in time.
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },

    /// The server answered a command with an unexpected reply code.
    #[error("Server rejected {command}: {code} {message}")]
    Rejected {
        command: String,
        code: u16,
        message: String,
    },

    /// STARTTLS is mandatory but the server does not offer it.
    #[error(
        "Server {0} does not support a secure connection. Use --allow-insecure to send without TLS."
    )]
    TlsUnsupported(String),

    /// The server offers AUTH, but not the PLAIN mechanism.
    #[error("Server {0} does not support AUTH PLAIN")]
    AuthUnsupported(String),

    /// The sender address derived from the configuration is not valid.
    #[error("Invalid sender address {address:?}: {source}")]
    InvalidSender {
        address: String,
        #[source]
        source: AddressError,
    },

    /// An attachment could not be read when building the message.
    #[error("Failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeliveryError {
    /// Returns `true` if the server answered with a permanent (5xx) failure.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 500)
    }
}
