//! SMTP transport configuration.

use std::time::Duration;

use json2mail_common::Address;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

/// Submission port used when the server address names none.
pub const DEFAULT_PORT: u16 = 587;

/// Per-command timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How STARTTLS is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Fail unless the server offers STARTTLS.
    #[default]
    Required,

    /// Use STARTTLS when offered, otherwise continue in plaintext.
    Opportunistic,

    /// Never attempt STARTTLS.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    pub password: String,

    #[serde(default)]
    pub tls: TlsPolicy,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SmtpConfig {
    /// Build a configuration from a `host[:port]` server string.
    ///
    /// The port falls back to [`DEFAULT_PORT`] when it is missing, is not a
    /// number, or lies outside `1..=65534`. IPv6 hosts may be bracketed.
    #[must_use]
    pub fn new(server: &str, username: impl Into<String>, password: impl Into<String>) -> Self {
        let (host, port) = split_server(server);

        Self {
            host,
            port,
            username: username.into(),
            password: password.into(),
            tls: TlsPolicy::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// `host:port`, suitable for opening a TCP connection.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Envelope sender for mail without a `from` field.
    ///
    /// This is the username when it already looks like an address, and
    /// `username@host` otherwise.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::InvalidSender`] if the result is not a valid address.
    pub fn default_sender(&self) -> Result<Address, DeliveryError> {
        let address = if self.username.contains('@') {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.host)
        };

        Address::parse(&address).map_err(|source| DeliveryError::InvalidSender { address, source })
    }
}

fn split_server(server: &str) -> (String, u16) {
    let server = server.trim();

    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') || is_bracketed(host) => (host, Some(port)),
        _ => (server, None),
    };

    let port = port
        .and_then(|port| port.parse::<u16>().ok())
        .filter(|port| (1..=65534).contains(port))
        .unwrap_or(DEFAULT_PORT);

    let host = if is_bracketed(host) {
        &host[1..host.len() - 1]
    } else {
        host
    };

    (host.to_string(), port)
}

fn is_bracketed(host: &str) -> bool {
    host.len() >= 2 && host.starts_with('[') && host.ends_with(']')
}
