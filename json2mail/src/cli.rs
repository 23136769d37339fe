//! Command line and environment configuration.

use std::time::Duration;

use clap::{Parser, builder::BoolishValueParser};
use json2mail_delivery::{DEFAULT_TIMEOUT_SECS, SmtpConfig, TlsPolicy};

use crate::error::ConfigError;

/// Send e-mails described by JSON read from standard input.
///
/// The input may hold mail objects, arrays of mail objects, or any sequence
/// of both separated by whitespace.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "json2mail", version, long_about = None)]
pub struct Options {
    /// SMTP server address, `host[:port]` (port defaults to 587)
    #[arg(long, env = "JSON_MAIL_SERVER")]
    pub server: Option<String>,

    /// Username for logging in to the SMTP server, also the default sender
    #[arg(long, env = "JSON_MAIL_USERNAME")]
    pub username: Option<String>,

    /// Password for logging in to the SMTP server
    #[arg(long, env = "JSON_MAIL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Send without TLS when the server does not offer STARTTLS
    #[arg(long, env = "JSON_MAIL_ALLOW_INSECURE", value_parser = BoolishValueParser::new())]
    pub allow_insecure: bool,

    /// Decode, validate and log every mail without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Milliseconds to wait between two sends
    #[arg(long, env = "JSON_MAIL_INTERVAL_MS", default_value_t = 0)]
    pub interval_ms: u64,

    /// Seconds to wait for each SMTP reply
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

/// Which transport to deliver with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    DryRun,
    Smtp(SmtpConfig),
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub transport: Transport,
    pub interval: Duration,
}

impl Options {
    /// Check for required options and build the runtime settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] listing every required option that is absent
    /// or empty. Nothing is required for a dry run.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let interval = Duration::from_millis(self.interval_ms);

        if self.dry_run {
            return Ok(Settings {
                transport: Transport::DryRun,
                interval,
            });
        }

        let server = present(self.server.as_deref());
        let username = present(self.username.as_deref());
        let password = present(self.password.as_deref());

        let (Some(server), Some(username), Some(password)) = (server, username, password) else {
            let missing = [
                (server.is_none(), "--server"),
                (username.is_none(), "--username"),
                (password.is_none(), "--password"),
            ]
            .into_iter()
            .filter_map(|(missing, name)| missing.then_some(name))
            .collect();
            return Err(ConfigError::Missing(missing));
        };

        let tls = if self.allow_insecure {
            TlsPolicy::Opportunistic
        } else {
            TlsPolicy::Required
        };

        Ok(Settings {
            transport: Transport::Smtp(
                SmtpConfig::new(server, username, password)
                    .with_tls(tls)
                    .with_timeout_secs(self.timeout_secs),
            ),
            interval,
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}
