//! Transports that deliver decoded mail records.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::Local;
use json2mail_common::{Address, Mail, internal, tracing};

use crate::{
    client::{Response, Result as ClientResult, SmtpClient},
    config::{SmtpConfig, TlsPolicy},
    error::DeliveryError,
    message::{Attachment, MessageBuilder},
};

/// Name announced in EHLO.
const EHLO_DOMAIN: &str = "localhost";

/// A mail transport.
///
/// Errors from [`send`](Mailer::send) concern one record only; the transport
/// stays usable for the next one.
#[async_trait]
pub trait Mailer: Send {
    async fn send(&mut self, mail: &Mail) -> Result<(), DeliveryError>;

    async fn close(self: Box<Self>) -> Result<(), DeliveryError>;
}

/// Accepts every record without sending anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunMailer;

#[async_trait]
impl Mailer for DryRunMailer {
    async fn send(&mut self, mail: &Mail) -> Result<(), DeliveryError> {
        internal!(
            level = DEBUG,
            "Dry run: not sending mail to {} recipient(s)",
            mail.recipients().count()
        );
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Delivers mail over one authenticated SMTP session.
pub struct SmtpMailer {
    client: SmtpClient,
    server: String,
    default_sender: Address,
    timeout: Duration,
}

impl SmtpMailer {
    /// Connect, negotiate TLS according to the configured policy and log in.
    ///
    /// # Errors
    ///
    /// Any failure to establish an authenticated session. With
    /// [`TlsPolicy::Required`], a server without STARTTLS yields
    /// [`DeliveryError::TlsUnsupported`].
    pub async fn connect(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let default_sender = config.default_sender()?;
        let server = config.address();
        let timeout = config.timeout();

        tracing::info!(%server, tls = ?config.tls, "Connecting to SMTP server");

        let client = with_timeout(timeout, "connect", SmtpClient::connect(&server, &config.host))
            .await?
            .map_err(|source| DeliveryError::Connect {
                server: server.clone(),
                source,
            })?;

        let mut mailer = Self {
            client,
            server,
            default_sender,
            timeout,
        };

        let greeting = mailer.call("greeting", |client| client.read_greeting()).await?;
        expect_code(&greeting, "greeting", 220)?;

        let mut ehlo = mailer.ehlo().await?;

        if config.tls != TlsPolicy::Disabled {
            if ehlo.has_extension("STARTTLS") {
                let response = mailer.call("STARTTLS", |client| client.starttls()).await?;
                expect_code(&response, "STARTTLS", 220)?;
                ehlo = mailer.ehlo().await?;
                tracing::debug!(server = %mailer.server, "TLS negotiated via STARTTLS");
            } else if config.tls == TlsPolicy::Required {
                return Err(DeliveryError::TlsUnsupported(mailer.server));
            } else {
                tracing::warn!(
                    server = %mailer.server,
                    "Server does not offer STARTTLS, continuing without encryption"
                );
            }
        }

        mailer.authenticate(&ehlo, &config.username, &config.password).await?;

        tracing::info!(server = %mailer.server, "SMTP session ready");
        Ok(mailer)
    }

    async fn ehlo(&mut self) -> Result<Response, DeliveryError> {
        let response = self.call("EHLO", |client| client.ehlo(EHLO_DOMAIN)).await?;
        expect_success(&response, "EHLO")?;
        Ok(response)
    }

    async fn authenticate(
        &mut self,
        ehlo: &Response,
        username: &str,
        password: &str,
    ) -> Result<(), DeliveryError> {
        if username.is_empty() {
            return Ok(());
        }

        let Some(mechanisms) = ehlo.extension_params("AUTH") else {
            tracing::warn!(server = %self.server, "Server does not offer AUTH, sending unauthenticated");
            return Ok(());
        };

        if !mechanisms.iter().any(|m| m.eq_ignore_ascii_case("PLAIN")) {
            return Err(DeliveryError::AuthUnsupported(self.server.clone()));
        }

        let response = self
            .call("AUTH", |client| client.auth_plain(username, password))
            .await?;
        expect_success(&response, "AUTH")
    }

    /// Run one client operation under the configured timeout.
    async fn call<'a, F, Fut>(
        &'a mut self,
        command: &'static str,
        operation: F,
    ) -> Result<Response, DeliveryError>
    where
        F: FnOnce(&'a mut SmtpClient) -> Fut,
        Fut: Future<Output = ClientResult<Response>> + 'a,
    {
        Ok(with_timeout(self.timeout, command, operation(&mut self.client)).await??)
    }

    async fn transaction(&mut self, mail: &Mail) -> Result<(), DeliveryError> {
        let sender = mail.from.clone().unwrap_or_else(|| self.default_sender.clone());

        let mut builder = MessageBuilder::for_mail(mail, sender.clone(), Local::now().fixed_offset());
        for path in mail.attachments.iter() {
            builder = builder.attach(Attachment::load(path).await?);
        }
        let message = builder.build();

        let envelope_from = sender.mailbox().to_string();
        let response = self
            .call("MAIL FROM", |client| client.mail_from(&envelope_from))
            .await?;
        expect_success(&response, "MAIL FROM")?;

        for recipient in mail.recipients() {
            let mailbox = recipient.mailbox().to_string();
            let response = self.call("RCPT TO", |client| client.rcpt_to(&mailbox)).await?;
            expect_success(&response, &format!("RCPT TO <{mailbox}>"))?;
        }

        let response = self.call("DATA", |client| client.data()).await?;
        expect_code(&response, "DATA", 354)?;

        let response = self
            .call("message data", |client| client.send_data(&message))
            .await?;
        expect_success(&response, "message data")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&mut self, mail: &Mail) -> Result<(), DeliveryError> {
        let result = self.transaction(mail).await;

        if let Err(err) = &result {
            tracing::debug!(server = %self.server, "Transaction failed, resetting: {err}");
            if let Err(reset) = self.call("RSET", |client| client.rset()).await {
                tracing::warn!(server = %self.server, "RSET failed: {reset}");
            }
        }

        result
    }

    async fn close(mut self: Box<Self>) -> Result<(), DeliveryError> {
        let response = self.call("QUIT", |client| client.quit()).await?;
        expect_code(&response, "QUIT", 221)?;
        tracing::info!(server = %self.server, "SMTP session closed");
        Ok(())
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    command: &'static str,
    future: impl Future<Output = T>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| DeliveryError::Timeout { command, timeout })
}

fn expect_success(response: &Response, command: &str) -> Result<(), DeliveryError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(rejected(response, command))
    }
}

fn expect_code(response: &Response, command: &str, code: u16) -> Result<(), DeliveryError> {
    if response.code == code {
        Ok(())
    } else {
        Err(rejected(response, command))
    }
}

fn rejected(response: &Response, command: &str) -> DeliveryError {
    DeliveryError::Rejected {
        command: command.to_string(),
        code: response.code,
        message: response.message(),
    }
}
