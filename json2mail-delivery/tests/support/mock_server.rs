//! Scripted SMTP server for exercising the mailer.
#![allow(dead_code)]
//!
//! Listens on a random local port, answers each connection from a fixed
//! configuration and records every command it receives.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// A command received by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    StartTls,
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content after DATA, with dot-stuffing removed.
    Message(String),
    Rset,
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: Reply,
    capabilities: Vec<String>,
    auth: Reply,
    mail_from: Reply,
    rejected_recipients: Vec<String>,
    data_end: Reply,
    silent_on: Option<String>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.example.com ESMTP"),
            capabilities: vec!["AUTH PLAIN LOGIN".to_string(), "8BITMIME".to_string()],
            auth: Reply::new(235, "Authentication successful"),
            mail_from: Reply::new(250, "OK"),
            rejected_recipients: Vec::new(),
            data_end: Reply::new(250, "OK: queued"),
            silent_on: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut lines = vec!["mock.example.com".to_string()];
        lines.extend(self.capabilities.iter().cloned());

        let last = lines.len() - 1;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let separator = if i == last { ' ' } else { '-' };
                format!("250{separator}{line}\r\n")
            })
            .collect::<String>()
            .into_bytes()
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// Every message body received so far.
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(&config.greeting.to_bytes()).await?;

        loop {
            line.clear();
            match timeout(Duration::from_secs(10), reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Err(_) => return Ok(()),
                Ok(result) => result?,
            };

            let cmd_line = line.trim_end();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));
            let verb = verb.to_uppercase();

            if config.silent_on.as_deref() == Some(verb.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let (command, reply) = match verb.as_str() {
                "EHLO" => (SmtpCommand::Ehlo(argument.to_string()), config.ehlo_bytes()),
                "STARTTLS" => (
                    SmtpCommand::StartTls,
                    Reply::new(502, "Command not implemented").to_bytes(),
                ),
                "AUTH" => (SmtpCommand::Auth(argument.to_string()), config.auth.to_bytes()),
                "MAIL" => (
                    SmtpCommand::MailFrom(argument.to_string()),
                    config.mail_from.to_bytes(),
                ),
                "RCPT" => {
                    let rejected = config
                        .rejected_recipients
                        .iter()
                        .any(|recipient| argument.contains(recipient.as_str()));
                    let reply = if rejected {
                        Reply::new(550, "No such user")
                    } else {
                        Reply::new(250, "OK")
                    };
                    (SmtpCommand::RcptTo(argument.to_string()), reply.to_bytes())
                }
                "DATA" => (
                    SmtpCommand::Data,
                    Reply::new(354, "End data with <CR><LF>.<CR><LF>").to_bytes(),
                ),
                "RSET" => (SmtpCommand::Rset, Reply::new(250, "OK").to_bytes()),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&Reply::new(221, "Bye").to_bytes()).await?;
                    return Ok(());
                }
                _ => (
                    SmtpCommand::Other(cmd_line.to_string()),
                    Reply::new(500, "Unknown command").to_bytes(),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            commands.write().await.push(command);
            writer.write_all(&reply).await?;

            if is_data {
                let message = Self::read_message(&mut reader).await?;
                commands.write().await.push(SmtpCommand::Message(message));
                writer.write_all(&config.data_end.to_bytes()).await?;
            }
        }
    }

    async fn read_message<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> std::io::Result<String> {
        let mut message = String::new();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 || line == ".\r\n" {
                return Ok(message);
            }
            message.push_str(line.strip_prefix('.').unwrap_or(&line));
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = Reply::new(code, message);
        self
    }

    /// Replace the EHLO keywords advertised after the greeting line.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from = Reply::new(code, message);
        self
    }

    /// Answer 550 to RCPT TO for any address containing `recipient`.
    #[must_use]
    pub fn rejecting_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.config.rejected_recipients.push(recipient.into());
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Never answer the given command verb.
    #[must_use]
    pub fn silent_on(mut self, verb: impl Into<String>) -> Self {
        self.config.silent_on = Some(verb.into());
        self
    }

    /// Bind to a random local port and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));

        let server_commands = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                let config = Arc::clone(&config);
                let commands = Arc::clone(&server_commands);
                tokio::spawn(async move {
                    let _ = MockSmtpServer::handle_client(stream, config, commands).await;
                });
            }
        });

        Ok(MockSmtpServer { addr, commands })
    }
}
