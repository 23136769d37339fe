//! Delivery of decoded mail records over SMTP.
//!
//! [`SmtpMailer`] keeps one authenticated session open for the whole input
//! stream. [`DryRunMailer`] accepts everything and sends nothing.

pub mod client;
mod config;
mod error;
mod mailer;
pub mod message;

pub use config::{DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, SmtpConfig, TlsPolicy};
pub use error::DeliveryError;
pub use mailer::{DryRunMailer, Mailer, SmtpMailer};
pub use message::{Attachment, MessageBuilder};
