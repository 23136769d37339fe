//! A small SMTP submission client.
//!
//! Supports plain TCP, STARTTLS upgrade via rustls, `AUTH PLAIN` and
//! dot-stuffed message transfer.

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, dot_stuff};
