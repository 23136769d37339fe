//! Decoding of JSON mail descriptions.
//!
//! A [`scanner::MailScanner`] reads a byte stream holding mail objects, arrays
//! of mail objects, or any whitespace-separated sequence of both, and yields
//! one [`mail::Mail`] at a time.

pub mod address;
pub mod address_parser;
pub mod encoded_word;
pub mod error;
pub mod logging;
pub mod mail;
pub mod scanner;
pub mod string_list;

pub use tracing;

pub use address::{Address, AddressList, Mailbox};
pub use error::{ScanError, ValidationError};
pub use mail::{Mail, MailList};
pub use scanner::{MailScanner, ScannerState};
pub use string_list::StringList;
