//! Error types for the json2mail-common crate.
//!
//! Address syntax errors live in [`crate::address_parser::AddressError`] and
//! reach callers wrapped in a [`ScanError::Data`] when they occur while
//! decoding a record.

use std::path::PathBuf;

use serde_json::error::Category;
use thiserror::Error;

/// Errors raised by [`crate::mail::Mail::validate`].
///
/// These are local to one record and never affect the scanner.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The record has no `to` address.
    #[error("field `to` is required")]
    MissingRecipient,

    /// An attachment path does not name an existing, readable file.
    #[error("attachment not found: {}", .0.display())]
    AttachmentNotFound(PathBuf),
}

/// Errors that terminate a [`crate::scanner::MailScanner`].
#[derive(Debug, Error)]
pub enum ScanError {
    /// The input is not well-formed JSON.
    #[error("Malformed JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// The input ended in the middle of a value.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(#[source] serde_json::Error),

    /// Well-formed JSON that does not describe mail, including bad addresses.
    #[error("Invalid mail: {0}")]
    Data(#[source] serde_json::Error),

    /// Reading the underlying byte stream failed.
    #[error("Failed to read input: {0}")]
    Io(#[source] serde_json::Error),
}

impl ScanError {
    const fn inner(&self) -> &serde_json::Error {
        match self {
            Self::Syntax(err) | Self::UnexpectedEof(err) | Self::Data(err) | Self::Io(err) => err,
        }
    }

    /// One-based line of the input at which decoding failed.
    #[must_use]
    pub fn line(&self) -> usize {
        self.inner().line()
    }

    /// One-based column of the input at which decoding failed.
    #[must_use]
    pub fn column(&self) -> usize {
        self.inner().column()
    }

    /// Returns `true` if the stream was cut off mid-value.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof(_))
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Syntax => Self::Syntax(err),
            Category::Eof => Self::UnexpectedEof(err),
            Category::Data => Self::Data(err),
            Category::Io => Self::Io(err),
        }
    }
}
