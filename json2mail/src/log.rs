//! JSON lines record of what happened to each mail.
//!
//! Every line is one object: `{"timestamp": ..., "mail": {...}}` for a mail
//! that was sent, or `{"timestamp": ..., "error": ..., "source": ...}` for a
//! failure. `source` holds the input text the failing mail was decoded from.

use std::{fmt::Display, io::Write};

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use json2mail_common::Mail;
use serde::Serialize;

/// Source of timestamps for log entries.
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// The local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

#[derive(Serialize)]
struct MailEntry<'a> {
    timestamp: String,
    mail: &'a Mail,
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    timestamp: String,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

pub struct MailLog<W, C = SystemClock> {
    writer: W,
    clock: C,
}

impl<W: Write> MailLog<W> {
    pub const fn new(writer: W) -> Self {
        Self::with_clock(writer, SystemClock)
    }
}

impl<W: Write, C: Clock> MailLog<W, C> {
    pub const fn with_clock(writer: W, clock: C) -> Self {
        Self { writer, clock }
    }

    /// Record a mail that was handed to the transport successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub fn mail(&mut self, mail: &Mail) -> serde_json::Result<()> {
        let entry = MailEntry {
            timestamp: self.timestamp(),
            mail,
        };
        self.write(&entry)
    }

    /// Record a failure, optionally with the input text it concerns.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    pub fn error(&mut self, error: &dyn Display, source: Option<&str>) -> serde_json::Result<()> {
        let entry = ErrorEntry {
            timestamp: self.timestamp(),
            error: error.to_string(),
            source,
        };
        self.write(&entry)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn write(&mut self, entry: &impl Serialize) -> serde_json::Result<()> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(serde_json::Error::io)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use json2mail_common::ValidationError;

    use super::*;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<FixedOffset> {
            DateTime::parse_from_rfc3339("2024-03-15T09:30:00+09:00").unwrap()
        }
    }

    fn output(log: MailLog<Vec<u8>, FixedClock>) -> String {
        String::from_utf8(log.into_inner()).unwrap()
    }

    #[test]
    fn test_mail_entry() {
        let mut log = MailLog::with_clock(Vec::new(), FixedClock);
        let mail: Mail = serde_json::from_str(r#"{"to":"a@example.com","subject":"hi"}"#).unwrap();
        log.mail(&mail).unwrap();

        assert_eq!(
            output(log),
            "{\"timestamp\":\"2024-03-15T09:30:00+09:00\",\"mail\":{\"to\":[\"a@example.com\"],\"subject\":\"hi\"}}\n"
        );
    }

    #[test]
    fn test_error_entries() {
        let mut log = MailLog::with_clock(Vec::new(), FixedClock);
        log.error(&ValidationError::MissingRecipient, Some("{\"body\":\"x\"}"))
            .unwrap();
        log.error(&"connection lost", None).unwrap();

        let text = output(log);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(
            lines[0],
            serde_json::json!({
                "timestamp": "2024-03-15T09:30:00+09:00",
                "error": "field `to` is required",
                "source": "{\"body\":\"x\"}",
            })
        );
        assert_eq!(
            lines[1],
            serde_json::json!({
                "timestamp": "2024-03-15T09:30:00+09:00",
                "error": "connection lost",
            })
        );
    }

    #[test]
    fn test_utc_uses_z() {
        struct Utc;
        impl Clock for Utc {
            fn now(&self) -> DateTime<FixedOffset> {
                DateTime::parse_from_rfc3339("2024-03-15T00:00:00+00:00").unwrap()
            }
        }

        let mut log = MailLog::with_clock(Vec::new(), Utc);
        log.error(&"x", None).unwrap();
        let text = String::from_utf8(log.into_inner()).unwrap();
        assert!(text.starts_with("{\"timestamp\":\"2024-03-15T00:00:00Z\""));
    }
}
