//! Internet message construction with MIME attachments.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset};
use json2mail_common::{Address, AddressList, Mail, encoded_word};

use crate::error::DeliveryError;

/// Base64 line length inside MIME parts.
const BASE64_LINE: usize = 76;

/// A file to attach, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Read a file from disk, naming it after the last path component.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Attachment`] if the file cannot be read.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeliveryError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;

        let filename = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |name| name.to_string_lossy().into_owned());

        Ok(Self {
            filename,
            content_type: guess_content_type(path).to_string(),
            data,
        })
    }
}

/// Builder for a complete RFC 5322 message.
///
/// Bcc recipients never appear in the headers; they belong only in the
/// envelope.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    from: Address,
    to: AddressList,
    cc: AddressList,
    subject: String,
    body: String,
    date: DateTime<FixedOffset>,
    boundary: String,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(from: Address, date: DateTime<FixedOffset>) -> Self {
        Self {
            from,
            to: AddressList::default(),
            cc: AddressList::default(),
            subject: String::new(),
            body: String::new(),
            boundary: format!(
                "=_json2mail_{:x}{:08x}",
                date.timestamp(),
                date.timestamp_subsec_nanos()
            ),
            date,
            attachments: Vec::new(),
        }
    }

    /// Start from a decoded record, leaving attachments to be added.
    #[must_use]
    pub fn for_mail(mail: &Mail, from: Address, date: DateTime<FixedOffset>) -> Self {
        Self::new(from, date)
            .to(mail.to.clone())
            .cc(mail.cc.clone())
            .subject(mail.subject.clone())
            .body(mail.body.clone())
    }

    #[must_use]
    pub fn to(mut self, to: AddressList) -> Self {
        self.to = to;
        self
    }

    #[must_use]
    pub fn cc(mut self, cc: AddressList) -> Self {
        self.cc = cc;
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Render the message with CRLF line endings.
    #[must_use]
    pub fn build(&self) -> String {
        let mut message = String::with_capacity(1024 + self.body.len());

        push_header(&mut message, "Date", &self.date.to_rfc2822());
        push_header(&mut message, "From", &header_address(&self.from));
        if !self.to.is_empty() {
            push_header(&mut message, "To", &header_address_list(&self.to));
        }
        if !self.cc.is_empty() {
            push_header(&mut message, "Cc", &header_address_list(&self.cc));
        }
        if !self.subject.is_empty() {
            push_header(&mut message, "Subject", &encoded_word::encode(&self.subject));
        }
        push_header(&mut message, "MIME-Version", "1.0");

        if self.attachments.is_empty() {
            self.push_text_part(&mut message);
            message.push_str(&crlf(&self.body));
            return message;
        }

        push_header(
            &mut message,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{}\"", self.boundary),
        );
        message.push_str("\r\n");

        message.push_str(&format!("--{}\r\n", self.boundary));
        self.push_text_part(&mut message);
        message.push_str(&crlf(&self.body));
        message.push_str("\r\n");

        for attachment in &self.attachments {
            message.push_str(&format!("--{}\r\n", self.boundary));
            push_header(&mut message, "Content-Type", &attachment.content_type);
            push_header(&mut message, "Content-Transfer-Encoding", "base64");
            push_header(
                &mut message,
                "Content-Disposition",
                &format!(
                    "attachment; filename=\"{}\"",
                    escape_quoted(&encoded_word::encode(&attachment.filename))
                ),
            );
            message.push_str("\r\n");
            message.push_str(&wrap_base64(&attachment.data));
        }

        message.push_str(&format!("--{}--\r\n", self.boundary));
        message
    }

    fn push_text_part(&self, message: &mut String) {
        let encoding = if self.body.is_ascii() { "7bit" } else { "8bit" };
        push_header(message, "Content-Type", "text/plain; charset=utf-8");
        push_header(message, "Content-Transfer-Encoding", encoding);
        message.push_str("\r\n");
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    message.push_str(name);
    message.push_str(": ");
    message.push_str(value);
    message.push_str("\r\n");
}

fn crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Header form of an address. Non-ASCII display names become encoded-words,
/// everything else keeps the canonical form.
fn header_address(address: &Address) -> String {
    match address.display_name() {
        Some(name) if !encoded_word::is_plain(name) => {
            format!("{} <{}>", encoded_word::encode(name), address.mailbox())
        }
        _ => address.format(),
    }
}

fn header_address_list(list: &AddressList) -> String {
    list.iter().map(header_address).collect::<Vec<_>>().join(", ")
}

fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);

    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        wrapped.push_str(&String::from_utf8_lossy(line));
        wrapped.push_str("\r\n");
    }

    wrapped
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    fn date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-15T09:30:00+09:00").unwrap()
    }

    fn sender() -> Address {
        Address::parse("Sender <sender@example.com>").unwrap()
    }

    fn header_block(message: &str) -> &str {
        message.split("\r\n\r\n").next().unwrap()
    }

    #[test]
    fn test_simple_message() {
        let mail: Mail = serde_json::from_str(
            r#"{"to":"a@example.com, b@example.com","cc":"c@example.com","bcc":"secret@example.com",
                "subject":"Test","body":"line one\nline two"}"#,
        )
        .unwrap();

        let message = MessageBuilder::for_mail(&mail, sender(), date()).build();
        let headers = header_block(&message);

        assert!(headers.contains("Date: Fri, 15 Mar 2024 09:30:00 +0900\r\n"));
        assert!(headers.contains("From: \"Sender\" <sender@example.com>\r\n"));
        assert!(headers.contains("To: a@example.com, b@example.com\r\n"));
        assert!(headers.contains("Cc: c@example.com\r\n"));
        assert!(headers.contains("Subject: Test\r\n"));
        assert!(headers.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(!message.contains("secret@example.com"));
        assert!(message.ends_with("\r\n\r\nline one\r\nline two"));
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let message = MessageBuilder::new(sender(), date()).build();
        assert!(!message.contains("To:"));
        assert!(!message.contains("Cc:"));
        assert!(!message.contains("Subject:"));
    }

    #[test]
    fn test_non_ascii_headers_are_encoded() {
        let mail: Mail = serde_json::from_str(
            r#"{"to":"山田 <yamada@example.jp>, plain@example.com","cc":"Café <cafe@example.fr>",
                "subject":"こんにちは","body":"本文"}"#,
        )
        .unwrap();
        let from = Address::parse("送信者 <s@example.com>").unwrap();

        let message = MessageBuilder::for_mail(&mail, from, date()).build();
        let headers = header_block(&message);

        assert!(headers.is_ascii(), "{headers}");
        assert!(headers.contains("From: =?UTF-8?B?6YCB5L+h6ICF?= <s@example.com>\r\n"));
        assert!(headers.contains("To: =?UTF-8?B?5bGx55Sw?= <yamada@example.jp>, plain@example.com\r\n"));
        assert!(headers.contains("Subject: =?UTF-8?B?44GT44KT44Gr44Gh44Gv?=\r\n"));
        assert!(headers.contains("Content-Transfer-Encoding: 8bit"));

        // the canonical form used for logging is unchanged
        assert_eq!(mail.to.format()[0], "\"山田\" <yamada@example.jp>");
    }

    #[test]
    fn test_encoded_header_parses_back() {
        let address = Address::parse("\"山田, 太郎\" <yamada@example.jp>").unwrap();
        let reparsed = Address::parse(&header_address(&address)).unwrap();
        assert_eq!(reparsed, address);
    }

    #[test]
    fn test_with_attachment() {
        let message = MessageBuilder::new(sender(), date())
            .subject("See attached")
            .body("hello")
            .boundary("BOUNDARY")
            .attach(Attachment {
                filename: "test.txt".to_string(),
                content_type: "text/plain".to_string(),
                data: b"Hello World".to_vec(),
            })
            .build();

        assert!(message.contains("Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n"));
        assert!(message.contains("--BOUNDARY\r\nContent-Type: text/plain; charset=utf-8\r\n"));
        assert!(message.contains("Content-Disposition: attachment; filename=\"test.txt\"\r\n"));
        assert!(message.contains("\r\n\r\nSGVsbG8gV29ybGQ=\r\n--BOUNDARY--\r\n"));
    }

    #[test]
    fn test_base64_wraps_lines() {
        let wrapped = wrap_base64(&[0u8; 100]);
        let lines: Vec<_> = wrapped.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), BASE64_LINE);
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a/report.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(guess_content_type(Path::new("Makefile")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_load_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"{}")
            .unwrap();

        let attachment = Attachment::load(&path).await.unwrap();
        assert_eq!(attachment.filename, "data.json");
        assert_eq!(attachment.content_type, "application/json");
        assert_eq!(attachment.data, b"{}");

        let err = Attachment::load(dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Attachment { .. }));
    }
}
