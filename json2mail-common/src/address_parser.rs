//! RFC 5322 compliant mailbox parser
//!
//! Parses the address syntax found in `To`, `Cc`, `Bcc` and `From` headers:
//! bare addr-specs, `Name <addr>` forms with atom or quoted display names,
//! comments, groups, and the obsolete empty list entries that many mail
//! clients still emit.
//!
//! # ABNF Grammar (RFC 5322 Section 3.4)
//!
//! ```text
//! address-list   = (address *("," address)) / obs-addr-list
//! address        = mailbox / group
//! mailbox        = name-addr / addr-spec
//! name-addr      = [display-name] angle-addr
//! angle-addr     = [CFWS] "<" addr-spec ">" [CFWS]
//! group          = display-name ":" [group-list] ";" [CFWS]
//! display-name   = phrase
//! phrase         = 1*word / obs-phrase
//! word           = atom / quoted-string
//! addr-spec      = local-part "@" domain
//! local-part     = dot-atom / quoted-string
//! domain         = dot-atom / domain-literal
//! ```
//!
//! Non-ASCII characters are accepted wherever `atext`, `qtext` or `dtext`
//! are (RFC 6532).
//!
//! # Size Constraints
//!
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::{
    address::{Address, Mailbox},
    encoded_word,
};

/// Result type for address parsing
pub type Result<T> = std::result::Result<T, AddressError>;

/// Errors that can occur during address parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The input holds no address at all (empty or whitespace/comments only)
    #[error("No address")]
    NoAddress,
    /// More than one mailbox where exactly one was expected
    #[error("Expected a single address")]
    ExpectedSingleAddress,
    /// A group with no members where exactly one mailbox was expected
    #[error("Empty group")]
    EmptyGroup,
    /// Two addresses in a list were not separated by a comma
    #[error("Expected comma, found '{0}'")]
    ExpectedComma(char),
    /// Local-part exceeds 64 octets
    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,
    /// Domain exceeds 255 octets
    #[error("Domain exceeds 255 octets")]
    DomainTooLong,
    /// A display name was given without an angle-addr
    #[error("Missing angle-addr after display name")]
    MissingAngleAddr,
    /// Missing closing angle bracket
    #[error("Missing closing angle bracket '>'")]
    MissingCloseBracket,
    /// Missing '@' separator in addr-spec
    #[error("Missing '@' separator in address")]
    MissingAtSign,
    /// Phrase contains no words
    #[error("Missing word in display name")]
    EmptyPhrase,
    /// Invalid character in local-part
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    /// Invalid character in domain
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    /// Invalid domain literal format
    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
    /// Unclosed quoted string
    #[error("Unclosed quoted string")]
    UnclosedQuotedString,
    /// Invalid character in quoted string
    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
    /// Unbalanced parentheses in a comment
    #[error("Unclosed comment")]
    UnclosedComment,
    /// Group not terminated by ';'
    #[error("Unclosed group, expected ';'")]
    UnclosedGroup,
}

/// Parse exactly one mailbox.
///
/// Accepts `user@example.com`, `Name <user@example.com>` and
/// `"Quoted Name" <user@example.com>`. A group holding exactly one member is
/// accepted as that member.
///
/// # Errors
///
/// Returns `AddressError` if the input holds zero or several mailboxes, or is
/// not valid RFC 5322 address syntax.
pub fn parse_address(input: &str) -> Result<Address> {
    let mut parser = Parser::new(input);
    let mut found = Vec::with_capacity(1);

    parser.parse_address(true, &mut found)?;
    parser.skip_cfws()?;
    if !parser.is_empty() {
        return Err(AddressError::ExpectedSingleAddress);
    }

    let mut found = found.into_iter();
    match (found.next(), found.next()) {
        (Some(address), None) => Ok(address),
        (None, _) => Err(AddressError::EmptyGroup),
        (Some(_), Some(_)) => Err(AddressError::ExpectedSingleAddress),
    }
}

/// Parse a comma-separated list of mailboxes and groups.
///
/// Group members are flattened into the result in order. Empty list entries
/// (`a@example.com, , b@example.com`) and trailing commas are tolerated.
///
/// # Errors
///
/// Returns [`AddressError::NoAddress`] when the input contains no address at
/// all, or another `AddressError` if any entry is malformed.
pub fn parse_address_list(input: &str) -> Result<Vec<Address>> {
    let mut parser = Parser::new(input);
    let mut addresses = Vec::new();

    loop {
        parser.skip_cfws()?;
        if parser.eat(',') {
            continue;
        }

        parser.parse_address(true, &mut addresses)?;

        parser.skip_cfws()?;
        if parser.is_empty() {
            break;
        }
        if !parser.eat(',') {
            return Err(AddressError::ExpectedComma(
                parser.peek().unwrap_or_default(),
            ));
        }

        loop {
            parser.skip_cfws()?;
            if !parser.eat(',') {
                break;
            }
        }
        if parser.is_empty() {
            break;
        }
    }

    Ok(addresses)
}

struct Parser<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Parser<'a> {
    #[inline]
    const fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.input[self.cursor..].chars().next()
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.cursor += ch.len_utf8();
        Some(ch)
    }

    #[inline]
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += expected.len_utf8();
            true
        } else {
            false
        }
    }

    #[inline]
    const fn is_empty(&self) -> bool {
        self.cursor >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.cursor += 1;
        }
    }

    /// Skip folding whitespace and (nested) comments.
    fn skip_cfws(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                return Ok(());
            }
            self.skip_comment()?;
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        let mut depth = 0usize;

        while let Some(ch) = self.bump() {
            match ch {
                '\\' => {
                    self.bump().ok_or(AddressError::UnclosedComment)?;
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        Err(AddressError::UnclosedComment)
    }

    /// Parse one `address` production, appending its mailboxes to `out`.
    fn parse_address(&mut self, allow_group: bool, out: &mut Vec<Address>) -> Result<()> {
        self.skip_cfws()?;
        if self.is_empty() {
            return Err(AddressError::NoAddress);
        }

        // addr-spec is the more restrictive grammar, so it is tried first
        let checkpoint = self.cursor;
        let spec_error = match self.consume_addr_spec() {
            Ok(mailbox) => {
                out.push(Address::new(None, mailbox));
                return Ok(());
            }
            Err(err) => err,
        };
        self.cursor = checkpoint;

        let display_name = if self.peek() == Some('<') {
            None
        } else {
            Some(self.consume_phrase()?)
        };

        self.skip_cfws()?;
        if allow_group && self.eat(':') {
            return self.parse_group_members(out);
        }

        if !self.eat('<') {
            // "foo.bar" was most likely meant as an addr-spec
            return Err(match display_name {
                Some(name) if name.chars().all(|ch| is_atext(ch) || ch == '.') => spec_error,
                _ => AddressError::MissingAngleAddr,
            });
        }

        self.skip_cfws()?;
        let mailbox = self.consume_addr_spec()?;
        self.skip_cfws()?;
        if !self.eat('>') {
            return Err(AddressError::MissingCloseBracket);
        }

        out.push(Address::new(display_name, mailbox));
        Ok(())
    }

    fn parse_group_members(&mut self, out: &mut Vec<Address>) -> Result<()> {
        self.skip_cfws()?;
        if self.eat(';') {
            return self.skip_cfws();
        }

        loop {
            self.parse_address(false, out)?;
            self.skip_cfws()?;

            if self.eat(';') {
                return self.skip_cfws();
            }
            if !self.eat(',') {
                return Err(AddressError::UnclosedGroup);
            }
        }
    }

    /// Parse a phrase, joining its words with single spaces.
    ///
    /// Atoms that are RFC 2047 encoded-words are decoded; whitespace between
    /// two adjacent encoded-words is dropped.
    fn consume_phrase(&mut self) -> Result<String> {
        let mut phrase = String::new();
        let mut words = 0usize;
        let mut last_encoded = false;

        loop {
            self.skip_cfws()?;
            let (word, encoded) = match self.peek() {
                Some('"') => (self.consume_quoted_string()?, false),
                // obs-phrase allows '.' between words
                Some(ch) if is_atext(ch) || ch == '.' => {
                    let atom = self.consume_atom(true);
                    encoded_word::decode(atom)
                        .map_or_else(|| (atom.to_string(), false), |text| (text, true))
                }
                _ => break,
            };

            if words > 0 && !(last_encoded && encoded) {
                phrase.push(' ');
            }
            phrase.push_str(&word);
            words += 1;
            last_encoded = encoded;
        }

        if words == 0 {
            return Err(AddressError::EmptyPhrase);
        }

        Ok(phrase)
    }

    fn consume_atom(&mut self, dot: bool) -> &'a str {
        let start = self.cursor;
        while let Some(ch) = self.peek() {
            if !(is_atext(ch) || (dot && ch == '.')) {
                break;
            }
            self.cursor += ch.len_utf8();
        }
        &self.input[start..self.cursor]
    }

    /// Parse a quoted-string, returning its unescaped content.
    fn consume_quoted_string(&mut self) -> Result<String> {
        if !self.eat('"') {
            return Err(AddressError::InvalidQuotedString(
                "Quoted string must start with '\"'".to_string(),
            ));
        }

        let mut content = String::new();
        loop {
            match self.bump() {
                None => return Err(AddressError::UnclosedQuotedString),
                Some('"') => return Ok(content),
                Some('\\') => match self.bump() {
                    Some(ch) if is_vchar(ch) || is_wsp(ch) => content.push(ch),
                    Some(ch) => {
                        return Err(AddressError::InvalidQuotedString(format!(
                            "Invalid quoted-pair: \\{ch}"
                        )));
                    }
                    None => return Err(AddressError::UnclosedQuotedString),
                },
                Some(ch) if is_qtext(ch) || is_wsp(ch) => content.push(ch),
                Some(ch) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid character '{}' in quoted string",
                        ch.escape_default()
                    )));
                }
            }
        }
    }

    /// Parse an addr-spec: `local-part@domain`.
    fn consume_addr_spec(&mut self) -> Result<Mailbox> {
        let local_part = if self.peek() == Some('"') {
            canonical_local_part(self.consume_quoted_string()?)?
        } else {
            let atom = self.consume_atom(true);
            validate_dot_atom(atom).map_err(AddressError::InvalidLocalPart)?;
            atom.to_string()
        };

        if !self.eat('@') {
            return Err(AddressError::MissingAtSign);
        }
        self.skip_whitespace();

        let domain = if self.peek() == Some('[') {
            self.consume_domain_literal()?
        } else {
            let atom = self.consume_atom(true);
            validate_dot_atom(atom).map_err(AddressError::InvalidDomain)?;
            atom.to_string()
        };

        if local_part.len() > 64 {
            return Err(AddressError::LocalPartTooLong);
        }
        if domain.len() > 255 {
            return Err(AddressError::DomainTooLong);
        }

        Ok(Mailbox { local_part, domain })
    }

    fn consume_domain_literal(&mut self) -> Result<String> {
        let start = self.cursor;
        self.bump();

        loop {
            match self.bump() {
                None => {
                    return Err(AddressError::InvalidAddressLiteral(
                        "Address literal must be enclosed in brackets".to_string(),
                    ));
                }
                Some(']') => break,
                Some(ch @ ('[' | '\\')) => {
                    return Err(AddressError::InvalidAddressLiteral(format!(
                        "Invalid character '{ch}' in address literal"
                    )));
                }
                Some(_) => {}
            }
        }

        parse_address_literal(&self.input[start..self.cursor])
    }
}

/// Keep a quoted local-part quoted only when it is not a valid dot-atom.
fn canonical_local_part(content: String) -> Result<String> {
    if content.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty quoted local-part".to_string(),
        ));
    }

    if validate_dot_atom(&content).is_ok() {
        Ok(content)
    } else {
        Ok(quote(&content))
    }
}

/// Wrap `text` in double quotes, escaping `"` and `\`.
pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Validate a dot-atom: Atom *("." Atom)
fn validate_dot_atom(input: &str) -> std::result::Result<(), String> {
    if input.is_empty() {
        return Err("Empty dot-atom".to_string());
    }

    // Cannot start or end with dot
    if input.starts_with('.') || input.ends_with('.') {
        return Err("Dot-atom cannot start or end with '.'".to_string());
    }

    // Cannot have consecutive dots
    if input.contains("..") {
        return Err("Dot-atom cannot contain consecutive dots".to_string());
    }

    for atom in input.split('.') {
        if let Some(ch) = atom.chars().find(|&ch| !is_atext(ch)) {
            return Err(format!("Invalid character '{ch}' in atom"));
        }
    }

    Ok(())
}

/// Parse an address-literal: `[IPv4]` or `[IPv6:...]` or `[tag:...]`
fn parse_address_literal(input: &str) -> Result<String> {
    if !input.starts_with('[') || !input.ends_with(']') {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    }

    let content = &input[1..input.len() - 1];

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(input.to_string());
    }

    // General address literal: tag:value
    if let Some((tag, value)) = content.split_once(':')
        && !tag.is_empty()
        && !value.is_empty()
    {
        return Ok(input.to_string());
    }

    Err(AddressError::InvalidAddressLiteral(format!(
        "Invalid address literal format: {content}"
    )))
}

/// Check if character is valid atext (atom text)
///
/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" /
///         "*" / "+" / "-" / "/" / "=" / "?" / "^" / "_" / "\`" /
///         "{" / "|" / "}" / "~" / UTF8-non-ascii
#[inline]
fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
        || is_utf8_non_ascii(ch)
}

/// qtext = %d33 / %d35-91 / %d93-126 / UTF8-non-ascii
#[inline]
fn is_qtext(ch: char) -> bool {
    matches!(ch, '!' | '#'..='[' | ']'..='~') || is_utf8_non_ascii(ch)
}

#[inline]
fn is_vchar(ch: char) -> bool {
    ch.is_ascii_graphic() || is_utf8_non_ascii(ch)
}

#[inline]
const fn is_wsp(ch: char) -> bool {
    matches!(ch, ' ' | '\t')
}

#[inline]
fn is_utf8_non_ascii(ch: char) -> bool {
    !ch.is_ascii() && !ch.is_control()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let address = parse_address("user@example.com").unwrap();
        assert_eq!(address.display_name(), None);
        assert_eq!(address.mailbox().local_part, "user");
        assert_eq!(address.mailbox().domain, "example.com");
    }

    #[test]
    fn test_parse_name_addr() {
        let address = parse_address("John Smith <john@example.com>").unwrap();
        assert_eq!(address.display_name(), Some("John Smith"));
        assert_eq!(address.mailbox().to_string(), "john@example.com");
    }

    #[test]
    fn test_parse_quoted_display_name() {
        let address = parse_address(r#""Smith, John \"JS\"" <john@example.com>"#).unwrap();
        assert_eq!(address.display_name(), Some(r#"Smith, John "JS""#));
    }

    #[test]
    fn test_encoded_word_display_name() {
        let address =
            parse_address("=?UTF-8?B?5bGx55Sw?= =?UTF-8?B?5aSq6YOO?= <yamada@example.jp>").unwrap();
        assert_eq!(address.display_name(), Some("山田太郎"));

        let address = parse_address("=?UTF-8?Q?Andr=C3=A9?= Pirard <andre@example.com>").unwrap();
        assert_eq!(address.display_name(), Some("André Pirard"));

        // quoted strings and unknown charsets stay verbatim
        let address = parse_address(r#""=?UTF-8?B?5bGx55Sw?=" <a@example.com>"#).unwrap();
        assert_eq!(address.display_name(), Some("=?UTF-8?B?5bGx55Sw?="));
        let address = parse_address("=?KOI8-R?B?9MXT1A==?= <b@example.com>").unwrap();
        assert_eq!(address.display_name(), Some("=?KOI8-R?B?9MXT1A==?="));
    }

    #[test]
    fn test_parse_angle_addr_without_name() {
        let address = parse_address("<john@example.com>").unwrap();
        assert_eq!(address.display_name(), None);
        assert_eq!(address.mailbox().to_string(), "john@example.com");
    }

    #[test]
    fn test_comments_are_dropped() {
        let address = parse_address("John (the (real) one) Smith <john@example.com> (work)").unwrap();
        assert_eq!(address.display_name(), Some("John Smith"));

        let address = parse_address("john@example.com (John)").unwrap();
        assert_eq!(address.display_name(), None);
    }

    #[test]
    fn test_quoted_local_part_is_canonicalised() {
        let address = parse_address(r#""john.smith"@example.com"#).unwrap();
        assert_eq!(address.mailbox().local_part, "john.smith");

        let address = parse_address(r#""john smith"@example.com"#).unwrap();
        assert_eq!(address.mailbox().local_part, r#""john smith""#);
    }

    #[test]
    fn test_parse_address_literal_ipv4() {
        let address = parse_address("user@[192.168.1.1]").unwrap();
        assert_eq!(address.mailbox().domain, "[192.168.1.1]");
    }

    #[test]
    fn test_parse_address_literal_ipv6() {
        let address = parse_address("user@[IPv6:2001:db8::1]").unwrap();
        assert_eq!(address.mailbox().domain, "[IPv6:2001:db8::1]");
    }

    #[test]
    fn test_non_ascii_display_name() {
        let address = parse_address("山田 太郎 <taro@example.jp>").unwrap();
        assert_eq!(address.display_name(), Some("山田 太郎"));
    }

    #[test]
    fn test_empty_input_has_no_address() {
        assert_eq!(parse_address("").unwrap_err(), AddressError::NoAddress);
        assert_eq!(parse_address("   ").unwrap_err(), AddressError::NoAddress);
        assert_eq!(parse_address_list(" (nothing) ").unwrap_err(), AddressError::NoAddress);
    }

    #[test]
    fn test_single_address_rejects_lists() {
        assert_eq!(
            parse_address("a@example.com, b@example.com").unwrap_err(),
            AddressError::ExpectedSingleAddress
        );
    }

    #[test]
    fn test_invalid_missing_at() {
        assert_eq!(
            parse_address("userexample.com").unwrap_err(),
            AddressError::MissingAtSign
        );
    }

    #[test]
    fn test_invalid_name_without_angle_addr() {
        assert_eq!(
            parse_address("John Smith").unwrap_err(),
            AddressError::MissingAngleAddr
        );
    }

    #[test]
    fn test_invalid_missing_close_bracket() {
        assert_eq!(
            parse_address("John <john@example.com").unwrap_err(),
            AddressError::MissingCloseBracket
        );
    }

    #[test]
    fn test_invalid_consecutive_dots() {
        assert!(matches!(
            parse_address("user..name@example.com").unwrap_err(),
            AddressError::InvalidLocalPart(_)
        ));
    }

    #[test]
    fn test_invalid_domain_start_with_dot() {
        assert!(matches!(
            parse_address("user@.example.com").unwrap_err(),
            AddressError::InvalidDomain(_)
        ));
    }

    #[test]
    fn test_unclosed_quoted_string() {
        assert_eq!(
            parse_address(r#""John <john@example.com>"#).unwrap_err(),
            AddressError::UnclosedQuotedString
        );
    }

    #[test]
    fn test_local_part_too_long() {
        let long_local = format!("{}@example.com", "a".repeat(70));
        assert_eq!(
            parse_address(&long_local).unwrap_err(),
            AddressError::LocalPartTooLong
        );
    }

    #[test]
    fn test_local_part_single_dot() {
        assert!(matches!(
            parse_address(".@aaa.aa"),
            Err(AddressError::InvalidLocalPart(_))
        ));
    }

    #[test]
    fn test_parse_list() {
        let list =
            parse_address_list(" foo@example.com, hello <world@example.com>").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].mailbox().to_string(), "foo@example.com");
        assert_eq!(list[1].display_name(), Some("hello"));
        assert_eq!(list[1].mailbox().to_string(), "world@example.com");
    }

    #[test]
    fn test_parse_list_with_empty_entries() {
        let list = parse_address_list(", a@example.com, , b@example.com,").unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_parse_list_quoted_comma() {
        let list = parse_address_list(r#""Doe, Jane" <jane@example.com>, john@example.com"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].display_name(), Some("Doe, Jane"));
    }

    #[test]
    fn test_parse_list_missing_comma() {
        assert_eq!(
            parse_address_list("a@example.com b@example.com").unwrap_err(),
            AddressError::ExpectedComma('b')
        );
    }

    #[test]
    fn test_parse_group() {
        let list = parse_address_list("team: a@example.com, B <b@example.com>;, c@example.com").unwrap();
        let mailboxes: Vec<_> = list.iter().map(|a| a.mailbox().to_string()).collect();
        assert_eq!(
            mailboxes,
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
    }

    #[test]
    fn test_empty_group() {
        assert!(parse_address_list("undisclosed-recipients:;").unwrap().is_empty());
        assert_eq!(
            parse_address("undisclosed-recipients:;").unwrap_err(),
            AddressError::EmptyGroup
        );
    }

    #[test]
    fn test_unclosed_group() {
        assert_eq!(
            parse_address_list("team: a@example.com").unwrap_err(),
            AddressError::UnclosedGroup
        );
    }

    #[test]
    fn test_unclosed_comment() {
        assert_eq!(
            parse_address("john@example.com (oops").unwrap_err(),
            AddressError::UnclosedComment
        );
    }
}
