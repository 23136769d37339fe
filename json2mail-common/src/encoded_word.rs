//! RFC 2047 encoded-words for non-ASCII header text.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Longest run of raw bytes that still fits in one 75 character encoded-word.
const ENCODED_WORD_BYTES: usize = 45;

/// Returns `true` if `text` can go into a header without encoding.
#[must_use]
pub fn is_plain(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii() && !c.is_ascii_control())
}

/// `B` encode `text`, split into words of at most 75 characters joined by a
/// folding whitespace. Plain printable ASCII is returned unchanged.
#[must_use]
pub fn encode(text: &str) -> String {
    if is_plain(text) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;

    for (index, ch) in text.char_indices() {
        if index + ch.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(&text[start..index]);
            start = index;
        }
    }
    words.push(&text[start..]);

    words
        .iter()
        .map(|word| format!("=?UTF-8?B?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Decode a single `=?charset?encoding?text?=` atom.
///
/// Only UTF-8 and US-ASCII are understood. Returns `None` for anything that
/// is not a well-formed encoded-word in one of those charsets, so the caller
/// can keep the atom verbatim.
#[must_use]
pub fn decode(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let text = parts.next()?;

    // RFC 2231 language suffix, e.g. `UTF-8*en`
    let charset = charset.split('*').next().unwrap_or(charset);
    if !(charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("us-ascii")) {
        return None;
    }
    if text.contains('?') || text.contains(' ') {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(text).ok()?,
        "Q" | "q" => decode_q(text)?,
        _ => return None,
    };

    String::from_utf8(bytes).ok()
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();

    while let Some(byte) = bytes.next() {
        match byte {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = [bytes.next()?, bytes.next()?];
                let hex = std::str::from_utf8(&hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
            }
            _ => out.push(byte),
        }
    }

    Some(out)
}
