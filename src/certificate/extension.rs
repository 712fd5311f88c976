//! Decoder for application-defined certificate extension values.
//!
//! Client certificates carry authorization metadata in private extensions.
//! The extension value, as returned by [`CertificateSource::extension_value`],
//! is a DER `OCTET STRING` wrapping a `UTF8String`:
//!
//! ```text
//! 04 <len> 0C <len> R o l e = a , b
//! ```
//!
//! # Error policy
//!
//! Two tiers, and call sites rely on the difference:
//!
//! | Input | Result |
//! |-------|--------|
//! | empty | `Ok(None)` |
//! | indefinite length (`0x80`) without an end-of-contents marker | `Err(Error::MalformedExtension)` |
//! | wrong tag, truncated header, declared length past the buffer, bad UTF-8 | `Ok(None)` |
//! | well-formed | `Ok(Some(text))` |
//!
//! Bytes after the declared inner length are ignored.
//!
//! [`CertificateSource::extension_value`]: crate::certificate::CertificateSource::extension_value

use tracing::debug;

use crate::{Error, Result};

/// ASN.1 universal tag: OCTET STRING
pub const TAG_OCTET_STRING: u8 = 0x04;
/// ASN.1 universal tag: UTF8String
pub const TAG_UTF8_STRING: u8 = 0x0C;

/// Length octet announcing the BER indefinite-length form.
const INDEFINITE_LENGTH: u8 = 0x80;
/// Largest long-form length prefix we accept (4 length octets).
const MAX_LENGTH_OCTETS: usize = 4;
/// End-of-contents marker closing an indefinite-length encoding.
const END_OF_CONTENTS: [u8; 2] = [0x00, 0x00];

// ─────────────────────────────────────────────────────────────────────────────
// TLV header
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    Definite(usize),
    Indefinite,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    tag: u8,
    length: Length,
    /// Number of bytes taken by tag + length octets.
    size: usize,
}

/// Read a single-byte tag and its length octets.
///
/// Returns `None` for a truncated header or an unsupported long form.
fn read_header(buf: &[u8]) -> Option<Header> {
    let (&tag, rest) = buf.split_first()?;
    let (&first, rest) = rest.split_first()?;

    if first == INDEFINITE_LENGTH {
        return Some(Header {
            tag,
            length: Length::Indefinite,
            size: 2,
        });
    }

    if first & 0x80 == 0 {
        return Some(Header {
            tag,
            length: Length::Definite(usize::from(first)),
            size: 2,
        });
    }

    let count = usize::from(first & 0x7F);
    if count > MAX_LENGTH_OCTETS || rest.len() < count {
        return None;
    }
    let length = rest[..count]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));

    Some(Header {
        tag,
        length: Length::Definite(length),
        size: 2 + count,
    })
}

/// Slice the contents of the element whose header was just read.
///
/// `Ok(None)` when a definite length runs past the buffer; `Err` when an
/// indefinite length has no end-of-contents marker.
fn contents<'a>(buf: &'a [u8], header: &Header, what: &str) -> Result<Option<&'a [u8]>> {
    let body = &buf[header.size..];
    match header.length {
        Length::Definite(len) if len <= body.len() => Ok(Some(&body[..len])),
        Length::Definite(len) => {
            debug!(
                element = what,
                declared = len,
                available = body.len(),
                "Extension length exceeds buffer"
            );
            Ok(None)
        }
        Length::Indefinite => match body.strip_suffix(&END_OF_CONTENTS) {
            Some(inner) => Ok(Some(inner)),
            None => Err(Error::MalformedExtension(format!(
                "{what} uses indefinite length without an end-of-contents marker"
            ))),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Decode an `OCTET STRING { UTF8String }` extension value into its text.
///
/// # Errors
///
/// Returns [`Error::MalformedExtension`] only for an indefinite-length
/// encoding that lacks its end-of-contents marker. Every other irregularity
/// yields `Ok(None)`.
pub fn decode(bytes: &[u8]) -> Result<Option<String>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let Some(outer) = read_header(bytes) else {
        return Ok(None);
    };
    if outer.tag != TAG_OCTET_STRING {
        debug!(tag = outer.tag, "Extension value is not an OCTET STRING");
        return Ok(None);
    }
    let Some(outer_body) = contents(bytes, &outer, "OCTET STRING")? else {
        return Ok(None);
    };

    let Some(inner) = read_header(outer_body) else {
        return Ok(None);
    };
    if inner.tag != TAG_UTF8_STRING {
        debug!(tag = inner.tag, "Extension payload is not a UTF8String");
        return Ok(None);
    }
    let Some(text) = contents(outer_body, &inner, "UTF8String")? else {
        return Ok(None);
    };

    Ok(std::str::from_utf8(text).ok().map(str::to_owned))
}

/// Wrap raw extension contents in a DER `OCTET STRING`.
#[must_use]
pub fn wrap_octet_string(contents: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(contents.len() + 6);
    out.push(TAG_OCTET_STRING);
    push_length(&mut out, contents.len());
    out.extend_from_slice(contents);
    out
}

/// DER-encode `text` as a `UTF8String`.
#[must_use]
pub fn encode_utf8_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 6);
    out.push(TAG_UTF8_STRING);
    push_length(&mut out, text.len());
    out.extend_from_slice(text.as_bytes());
    out
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        // Short form; the cast cannot truncate.
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
