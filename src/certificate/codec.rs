//! Certificate text encodings and field helpers.
//!
//! - [`to_base64`] / [`to_pem`]: DER → Base64 / PEM text
//! - [`write_pem`]: PEM to a file through a scoped writer
//! - [`key_size`]: public-key size in bits (`-1` when unsupported)
//! - [`common_name`]: first `CN` attribute of the subject DN
//! - [`fingerprint_sha256`]: stable file-naming key

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::CertificateSource;
use crate::{Error, Result};

/// PEM opening delimiter for certificates.
pub const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
/// PEM closing delimiter for certificates.
pub const PEM_END: &str = "-----END CERTIFICATE-----";
/// Base64 characters per PEM body line.
const PEM_LINE_WIDTH: usize = 64;

/// Platform line terminator used in generated PEM text.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
/// Platform line terminator used in generated PEM text.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

const BASE64_FAILURE: &str = "Failed to convert X509Certificate to Base64 format";
const PEM_FAILURE: &str = "Failed to convert X509Certificate to PEM format";
const WRITE_FAILURE: &str = "Failed to write PEM certificate to file";

/// Base64-encode the certificate's DER bytes.
///
/// # Errors
///
/// Returns `Error::Conversion` when the DER encoding is unavailable.
pub fn to_base64<C: CertificateSource + ?Sized>(cert: &C) -> Result<String> {
    let der = cert
        .der()
        .map_err(|e| Error::conversion_with(BASE64_FAILURE, e))?;
    Ok(STANDARD.encode(der))
}

/// Render the certificate as PEM, 64 characters per line.
///
/// # Errors
///
/// Returns `Error::Conversion` when the DER encoding is unavailable.
pub fn to_pem<C: CertificateSource + ?Sized>(cert: &C) -> Result<String> {
    let base64 = to_base64(cert).map_err(|e| Error::conversion_with(PEM_FAILURE, e))?;
    Ok(wrap_pem(&base64))
}

fn wrap_pem(base64: &str) -> String {
    let lines = base64.len().div_ceil(PEM_LINE_WIDTH);
    let mut pem = String::with_capacity(
        base64.len() + PEM_BEGIN.len() + PEM_END.len() + (lines + 2) * LINE_SEPARATOR.len(),
    );
    pem.push_str(PEM_BEGIN);
    pem.push_str(LINE_SEPARATOR);
    // Base64 output is ASCII, so byte chunks are char boundaries.
    for chunk in base64.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        pem.push_str(LINE_SEPARATOR);
    }
    pem.push_str(PEM_END);
    pem.push_str(LINE_SEPARATOR);
    pem
}

/// Write the certificate to `path` in PEM format.
///
/// The PEM text is produced before the file is opened, so an encoding
/// failure never truncates an existing file. The file handle is released on
/// every path when the writer goes out of scope.
///
/// # Errors
///
/// Returns `Error::Conversion` with the PEM message for encoding failures
/// and with the write message for I/O failures.
pub fn write_pem<C: CertificateSource + ?Sized>(cert: &C, path: &Path) -> Result<()> {
    let pem = to_pem(cert)?;

    let file = File::create(path).map_err(|e| Error::conversion_with(WRITE_FAILURE, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(pem.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|e| Error::conversion_with(WRITE_FAILURE, e))
}

/// Public-key size in bits; `-1` for an unsupported key kind.
pub fn key_size<C: CertificateSource + ?Sized>(cert: &C) -> i32 {
    cert.public_key().key_size()
}

/// Common Name of the certificate subject.
///
/// Returns the value of the first `CN` attribute, or `None` when the subject
/// is absent or has no CN. Sources exposing only a DN string are parsed with
/// [`common_name_from_dn`] (key matched case-insensitively).
///
/// # Errors
///
/// Returns `Error::InvalidArgument` when `cert` is `None`.
pub fn common_name<C: CertificateSource + ?Sized>(cert: Option<&C>) -> Result<Option<String>> {
    let cert = cert.ok_or_else(|| Error::InvalidArgument("certificate must not be null".into()))?;
    Ok(cert.subject_common_name())
}

/// Lowercase hex SHA-256 of the certificate's DER encoding.
///
/// # Errors
///
/// Returns `Error::Conversion` when the DER encoding is unavailable.
pub fn fingerprint_sha256<C: CertificateSource + ?Sized>(cert: &C) -> Result<String> {
    let der = cert
        .der()
        .map_err(|e| Error::conversion_with("Failed to fingerprint certificate", e))?;
    Ok(hex::encode(Sha256::digest(der)))
}

// ─────────────────────────────────────────────────────────────────────────────
// DN parsing
// ─────────────────────────────────────────────────────────────────────────────

/// First `CN` value of a distinguished name string.
#[must_use]
pub fn common_name_from_dn(dn: &str) -> Option<String> {
    dn_attributes(dn)
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("CN"))
        .map(|(_, value)| value)
}

/// Split a DN into `(type, value)` pairs in encounter order.
///
/// Attributes are separated by `,`, `;` or `+`. A backslash escapes the next
/// character; double quotes protect separators inside a value.
fn dn_attributes(dn: &str) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    let mut current = String::new();
    let mut chars = dn.chars();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' | ';' | '+' if !quoted => {
                attributes.extend(split_attribute(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    attributes.extend(split_attribute(&current));
    attributes
}

fn split_attribute(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unescape_value(value.trim())))
}

fn unescape_value(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
