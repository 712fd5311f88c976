//! X.509 certificate model, codec and extension decoding.
//!
//! # Modules
//!
//! - [`extension`]: `OCTET STRING { UTF8String }` extension value decoder
//! - [`codec`]: Base64/PEM conversion, PEM file output, Common Name, fingerprint
//! - [`key`]: public-key parameters and key-size computation
//!
//! Consumers work against the [`CertificateSource`] trait so the identity
//! and codec logic can run on anything that exposes DER, a subject, a key
//! and extension values. [`X509Cert`] is the owned implementation parsed
//! with `x509-parser`.

pub mod codec;
pub mod extension;
pub mod key;

use std::collections::BTreeMap;

use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

pub use key::KeyParameters;

// ─────────────────────────────────────────────────────────────────────────────
// Certificate view
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of a certificate.
pub trait CertificateSource: Send + Sync + std::fmt::Debug {
    /// DER encoding of the whole certificate.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the encoding is unavailable.
    fn der(&self) -> Result<&[u8]>;

    /// Subject distinguished name as `TYPE=value` attributes joined by `", "`,
    /// or `None` when the certificate has no subject principal.
    fn subject(&self) -> Option<&str>;

    /// Public-key parameters.
    fn public_key(&self) -> &KeyParameters;

    /// Value of the extension `oid`, DER-wrapped in an `OCTET STRING`.
    fn extension_value(&self, oid: &str) -> Option<&[u8]>;

    /// First Common Name of the subject.
    ///
    /// The default re-parses [`Self::subject`]; sources holding the decoded
    /// attribute should return it directly, since a rendered DN need not
    /// escape separators inside values.
    fn subject_common_name(&self) -> Option<String> {
        self.subject().and_then(codec::common_name_from_dn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Owned parsed certificate
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable certificate parsed from DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Cert {
    der: Vec<u8>,
    subject: Option<String>,
    common_name: Option<String>,
    issuer: String,
    serial: String,
    not_before: i64,
    not_after: i64,
    key: KeyParameters,
    /// Extension OID (dotted) → `OCTET STRING`-wrapped value.
    extensions: BTreeMap<String, Vec<u8>>,
}

impl X509Cert {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `Error::CertificateParse` if the bytes are not a single valid
    /// X.509 certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        let (rest, cert) = X509Certificate::from_der(&der)
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        if !rest.is_empty() {
            return Err(Error::CertificateParse(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }

        let subject = (cert.subject().iter().next().is_some())
            .then(|| cert.subject().to_string());
        let common_name = extract_cn(&cert);
        let issuer = cert.issuer().to_string();
        let serial = hex::encode(cert.raw_serial());
        let not_before = cert.validity().not_before.timestamp();
        let not_after = cert.validity().not_after.timestamp();
        let key = KeyParameters::from_spki(cert.public_key());
        let extensions = cert
            .extensions()
            .iter()
            .map(|ext| {
                (
                    ext.oid.to_id_string(),
                    extension::wrap_octet_string(ext.value),
                )
            })
            .collect();

        Ok(Self {
            der,
            subject,
            common_name,
            issuer,
            serial,
            not_before,
            not_after,
            key,
            extensions,
        })
    }

    /// Parse the first certificate found in PEM text.
    ///
    /// # Errors
    ///
    /// Returns `Error::CertificateParse` if no `CERTIFICATE` block is present
    /// or the block does not hold a valid certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = rustls_pemfile::certs(&mut pem.as_bytes())
            .next()
            .ok_or_else(|| Error::CertificateParse("No PEM certificate block found".to_string()))?
            .map_err(|e| Error::CertificateParse(e.to_string()))?;
        Self::from_der(der.as_ref())
    }

    /// Issuer distinguished name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as lowercase hex.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Whether `unix_time` falls inside the certificate's validity window.
    #[must_use]
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        (self.not_before..=self.not_after).contains(&unix_time)
    }
}

impl CertificateSource for X509Cert {
    fn der(&self) -> Result<&[u8]> {
        Ok(&self.der)
    }

    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn public_key(&self) -> &KeyParameters {
        &self.key
    }

    fn extension_value(&self, oid: &str) -> Option<&[u8]> {
        self.extensions.get(oid).map(Vec::as_slice)
    }

    fn subject_common_name(&self) -> Option<String> {
        self.common_name.clone()
    }
}

/// First CN attribute of the subject, as decoded by `x509-parser`.
fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-built certificates and `rcgen` helpers shared by unit tests.

    use std::collections::BTreeMap;

    use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};

    use super::{CertificateSource, KeyParameters, extension};
    use crate::{Error, Result};

    /// Certificate stand-in with every field under test control.
    #[derive(Debug, Clone)]
    pub struct MockCertificate {
        pub der: Option<Vec<u8>>,
        pub subject: Option<String>,
        pub key: KeyParameters,
        pub extensions: BTreeMap<String, Vec<u8>>,
    }

    impl MockCertificate {
        pub fn with_der(der: &[u8]) -> Self {
            Self {
                der: Some(der.to_vec()),
                ..Self::default()
            }
        }

        pub fn with_extension(oid: &str, value: &[u8]) -> Self {
            let mut cert = Self::default();
            cert.extensions.insert(oid.to_string(), value.to_vec());
            cert
        }
    }

    impl Default for MockCertificate {
        fn default() -> Self {
            Self {
                der: None,
                subject: None,
                key: KeyParameters::Other {
                    algorithm: String::new(),
                },
                extensions: BTreeMap::new(),
            }
        }
    }

    impl CertificateSource for MockCertificate {
        fn der(&self) -> Result<&[u8]> {
            self.der
                .as_deref()
                .ok_or_else(|| Error::conversion("Encoding error"))
        }

        fn subject(&self) -> Option<&str> {
            self.subject.as_deref()
        }

        fn public_key(&self) -> &KeyParameters {
            &self.key
        }

        fn extension_value(&self, oid: &str) -> Option<&[u8]> {
            self.extensions.get(oid).map(Vec::as_slice)
        }
    }

    fn oid_arcs(oid: &str) -> Vec<u64> {
        oid.split('.').map(|arc| arc.parse().unwrap()).collect()
    }

    /// Self-signed DER certificate with `cn` and UTF8String custom extensions.
    pub fn self_signed_der(cn: &str, extensions: &[(&str, &str)]) -> Vec<u8> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        dn.push(DnType::OrganizationName, "Example");
        params.distinguished_name = dn;
        params.custom_extensions = extensions
            .iter()
            .map(|(oid, text)| {
                CustomExtension::from_oid_content(
                    &oid_arcs(oid),
                    extension::encode_utf8_string(text),
                )
            })
            .collect();

        let key_pair = KeyPair::generate().expect("key generation failed");
        params
            .self_signed(&key_pair)
            .expect("rcgen cert generation failed")
            .der()
            .to_vec()
    }
}
