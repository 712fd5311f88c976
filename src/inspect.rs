//! Human- and machine-readable certificate summaries.

use std::sync::Arc;

use serde::Serialize;

use crate::Result;
use crate::certificate::{CertificateSource, X509Cert, codec};
use crate::identity::{AttributeMap, IdentityAugmentor, RoleSet, SecurityIdentity};

/// Everything the tooling reports about a client certificate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateReport {
    /// Subject DN
    pub subject: Option<String>,
    /// Subject Common Name
    #[serde(rename = "userCN")]
    pub user_cn: Option<String>,
    /// Issuer DN
    pub issuer: String,
    /// Serial number (hex)
    pub serial: String,
    /// SHA-256 fingerprint of the DER (hex)
    pub fingerprint: String,
    /// Public-key size in bits, `-1` when unknown
    pub key_size: i32,
    /// Roles from the roles extension
    pub roles: RoleSet,
    /// Attributes from the device id extension
    pub attributes: AttributeMap,
}

/// Parse `pem` and run it through `augmentor`.
///
/// # Errors
///
/// Returns `Error::CertificateParse` for unparsable input.
pub fn inspect_pem(pem: &str, augmentor: &dyn IdentityAugmentor) -> Result<CertificateReport> {
    let cert = Arc::new(X509Cert::from_pem(pem)?);
    let identity = augmentor.augment(&SecurityIdentity::from_certificate(cert.clone()));

    Ok(CertificateReport {
        subject: cert.subject().map(str::to_owned),
        user_cn: codec::common_name(Some(cert.as_ref()))?,
        issuer: cert.issuer().to_string(),
        serial: cert.serial().to_string(),
        fingerprint: codec::fingerprint_sha256(cert.as_ref())?,
        key_size: codec::key_size(cert.as_ref()),
        roles: identity.roles().clone(),
        attributes: identity.attributes().clone(),
    })
}
