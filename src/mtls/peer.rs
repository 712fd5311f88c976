//! Security identity of a TLS peer.

use rustls::ServerConnection;
use tracing::debug;

use crate::Result;
use crate::identity::{IdentityAugmentor, SecurityIdentity};

/// Build the augmented identity for the client of a completed handshake.
///
/// Only the leaf of the presented chain is used; rustls has already
/// verified it. A client without a certificate yields an anonymous identity.
///
/// # Errors
///
/// Returns `Error::CertificateParse` if the leaf certificate cannot be parsed.
pub fn identity_from_connection(
    conn: &ServerConnection,
    augmentor: &dyn IdentityAugmentor,
) -> Result<SecurityIdentity> {
    let Some(leaf) = conn.peer_certificates().and_then(<[_]>::first) else {
        debug!("TLS peer presented no certificate");
        return Ok(SecurityIdentity::anonymous());
    };
    let identity = SecurityIdentity::from_peer_certificate(leaf.as_ref())?;
    let identity = augmentor.augment(&identity);
    debug!(
        principal = identity.principal().unwrap_or("<anonymous>"),
        roles = identity.roles().len(),
        "TLS peer identity established"
    );
    Ok(identity)
}
