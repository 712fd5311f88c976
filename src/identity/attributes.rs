//! Attributes from the `DeviceId=<value>` certificate extension.

use tracing::debug;

use super::{AttributeMap, IdentityAugmentor, SecurityIdentity, extension_text, payload_value};
use crate::certificate::CertificateSource;

/// Private-enterprise OID carrying the device identifier.
pub const OID_DEVICE_ID: &str = "1.3.6.1.4.1.99999.2";

/// Attribute name under which the device identifier is exposed.
pub const ATTRIBUTE_DEVICE_ID: &str = "deviceId";

const DEVICE_ID_KEY: &str = "DeviceId";

/// Attaches the device identifier carried in a certificate extension.
#[derive(Debug, Clone)]
pub struct AttributesAugmentor {
    oid: String,
}

impl AttributesAugmentor {
    /// Augmentor reading [`OID_DEVICE_ID`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_oid(OID_DEVICE_ID)
    }

    /// Augmentor reading the device identifier from a custom extension OID.
    #[must_use]
    pub fn with_oid(oid: &str) -> Self {
        Self {
            oid: oid.to_string(),
        }
    }

    /// Extension OID this augmentor reads.
    #[must_use]
    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Attributes carried by `cert`; empty when absent or malformed.
    #[must_use]
    pub fn extract_attributes(&self, cert: &dyn CertificateSource) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        if let Some(value) = extension_text(cert, &self.oid)
            .as_deref()
            .and_then(|payload| payload_value(payload, DEVICE_ID_KEY))
        {
            attributes.insert(ATTRIBUTE_DEVICE_ID.to_string(), value.to_string());
        }
        attributes
    }
}

impl Default for AttributesAugmentor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityAugmentor for AttributesAugmentor {
    fn augment(&self, identity: &SecurityIdentity) -> SecurityIdentity {
        let Some(cert) = identity.certificate() else {
            return identity.clone();
        };
        let attributes = self.extract_attributes(cert);
        debug!(
            principal = identity.principal().unwrap_or("<anonymous>"),
            attributes = ?attributes,
            "Attributes extracted from certificate"
        );
        identity.clone().with_attributes(attributes)
    }
}
