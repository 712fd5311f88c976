//! Roles from the `Role=<v1>,<v2>,...` certificate extension.

use tracing::debug;

use super::{IdentityAugmentor, RoleSet, SecurityIdentity, extension_text, payload_value};
use crate::certificate::CertificateSource;

/// Private-enterprise OID carrying the role list.
pub const OID_ROLES: &str = "1.3.6.1.4.1.99999.1";

const ROLE_KEY: &str = "Role";

/// Grants roles listed in a certificate extension.
#[derive(Debug, Clone)]
pub struct RolesAugmentor {
    oid: String,
}

impl RolesAugmentor {
    /// Augmentor reading [`OID_ROLES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_oid(OID_ROLES)
    }

    /// Augmentor reading roles from a custom extension OID.
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

    /// Roles carried by `cert`; empty when absent or malformed.
    #[must_use]
    pub fn extract_roles(&self, cert: &dyn CertificateSource) -> RoleSet {
        let Some(payload) = extension_text(cert, &self.oid) else {
            return RoleSet::new();
        };
        parse_roles(&payload)
    }
}

impl Default for RolesAugmentor {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityAugmentor for RolesAugmentor {
    fn augment(&self, identity: &SecurityIdentity) -> SecurityIdentity {
        let Some(cert) = identity.certificate() else {
            return identity.clone();
        };
        let roles = self.extract_roles(cert);
        debug!(
            principal = identity.principal().unwrap_or("<anonymous>"),
            roles = ?roles,
            "Roles extracted from certificate"
        );
        identity.clone().with_roles(roles)
    }
}

/// Parse `Role=a,b,c` into `{a, b, c}`; anything else is empty.
fn parse_roles(payload: &str) -> RoleSet {
    payload_value(payload, ROLE_KEY)
        .map(|values| {
            values
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::certificate::X509Cert;
    use crate::certificate::extension::{encode_utf8_string, wrap_octet_string};
    use crate::certificate::testing::{MockCertificate, self_signed_der};

    fn role_set(roles: &[&str]) -> RoleSet {
        roles.iter().map(|r| (*r).to_string()).collect()
    }

    fn cert_with_payload(payload: &str) -> MockCertificate {
        MockCertificate::with_extension(
            OID_ROLES,
            &wrap_octet_string(&encode_utf8_string(payload)),
        )
    }

    /// OCTET STRING length 11, UTF8String length 9, 16 payload bytes.
    fn short_length_fixture() -> MockCertificate {
        let mut bytes = vec![0x04, 0x0B, 0x0C, 0x09];
        bytes.extend_from_slice(b"Role=role1,role2");
        MockCertificate::with_extension(OID_ROLES, &bytes)
    }

    #[test]
    fn extract_roles_from_well_formed_payload() {
        let cert = cert_with_payload("Role=a,b,c");
        assert_eq!(
            RolesAugmentor::new().extract_roles(&cert),
            role_set(&["a", "b", "c"])
        );
    }

    #[test]
    fn extract_roles_is_order_independent_and_deduplicates() {
        let augmentor = RolesAugmentor::new();
        let forward = augmentor.extract_roles(&cert_with_payload("Role=a,b,c"));
        let shuffled = augmentor.extract_roles(&cert_with_payload("Role=c, a ,b,a"));
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn extract_roles_honours_declared_length() {
        // GIVEN: inner length 9 truncates the payload to "Role=role"
        let roles = RolesAugmentor::new().extract_roles(&short_length_fixture());
        assert_eq!(roles, role_set(&["role"]));
    }

    #[test]
    fn augment_merges_roles_into_identity() {
        let cert: Arc<dyn CertificateSource> = Arc::new(short_length_fixture());
        let identity = SecurityIdentity::from_certificate(cert);

        let augmented = RolesAugmentor::new().augment(&identity);

        assert_eq!(augmented.roles(), &role_set(&["role"]));
        // input is untouched
        assert!(identity.roles().is_empty());
    }

    #[test]
    fn augment_without_certificate_returns_identity_unchanged() {
        let identity = SecurityIdentity::anonymous().with_roles(["Existing"]);
        let augmented = RolesAugmentor::new().augment(&identity);
        assert_eq!(augmented.roles(), &role_set(&["Existing"]));
    }

    #[test]
    fn missing_extension_yields_no_roles() {
        let cert = MockCertificate::default();
        assert!(RolesAugmentor::new().extract_roles(&cert).is_empty());
    }

    #[test]
    fn empty_extension_value_yields_no_roles() {
        let cert = MockCertificate::with_extension(OID_ROLES, &[]);
        assert!(RolesAugmentor::new().extract_roles(&cert).is_empty());
    }

    #[test]
    fn indefinite_length_extension_yields_no_roles() {
        let cert = MockCertificate::with_extension(OID_ROLES, &[0x04, 0x80, 0x0C, 0x02, b'a', b'b']);
        assert!(RolesAugmentor::new().extract_roles(&cert).is_empty());
    }

    #[test]
    fn wrong_payload_key_yields_no_roles() {
        let cert = cert_with_payload("Group=a,b");
        assert!(RolesAugmentor::new().extract_roles(&cert).is_empty());
    }

    #[test]
    fn roles_read_from_real_certificate() {
        // GIVEN: an rcgen certificate with the roles extension
        let der = self_signed_der(
            "C708ECA6-C8F9-464C-A745-3A37FF670DFC",
            &[(OID_ROLES, "Role=User,Administrator,HorseManager")],
        );
        let cert = X509Cert::from_der(der).unwrap();
        // THEN: every role extracted
        assert_eq!(
            RolesAugmentor::new().extract_roles(&cert),
            role_set(&["User", "Administrator", "HorseManager"])
        );
    }

    #[test]
    fn custom_oid_is_respected() {
        let cert = MockCertificate::with_extension(
            "1.2.3.4",
            &wrap_octet_string(&encode_utf8_string("Role=ops")),
        );
        assert!(RolesAugmentor::new().extract_roles(&cert).is_empty());
        assert_eq!(
            RolesAugmentor::with_oid("1.2.3.4").extract_roles(&cert),
            role_set(&["ops"])
        );
    }
}
