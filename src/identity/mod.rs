//! Authenticated principals and certificate-driven identity augmentation.
//!
//! # Flow
//!
//! ```text
//! TLS handshake (peer certificate already verified)
//!   → SecurityIdentity::from_peer_certificate
//!   → AugmentorChain [RolesAugmentor, AttributesAugmentor]
//!   → RolePolicy / external access control
//! ```
//!
//! Augmentation is fail-open: a missing, garbled or malformed extension
//! yields no roles or attributes, never an authentication failure.
//!
//! # Modules
//!
//! - [`roles`]: `Role=a,b,c` extension → role set
//! - [`attributes`]: `DeviceId=...` extension → attribute map
//! - [`device_id`]: HMAC-signed device identifier generation/verification
//! - [`access_control`]: first-match role rules per request path

pub mod access_control;
pub mod attributes;
pub mod device_id;
pub mod roles;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::Result;
use crate::certificate::{CertificateSource, X509Cert, codec, extension};
use crate::config::IdentityConfig;

pub use access_control::{AccessDecision, RolePolicy};
pub use attributes::AttributesAugmentor;
pub use device_id::DeviceIdGenerator;
pub use roles::RolesAugmentor;

/// Set of role names attached to a principal.
pub type RoleSet = BTreeSet<String>;
/// Free-form attributes attached to a principal.
pub type AttributeMap = BTreeMap<String, String>;

// ─────────────────────────────────────────────────────────────────────────────
// Security identity
// ─────────────────────────────────────────────────────────────────────────────

/// An authenticated principal and its authorization context.
///
/// Values are immutable once built; augmentors return new identities.
#[derive(Debug, Clone, Default)]
pub struct SecurityIdentity {
    principal: Option<String>,
    certificate: Option<Arc<dyn CertificateSource>>,
    roles: RoleSet,
    attributes: AttributeMap,
}

impl SecurityIdentity {
    /// Identity with no principal and no credential.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Identity backed by a certificate credential; the principal is the subject DN.
    #[must_use]
    pub fn from_certificate(certificate: Arc<dyn CertificateSource>) -> Self {
        Self {
            principal: certificate.subject().map(str::to_owned),
            certificate: Some(certificate),
            ..Self::default()
        }
    }

    /// Build an identity from the DER peer certificate handed over by the TLS layer.
    ///
    /// # Errors
    ///
    /// Returns `Error::CertificateParse` if the DER cannot be parsed.
    pub fn from_peer_certificate(der: &[u8]) -> Result<Self> {
        let cert = X509Cert::from_der(der)?;
        Ok(Self::from_certificate(Arc::new(cert)))
    }

    /// Copy of this identity with `roles` added.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Copy of this identity with `attributes` merged in (later values win).
    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Principal name (subject DN for certificate identities).
    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// The peer certificate credential, if any.
    #[must_use]
    pub fn certificate(&self) -> Option<&dyn CertificateSource> {
        self.certificate.as_deref()
    }

    /// Roles granted to this identity.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Attributes attached to this identity.
    #[must_use]
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// `true` when no principal is known.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }

    /// `true` when `role` was granted.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Common Name of the peer certificate subject.
    #[must_use]
    pub fn common_name(&self) -> Option<String> {
        codec::common_name(self.certificate()).ok().flatten()
    }

    /// Serialisable snapshot of the principal and its authorization data.
    #[must_use]
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            principal: self.principal.clone(),
            user_cn: self.common_name(),
            roles: self.roles.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Serialisable view of a [`SecurityIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Subject DN.
    pub principal: Option<String>,
    /// Subject Common Name.
    #[serde(rename = "userCN")]
    pub user_cn: Option<String>,
    /// Granted roles.
    pub roles: RoleSet,
    /// Attached attributes.
    pub attributes: AttributeMap,
}

// ─────────────────────────────────────────────────────────────────────────────
// Augmentation
// ─────────────────────────────────────────────────────────────────────────────

/// Adds authorization data to an authenticated identity.
///
/// Implementations must be pure: the result depends only on the input
/// identity and the augmentor's immutable configuration.
pub trait IdentityAugmentor: Send + Sync {
    /// Return `identity` with extra roles or attributes merged in.
    fn augment(&self, identity: &SecurityIdentity) -> SecurityIdentity;
}

/// Applies several augmentors in order.
#[derive(Default)]
pub struct AugmentorChain {
    augmentors: Vec<Box<dyn IdentityAugmentor>>,
}

impl AugmentorChain {
    /// Empty chain (identity passes through unchanged).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Roles then attributes, with OIDs from configuration.
    #[must_use]
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new()
            .with(RolesAugmentor::with_oid(&config.roles_oid))
            .with(AttributesAugmentor::with_oid(&config.device_id_oid))
    }

    /// Append an augmentor.
    #[must_use]
    pub fn with(mut self, augmentor: impl IdentityAugmentor + 'static) -> Self {
        self.augmentors.push(Box::new(augmentor));
        self
    }

    /// Number of augmentors in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.augmentors.len()
    }

    /// `true` when the chain has no augmentors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.augmentors.is_empty()
    }
}

impl IdentityAugmentor for AugmentorChain {
    fn augment(&self, identity: &SecurityIdentity) -> SecurityIdentity {
        self.augmentors
            .iter()
            .fold(identity.clone(), |acc, augmentor| augmentor.augment(&acc))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared payload helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decode the text payload of extension `oid`, swallowing malformed encodings.
fn extension_text(cert: &dyn CertificateSource, oid: &str) -> Option<String> {
    let value = cert.extension_value(oid)?;
    match extension::decode(value) {
        Ok(text) => text,
        Err(e) => {
            warn!(oid = %oid, error = %e, "Ignoring malformed certificate extension");
            None
        }
    }
}

/// Split a `Key=rest` payload, requiring `Key` to match `expected_key`.
fn payload_value<'a>(payload: &'a str, expected_key: &str) -> Option<&'a str> {
    let (key, value) = payload.split_once('=')?;
    key.trim()
        .eq_ignore_ascii_case(expected_key)
        .then(|| value.trim())
}
