//! HMAC-signed device identifiers.
//!
//! An identifier is the Base64 encoding of
//! `<unix-nanos>#<uuid-v4>#<hostname>#<hex hmac-sha256>` where the HMAC covers
//! the first three fields. These values are what gets embedded in the
//! `DeviceId=` certificate extension when issuing client certificates.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{KeyInit, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

const SEPARATOR: char = '#';
const FIELD_COUNT: usize = 4;
const FALLBACK_HOSTNAME: &str = "localhost";

/// Generates and verifies device identifiers with a shared secret.
#[derive(Clone)]
pub struct DeviceIdGenerator {
    secret: Vec<u8>,
    hostname: String,
}

impl std::fmt::Debug for DeviceIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdGenerator")
            .field("secret", &"<redacted>")
            .field("hostname", &self.hostname)
            .finish()
    }
}

impl DeviceIdGenerator {
    /// Generator signing with `secret`; the hostname comes from `$HOSTNAME`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let hostname = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string());
        Self {
            secret: secret.into(),
            hostname,
        }
    }

    /// Override the hostname embedded in generated identifiers.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Hostname embedded in generated identifiers.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Fresh identifier for the current instant and a random UUID.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the secret cannot key the HMAC.
    pub fn generate(&self) -> Result<String> {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1000));
        self.generate_at(nanos, Uuid::new_v4())
    }

    fn generate_at(&self, nanos: i64, id: Uuid) -> Result<String> {
        let data = format!("{nanos}{SEPARATOR}{id}{SEPARATOR}{}", self.hostname);
        let signature = self.sign(&data)?;
        Ok(BASE64.encode(format!("{data}{SEPARATOR}{signature}")))
    }

    /// `true` only for a well-formed identifier signed with this secret.
    #[must_use]
    pub fn verify(&self, device_id: Option<&str>) -> bool {
        let Some(device_id) = device_id.filter(|s| !s.is_empty()) else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(device_id) else {
            debug!("Device id is not valid Base64");
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        if decoded.split(SEPARATOR).count() != FIELD_COUNT {
            debug!("Device id has the wrong number of fields");
            return false;
        }
        let Some((data, signature)) = decoded.rsplit_once(SEPARATOR) else {
            return false;
        };
        let Ok(expected) = self.sign(data) else {
            return false;
        };
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }

    fn sign(&self, data: &str) -> Result<String> {
        let mut mac = hmac::Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|e| Error::InvalidArgument(format!("Invalid device id secret: {e}")))?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
