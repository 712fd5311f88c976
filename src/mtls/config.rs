//! mTLS configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server-side mutual TLS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Build and validate the TLS server configuration at startup.
    pub enabled: bool,

    /// PEM server certificate chain.
    pub server_cert: PathBuf,

    /// PEM server private key.
    pub server_key: PathBuf,

    /// PEM bundle of client-certificate trust anchors.
    ///
    /// Left empty, it resolves to `trust_list.bundle_path`.
    pub trust_bundle: PathBuf,

    /// Additional PEM CA trusted alongside the bundle (e.g. a private
    /// issuing CA for device certificates).
    pub extra_ca_cert: Option<PathBuf>,

    /// Reject clients that present no certificate.
    ///
    /// When `false`, a certificate is requested but anonymous clients are
    /// admitted; presented certificates are still verified.
    pub require_client_cert: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_cert: PathBuf::new(),
            server_key: PathBuf::new(),
            trust_bundle: PathBuf::new(),
            extra_ca_cert: None,
            require_client_cert: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requires_client_certificate() {
        let config = MtlsConfig::default();
        assert!(!config.enabled);
        assert!(config.require_client_cert);
        assert!(config.extra_ca_cert.is_none());
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let yaml = "enabled: true\nserver_cert: /tls/server.crt\nserver_key: /tls/server.key\n";
        let config: MtlsConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.server_cert, PathBuf::from("/tls/server.crt"));
        assert!(config.require_client_cert);
        assert!(config.trust_bundle.as_os_str().is_empty());
    }
}
