//! Mutual TLS with trust anchors from the national trust list.
//!
//! ```text
//! TCP connection
//!   → TLS handshake  (rustls verifies the client cert against the trust bundle)
//!   → peer::identity_from_connection
//!   → AugmentorChain (roles, device id)
//! ```
//!
//! - [`config`]: `MtlsConfig`
//! - [`cert_manager`]: PEM loading and `rustls::ServerConfig` building
//! - [`peer`]: handshake result → `SecurityIdentity`
//!
//! ```yaml
//! mtls:
//!   enabled: true
//!   server_cert: "/etc/mtls-trust/tls/server.crt"
//!   server_key:  "/etc/mtls-trust/tls/server.key"
//!   extra_ca_cert: "/etc/mtls-trust/tls/private-ca.crt"
//!   require_client_cert: true
//! ```

pub mod cert_manager;
pub mod config;
pub mod peer;

pub use cert_manager::{build_tls_config, load_certs, load_private_key};
pub use config::MtlsConfig;
pub use peer::identity_from_connection;
