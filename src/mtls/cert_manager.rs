//! PEM loading and `rustls` server configuration.
//!
//! Client certificates are verified against every anchor in the trust
//! bundle produced by the trust-list refresher, plus an optional extra CA.
//! Bundle entries that `webpki` cannot use as anchors are skipped and
//! counted rather than failing the whole configuration.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tracing::{debug, info, warn};

use crate::mtls::config::MtlsConfig;
use crate::{Error, Result};

/// Build a `rustls::ServerConfig` requesting client certificates.
///
/// # Errors
///
/// Returns `Error::Config` if a file cannot be read or parsed, no usable
/// trust anchor is found, or the server certificate and key do not match.
pub fn build_tls_config(config: &MtlsConfig) -> Result<ServerConfig> {
    let server_certs = load_certs(&config.server_cert)?;
    let server_key = load_private_key(&config.server_key)?;
    let roots = build_root_store(config)?;

    let builder = WebPkiClientVerifier::builder(Arc::new(roots));
    let builder = if config.require_client_cert {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    let verifier = builder
        .build()
        .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?;

    let mut tls_cfg = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;
    tls_cfg.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert.display(),
        trust_bundle = %config.trust_bundle.display(),
        require_client_cert = config.require_client_cert,
        "mTLS config built"
    );
    Ok(tls_cfg)
}

/// Trust anchors from the bundle and the optional extra CA.
///
/// A missing bundle is tolerated when an extra CA is configured, since the
/// first refresh may not have completed yet.
///
/// # Errors
///
/// Returns `Error::Config` if a file is unreadable or no anchor is usable.
pub fn build_root_store(config: &MtlsConfig) -> Result<RootCertStore> {
    let mut anchors = Vec::new();
    if config.trust_bundle.exists() {
        anchors.extend(load_certs(&config.trust_bundle)?);
    } else if config.extra_ca_cert.is_some() {
        warn!(
            trust_bundle = %config.trust_bundle.display(),
            "Trust bundle not found, trusting only the extra CA"
        );
    } else {
        return Err(Error::Config(format!(
            "Trust bundle '{}' not found",
            config.trust_bundle.display()
        )));
    }
    if let Some(extra) = &config.extra_ca_cert {
        anchors.extend(load_certs(extra)?);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(anchors);
    if ignored > 0 {
        warn!(ignored, "Skipped trust anchors rustls could not use");
    }
    if added == 0 {
        return Err(Error::Config("No usable client trust anchors".to_string()));
    }
    info!(anchors = added, "Client trust anchors loaded");
    Ok(roots)
}

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or holds no
/// certificate block.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs = rustls_pemfile::certs(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::Config(format!("Failed to parse certs from '{}': {e}", path.display()))
        })?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or holds no key.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    rustls_pemfile::private_key(&mut pem_data.as_slice())
        .map_err(|e| {
            Error::Config(format!(
                "Failed to parse private key from '{}': {e}",
                path.display()
            ))
        })?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path.display())))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("Cannot read '{}': {e}", path.display())))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Self-signed PEM material written to a temp dir.

    use std::path::{Path, PathBuf};

    use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair};

    use crate::certificate::extension;

    /// PEM certificate and key on disk.
    pub struct PemPair {
        pub cert: PathBuf,
        pub key: PathBuf,
        pub cert_pem: String,
        pub key_pem: String,
    }

    /// Self-signed cert for `name` (also a DNS SAN) with UTF8String extensions.
    pub fn write_pair(dir: &Path, name: &str, extensions: &[(&[u64], &str)]) -> PemPair {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.custom_extensions = extensions
            .iter()
            .map(|(oid, text)| {
                CustomExtension::from_oid_content(oid, extension::encode_utf8_string(text))
            })
            .collect();
        let key = KeyPair::generate().unwrap();
        let cert_pem = params.self_signed(&key).unwrap().pem();
        let key_pem = key.serialize_pem();

        let cert = dir.join(format!("{name}.crt"));
        let key_path = dir.join(format!("{name}.key"));
        std::fs::write(&cert, &cert_pem).unwrap();
        std::fs::write(&key_path, &key_pem).unwrap();
        PemPair {
            cert,
            key: key_path,
            cert_pem,
            key_pem,
        }
    }
}
