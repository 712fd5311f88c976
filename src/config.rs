//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::identity::attributes::OID_DEVICE_ID;
use crate::identity::roles::OID_ROLES;
use crate::mtls::MtlsConfig;
use crate::{Error, Result};

/// Environment variable prefix; nested keys are separated by `__`
/// (e.g. `MTLS_TRUST_TRUST_LIST__URL`).
pub const ENV_PREFIX: &str = "MTLS_TRUST_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote trust list and local store
    pub trust_list: TrustListConfig,
    /// Certificate extension OIDs and device id secret
    pub identity: IdentityConfig,
    /// Path-based role rules
    pub access: AccessConfig,
    /// Mutual TLS server settings
    pub mtls: MtlsConfig,
}

/// Trust-list download and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustListConfig {
    /// URL of the ETSI TS 119 612 trust-list XML
    pub url: String,
    /// Directory receiving one `<fingerprint>.pem` per certificate
    pub output_dir: PathBuf,
    /// Concatenated PEM bundle
    pub bundle_path: PathBuf,
    /// Gap between refresh cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Wait before the first cycle
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// HTTP request timeout
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
}

impl Default for TrustListConfig {
    fn default() -> Self {
        Self {
            url: "https://eidas.agid.gov.it/TL/TSL-IT.xml".to_string(),
            output_dir: PathBuf::from("/tmp/tsl-it"),
            bundle_path: PathBuf::from("/tmp/tsl-it/tsl-it_bundle.pem"),
            interval: Duration::from_secs(120),
            initial_delay: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Identity augmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Extension OID carrying `Role=...`
    pub roles_oid: String,
    /// Extension OID carrying `DeviceId=...`
    pub device_id_oid: String,
    /// HMAC secret for device identifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id_secret: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            roles_oid: OID_ROLES.to_string(),
            device_id_oid: OID_DEVICE_ID.to_string(),
            device_id_secret: None,
        }
    }
}

/// Ordered access rules; first match wins, no match denies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Rules in evaluation order
    pub rules: Vec<AccessRuleConfig>,
}

/// One path → roles rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRuleConfig {
    /// Path glob (`*`, `prefix*`, `*suffix`, `*contains*`, exact)
    pub path: String,
    /// Roles granting access; `"*"` admits any authenticated identity
    pub roles: Vec<String>,
}

impl Config {
    /// Load configuration from an optional YAML file and `MTLS_TRUST_` env vars.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, cannot be parsed, or
    /// the resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.resolve();
        config.validate()?;
        Ok(config)
    }

    /// Fill derived defaults.
    fn resolve(&mut self) {
        if self.mtls.trust_bundle.as_os_str().is_empty() {
            self.mtls.trust_bundle.clone_from(&self.trust_list.bundle_path);
        }
    }

    /// Check values that deserialisation alone cannot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.trust_list.url).map_err(|e| {
            Error::Config(format!("Invalid trust_list.url '{}': {e}", self.trust_list.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "trust_list.url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.trust_list.interval.is_zero() {
            return Err(Error::Config("trust_list.interval must be non-zero".to_string()));
        }
        if self.trust_list.output_dir.as_os_str().is_empty() {
            return Err(Error::Config("trust_list.output_dir must be set".to_string()));
        }
        for (name, oid) in [
            ("identity.roles_oid", &self.identity.roles_oid),
            ("identity.device_id_oid", &self.identity.device_id_oid),
        ] {
            if !is_dotted_oid(oid) {
                return Err(Error::Config(format!("{name} '{oid}' is not a dotted OID")));
            }
        }
        if self.mtls.enabled
            && (self.mtls.server_cert.as_os_str().is_empty()
                || self.mtls.server_key.as_os_str().is_empty())
        {
            return Err(Error::Config(
                "mtls.server_cert and mtls.server_key are required when mTLS is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn is_dotted_oid(oid: &str) -> bool {
    let mut arcs = oid.split('.');
    let valid = arcs
        .clone()
        .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
    valid && arcs.nth(1).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_national_trust_list_schedule() {
        let config = Config::default();
        assert_eq!(config.trust_list.interval, Duration::from_secs(120));
        assert_eq!(config.trust_list.initial_delay, Duration::from_secs(60));
        assert_eq!(config.identity.roles_oid, "1.3.6.1.4.1.99999.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_with_humantime_durations() {
        let yaml = r#"
trust_list:
  url: "https://example.org/TSL.xml"
  output_dir: /var/lib/mtls-trust/certs
  interval: 5m
  initial_delay: 10s
access:
  rules:
    - path: "/api/v1/admin*"
      roles: [Administrator]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.trust_list.interval, Duration::from_secs(300));
        assert_eq!(config.trust_list.initial_delay, Duration::from_secs(10));
        assert_eq!(config.access.rules[0].roles, vec!["Administrator"]);
        // untouched sections keep their defaults
        assert_eq!(config.identity.device_id_oid, "1.3.6.1.4.1.99999.2");
    }

    #[test]
    fn load_reads_file_and_resolves_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "trust_list:\n  bundle_path: /srv/bundle.pem\nmtls:\n  require_client_cert: false\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.mtls.trust_bundle, PathBuf::from("/srv/bundle.pem"));
        assert!(!config.mtls.require_client_cert);
    }

    #[test]
    fn load_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/config.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_url() {
        let mut config = Config::default();
        config.trust_list.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.trust_list.url = "ftp://example.org/tsl.xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.trust_list.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_oid() {
        let mut config = Config::default();
        config.identity.roles_oid = "1.3.x".to_string();
        assert!(config.validate().is_err());
        config.identity.roles_oid = "1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_server_material_when_mtls_enabled() {
        let mut config = Config::default();
        config.mtls.enabled = true;
        assert!(config.validate().is_err());
    }
}
