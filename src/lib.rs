//! mtls-trust Library
//!
//! Mutual-TLS client authentication backed by a national trust list.
//!
//! # Features
//!
//! - **Trust-list refresh**: periodic download of an ETSI TS 119 612 list,
//!   one PEM per certificate plus an atomically written bundle
//! - **TLS trust anchors**: `rustls` server configuration trusting the bundle
//! - **Identity augmentation**: roles and device identifiers read from private
//!   certificate extensions
//! - **Certificate tooling**: PEM/Base64 codec, Common Name, key size,
//!   fingerprints, signed device identifiers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod inspect;
pub mod mtls;
pub mod trust_list;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format = Some("json")` selects
/// structured JSON output.
///
/// # Errors
///
/// Returns `Error::Config` if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
