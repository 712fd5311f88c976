//! National trust-list ingestion.
//!
//! The remote list (ETSI TS 119 612 XML) is fetched periodically, every
//! `X509Certificate` it carries is validated and written as
//! `<sha256-fingerprint>.pem`, and the directory is concatenated into a
//! single bundle that the TLS layer loads as client-certificate trust
//! anchors.
//!
//! - [`document`]: XML → Base64 certificate bodies
//! - [`store`]: bodies → PEM files and the bundle
//! - [`refresher`]: HTTP fetch and the periodic loop

pub mod document;
pub mod refresher;
pub mod store;

pub use refresher::{HttpTrustListSource, RefreshOutcome, TrustListRefresher, TrustListSource};
pub use store::{RefreshReport, TrustListStore, render_bundle};
