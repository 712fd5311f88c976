//! Error types for mtls-trust

use std::io;

use thiserror::Error;

/// Result type alias for mtls-trust
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried as the cause of a conversion failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// mtls-trust errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate could not be encoded to Base64/PEM or written to disk
    #[error("{message}")]
    Conversion {
        /// Human-readable description of the failed step
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// Structurally invalid ASN.1 in a certificate extension value
    #[error("Malformed extension: {0}")]
    MalformedExtension(String),

    /// Trust-list download returned a non-success status
    #[error("Trust list fetch from {url} failed with HTTP status {status}")]
    Fetch {
        /// Requested URL
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// A required argument was absent or unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Certificate DER could not be parsed
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// Create a conversion error without an underlying cause
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
            source: None,
        }
    }

    /// Create a conversion error wrapping its cause
    pub fn conversion_with(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Conversion {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this error only affects a single certificate or extension.
    ///
    /// Local errors degrade to "skip" or "empty result" at the call site.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Conversion { .. }
                | Self::MalformedExtension(_)
                | Self::CertificateParse(_)
        )
    }
}
