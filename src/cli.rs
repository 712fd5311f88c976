//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Trust-list backed mutual TLS: anchor refresh and certificate identity tools
#[derive(Parser, Debug)]
#[command(name = "mtls-trust")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MTLS_TRUST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "MTLS_TRUST_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MTLS_TRUST_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to serve)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the trust list periodically until interrupted (default)
    Serve {
        /// Run the first cycle immediately instead of after the initial delay
        #[arg(long)]
        now: bool,
    },

    /// Run a single refresh cycle and exit
    Refresh,

    /// Rebuild the PEM bundle from the stored certificates
    Bundle,

    /// Print certificate details, roles and attributes as JSON
    Inspect {
        /// PEM certificate file
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Evaluate the access rules for a certificate and request path
    Authorize {
        /// PEM client certificate file
        #[arg(required = true)]
        file: PathBuf,

        /// Request path to check
        #[arg(required = true)]
        path: String,
    },

    /// Device identifier commands
    #[command(subcommand)]
    DeviceId(DeviceIdCommand),
}

/// Device identifier subcommands
#[derive(Subcommand, Debug)]
pub enum DeviceIdCommand {
    /// Generate a new signed device identifier
    Generate,

    /// Verify a device identifier (exit code 0 when valid)
    Verify {
        /// Base64 device identifier
        #[arg(required = true)]
        id: String,
    },
}
