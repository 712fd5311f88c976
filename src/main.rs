//! mtls-trust - trust-list refresher and certificate identity tooling

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use mtls_trust::{
    cli::{Cli, Command, DeviceIdCommand},
    config::Config,
    identity::{
        AccessDecision, AugmentorChain, DeviceIdGenerator, IdentityAugmentor, RolePolicy,
        SecurityIdentity,
    },
    inspect::inspect_pem,
    mtls::build_tls_config,
    setup_tracing,
    trust_list::{RefreshOutcome, TrustListRefresher},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Refresh) => run_refresh(&config).await,
        Some(Command::Bundle) => run_bundle(&config),
        Some(Command::Inspect { file }) => run_inspect(&config, &file),
        Some(Command::Authorize { file, path }) => run_authorize(&config, &file, &path),
        Some(Command::DeviceId(cmd)) => run_device_id(&config, &cmd),
        Some(Command::Serve { now }) => run_server(config, now).await,
        None => run_server(config, false).await,
    }
}

/// Refresh periodically until SIGINT/SIGTERM
async fn run_server(config: Config, now: bool) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %config.trust_list.url,
        output_dir = %config.trust_list.output_dir.display(),
        "Starting mtls-trust"
    );

    if config.mtls.enabled {
        match build_tls_config(&config.mtls) {
            Ok(_) => info!("mTLS server configuration validated"),
            Err(e) => warn!("mTLS configuration not usable yet: {e}"),
        }
    }

    let mut trust_list = config.trust_list.clone();
    if now {
        trust_list.initial_delay = std::time::Duration::ZERO;
    }
    let refresher = match TrustListRefresher::from_config(&trust_list) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("Failed to create refresher: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = refresher.clone().spawn(shutdown_rx);

    shutdown_signal(shutdown_tx).await;
    if let Err(e) = handle.await {
        error!("Refresher task failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(report) = refresher.last_report() {
        info!(saved = report.saved, skipped = report.skipped, "Last refresh");
    }
    info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Run one refresh cycle
async fn run_refresh(config: &Config) -> ExitCode {
    let refresher = match TrustListRefresher::from_config(&config.trust_list) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create refresher: {e}");
            return ExitCode::FAILURE;
        }
    };

    match refresher.refresh_once().await {
        RefreshOutcome::Updated { report, bundled } => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!("Failed to serialize report: {e}"),
            }
            if let Some(count) = bundled {
                info!(certificates = count, "Bundle updated");
            }
            ExitCode::SUCCESS
        }
        RefreshOutcome::Failed { reason } => {
            eprintln!("Refresh failed: {reason}");
            ExitCode::FAILURE
        }
        RefreshOutcome::Skipped => ExitCode::SUCCESS,
    }
}

/// Rebuild the bundle from stored certificates
fn run_bundle(config: &Config) -> ExitCode {
    match mtls_trust::trust_list::render_bundle(
        &config.trust_list.output_dir,
        &config.trust_list.bundle_path,
    ) {
        Ok(count) => {
            println!(
                "{} certificate(s) written to {}",
                count,
                config.trust_list.bundle_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Bundle failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_pem(file: &std::path::Path) -> Option<String> {
    match std::fs::read_to_string(file) {
        Ok(pem) => Some(pem),
        Err(e) => {
            eprintln!("Cannot read {}: {e}", file.display());
            None
        }
    }
}

/// Print certificate details as JSON
fn run_inspect(config: &Config, file: &std::path::Path) -> ExitCode {
    let Some(pem) = read_pem(file) else {
        return ExitCode::FAILURE;
    };
    let chain = AugmentorChain::from_config(&config.identity);

    match inspect_pem(&pem, &chain).and_then(|report| {
        serde_json::to_string_pretty(&report)
            .map_err(|e| mtls_trust::Error::conversion_with("Failed to serialize report", e))
    }) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Inspect failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Evaluate the access rules for a certificate
fn run_authorize(config: &Config, file: &std::path::Path, path: &str) -> ExitCode {
    let Some(pem) = read_pem(file) else {
        return ExitCode::FAILURE;
    };
    let cert = match mtls_trust::certificate::X509Cert::from_pem(&pem) {
        Ok(cert) => cert,
        Err(e) => {
            eprintln!("Invalid certificate: {e}");
            return ExitCode::FAILURE;
        }
    };

    let chain = AugmentorChain::from_config(&config.identity);
    let identity = chain.augment(&SecurityIdentity::from_certificate(Arc::new(cert)));
    let policy = RolePolicy::from_config(&config.access);

    match policy.evaluate(&identity, path) {
        AccessDecision::Allow => {
            println!("allow");
            ExitCode::SUCCESS
        }
        AccessDecision::Deny => {
            println!("deny");
            ExitCode::FAILURE
        }
    }
}

/// Generate or verify device identifiers
fn run_device_id(config: &Config, cmd: &DeviceIdCommand) -> ExitCode {
    let Some(secret) = config.identity.device_id_secret.as_deref() else {
        eprintln!("identity.device_id_secret is not configured (MTLS_TRUST_IDENTITY__DEVICE_ID_SECRET)");
        return ExitCode::FAILURE;
    };
    let generator = DeviceIdGenerator::new(secret);

    match cmd {
        DeviceIdCommand::Generate => match generator.generate() {
            Ok(id) => {
                println!("{id}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Generation failed: {e}");
                ExitCode::FAILURE
            }
        },
        DeviceIdCommand::Verify { id } => {
            if generator.verify(Some(id)) {
                println!("valid");
                ExitCode::SUCCESS
            } else {
                println!("invalid");
                ExitCode::FAILURE
            }
        }
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
