//! Periodic download of the remote trust list.
//!
//! ```text
//! spawn(shutdown)
//!   sleep(initial_delay)
//!   every interval:
//!     refresh_once ── already running? → Skipped
//!       fetch ──────── non-2xx / transport error → Failed (files untouched)
//!       parse_and_save + render_bundle when authoritative (blocking pool)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::store::{RefreshReport, TrustListStore};
use crate::config::TrustListConfig;
use crate::{Error, Result};

/// Where the trust-list document comes from.
#[async_trait]
pub trait TrustListSource: Send + Sync {
    /// Retrieve the full document body.
    ///
    /// # Errors
    ///
    /// `Error::Fetch` for a non-success response, `Error::Http` for
    /// transport failures.
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location used in logs.
    fn location(&self) -> &str;
}

/// Downloads the trust list over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTrustListSource {
    url: String,
    client: reqwest::Client,
}

impl HttpTrustListSource {
    /// Source for `url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mtls-trust/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl TrustListSource for HttpTrustListSource {
    async fn fetch(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

/// Result of one [`TrustListRefresher::refresh_once`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The document was fetched and processed.
    Updated {
        /// Per-entry counters.
        report: RefreshReport,
        /// Certificates in the re-rendered bundle; `None` when the cycle
        /// was incomplete or saved nothing and the bundle was left alone.
        bundled: Option<usize>,
    },
    /// The cycle failed before touching any file.
    Failed {
        /// Description of the failure.
        reason: String,
    },
    /// Another refresh was already running.
    Skipped,
}

/// Keeps the on-disk trust store in sync with a [`TrustListSource`].
pub struct TrustListRefresher {
    source: Arc<dyn TrustListSource>,
    store: TrustListStore,
    bundle_path: PathBuf,
    interval: Duration,
    initial_delay: Duration,
    in_flight: Mutex<()>,
    last_report: RwLock<Option<RefreshReport>>,
}

impl std::fmt::Debug for TrustListRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustListRefresher")
            .field("source", &self.source.location())
            .field("store", &self.store)
            .field("bundle_path", &self.bundle_path)
            .field("interval", &self.interval)
            .field("initial_delay", &self.initial_delay)
            .finish_non_exhaustive()
    }
}

impl TrustListRefresher {
    /// Default gap between refresh cycles.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);
    /// Default wait before the first cycle.
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);

    /// Refresher with the default schedule.
    pub fn new(
        source: Arc<dyn TrustListSource>,
        store: TrustListStore,
        bundle_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            store,
            bundle_path: bundle_path.into(),
            interval: Self::DEFAULT_INTERVAL,
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            in_flight: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// HTTP-backed refresher built from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &TrustListConfig) -> Result<Self> {
        let source = HttpTrustListSource::new(&config.url, config.http_timeout)?;
        Ok(Self::new(
            Arc::new(source),
            TrustListStore::new(&config.output_dir),
            &config.bundle_path,
        )
        .with_schedule(config.interval, config.initial_delay))
    }

    /// Override the refresh interval and the initial delay.
    #[must_use]
    pub fn with_schedule(mut self, interval: Duration, initial_delay: Duration) -> Self {
        self.interval = interval;
        self.initial_delay = initial_delay;
        self
    }

    /// Store the refresher writes into.
    #[must_use]
    pub fn store(&self) -> &TrustListStore {
        &self.store
    }

    /// Report of the last cycle that processed a document.
    #[must_use]
    pub fn last_report(&self) -> Option<RefreshReport> {
        self.last_report.read().clone()
    }

    /// Run one fetch → parse → save → bundle cycle.
    ///
    /// Returns [`RefreshOutcome::Skipped`] immediately if a cycle is already
    /// in progress. Failures are logged and reported, never propagated.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Trust list refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        };

        let location = self.source.location();
        let document = match self.source.fetch().await {
            Ok(document) => document,
            Err(e @ Error::Fetch { .. }) => {
                warn!(source = %location, error = %e, "Failed to update trust list");
                return RefreshOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            Err(e) => {
                error!(source = %location, error = %e, "Error updating trust list");
                return RefreshOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let store = self.store.clone();
        let bundle_path = self.bundle_path.clone();
        let processed = tokio::task::spawn_blocking(move || -> Result<_> {
            let report = store.parse_and_save(&document)?;
            let bundled = if report.is_authoritative() {
                Some(store.render_bundle(&bundle_path)?)
            } else {
                None
            };
            Ok((report, bundled))
        })
        .await;

        match processed {
            Ok(Ok((report, bundled))) => {
                info!(
                    source = %location,
                    saved = report.saved,
                    skipped = report.skipped,
                    "Trust list refreshed"
                );
                *self.last_report.write() = Some(report.clone());
                RefreshOutcome::Updated { report, bundled }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to store trust list");
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Trust list processing task failed");
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Start the periodic refresh loop.
    ///
    /// The first cycle runs after the initial delay, then one per interval;
    /// ticks missed while a slow cycle runs are dropped. The task ends when
    /// `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                source = %self.source.location(),
                interval = ?self.interval,
                initial_delay = ?self.initial_delay,
                "Trust list refresher started"
            );
            tokio::select! {
                () = tokio::time::sleep(self.initial_delay) => {}
                _ = shutdown.recv() => {
                    debug!("Trust list refresher shutting down");
                    return;
                }
            }

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh_once().await;
                    }
                    _ = shutdown.recv() => {
                        debug!("Trust list refresher shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use super::*;
    use crate::certificate::testing::self_signed_der;
    use crate::trust_list::store::pem_files;

    /// In-memory source returning a fixed result after an optional delay.
    struct StaticSource {
        body: std::result::Result<String, u16>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(body: String) -> Self {
            Self {
                body: Ok(body),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn status(status: u16) -> Self {
            Self {
                body: Err(status),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TrustListSource for StaticSource {
        async fn fetch(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.body.clone().map_err(|status| Error::Fetch {
                url: "memory://trust-list".to_string(),
                status,
            })
        }

        fn location(&self) -> &str {
            "memory://trust-list"
        }
    }

    fn trust_list(cns: &[&str]) -> String {
        let body: String = cns
            .iter()
            .map(|cn| {
                format!(
                    "<X509Certificate>{}</X509Certificate>",
                    BASE64.encode(self_signed_der(cn, &[]))
                )
            })
            .collect();
        format!("<TrustServiceStatusList>{body}</TrustServiceStatusList>")
    }

    fn refresher(source: StaticSource, dir: &std::path::Path) -> TrustListRefresher {
        TrustListRefresher::new(
            Arc::new(source),
            TrustListStore::new(dir.join("certs")),
            dir.join("bundle.pem"),
        )
    }

    #[tokio::test]
    async fn successful_cycle_saves_and_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let refresher = refresher(StaticSource::ok(trust_list(&["ca-1", "ca-2"])), dir.path());

        let outcome = refresher.refresh_once().await;

        let RefreshOutcome::Updated { report, bundled } = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        assert_eq!(report.saved, 2);
        assert_eq!(bundled, Some(2));
        assert!(dir.path().join("bundle.pem").exists());
        assert_eq!(refresher.last_report(), Some(report));
    }

    #[tokio::test]
    async fn error_status_leaves_files_untouched() {
        // GIVEN: an existing store and bundle
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("certs")).unwrap();
        std::fs::write(dir.path().join("certs").join("old.pem"), "old").unwrap();
        std::fs::write(dir.path().join("bundle.pem"), "old").unwrap();
        let refresher = refresher(StaticSource::status(500), dir.path());

        // WHEN: the server answers 500
        let outcome = refresher.refresh_once().await;

        // THEN: failure reported, nothing changed
        assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
        assert_eq!(pem_files(&dir.path().join("certs")).unwrap().len(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("bundle.pem")).unwrap(), "old");
        assert_eq!(refresher.last_report(), None);
    }

    #[tokio::test]
    async fn document_without_valid_entries_keeps_bundle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bundle.pem"), "old").unwrap();
        let refresher = refresher(
            StaticSource::ok("<L><X509Certificate>INVALID</X509Certificate></L>".to_string()),
            dir.path(),
        );

        let outcome = refresher.refresh_once().await;

        let RefreshOutcome::Updated { report, bundled } = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        assert_eq!(report.skipped, 1);
        assert_eq!(bundled, None);
        assert_eq!(std::fs::read_to_string(dir.path().join("bundle.pem")).unwrap(), "old");
    }

    #[tokio::test]
    async fn truncated_document_keeps_bundle() {
        // GIVEN: a bundle from an earlier cycle
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bundle.pem"), "old").unwrap();
        let xml = format!(
            "<L><X509Certificate>{}</X509Certificate><X509Certificate>x</Broken></L>",
            BASE64.encode(self_signed_der("ca-1", &[]))
        );
        let refresher = refresher(StaticSource::ok(xml), dir.path());

        // WHEN: the document breaks part-way
        let outcome = refresher.refresh_once().await;

        // THEN: the entry is saved but the bundle is not replaced
        let RefreshOutcome::Updated { report, bundled } = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        assert_eq!(report.saved, 1);
        assert!(!report.complete);
        assert_eq!(bundled, None);
        assert_eq!(std::fs::read_to_string(dir.path().join("bundle.pem")).unwrap(), "old");
    }

    #[tokio::test]
    async fn concurrent_refresh_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = StaticSource::ok(trust_list(&["ca-1"]));
        source.delay = Duration::from_millis(200);
        let refresher = refresher(source, dir.path());

        // first future takes the lock and parks in fetch; second finds it held
        let (first, second) = tokio::join!(refresher.refresh_once(), refresher.refresh_once());

        assert!(matches!(first, RefreshOutcome::Updated { .. }));
        assert_eq!(second, RefreshOutcome::Skipped);
    }

    #[tokio::test]
    async fn spawned_loop_refreshes_until_shutdown() {
        // GIVEN: a fast schedule
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StaticSource::ok(trust_list(&["ca-1"])));
        let refresher = Arc::new(
            TrustListRefresher::new(
                source.clone(),
                TrustListStore::new(dir.path().join("certs")),
                dir.path().join("bundle.pem"),
            )
            .with_schedule(Duration::from_millis(20), Duration::ZERO),
        );
        let (tx, rx) = broadcast::channel(1);

        // WHEN: running for a while
        let handle = refresher.clone().spawn(rx);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while source.calls.load(Ordering::SeqCst) < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(()).unwrap();
        handle.await.unwrap();

        // THEN: several cycles ran and the loop stopped
        assert!(source.calls.load(Ordering::SeqCst) >= 2);
        assert!(refresher.last_report().is_some());
    }

    #[tokio::test]
    async fn shutdown_during_initial_delay_stops_before_first_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(StaticSource::ok(String::new()));
        let refresher = Arc::new(TrustListRefresher::new(
            source.clone(),
            TrustListStore::new(dir.path()),
            dir.path().join("bundle.pem"),
        ));
        let (tx, rx) = broadcast::channel(1);

        let handle = refresher.spawn(rx);
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
