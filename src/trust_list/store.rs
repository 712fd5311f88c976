//! On-disk trust-anchor store: one PEM per certificate plus a bundle.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::document;
use crate::certificate::{X509Cert, codec};
use crate::{Error, Result};

const PEM_EXTENSION: &str = "pem";

/// Counters for one parse-and-save cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// `X509Certificate` entries found in the document.
    pub found: usize,
    /// Entries written as PEM files.
    pub saved: usize,
    /// Entries rejected (bad Base64, bad DER, outside validity, write failure).
    pub skipped: usize,
    /// Stale PEM files removed from the output directory.
    pub pruned: usize,
    /// `false` when an XML syntax error cut the document short.
    pub complete: bool,
}

impl RefreshReport {
    /// Whether this cycle describes the whole trust list: the document was
    /// read to the end and at least one certificate was saved. Only such a
    /// cycle may prune stale files or replace the bundle.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.complete && self.saved > 0
    }
}

/// Writes trust-list certificates into a directory of PEM files.
#[derive(Debug, Clone)]
pub struct TrustListStore {
    output_dir: PathBuf,
}

impl TrustListStore {
    /// Store rooted at `output_dir` (created on first save).
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory holding the per-certificate PEM files.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Extract, validate and save every certificate in `document`.
    ///
    /// Individual bad entries are logged and skipped. Stale fingerprint-named
    /// `.pem` files are pruned only after an authoritative cycle (see
    /// [`RefreshReport::is_authoritative`]); other files in the directory,
    /// such as a bundle stored alongside, are never touched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the output directory cannot be created or listed,
    /// or a non-certificate error interrupts the batch.
    pub fn parse_and_save(&self, document: &str) -> Result<RefreshReport> {
        self.parse_and_save_at(document, chrono::Utc::now().timestamp())
    }

    /// [`Self::parse_and_save`] with an explicit validity reference time.
    ///
    /// # Errors
    ///
    /// See [`Self::parse_and_save`].
    pub fn parse_and_save_at(&self, document: &str, now: i64) -> Result<RefreshReport> {
        fs::create_dir_all(&self.output_dir)?;

        let extracted = document::extract_certificates(document);
        let mut report = RefreshReport {
            found: extracted.entries.len(),
            complete: extracted.is_complete(),
            ..RefreshReport::default()
        };
        let mut written = BTreeSet::new();

        for (index, entry) in extracted.entries.iter().enumerate() {
            match self.save_entry(entry, now) {
                Ok(path) => {
                    debug!(index, path = %path.display(), "Saved trust-list certificate");
                    written.insert(path);
                    report.saved += 1;
                }
                Err(e) if e.is_local() => {
                    warn!(index, error = %e, "Skipping trust-list entry");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if report.is_authoritative() {
            report.pruned = self.prune_except(&written)?;
        } else if report.saved > 0 {
            warn!(
                dir = %self.output_dir.display(),
                "Trust list document incomplete, keeping existing certificates"
            );
        }

        record_metrics(&report);
        info!(
            dir = %self.output_dir.display(),
            found = report.found,
            saved = report.saved,
            skipped = report.skipped,
            pruned = report.pruned,
            "Trust list parsed"
        );
        Ok(report)
    }

    fn save_entry(&self, entry: &str, now: i64) -> Result<PathBuf> {
        let compact: String = entry.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(Error::conversion("Empty certificate entry"));
        }
        let der = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| Error::conversion_with("Invalid Base64 certificate entry", e))?;
        let cert = X509Cert::from_der(der)?;
        if !cert.is_valid_at(now) {
            return Err(Error::CertificateParse(format!(
                "Certificate with serial {} is outside its validity period",
                cert.serial()
            )));
        }

        let path = self
            .output_dir
            .join(format!("{}.{PEM_EXTENSION}", codec::fingerprint_sha256(&cert)?));
        codec::write_pem(&cert, &path)?;
        Ok(path)
    }

    fn prune_except(&self, keep: &BTreeSet<PathBuf>) -> Result<usize> {
        let mut pruned = 0;
        for path in pem_files(&self.output_dir)? {
            if keep.contains(&path) || !is_fingerprint_name(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Pruned stale certificate");
                    pruned += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune stale certificate"),
            }
        }
        Ok(pruned)
    }

    /// Concatenate this store's PEM files into `bundle_path`.
    ///
    /// # Errors
    ///
    /// See [`render_bundle`].
    pub fn render_bundle(&self, bundle_path: &Path) -> Result<usize> {
        render_bundle(&self.output_dir, bundle_path)
    }
}

/// Concatenate every `*.pem` file in `source_dir`, sorted by file name, into
/// `bundle_path`. The bundle itself is skipped when it lives in `source_dir`.
///
/// The bundle is written to a temporary file beside it and renamed into place,
/// so readers never observe a partial bundle. Returns the number of files
/// included.
///
/// # Errors
///
/// Returns `Error::Io` if the directory cannot be read or the bundle cannot
/// be written.
pub fn render_bundle(source_dir: &Path, bundle_path: &Path) -> Result<usize> {
    let bundle_dir = match bundle_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&bundle_dir)?;
    let bundle_canonical = bundle_path.canonicalize().ok();

    let mut tmp = tempfile::NamedTempFile::new_in(&bundle_dir)?;
    let mut included = 0;
    for path in pem_files(source_dir)? {
        let is_bundle = path == bundle_path
            || bundle_canonical
                .as_ref()
                .is_some_and(|bundle| path.canonicalize().ok().as_ref() == Some(bundle));
        if is_bundle {
            continue;
        }
        let content = fs::read(&path)?;
        tmp.write_all(&content)?;
        if !content.ends_with(b"\n") {
            tmp.write_all(b"\n")?;
        }
        included += 1;
    }
    tmp.flush()?;
    tmp.persist(bundle_path).map_err(|e| Error::Io(e.error))?;

    info!(
        bundle = %bundle_path.display(),
        certificates = included,
        "Trust bundle written"
    );
    Ok(included)
}

/// `*.pem` regular files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns `Error::Io` if `dir` cannot be read.
pub fn pem_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_pem = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PEM_EXTENSION));
        if is_pem && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// `<64 lowercase hex>.pem`, the names [`TrustListStore`] writes.
fn is_fingerprint_name(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| {
            stem.len() == 64 && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
}

fn record_metrics(report: &RefreshReport) {
    telemetry_metrics::counter!("trust_list_entries_total").increment(report.found as u64);
    telemetry_metrics::counter!("trust_list_entries_saved_total").increment(report.saved as u64);
    telemetry_metrics::counter!("trust_list_entries_skipped_total")
        .increment(report.skipped as u64);
}
