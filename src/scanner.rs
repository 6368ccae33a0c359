use kappa_capture::{CaptureError, FrameSource, PrimaryDisplay};
use kappa_vision::{collapse_overlapping, match_catalog, Detection, MatcherConfig, TemplateStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a scan needs, in one place. Thresholds and tolerances are
/// deliberately plain fields rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory of catalog icon files (file stem = identifier).
    pub catalog_dir: PathBuf,
    /// Square size templates are normalized to at load.
    pub canonical_size: u32,
    pub matcher: MatcherConfig,
    pub dedupe_tolerance_px: u32,
}

impl ScanConfig {
    pub fn new(catalog_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
            canonical_size: kappa_vision::DEFAULT_CANONICAL_SIZE,
            matcher: MatcherConfig::default(),
            dedupe_tolerance_px: kappa_vision::DEFAULT_TOLERANCE_PX,
        }
    }
}

/// The externally visible result of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub matches: Vec<Detection>,
    pub scan_time_ms: f64,
}

impl ScanReport {
    fn empty() -> Self {
        Self {
            matches: Vec::new(),
            scan_time_ms: 0.0,
        }
    }
}

/// Sequences capture, matching, and deduplication for a full-screen
/// scan. Constructed once per process; the catalog loads lazily on the
/// first scan and is held for the process lifetime.
///
/// Scans are single-flight: a scan requested while another is running
/// returns an empty report immediately instead of queueing.
pub struct Scanner {
    config: ScanConfig,
    source: Box<dyn FrameSource + Send + Sync>,
    store: Mutex<TemplateStore>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path, including errors.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scanner {
    /// Scanner backed by the primary display.
    pub fn new(config: ScanConfig) -> Self {
        Self::with_source(config, Box::new(PrimaryDisplay))
    }

    /// Scanner with an injected frame source. Used by tests and by
    /// callers matching against something other than the live screen.
    pub fn with_source(config: ScanConfig, source: Box<dyn FrameSource + Send + Sync>) -> Self {
        let store = TemplateStore::new(&config.catalog_dir, config.canonical_size);
        Self {
            config,
            source,
            store: Mutex::new(store),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Load the catalog eagerly instead of paying the cost on the first
    /// scan. Returns the number of loaded templates.
    pub fn preload(&self) -> anyhow::Result<usize> {
        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        store.load_all()
    }

    /// Run one full scan: capture the display, match every catalog
    /// template, collapse duplicates. Only a capture failure surfaces as
    /// an error; template-level problems degrade to fewer matches and a
    /// scan with zero detections is a normal outcome.
    pub fn scan(&self) -> Result<ScanReport, CaptureError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Scan already in flight, rejecting request");
            return Ok(ScanReport::empty());
        }
        let _guard = InFlightGuard(&self.in_flight);

        let started = Instant::now();

        let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
        if !store.is_loaded() {
            if let Err(e) = store.load_all() {
                warn!("Catalog load failed: {:#}; scanning with empty catalog", e);
            }
        }

        let frame = self.source.capture()?;
        let capture_ms = started.elapsed().as_secs_f64() * 1000.0;

        let match_started = Instant::now();
        let raw = match_catalog(&frame.gray, store.templates(), &self.config.matcher);
        let raw_count = raw.len();
        let matches = collapse_overlapping(raw, self.config.dedupe_tolerance_px);
        let match_ms = match_started.elapsed().as_secs_f64() * 1000.0;

        let scan_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Scan complete in {:.0}ms (capture {:.0}ms, match {:.0}ms): {} unique matches ({} raw)",
            scan_time_ms,
            capture_ms,
            match_ms,
            matches.len(),
            raw_count
        );

        Ok(ScanReport {
            matches,
            scan_time_ms,
        })
    }
}
