//! Full-screen icon scanner: captures the primary display, matches a
//! catalog of reference icons against it at multiple scales, and
//! reports deduplicated detections with positions and confidence.
//!
//! ```no_run
//! use kappa_scan::{ScanConfig, Scanner};
//!
//! let scanner = Scanner::new(ScanConfig::new("assets/kappa-icons"));
//! let report = scanner.scan()?;
//! for m in &report.matches {
//!     println!("{} at ({}, {}) confidence {:.2}", m.id, m.x, m.y, m.confidence);
//! }
//! # Ok::<(), kappa_scan::CaptureError>(())
//! ```

mod scanner;

pub use scanner::{ScanConfig, ScanReport, Scanner};

pub use kappa_capture::{CaptureError, Frame, FrameSource, PrimaryDisplay};
pub use kappa_vision::{
    collapse_overlapping, match_catalog, Detection, MatcherConfig, Template, TemplateStore,
};
