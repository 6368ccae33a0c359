pub mod catalog;
pub mod dedupe;
pub mod matcher;

pub use catalog::{Template, TemplateStore, DEFAULT_CANONICAL_SIZE};
pub use dedupe::{collapse_overlapping, DEFAULT_TOLERANCE_PX};
pub use matcher::{match_catalog, Detection, MatcherConfig};
