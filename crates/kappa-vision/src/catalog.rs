use anyhow::{Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Canonical square size templates are normalized to at load time.
pub const DEFAULT_CANONICAL_SIZE: u32 = 64;

/// Raster formats accepted in the catalog directory.
const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// One catalog icon, normalized and ready to match. The id is the file
/// stem of the catalog entry and is unique within a store. Never mutated
/// after load.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub gray: GrayImage,
}

impl Template {
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Holds the icon catalog as matchable grayscale buffers, loaded once
/// per process. There is no eviction; catalogs are tens of entries.
pub struct TemplateStore {
    dir: PathBuf,
    canonical_size: u32,
    templates: Vec<Template>,
    loaded: bool,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>, canonical_size: u32) -> Self {
        Self {
            dir: dir.into(),
            canonical_size,
            templates: Vec::new(),
            loaded: false,
        }
    }

    /// Load every image file in the catalog directory. Entries that fail
    /// to decode are skipped with a warning; the rest of the catalog
    /// still loads. Calling this again is a no-op that returns the
    /// already-loaded count.
    pub fn load_all(&mut self) -> Result<usize> {
        if self.loaded {
            return Ok(self.templates.len());
        }

        if !self.dir.exists() {
            warn!("Catalog directory not found: {}", self.dir.display());
            self.loaded = true;
            return Ok(0);
        }

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read catalog directory {}", self.dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !is_supported(&path) {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            match load_template(&path, &id, self.canonical_size) {
                Ok(tmpl) => self.templates.push(tmpl),
                Err(e) => warn!("Skipping catalog entry {}: {}", path.display(), e),
            }
        }

        self.loaded = true;
        info!(
            "Loaded {} templates from {}",
            self.templates.len(),
            self.dir.display()
        );
        Ok(self.templates.len())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn canonical_size(&self) -> u32 {
        self.canonical_size
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Decode one catalog file and normalize it: RGBA intermediate so every
/// source format lands in the same place, then grayscale, then resize to
/// the canonical square. Triangle filtering here must stay consistent
/// with the per-scale resize in the matcher.
fn load_template(path: &Path, id: &str, canonical_size: u32) -> Result<Template> {
    let img = image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
    let rgba = img.to_rgba8();
    let gray = image::imageops::grayscale(&rgba);
    let resized = image::imageops::resize(
        &gray,
        canonical_size,
        canonical_size,
        image::imageops::FilterType::Triangle,
    );

    Ok(Template {
        id: id.to_string(),
        gray: resized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn write_icon(dir: &Path, name: &str, seed: u32) {
        let img = GrayImage::from_fn(48, 48, |x, y| {
            Luma([((x * seed + y * 7 + x * y) % 256) as u8])
        });
        img.save(dir.join(name)).unwrap();
    }

    /// Counts warn-level events so tests can pin down how noisy a load is.
    struct WarnCounter(Arc<AtomicUsize>);

    impl tracing::Subscriber for WarnCounter {
        fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

        fn event(&self, event: &tracing::Event<'_>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn enter(&self, _: &tracing::span::Id) {}

        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn test_load_all_resizes_to_canonical() {
        let dir = tempfile::tempdir().unwrap();
        write_icon(dir.path(), "rooster.png", 13);

        let mut store = TemplateStore::new(dir.path(), 32);
        assert_eq!(store.load_all().unwrap(), 1);

        let tmpl = &store.templates()[0];
        assert_eq!(tmpl.id, "rooster");
        assert_eq!(tmpl.width(), 32);
        assert_eq!(tmpl.height(), 32);
    }

    #[test]
    fn test_load_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_icon(dir.path(), "a.png", 13);
        write_icon(dir.path(), "b.png", 29);

        let mut store = TemplateStore::new(dir.path(), 32);
        assert_eq!(store.load_all().unwrap(), 2);
        assert_eq!(store.load_all().unwrap(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_corrupt_entry_is_skipped_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        write_icon(dir.path(), "a.png", 13);
        write_icon(dir.path(), "b.png", 29);
        write_icon(dir.path(), "c.png", 41);
        std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();

        let warnings = Arc::new(AtomicUsize::new(0));
        let mut store = TemplateStore::new(dir.path(), 32);
        let loaded = tracing::subscriber::with_default(WarnCounter(warnings.clone()), || {
            store.load_all().unwrap()
        });

        assert_eq!(loaded, 3);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_extensions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_icon(dir.path(), "a.png", 13);
        std::fs::write(dir.path().join("notes.txt"), b"readme").unwrap();

        let mut store = TemplateStore::new(dir.path(), 32);
        assert_eq!(store.load_all().unwrap(), 1);
    }

    #[test]
    fn test_missing_directory_loads_empty() {
        let mut store = TemplateStore::new("/nonexistent/catalog", 64);
        assert_eq!(store.load_all().unwrap(), 0);
        assert!(store.is_loaded());
        assert!(store.is_empty());
    }
}
