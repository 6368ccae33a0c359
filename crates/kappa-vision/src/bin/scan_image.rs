//! CLI tool to run the catalog matcher against a saved screenshot.
//! Usage: cargo run --bin scan_image --features cli -- <catalog_dir> <screenshot.png>

use kappa_vision::{collapse_overlapping, match_catalog, MatcherConfig, TemplateStore};
use std::path::PathBuf;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <catalog_dir> <screenshot.png>", args[0]);
        std::process::exit(1);
    }

    let catalog_dir = PathBuf::from(&args[1]);
    let screenshot = PathBuf::from(&args[2]);

    let mut store = TemplateStore::new(&catalog_dir, kappa_vision::DEFAULT_CANONICAL_SIZE);
    let loaded = store.load_all().expect("Failed to load catalog");
    println!("Loaded {} templates from {}", loaded, catalog_dir.display());

    println!("Loading screenshot: {}", screenshot.display());
    let img = image::open(&screenshot)
        .expect("Failed to open screenshot")
        .to_rgba8();
    let gray = image::imageops::grayscale(&img);
    println!("Screenshot size: {}x{}", gray.width(), gray.height());

    let config = MatcherConfig::default();
    let started = std::time::Instant::now();
    let raw = match_catalog(&gray, store.templates(), &config);
    let matches = collapse_overlapping(raw, kappa_vision::DEFAULT_TOLERANCE_PX);
    let elapsed = started.elapsed();

    println!(
        "\n{} match(es) in {:.0}ms:",
        matches.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    for m in &matches {
        println!(
            "  {} at ({}, {}) {}x{} scale={} confidence={:.3}",
            m.id, m.x, m.y, m.width, m.height, m.scale, m.confidence
        );
    }

    println!(
        "\n{}",
        serde_json::to_string_pretty(&matches).expect("Failed to serialize matches")
    );
}
