use crate::catalog::Template;
use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Windows with less pixel variance than this are treated as flat and
/// never scored (a correlation against them is undefined).
const MIN_VARIANCE: f64 = 1e-6;

/// Tuning knobs for the multi-scale search. All of these were fixed
/// constants in earlier iterations of the scanner; they are explicit
/// here so callers can tighten or widen the search per use case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Scale factors tried per template, in increasing order.
    pub scales: Vec<f64>,
    /// Minimum correlation for a match to become a detection.
    pub min_confidence: f64,
    /// Once a scale scores at least this, later scales are not tried.
    pub early_exit_confidence: f64,
    /// Longest frame edge searched directly; larger frames are shrunk to
    /// this before matching and coordinates mapped back. 0 disables.
    pub max_dimension: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            scales: vec![0.8, 0.9, 1.0, 1.1, 1.2],
            min_confidence: 0.8,
            early_exit_confidence: 0.9,
            max_dimension: 1920,
        }
    }
}

/// One template match surviving the confidence threshold. Coordinates
/// are native frame pixels; width/height are the template's canonical
/// dimensions multiplied by the winning scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
    pub scale: f64,
}

impl Detection {
    /// Bounding-box center, used by deduplication.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// Search a frame for every catalog template, each at its best scale.
/// Templates are matched independently and in parallel; the frame is
/// shared read-only.
pub fn match_catalog(
    frame: &GrayImage,
    templates: &[Template],
    config: &MatcherConfig,
) -> Vec<Detection> {
    if templates.is_empty() {
        return Vec::new();
    }

    let started = Instant::now();

    // Shrink oversized frames before the correlation pass; detections
    // are mapped back to native coordinates below.
    let longest = frame.width().max(frame.height());
    let (search, factor) = if config.max_dimension > 0 && longest > config.max_dimension {
        let factor = config.max_dimension as f64 / longest as f64;
        let w = (frame.width() as f64 * factor).round() as u32;
        let h = (frame.height() as f64 * factor).round() as u32;
        let shrunk =
            image::imageops::resize(frame, w, h, image::imageops::FilterType::Triangle);
        debug!(
            "Downscaled {}x{} frame to {}x{} for matching",
            frame.width(),
            frame.height(),
            w,
            h
        );
        (shrunk, factor)
    } else {
        (frame.clone(), 1.0)
    };

    let plan = FramePlan::new(&search);

    let detections: Vec<Detection> = templates
        .par_iter()
        .filter_map(|tmpl| match_one(&plan, tmpl, config, factor))
        .collect();

    debug!(
        "Matched {} templates in {:?}: {} above threshold",
        templates.len(),
        started.elapsed(),
        detections.len()
    );

    detections
}

/// Best match for one template across all configured scales. Scales are
/// tried in increasing order and ties break toward the first scale that
/// reached the score. A scale whose template does not fit the search
/// image, or degenerates to a flat buffer, is skipped rather than
/// failing the template.
fn match_one(
    plan: &FramePlan<'_>,
    tmpl: &Template,
    config: &MatcherConfig,
    factor: f64,
) -> Option<Detection> {
    let mut best_score = f64::NEG_INFINITY;
    let mut best = None;

    for &scale in &config.scales {
        let sw = (tmpl.width() as f64 * scale).round() as u32;
        let sh = (tmpl.height() as f64 * scale).round() as u32;
        if sw == 0 || sh == 0 || sw as usize > plan.width || sh as usize > plan.height {
            continue;
        }

        let scaled = image::imageops::resize(
            &tmpl.gray,
            sw,
            sh,
            image::imageops::FilterType::Triangle,
        );
        let Some(prepared) = TemplatePlan::new(&scaled) else {
            continue;
        };

        if let Some((score, x, y)) = plan.best_correlation(&prepared) {
            if score > best_score {
                best_score = score;
                best = Some((x, y, sw, sh, scale));
            }
        }

        if best_score >= config.early_exit_confidence {
            break;
        }
    }

    let (x, y, sw, sh, scale) = best?;
    if best_score < config.min_confidence {
        return None;
    }

    Some(Detection {
        id: tmpl.id.clone(),
        x: (x as f64 / factor).round() as u32,
        y: (y as f64 / factor).round() as u32,
        width: (sw as f64 / factor).round() as u32,
        height: (sh as f64 / factor).round() as u32,
        confidence: best_score,
        scale,
    })
}

/// Search image plus integral tables for O(1) window sums. Built once
/// per scan and shared across all template tasks.
struct FramePlan<'a> {
    width: usize,
    height: usize,
    data: &'a [u8],
    /// (width + 1) x (height + 1) summed-area tables of pixel values
    /// and squared pixel values.
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl<'a> FramePlan<'a> {
    fn new(img: &'a GrayImage) -> Self {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let data = img.as_raw().as_slice();

        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut sum_sq = vec![0u64; stride * (height + 1)];

        for y in 0..height {
            let row = &data[y * width..(y + 1) * width];
            for (x, &p) in row.iter().enumerate() {
                let p = p as u64;
                let i = (y + 1) * stride + (x + 1);
                sum[i] = p + sum[i - 1] + sum[i - stride] - sum[i - stride - 1];
                sum_sq[i] = p * p + sum_sq[i - 1] + sum_sq[i - stride] - sum_sq[i - stride - 1];
            }
        }

        Self {
            width,
            height,
            data,
            sum,
            sum_sq,
        }
    }

    /// Sum and sum-of-squares over the window at (x, y).
    fn window_sums(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let stride = self.width + 1;
        let a = y * stride + x;
        let b = y * stride + (x + w);
        let c = (y + h) * stride + x;
        let d = (y + h) * stride + (x + w);
        let s = (self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c]) as f64;
        let sq = (self.sum_sq[d] + self.sum_sq[a] - self.sum_sq[b] - self.sum_sq[c]) as f64;
        (s, sq)
    }

    /// Dense zero-mean normalized cross-correlation scan. Returns the
    /// global maximum and its top-left position, or None when every
    /// window was flat.
    fn best_correlation(&self, tmpl: &TemplatePlan) -> Option<(f64, u32, u32)> {
        let tw = tmpl.width;
        let th = tmpl.height;
        let n = (tw * th) as f64;

        let mut best: Option<(f64, u32, u32)> = None;

        for y in 0..=(self.height - th) {
            for x in 0..=(self.width - tw) {
                let (sum_i, sum_sq) = self.window_sums(x, y, tw, th);
                let var_i = sum_sq - sum_i * sum_i / n;
                if var_i <= MIN_VARIANCE {
                    continue;
                }

                // Template values are zero-mean, so the cross term needs
                // no window-mean correction.
                let mut dot = 0.0f64;
                for ty in 0..th {
                    let row = &self.data[(y + ty) * self.width + x..][..tw];
                    let trow = &tmpl.zero_mean[ty * tw..][..tw];
                    for (p, t) in row.iter().zip(trow) {
                        dot += (*p as f64) * t;
                    }
                }

                let score = dot / (tmpl.variance * var_i).sqrt();
                if score.is_finite() && best.map_or(true, |(b, _, _)| score > b) {
                    best = Some((score, x as u32, y as u32));
                }
            }
        }

        best
    }
}

/// Zero-mean form of one scaled template, precomputed once per scale.
struct TemplatePlan {
    width: usize,
    height: usize,
    zero_mean: Vec<f64>,
    variance: f64,
}

impl TemplatePlan {
    /// None when the template has no pixel variance to correlate on.
    fn new(img: &GrayImage) -> Option<Self> {
        let n = (img.width() * img.height()) as f64;
        if n == 0.0 {
            return None;
        }

        let mean = img.as_raw().iter().map(|&p| p as f64).sum::<f64>() / n;
        let zero_mean: Vec<f64> = img.as_raw().iter().map(|&p| p as f64 - mean).collect();
        let variance: f64 = zero_mean.iter().map(|t| t * t).sum();
        if variance <= MIN_VARIANCE {
            return None;
        }

        Some(Self {
            width: img.width() as usize,
            height: img.height() as usize,
            zero_mean,
            variance,
        })
    }
}
