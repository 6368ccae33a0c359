use crate::matcher::Detection;

/// Default center-distance tolerance in pixels. Icon sprites are small
/// and roughly uniform in size, so center distance is enough; full IoU
/// suppression is not needed.
pub const DEFAULT_TOLERANCE_PX: u32 = 20;

/// Collapse detections whose bounding-box centers sit within
/// `tolerance_px` on both axes, keeping the highest-confidence one.
/// Near-duplicate catalog icons routinely fire on the same on-screen
/// item; this is greedy non-maximum suppression over centers.
pub fn collapse_overlapping(mut detections: Vec<Detection>, tolerance_px: u32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let tolerance = tolerance_px as f64;
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());

    for candidate in detections {
        let (cx, cy) = candidate.center();
        let collides = kept.iter().any(|k| {
            let (kx, ky) = k.center();
            (cx - kx).abs() <= tolerance && (cy - ky).abs() <= tolerance
        });
        if !collides {
            kept.push(candidate);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(id: &str, x: u32, y: u32, confidence: f64) -> Detection {
        Detection {
            id: id.to_string(),
            x,
            y,
            width: 64,
            height: 64,
            confidence,
            scale: 1.0,
        }
    }

    #[test]
    fn test_nearby_centers_collapse_to_highest_confidence() {
        let detections = vec![
            detection("weaker", 100, 100, 0.85),
            detection("stronger", 105, 100, 0.95),
        ];

        let kept = collapse_overlapping(detections, DEFAULT_TOLERANCE_PX);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "stronger");
    }

    #[test]
    fn test_distant_centers_both_survive() {
        let detections = vec![
            detection("a", 100, 100, 0.85),
            detection("b", 150, 100, 0.95),
        ];

        let kept = collapse_overlapping(detections, DEFAULT_TOLERANCE_PX);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_chain_suppression_is_greedy() {
        // b collides with a, c collides with b but not a. The greedy
        // walk keeps a (strongest), drops b, keeps c.
        let detections = vec![
            detection("a", 100, 100, 0.99),
            detection("b", 115, 100, 0.90),
            detection("c", 130, 100, 0.85),
        ];

        let kept = collapse_overlapping(detections, DEFAULT_TOLERANCE_PX);
        let ids: Vec<&str> = kept.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(collapse_overlapping(Vec::new(), DEFAULT_TOLERANCE_PX).is_empty());
    }
}
