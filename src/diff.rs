//! Perceptual change detection between capture cycles.
//!
//! Each screenshot is reduced to a small feature vector (a downscaled,
//! normalized RGB thumbnail) and display pairs are compared by RMS
//! distance. Cheap enough to run every cycle on every display.

use std::path::Path;
use tracing::{debug, warn};

use crate::capture::DisplaySnapshot;
use crate::error::TrackerResult;

/// Distance above which a display counts as changed. Distances are in
/// 0.0–1.0; lower threshold = more sensitive.
pub const CHANGE_THRESHOLD: f64 = 0.03;

/// Thumbnail edge length used for feature extraction.
const THUMB_SIZE: u32 = 32;

/// Reduce an image file to a normalized RGB feature vector.
pub fn feature_vector(path: &Path) -> TrackerResult<Vec<f64>> {
    let img = image::open(path)?;
    let thumb = img.resize_exact(THUMB_SIZE, THUMB_SIZE, image::imageops::FilterType::Nearest);
    let rgb = thumb.to_rgb8();

    let mut features = Vec::with_capacity((THUMB_SIZE * THUMB_SIZE * 3) as usize);
    for pixel in rgb.pixels() {
        features.push(pixel[0] as f64 / 255.0);
        features.push(pixel[1] as f64 / 255.0);
        features.push(pixel[2] as f64 / 255.0);
    }
    Ok(features)
}

/// RMS distance between two feature vectors, in 0.0–1.0.
pub fn feature_distance(a: &[f64], b: &[f64]) -> f64 {
    let count = a.len().min(b.len());
    if count == 0 {
        return 0.0;
    }
    let total: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    (total / count as f64).sqrt()
}

/// Whether the pair of image files differs beyond the threshold.
fn display_changed(before: &Path, after: &Path) -> TrackerResult<bool> {
    let prev = feature_vector(before)?;
    let curr = feature_vector(after)?;
    let distance = feature_distance(&prev, &curr);
    debug!(
        "Change detection: {} vs {} distance={:.4}",
        before.display(),
        after.display(),
        distance
    );
    Ok(distance > CHANGE_THRESHOLD)
}

/// Indices (ascending) of displays that changed between two snapshots.
///
/// A display-count mismatch means the comparison is meaningless, so every
/// current display is reported as changed. A pair whose feature extraction
/// fails is also reported as changed rather than silently dropped.
pub fn changed_displays(prior: &DisplaySnapshot, current: &DisplaySnapshot) -> Vec<usize> {
    if prior.screens.len() != current.screens.len() {
        return (0..current.screens.len()).collect();
    }

    let mut changed = Vec::new();
    for (idx, (before, after)) in prior.screens.iter().zip(current.screens.iter()).enumerate() {
        match display_changed(before, after) {
            Ok(true) => changed.push(idx),
            Ok(false) => {}
            Err(e) => {
                warn!("Change detection failed for display {}: {}", idx + 1, e);
                changed.push(idx);
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::path::PathBuf;

    fn solid_png(dir: &Path, name: &str, gray: u8) -> PathBuf {
        let img = image::RgbImage::from_pixel(64, 64, image::Rgb([gray, gray, gray]));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn snapshot(screens: Vec<PathBuf>) -> DisplaySnapshot {
        DisplaySnapshot {
            taken_at: Local::now(),
            screens,
        }
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let dir = tempfile::tempdir().unwrap();
        let a = solid_png(dir.path(), "a.png", 100);
        let b = solid_png(dir.path(), "b.png", 100);
        let va = feature_vector(&a).unwrap();
        let vb = feature_vector(&b).unwrap();
        assert_eq!(feature_distance(&va, &vb), 0.0);
    }

    #[test]
    fn distance_matches_uniform_brightness_delta() {
        let dir = tempfile::tempdir().unwrap();
        let a = solid_png(dir.path(), "a.png", 100);
        let b = solid_png(dir.path(), "b.png", 126);
        let va = feature_vector(&a).unwrap();
        let vb = feature_vector(&b).unwrap();
        let d = feature_distance(&va, &vb);
        assert!((d - 26.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn small_difference_stays_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let prior = snapshot(vec![solid_png(dir.path(), "p.png", 100)]);
        let current = snapshot(vec![solid_png(dir.path(), "c.png", 103)]);
        assert!(changed_displays(&prior, &current).is_empty());
    }

    #[test]
    fn large_difference_marks_display_changed() {
        let dir = tempfile::tempdir().unwrap();
        let prior = snapshot(vec![solid_png(dir.path(), "p.png", 100)]);
        let current = snapshot(vec![solid_png(dir.path(), "c.png", 126)]);
        assert_eq!(changed_displays(&prior, &current), vec![0]);
    }

    #[test]
    fn count_mismatch_marks_every_current_display() {
        let dir = tempfile::tempdir().unwrap();
        let prior = snapshot(vec![solid_png(dir.path(), "p1.png", 10)]);
        let current = snapshot(vec![
            solid_png(dir.path(), "c1.png", 10),
            solid_png(dir.path(), "c2.png", 10),
        ]);
        assert_eq!(changed_displays(&prior, &current), vec![0, 1]);
    }

    #[test]
    fn unreadable_image_counts_as_changed() {
        let dir = tempfile::tempdir().unwrap();
        let prior = snapshot(vec![dir.path().join("missing.png")]);
        let current = snapshot(vec![solid_png(dir.path(), "c.png", 50)]);
        assert_eq!(changed_displays(&prior, &current), vec![0]);
    }

    #[test]
    fn indices_come_back_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let prior = snapshot(vec![
            solid_png(dir.path(), "p1.png", 100),
            solid_png(dir.path(), "p2.png", 100),
            solid_png(dir.path(), "p3.png", 100),
        ]);
        let current = snapshot(vec![
            solid_png(dir.path(), "c1.png", 200),
            solid_png(dir.path(), "c2.png", 100),
            solid_png(dir.path(), "c3.png", 200),
        ]);
        assert_eq!(changed_displays(&prior, &current), vec![0, 2]);
    }

    #[test]
    fn empty_snapshots_compare_as_unchanged() {
        let prior = snapshot(vec![]);
        let current = snapshot(vec![]);
        assert!(changed_displays(&prior, &current).is_empty());
    }
}
