//! Moving-average position smoothing.

use std::collections::BTreeMap;

use crate::types::{Filament, META_ANGLE, Pick, SpatialHandle};

/// Replace interior picks with the arithmetic mean over a sliding
/// window of `width` picks.
///
/// The mean covers x, y, w, h and confidence (a missing confidence
/// counts as 1.0). When any pick in the window carries `"angle"`
/// metadata, the synthetic pick gets the median of the carried angles.
/// The first and last `(width - 1) / 2` picks pass through unchanged.
/// Filaments shorter than `width + 1` picks (and widths under 2) are
/// returned as-is. Synthetic picks carry no spatial-index handle.
#[must_use]
pub fn moving_window(filament: &Filament, width: usize) -> Filament {
    let picks = filament.picks();
    if width < 2 || picks.len() < width + 1 {
        return filament.clone();
    }
    let half = (width - 1) / 2;

    let mut smoothed = Vec::with_capacity(picks.len());
    for (i, pick) in picks.iter().enumerate() {
        if i < half || i + half >= picks.len() {
            smoothed.push(pick.clone());
        } else {
            smoothed.push(window_mean(&picks[i - half..=i + half], pick));
        }
    }
    Filament::new(smoothed)
}

/// Synthetic pick averaging one window, anchored at `center`.
fn window_mean(window: &[Pick], center: &Pick) -> Pick {
    #[allow(clippy::cast_precision_loss)]
    let count = window.len() as f64;

    let mut x = 0.0;
    let mut y = 0.0;
    let mut w = 0.0;
    let mut h = 0.0;
    let mut confidence = 0.0;
    for pick in window {
        x += pick.x;
        y += pick.y;
        w += pick.w;
        h += pick.h;
        confidence += pick.confidence.unwrap_or(1.0);
    }

    let mut metadata = BTreeMap::new();
    let mut angles: Vec<f64> = window.iter().filter_map(Pick::angle).collect();
    if !angles.is_empty() {
        angles.sort_by(f64::total_cmp);
        metadata.insert(META_ANGLE.to_owned(), median_of_sorted(&angles));
    }

    Pick {
        x: x / count,
        y: y / count,
        w: w / count,
        h: h / count,
        confidence: Some(confidence / count),
        z: center.z,
        metadata,
        handle: SpatialHandle::Unindexed,
    }
}

/// Median of a non-empty sorted slice; an even count averages the two
/// middle values.
fn median_of_sorted(values: &[f64]) -> f64 {
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}
