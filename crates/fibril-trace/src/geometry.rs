//! Angle and overlap helpers shared across the tracing stages.
//!
//! Angles are degrees in [0, 360) unless a function says otherwise.
//! Vectors are `geo::Coord` displacements between pick centers.

use geo::Coord;

use crate::types::Pick;

/// Added to vector norms before dividing, so coincident picks cannot
/// propagate NaN through direction estimates.
pub const NORM_EPSILON: f64 = 1e-4;

/// Angle of a displacement vector in degrees, normalized to [0, 360).
#[must_use]
pub fn vector_angle(v: Coord<f64>) -> f64 {
    v.y.atan2(v.x).to_degrees().rem_euclid(360.0)
}

/// Unit-ish direction of a displacement vector.
///
/// The norm gets [`NORM_EPSILON`] added before dividing, so the zero
/// vector maps to the zero vector instead of NaN.
#[must_use]
pub fn normalize(v: Coord<f64>) -> Coord<f64> {
    let norm = v.x.hypot(v.y) + NORM_EPSILON;
    Coord {
        x: v.x / norm,
        y: v.y / norm,
    }
}

/// Smallest rotation between two directed angles, in [0, 180].
#[must_use]
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let difference = (a - b).rem_euclid(360.0);
    difference.min(360.0 - difference)
}

/// Smallest rotation between a directed angle and an undirected axis,
/// in [0, 90].
///
/// The axis test compares against both the axis angle and its 180°
/// complement; algebraically this equals a single mod-180 comparison,
/// but the two-sided form is kept as the original defines it.
#[must_use]
pub fn axis_difference(angle: f64, axis: f64) -> f64 {
    angular_difference(angle, axis).min(angular_difference(angle, axis + 180.0))
}

/// Intersection-over-union of two picks' axis-aligned footprints.
///
/// Returns 0 for disjoint or degenerate (zero-area union) boxes.
#[must_use]
pub fn iou(a: &Pick, b: &Pick) -> f64 {
    let ra = a.rect();
    let rb = b.rect();
    let overlap_x = (ra.max().x.min(rb.max().x) - ra.min().x.max(rb.min().x)).max(0.0);
    let overlap_y = (ra.max().y.min(rb.max().y) - ra.min().y.max(rb.min().y)).max(0.0);
    let intersection = overlap_x * overlap_y;
    let union = ra.width() * ra.height() + rb.width() * rb.height() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_angle_quadrants() {
        assert!((vector_angle(Coord { x: 1.0, y: 0.0 }) - 0.0).abs() < 1e-12);
        assert!((vector_angle(Coord { x: 0.0, y: 1.0 }) - 90.0).abs() < 1e-12);
        assert!((vector_angle(Coord { x: -1.0, y: 0.0 }) - 180.0).abs() < 1e-12);
        assert!((vector_angle(Coord { x: 0.0, y: -1.0 }) - 270.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_zero_vector_is_finite() {
        let v = normalize(Coord { x: 0.0, y: 0.0 });
        assert!(v.x.abs() < f64::EPSILON);
        assert!(v.y.abs() < f64::EPSILON);
    }

    #[test]
    fn normalize_is_close_to_unit_for_long_vectors() {
        let v = normalize(Coord { x: 300.0, y: 400.0 });
        let norm = v.x.hypot(v.y);
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[test]
    fn angular_difference_wraps() {
        assert!((angular_difference(350.0, 10.0) - 20.0).abs() < 1e-12);
        assert!((angular_difference(10.0, 350.0) - 20.0).abs() < 1e-12);
        assert!((angular_difference(90.0, 270.0) - 180.0).abs() < 1e-12);
    }

    #[test]
    fn axis_difference_folds_opposite_directions() {
        // 184° is 4° away from the 0°/180° axis.
        assert!((axis_difference(184.0, 0.0) - 4.0).abs() < 1e-12);
        assert!((axis_difference(0.0, 184.0) - 4.0).abs() < 1e-12);
        // ...and the two-sided form matches a mod-180 comparison.
        let two_sided = axis_difference(97.0, 260.0);
        let mod_180 = {
            let difference = (97.0f64 - 260.0).rem_euclid(180.0);
            difference.min(180.0 - difference)
        };
        assert!((two_sided - mod_180).abs() < 1e-12);
    }

    #[test]
    fn iou_identical_boxes_is_one() {
        let a = Pick::new(10.0, 10.0, 20.0, 20.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn iou_disjoint_boxes_is_zero() {
        let a = Pick::new(0.0, 0.0, 10.0, 10.0);
        let b = Pick::new(100.0, 0.0, 10.0, 10.0);
        assert!(iou(&a, &b).abs() < f64::EPSILON);
    }

    #[test]
    fn iou_half_overlap() {
        // Two 10x10 boxes offset by 5 in x: intersection 50, union 150.
        let a = Pick::new(0.0, 0.0, 10.0, 10.0);
        let b = Pick::new(5.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn iou_zero_area_boxes() {
        let a = Pick::new(0.0, 0.0, 0.0, 0.0);
        let b = Pick::new(0.0, 0.0, 0.0, 0.0);
        assert!(iou(&a, &b).abs() < f64::EPSILON);
    }
}
