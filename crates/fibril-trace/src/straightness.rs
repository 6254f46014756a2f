//! Straightness metrics and the recursive filament splitter.
//!
//! This module defines the [`StraightnessMetric`] trait for pluggable
//! straightness measures and the [`StraightnessKind`] enum for runtime
//! selection. Metrics disagree about which end of their scale means
//! "straight" (a ratio near 1 vs a deviation near 0), so each carries
//! an explicit [`Preference`] tag and one comparison predicate serves
//! them all.

use serde::{Deserialize, Serialize};

use crate::geometry::NORM_EPSILON;
use crate::types::{Filament, Pick};

/// Which end of a metric's scale means "straighter".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// Larger scores are straighter (ratios).
    PreferHigher,
    /// Smaller scores are straighter (deviations).
    PreferLower,
}

/// A scalar measure of how straight an ordered pick run is.
pub trait StraightnessMetric {
    /// Score the run. [`split_filament`] never passes runs under 3
    /// picks; implementations still return their trivial value for
    /// them.
    fn score(&self, picks: &[Pick]) -> f64;

    /// Which direction of the scale is straighter.
    fn preference(&self) -> Preference;
}

/// Endpoint-to-endpoint distance over summed consecutive distances.
///
/// 1.0 means perfectly straight; runs under 3 picks score 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineStraightness;

impl StraightnessMetric for LineStraightness {
    fn score(&self, picks: &[Pick]) -> f64 {
        if picks.len() < 3 {
            return 1.0;
        }
        let (Some(first), Some(last)) = (picks.first(), picks.last()) else {
            return 1.0;
        };
        let end_to_end = first.center_distance(last);
        let path: f64 = picks
            .windows(2)
            .map(|pair| pair[0].center_distance(&pair[1]))
            .sum();
        // Clamp only the degenerate all-coincident case; ordinary runs
        // divide exactly so boundary thresholds stay constructible.
        end_to_end / path.max(NORM_EPSILON)
    }

    fn preference(&self) -> Preference {
        Preference::PreferHigher
    }
}

/// RMS perpendicular distance of interior picks to the endpoint chord.
///
/// 0.0 means perfectly straight; runs under 3 picks score 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmsDeviation;

impl StraightnessMetric for RmsDeviation {
    fn score(&self, picks: &[Pick]) -> f64 {
        if picks.len() < 3 {
            return 0.0;
        }
        let (Some(first), Some(last)) = (picks.first(), picks.last()) else {
            return 0.0;
        };
        let chord = first.displacement_to(last);
        let norm = chord.x.hypot(chord.y) + NORM_EPSILON;
        let mut sum_squared = 0.0;
        for pick in &picks[1..picks.len() - 1] {
            let offset = first.displacement_to(pick);
            let perpendicular = chord.x.mul_add(offset.y, -(chord.y * offset.x)) / norm;
            sum_squared += perpendicular * perpendicular;
        }
        #[allow(clippy::cast_precision_loss)]
        let interior = (picks.len() - 2) as f64;
        (sum_squared / interior).sqrt()
    }

    fn preference(&self) -> Preference {
        Preference::PreferLower
    }
}

/// Selects which straightness metric to use, if any.
///
/// `None` disables re-segmentation at the pipeline level. Custom
/// metrics plug in through [`StraightnessMetric`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StraightnessKind {
    /// No straightness splitting.
    #[default]
    None,
    /// [`LineStraightness`].
    LineStraightness,
    /// [`RmsDeviation`].
    Rmsd,
}

impl StraightnessKind {
    /// The metric behind this kind, or `None` when splitting is
    /// disabled.
    #[must_use]
    pub fn metric(self) -> Option<&'static dyn StraightnessMetric> {
        match self {
            Self::None => None,
            Self::LineStraightness => Some(&LineStraightness),
            Self::Rmsd => Some(&RmsDeviation),
        }
    }
}

/// Whether the run already counts as straight (inclusive boundary).
///
/// Runs under 3 picks satisfy any threshold, which also bounds the
/// splitter's recursion depth.
fn satisfies<M: StraightnessMetric + ?Sized>(metric: &M, picks: &[Pick], threshold: f64) -> bool {
    if picks.len() < 3 {
        return true;
    }
    let score = metric.score(picks);
    match metric.preference() {
        Preference::PreferHigher => score >= threshold,
        Preference::PreferLower => score <= threshold,
    }
}

/// Recursively bisect `filament` until every leaf satisfies
/// `threshold`.
///
/// A satisfying filament is returned as a single-element list;
/// otherwise it is cut at `len / 2` into two disjoint halves and each
/// half is processed independently. Pure: every call builds new
/// filaments, nothing is edited in place.
#[must_use]
pub fn split_filament<M: StraightnessMetric + ?Sized>(
    filament: &Filament,
    metric: &M,
    threshold: f64,
) -> Vec<Filament> {
    let picks = filament.picks();
    if satisfies(metric, picks, threshold) {
        return vec![filament.clone()];
    }
    let middle = picks.len() / 2;
    let mut segments = split_filament(&Filament::new(picks[..middle].to_vec()), metric, threshold);
    segments.extend(split_filament(
        &Filament::new(picks[middle..].to_vec()),
        metric,
        threshold,
    ));
    segments
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chain(coords: &[(f64, f64)]) -> Filament {
        Filament::new(
            coords
                .iter()
                .map(|&(x, y)| Pick::new(x, y, 10.0, 10.0))
                .collect(),
        )
    }

    #[test]
    fn collinear_run_scores_exactly_one() {
        let filament = chain(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let score = LineStraightness.score(filament.picks());
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bent_run_scores_below_one() {
        let filament = chain(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let score = LineStraightness.score(filament.picks());
        assert!(score < 1.0);
        assert!(score > 0.0);
    }

    #[test]
    fn short_runs_are_trivially_straight() {
        let two = chain(&[(0.0, 0.0), (3.0, 9.0)]);
        assert!((LineStraightness.score(two.picks()) - 1.0).abs() < f64::EPSILON);
        assert!(RmsDeviation.score(two.picks()).abs() < f64::EPSILON);
    }

    #[test]
    fn rms_deviation_of_collinear_run_is_near_zero() {
        let filament = chain(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        assert!(RmsDeviation.score(filament.picks()) < 1e-9);
    }

    #[test]
    fn rms_deviation_measures_perpendicular_offset() {
        // One interior pick 5 px off a 20 px chord.
        let filament = chain(&[(0.0, 0.0), (10.0, 5.0), (20.0, 0.0)]);
        let score = RmsDeviation.score(filament.picks());
        assert!((score - 5.0).abs() < 1e-3);
    }

    #[test]
    fn preference_tags_match_conventions() {
        assert_eq!(LineStraightness.preference(), Preference::PreferHigher);
        assert_eq!(RmsDeviation.preference(), Preference::PreferLower);
    }

    #[test]
    fn kind_maps_to_metrics() {
        assert!(StraightnessKind::None.metric().is_none());
        assert!(StraightnessKind::LineStraightness.metric().is_some());
        assert!(StraightnessKind::Rmsd.metric().is_some());
    }

    #[test]
    fn straight_filament_is_not_split() {
        let filament = chain(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)]);
        let segments = split_filament(&filament, &LineStraightness, 0.95);
        assert_eq!(segments, vec![filament]);
    }

    #[test]
    fn score_exactly_at_threshold_is_straight() {
        // Inclusive boundary: a filament whose score equals the
        // threshold must not be split.
        let filament = chain(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let score = LineStraightness.score(filament.picks());
        let segments = split_filament(&filament, &LineStraightness, score);
        assert_eq!(segments, vec![filament]);
    }

    #[test]
    fn score_just_past_threshold_splits() {
        let filament = chain(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let score = LineStraightness.score(filament.picks());
        let segments = split_filament(&filament, &LineStraightness, score + 1e-9);
        // A 3-pick filament bisects into a 1-pick and a 2-pick leaf,
        // both trivially straight.
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 1);
        assert_eq!(segments[1].len(), 2);
    }

    #[test]
    fn bent_filament_splits_into_straight_leaves() {
        // An L shape: 5 picks along +x then 5 along +y. Every leaf of
        // the recursion must satisfy the threshold.
        let mut coords: Vec<(f64, f64)> = (0..5).map(|i| (f64::from(i) * 10.0, 0.0)).collect();
        coords.extend((1..6).map(|i| (40.0, f64::from(i) * 10.0)));
        let filament = chain(&coords);

        let segments = split_filament(&filament, &LineStraightness, 0.95);
        assert!(segments.len() >= 2);
        for segment in &segments {
            assert!(
                segment.len() < 3 || LineStraightness.score(segment.picks()) >= 0.95,
                "leaf still bent: {segment:?}"
            );
        }
        // No pick is lost or duplicated by the bisection.
        let total: usize = segments.iter().map(Filament::len).sum();
        assert_eq!(total, filament.len());
    }

    #[test]
    fn splitter_works_with_rmsd() {
        let mut coords: Vec<(f64, f64)> = (0..5).map(|i| (f64::from(i) * 10.0, 0.0)).collect();
        coords.extend((1..6).map(|i| (40.0, f64::from(i) * 10.0)));
        let filament = chain(&coords);

        let segments = split_filament(&filament, &RmsDeviation, 1.0);
        for segment in &segments {
            assert!(segment.len() < 3 || RmsDeviation.score(segment.picks()) <= 1.0);
        }
    }
}
