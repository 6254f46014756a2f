//! Shared types for the filament tracing pipeline.

use std::collections::BTreeMap;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::straightness::StraightnessKind;

/// Metadata key holding a pick's in-plane rotation in radians.
pub const META_ANGLE: &str = "angle";

/// Metadata key holding a per-pick box size estimate in pixels.
pub const META_BOXSIZE_ESTIMATED: &str = "boxsize_estimated";

/// Link between a pick and the spatial-index generation that stamped it.
///
/// [`PickIndex::build`](crate::index::PickIndex::build) assigns
/// `Indexed { generation, id }` handles; everything synthesized later
/// (smoothed picks, hand-built picks) stays `Unindexed` and is thereby
/// forced onto the direct distance path. A handle is only honored by the
/// index whose generation stamp it carries, so reusing a pick across an
/// index rebuild can never read a stale cached distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpatialHandle {
    /// Assigned by an index build; valid against that build only.
    Indexed {
        /// Generation stamp of the index that assigned this handle.
        generation: u64,
        /// Position of the pick in the indexed snapshot (0-based).
        id: usize,
    },
    /// No index association; distance queries compute directly.
    #[default]
    Unindexed,
}

/// An oriented particle pick: box center, box size, confidence, metadata.
///
/// Picks are value-like. The detector produces them in reading order;
/// the smoother produces synthetic ones with no spatial-index handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    /// Box center, horizontal (pixels from the left edge).
    pub x: f64,
    /// Box center, vertical (pixels from the top edge).
    pub y: f64,
    /// Box width in pixels.
    pub w: f64,
    /// Box height in pixels.
    pub h: f64,
    /// Detector confidence, when known.
    pub confidence: Option<f64>,
    /// Depth coordinate for picks taken from a stack slice.
    pub z: Option<f64>,
    /// Free-form numeric metadata (`"angle"` in radians,
    /// `"boxsize_estimated"`, ...). Ordered so iteration never depends
    /// on hash state.
    #[serde(default)]
    pub metadata: BTreeMap<String, f64>,
    /// Spatial-index association, if any.
    #[serde(default)]
    pub handle: SpatialHandle,
}

impl Pick {
    /// Create a pick with the given center and box size.
    #[must_use]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence: None,
            z: None,
            metadata: BTreeMap::new(),
            handle: SpatialHandle::Unindexed,
        }
    }

    /// Set the detector confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Set the `"angle"` metadata, in radians.
    #[must_use]
    pub fn with_angle(mut self, radians: f64) -> Self {
        self.metadata.insert(META_ANGLE.to_owned(), radians);
        self
    }

    /// The `"angle"` metadata in radians, when present.
    #[must_use]
    pub fn angle(&self) -> Option<f64> {
        self.metadata.get(META_ANGLE).copied()
    }

    /// Box center as a coordinate.
    #[must_use]
    pub const fn center(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Displacement vector from this pick's center to `other`'s.
    #[must_use]
    pub fn displacement_to(&self, other: &Self) -> Coord<f64> {
        Coord {
            x: other.x - self.x,
            y: other.y - self.y,
        }
    }

    /// Euclidean distance between box centers.
    #[must_use]
    pub fn center_distance(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Squared Euclidean distance between box centers.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn center_distance_squared(&self, other: &Self) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Truncated-integer center cell.
    ///
    /// This is the membership identity used during path building: two
    /// geometrically distinct picks whose centers truncate to the same
    /// cell count as the same pick. Truncation is toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn cell(&self) -> (i64, i64) {
        (self.x as i64, self.y as i64)
    }

    /// Axis-aligned footprint of the box.
    #[must_use]
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.x - self.w / 2.0,
                y: self.y - self.h / 2.0,
            },
            Coord {
                x: self.x + self.w / 2.0,
                y: self.y + self.h / 2.0,
            },
        )
    }
}

/// An ordered chain of picks approximating a curvilinear structure.
///
/// Grown by appending during path building; every later stage (merge,
/// split, smooth) replaces filaments wholesale instead of editing them
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filament(Vec<Pick>);

impl Filament {
    /// Create a filament from an ordered vector of picks.
    #[must_use]
    pub const fn new(picks: Vec<Pick>) -> Self {
        Self(picks)
    }

    /// Returns `true` if the filament has no picks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of picks in the filament.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// First pick, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Pick> {
        self.0.first()
    }

    /// Last pick, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Pick> {
        self.0.last()
    }

    /// All picks as a slice.
    #[must_use]
    pub fn picks(&self) -> &[Pick] {
        &self.0
    }

    /// Append a pick at the tail.
    pub fn push(&mut self, pick: Pick) {
        self.0.push(pick);
    }

    /// Consume the filament and return the underlying vector.
    #[must_use]
    pub fn into_picks(self) -> Vec<Pick> {
        self.0
    }

    /// The same picks in reverse order, as a new filament.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut picks = self.0.clone();
        picks.reverse();
        Self(picks)
    }
}

/// Configuration for one tracer instance.
///
/// Angles are degrees, distances are pixels in the (rescaled) picking
/// image's coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Neighbor search radius around the filament tail.
    pub search_radius: f64,

    /// Maximum deviation between a candidate step (or a candidate's own
    /// orientation) and the filament's reference orientation axis.
    pub angle_delta: f64,

    /// Half-width of the angular search region, and the agreement bound
    /// for the established tracing direction.
    pub direction_delta: f64,

    /// Filaments with fewer picks than this are discarded after tracing
    /// (and optional merging).
    pub min_number_boxes: usize,

    /// Single scalar applied to every pick's x, y, w, h at index build.
    pub rescale_factor: f64,

    /// Whether compatible filament pairs are welded end to end.
    pub do_merging: bool,

    /// Maximum deviation between the joining tails' directions for a
    /// merge to be accepted.
    pub filament_direction_delta: f64,

    /// Target spacing for the external resampler; `None` disables
    /// resampling.
    pub box_distance: Option<f64>,

    /// Straightness metric used for recursive re-segmentation;
    /// [`StraightnessKind::None`] disables splitting.
    pub straightness_method: StraightnessKind,

    /// Threshold for the straightness predicate (inclusive boundary).
    pub straightness_threshold: f64,

    /// Box-pair overlap above this counts as duplication, both for
    /// filament NMS and for consuming overlapping off-axis picks during
    /// path building.
    pub iou_thresh: f64,

    /// Moving-average window width for position smoothing. Must be odd.
    pub smooth_window: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            search_radius: 100.0,
            angle_delta: 10.0,
            direction_delta: 30.0,
            min_number_boxes: 2,
            rescale_factor: 1.0,
            do_merging: true,
            filament_direction_delta: 50.0,
            box_distance: None,
            straightness_method: StraightnessKind::default(),
            straightness_threshold: 0.95,
            iou_thresh: 0.3,
            smooth_window: 3,
        }
    }
}

impl TraceConfig {
    /// Check the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), TraceError> {
        positive(self.search_radius, "search_radius")?;
        positive(self.rescale_factor, "rescale_factor")?;
        delta_in_range(self.angle_delta, "angle_delta")?;
        delta_in_range(self.direction_delta, "direction_delta")?;
        delta_in_range(self.filament_direction_delta, "filament_direction_delta")?;
        if !(0.0..=1.0).contains(&self.iou_thresh) {
            return Err(TraceError::InvalidConfig(format!(
                "iou_thresh must be within [0, 1], got {}",
                self.iou_thresh
            )));
        }
        if self.min_number_boxes == 0 {
            return Err(TraceError::InvalidConfig(
                "min_number_boxes must be at least 1".to_owned(),
            ));
        }
        if self.smooth_window == 0 || self.smooth_window % 2 == 0 {
            return Err(TraceError::InvalidConfig(format!(
                "smooth_window must be odd, got {}",
                self.smooth_window
            )));
        }
        if let Some(distance) = self.box_distance {
            positive(distance, "box_distance")?;
        }
        if !self.straightness_threshold.is_finite() {
            return Err(TraceError::InvalidConfig(format!(
                "straightness_threshold must be finite, got {}",
                self.straightness_threshold
            )));
        }
        Ok(())
    }
}

fn positive(value: f64, name: &str) -> Result<(), TraceError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TraceError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn delta_in_range(value: f64, name: &str) -> Result<(), TraceError> {
    if value.is_finite() && value > 0.0 && value <= 180.0 {
        Ok(())
    } else {
        Err(TraceError::InvalidConfig(format!(
            "{name} must be within (0, 180] degrees, got {value}"
        )))
    }
}

/// Result of a trace with every stage's output preserved.
///
/// Each field captures one logical pipeline stage, so callers can
/// inspect what merging, filtering, or de-duplication did to a given
/// micrograph. Optional stages record `None` when disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTrace {
    /// Raw filaments straight out of the path builder.
    pub raw: Vec<Filament>,
    /// After end-to-end merging; `None` when merging is disabled.
    pub merged: Option<Vec<Filament>>,
    /// After the minimum-length filter.
    pub filtered: Vec<Filament>,
    /// After moving-window smoothing.
    pub smoothed: Vec<Filament>,
    /// After external resampling; `None` when not configured.
    pub resampled: Option<Vec<Filament>>,
    /// After cross-filament de-duplication.
    pub deduplicated: Vec<Filament>,
    /// After straightness splitting; `None` when disabled.
    pub split: Option<Vec<Filament>>,
    /// Final output with per-pick orientation annotations.
    pub filaments: Vec<Filament>,
}

/// Errors that can occur while tracing.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum TraceError {
    /// Neither a raster nor pick metadata could provide an orientation.
    ///
    /// Fatal for the whole trace: the angular filters are meaningless
    /// without a direction, so there is no per-pick fallback.
    #[error("no orientation available for pick at ({x:.1}, {y:.1})")]
    MissingOrientation {
        /// Center x of the offending pick.
        x: f64,
        /// Center y of the offending pick.
        y: f64,
    },

    /// Tracer configuration is invalid.
    #[error("invalid trace configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Pick tests ---

    #[test]
    fn pick_new_has_no_handle() {
        let pick = Pick::new(1.0, 2.0, 10.0, 10.0);
        assert_eq!(pick.handle, SpatialHandle::Unindexed);
        assert!(pick.confidence.is_none());
        assert!(pick.metadata.is_empty());
    }

    #[test]
    fn pick_center_distance() {
        let a = Pick::new(0.0, 0.0, 10.0, 10.0);
        let b = Pick::new(3.0, 4.0, 10.0, 10.0);
        assert!((a.center_distance(&b) - 5.0).abs() < f64::EPSILON);
        assert!((a.center_distance_squared(&b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pick_cell_truncates_toward_zero() {
        assert_eq!(Pick::new(10.9, 3.2, 1.0, 1.0).cell(), (10, 3));
        assert_eq!(Pick::new(-0.5, -1.7, 1.0, 1.0).cell(), (0, -1));
    }

    #[test]
    fn distinct_picks_can_share_a_cell() {
        // The membership ambiguity reproduced on purpose: two different
        // centers inside one integer cell compare equal for assignment.
        let a = Pick::new(10.1, 4.2, 1.0, 1.0);
        let b = Pick::new(10.8, 4.9, 1.0, 1.0);
        assert_eq!(a.cell(), b.cell());
    }

    #[test]
    fn pick_angle_round_trip() {
        let pick = Pick::new(0.0, 0.0, 1.0, 1.0).with_angle(1.25);
        assert_eq!(pick.angle(), Some(1.25));
    }

    #[test]
    fn pick_rect_is_centered() {
        let rect = Pick::new(10.0, 20.0, 4.0, 6.0).rect();
        assert!((rect.min().x - 8.0).abs() < f64::EPSILON);
        assert!((rect.min().y - 17.0).abs() < f64::EPSILON);
        assert!((rect.max().x - 12.0).abs() < f64::EPSILON);
        assert!((rect.max().y - 23.0).abs() < f64::EPSILON);
    }

    // --- Filament tests ---

    #[test]
    fn filament_first_and_last() {
        let filament = Filament::new(vec![
            Pick::new(0.0, 0.0, 1.0, 1.0),
            Pick::new(1.0, 0.0, 1.0, 1.0),
            Pick::new(2.0, 0.0, 1.0, 1.0),
        ]);
        assert_eq!(filament.len(), 3);
        assert!((filament.first().unwrap().x - 0.0).abs() < f64::EPSILON);
        assert!((filament.last().unwrap().x - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn filament_reversed_keeps_picks() {
        let filament = Filament::new(vec![
            Pick::new(0.0, 0.0, 1.0, 1.0),
            Pick::new(1.0, 0.0, 1.0, 1.0),
        ]);
        let reversed = filament.reversed();
        assert!((reversed.first().unwrap().x - 1.0).abs() < f64::EPSILON);
        assert!((reversed.last().unwrap().x - 0.0).abs() < f64::EPSILON);
        assert_eq!(reversed.len(), 2);
    }

    #[test]
    fn empty_filament() {
        let filament = Filament::new(vec![]);
        assert!(filament.is_empty());
        assert!(filament.first().is_none());
        assert!(filament.last().is_none());
    }

    // --- TraceConfig tests ---

    #[test]
    fn default_config_is_valid() {
        assert!(TraceConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_nonpositive_radius() {
        let config = TraceConfig {
            search_radius: 0.0,
            ..TraceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TraceError::InvalidConfig(message)) if message.contains("search_radius")
        ));
    }

    #[test]
    fn config_rejects_nan_rescale() {
        let config = TraceConfig {
            rescale_factor: f64::NAN,
            ..TraceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_wide_delta() {
        let config = TraceConfig {
            angle_delta: 181.0,
            ..TraceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_even_smooth_window() {
        let config = TraceConfig {
            smooth_window: 4,
            ..TraceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TraceError::InvalidConfig(message)) if message.contains("smooth_window")
        ));
    }

    #[test]
    fn config_rejects_out_of_range_iou() {
        let config = TraceConfig {
            iou_thresh: 1.5,
            ..TraceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    // --- Serde round-trip tests ---

    #[test]
    fn pick_serde_round_trip() {
        let pick = Pick::new(3.5, -1.25, 20.0, 24.0)
            .with_confidence(0.8)
            .with_angle(0.5);
        let json = serde_json::to_string(&pick).unwrap();
        let deserialized: Pick = serde_json::from_str(&json).unwrap();
        assert_eq!(pick, deserialized);
    }

    #[test]
    fn filament_serde_round_trip() {
        let filament = Filament::new(vec![
            Pick::new(0.0, 0.0, 10.0, 10.0),
            Pick::new(5.0, 5.0, 10.0, 10.0),
        ]);
        let json = serde_json::to_string(&filament).unwrap();
        let deserialized: Filament = serde_json::from_str(&json).unwrap();
        assert_eq!(filament, deserialized);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = TraceConfig {
            box_distance: Some(12.5),
            straightness_method: StraightnessKind::Rmsd,
            ..TraceConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: TraceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn error_serde_round_trip() {
        let error = TraceError::MissingOrientation { x: 4.0, y: 8.0 };
        let json = serde_json::to_string(&error).unwrap();
        let deserialized: TraceError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            TraceError::MissingOrientation { x, y } if x == 4.0 && y == 8.0
        ));
    }

    #[test]
    fn error_display() {
        let error = TraceError::MissingOrientation { x: 4.25, y: 8.5 };
        assert_eq!(
            error.to_string(),
            "no orientation available for pick at (4.2, 8.5)"
        );
    }
}
