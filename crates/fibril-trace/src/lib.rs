//! fibril-trace: filament tracing and consolidation for cryo-EM picks
//! (sans-IO).
//!
//! Turns independently detected, oriented box picks on a micrograph
//! into ordered filaments through:
//! spatial indexing -> greedy path building -> end-to-end merging ->
//! length filtering -> smoothing -> de-duplication -> straightness
//! splitting -> orientation annotation.
//!
//! This crate has **no I/O dependencies** -- detector inference, image
//! decoding, coordinate file formats, and process orchestration all
//! live outside. The one inbound seam is [`Resampler`], invoked when a
//! fixed pick spacing is configured.

pub mod builder;
pub mod dedup;
pub mod geometry;
pub mod index;
pub mod merge;
pub mod orientation;
pub mod resample;
pub mod smooth;
pub mod split;
pub mod straightness;
pub mod task;
pub mod types;

use serde::{Deserialize, Serialize};

pub use builder::PathBuilder;
pub use index::PickIndex;
pub use orientation::{OrientationOracle, OrientationRaster, OrientationSource};
pub use resample::Resampler;
pub use straightness::{Preference, StraightnessKind, StraightnessMetric};
pub use task::TraceTask;
pub use types::{Filament, META_ANGLE, Pick, SpatialHandle, StagedTrace, TraceConfig, TraceError};

/// One tracing instance: a configuration plus an orientation source.
///
/// Each image (or stack slice) gets its own tracer; instances share
/// nothing, so parallelism is handled entirely by whatever worker pool
/// owns the [`TraceTask`](task::TraceTask) values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracer {
    config: TraceConfig,
    orientation: OrientationSource,
}

impl Tracer {
    /// Create a tracer, validating the configuration up front.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidConfig`] for values the pipeline
    /// cannot run with.
    pub fn new(config: TraceConfig, orientation: OrientationSource) -> Result<Self, TraceError> {
        config.validate()?;
        Ok(Self {
            config,
            orientation,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Run the full pipeline and return the final filaments.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MissingOrientation`] when any pick the
    /// angular filters need has no orientation; the whole trace fails.
    pub fn trace(&self, picks: Vec<Pick>) -> Result<Vec<Filament>, TraceError> {
        Ok(self.trace_staged(picks, None)?.filaments)
    }

    /// Run the full pipeline, preserving every stage's output.
    ///
    /// Empty input yields an all-empty result, not an error.
    ///
    /// # Pipeline steps
    ///
    /// 1. Build the spatial index (rescale, handles, distance cache)
    /// 2. Greedy path building
    /// 3. End-to-end merging (when `do_merging`)
    /// 4. Minimum-length filter
    /// 5. Moving-window smoothing
    /// 6. External resampling (when `box_distance` is set and a
    ///    resampler is supplied)
    /// 7. Cross-filament de-duplication
    /// 8. Straightness splitting (when a metric is selected)
    /// 9. Per-pick orientation annotation
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::MissingOrientation`] as for
    /// [`Self::trace`].
    pub fn trace_staged(
        &self,
        picks: Vec<Pick>,
        resampler: Option<&dyn Resampler>,
    ) -> Result<StagedTrace, TraceError> {
        if picks.is_empty() {
            return Ok(StagedTrace {
                raw: Vec::new(),
                merged: None,
                filtered: Vec::new(),
                smoothed: Vec::new(),
                resampled: None,
                deduplicated: Vec::new(),
                split: None,
                filaments: Vec::new(),
            });
        }

        // 1 + 2. Index the snapshot and grow filaments greedily.
        let index = PickIndex::build(picks, self.config.rescale_factor, self.config.search_radius);
        let oracle = OrientationOracle::new(&self.orientation);
        let raw = PathBuilder::new(&index, oracle, &self.config).trace_all()?;

        // 3. Optional end-to-end merging.
        let merged = self
            .config
            .do_merging
            .then(|| merge::merge_filaments(raw.clone(), &self.config));
        let current = merged.clone().unwrap_or_else(|| raw.clone());

        // 4. Minimum-length filter.
        let filtered: Vec<Filament> = current
            .into_iter()
            .filter(|filament| filament.len() >= self.config.min_number_boxes)
            .collect();

        // 5. Moving-window smoothing.
        let smoothed: Vec<Filament> = filtered
            .iter()
            .map(|filament| smooth::moving_window(filament, self.config.smooth_window))
            .collect();

        // 6. Optional external resampling.
        let resampled = match (self.config.box_distance, resampler) {
            (Some(distance), Some(resampler)) => Some(
                smoothed
                    .iter()
                    .map(|filament| resampler.resample(filament, distance))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };
        let current = resampled.clone().unwrap_or_else(|| smoothed.clone());

        // 7. Cross-filament de-duplication.
        let deduplicated = dedup::deduplicate(current, self.config.iou_thresh);

        // 8. Optional straightness splitting.
        let split = self.config.straightness_method.metric().map(|metric| {
            deduplicated
                .iter()
                .flat_map(|filament| {
                    straightness::split_filament(
                        filament,
                        metric,
                        self.config.straightness_threshold,
                    )
                })
                .collect::<Vec<_>>()
        });
        let current = split.clone().unwrap_or_else(|| deduplicated.clone());

        // 9. Per-pick orientation annotation.
        let filaments = annotate_orientations(current);

        Ok(StagedTrace {
            raw,
            merged,
            filtered,
            smoothed,
            resampled,
            deduplicated,
            split,
            filaments,
        })
    }
}

/// Stamp every pick with its filament-local tangent angle.
///
/// The tangent at pick `i` runs from its predecessor to its successor
/// (one-sided at the endpoints), folded to `[0, pi)` radians and stored
/// under the `"angle"` metadata key. Single-pick filaments keep
/// whatever metadata they already carry -- no tangent exists.
fn annotate_orientations(filaments: Vec<Filament>) -> Vec<Filament> {
    filaments
        .into_iter()
        .map(|filament| {
            let mut picks = filament.into_picks();
            if picks.len() >= 2 {
                let angles: Vec<f64> = (0..picks.len())
                    .map(|i| {
                        let previous = &picks[i.saturating_sub(1)];
                        let next = &picks[(i + 1).min(picks.len() - 1)];
                        let tangent = previous.displacement_to(next);
                        tangent
                            .y
                            .atan2(tangent.x)
                            .rem_euclid(std::f64::consts::PI)
                    })
                    .collect();
                for (pick, angle) in picks.iter_mut().zip(angles) {
                    pick.metadata.insert(META_ANGLE.to_owned(), angle);
                }
            }
            Filament::new(picks)
        })
        .collect()
}
