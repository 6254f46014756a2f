//! Greedy filament growth from seed picks.
//!
//! [`PathBuilder`] walks the indexed picks in their original order.
//! Each not-yet-assigned pick seeds a filament that grows by
//! batch-appending every surviving neighbor of the current tail,
//! nearest first, until an iteration adds nothing. Assignment is keyed
//! by truncated-integer center cells: a pick is consumed by at most one
//! filament per pass, and two picks sharing a cell count as one.

use std::collections::HashSet;

use geo::Coord;

use crate::geometry::{angular_difference, axis_difference, iou, normalize, vector_angle};
use crate::index::PickIndex;
use crate::orientation::{ORIENTATION_WINDOW, OrientationOracle};
use crate::types::{Filament, Pick, TraceConfig, TraceError};

/// Greedy state machine that grows filaments one tail extension at a
/// time.
#[derive(Debug)]
pub struct PathBuilder<'a> {
    index: &'a PickIndex,
    oracle: OrientationOracle<'a>,
    config: &'a TraceConfig,
    assigned: HashSet<(i64, i64)>,
}

impl<'a> PathBuilder<'a> {
    /// Create a builder over one index snapshot.
    #[must_use]
    pub fn new(index: &'a PickIndex, oracle: OrientationOracle<'a>, config: &'a TraceConfig) -> Self {
        Self {
            index,
            oracle,
            config,
            assigned: HashSet::new(),
        }
    }

    /// Trace every filament, seeding from picks in their original order.
    ///
    /// # Errors
    ///
    /// Propagates [`TraceError::MissingOrientation`] from any pick the
    /// angular filters need an orientation for; the whole pass fails.
    pub fn trace_all(mut self) -> Result<Vec<Filament>, TraceError> {
        let mut filaments = Vec::new();
        for seed in self.index.picks() {
            if self.assigned.contains(&seed.cell()) {
                continue;
            }
            filaments.push(self.trace_from(seed)?);
        }
        Ok(filaments)
    }

    /// Grow one filament from `seed` until an iteration adds nothing.
    fn trace_from(&mut self, seed: &Pick) -> Result<Filament, TraceError> {
        let mut picks = vec![seed.clone()];
        self.assigned.insert(seed.cell());
        let mut direction: Option<Coord<f64>> = None;

        loop {
            let appended = self.extend_tail(&mut picks, &mut direction)?;
            if appended == 0 {
                break;
            }
        }
        Ok(Filament::new(picks))
    }

    /// One growth iteration: filter the tail's neighbors and
    /// batch-append the survivors, nearest first. Returns how many picks
    /// were appended.
    fn extend_tail(
        &mut self,
        picks: &mut Vec<Pick>,
        direction: &mut Option<Coord<f64>>,
    ) -> Result<usize, TraceError> {
        let index = self.index;
        let Some(last) = picks.last().cloned() else {
            return Ok(0);
        };
        let reference = self.reference_orientation(picks, &last)?;

        // Partition the unassigned neighborhood into the angular search
        // region (an undirected axis test against the reference
        // orientation) and the rest. Off-axis picks overlapping the tail
        // are consumed without extending the filament so they cannot
        // seed a spurious one later.
        let mut in_region = Vec::new();
        for candidate in index.neighbors_within(&last, self.config.search_radius) {
            if self.assigned.contains(&candidate.cell()) {
                continue;
            }
            let heading = vector_angle(last.displacement_to(candidate));
            if axis_difference(heading, reference) < self.config.direction_delta {
                in_region.push(candidate);
            } else if iou(&last, candidate) > self.config.iou_thresh {
                self.assigned.insert(candidate.cell());
            }
        }

        let mut survivors = Vec::new();
        for candidate in in_region {
            if index.distance(&last, candidate) >= self.config.search_radius {
                continue;
            }
            let heading = vector_angle(last.displacement_to(candidate));
            if axis_difference(heading, reference) >= self.config.angle_delta {
                continue;
            }
            let own = self.oracle.pick_orientation(candidate)?;
            if axis_difference(own, reference) >= self.config.angle_delta {
                continue;
            }
            survivors.push(candidate);
        }

        if picks.len() >= 2 && direction.is_none() {
            *direction = self.estimate_direction(&last, &survivors);
        }
        if let Some(established) = *direction {
            let established_angle = vector_angle(established);
            survivors.retain(|candidate| {
                let heading = vector_angle(last.displacement_to(candidate));
                angular_difference(heading, established_angle) < self.config.direction_delta
            });
        }

        // Stable sort: equal distances keep handle order.
        survivors.sort_by(|a, b| {
            index
                .distance(&last, a)
                .total_cmp(&index.distance(&last, b))
        });

        let appended = survivors.len();
        for candidate in survivors {
            self.assigned.insert(candidate.cell());
            picks.push(candidate.clone());
        }
        Ok(appended)
    }

    /// Reference orientation for filtering: the filament's windowed mean
    /// once it has at least two picks, else the tail pick's own.
    fn reference_orientation(&self, picks: &[Pick], last: &Pick) -> Result<f64, TraceError> {
        if picks.len() >= 2
            && let Some(orientation) = self.oracle.orientation_of(picks, ORIENTATION_WINDOW)?
        {
            return Ok(orientation);
        }
        self.oracle.pick_orientation(last)
    }

    /// Estimate the tracing direction by mutual agreement among the
    /// surviving candidates.
    ///
    /// Each candidate's outward displacement from the tail votes; the
    /// candidate whose heading the most *other* candidates agree with
    /// (within `direction_delta`) wins, first maximum on ties.
    fn estimate_direction(&self, last: &Pick, survivors: &[&Pick]) -> Option<Coord<f64>> {
        let headings: Vec<f64> = survivors
            .iter()
            .map(|candidate| vector_angle(last.displacement_to(candidate)))
            .collect();

        let mut best: Option<(usize, usize)> = None;
        for (i, own) in headings.iter().enumerate() {
            let count = headings
                .iter()
                .enumerate()
                .filter(|&(j, other)| {
                    j != i && angular_difference(*other, *own) < self.config.direction_delta
                })
                .count();
            let better = best.is_none_or(|(best_count, _)| count > best_count);
            if better {
                best = Some((count, i));
            }
        }
        best.map(|(_, winner)| normalize(last.displacement_to(survivors[winner])))
    }
}
