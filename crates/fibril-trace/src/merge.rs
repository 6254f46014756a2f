//! End-to-end welding of compatible filament pairs.
//!
//! Two filaments merge when a pair of their endpoints lies within the
//! search radius and the directions of the two joining tails agree. One
//! filament's pick order is reversed as needed so the merged result
//! runs spatially continuously through the junction.

use geo::Coord;

use crate::geometry::{angular_difference, vector_angle};
use crate::orientation::direction_of;
use crate::types::{Filament, Pick, TraceConfig};

/// Picks considered when estimating the direction of a joining tail.
const MERGE_LOOKBACK: usize = 3;

/// Try to weld `a` and `b` end to end.
///
/// Endpoint pairings are tried in order start/start, start/end; the
/// end-side pairings end/start and end/end are considered only when
/// neither start-side pairing was within `search_radius`. The first
/// in-range pairing is direction-checked: the joining tails must agree
/// within `filament_direction_delta`, with picks borrowed across the
/// junction when a side has fewer than [`MERGE_LOOKBACK`] of its own.
///
/// Returns the merged filament and the connecting squared distance, or
/// `None` when no pairing is in range or the direction check fails.
#[must_use]
pub fn merge_pair(a: &Filament, b: &Filament, config: &TraceConfig) -> Option<(Filament, f64)> {
    let (a_first, a_last) = (a.first()?, a.last()?);
    let (b_first, b_last) = (b.first()?, b.last()?);
    let radius_squared = config.search_radius * config.search_radius;

    let start_start = a_first.center_distance_squared(b_first);
    let start_end = a_first.center_distance_squared(b_last);
    let end_start = a_last.center_distance_squared(b_first);
    let end_end = a_last.center_distance_squared(b_last);

    // Each pairing is normalized to (left, right) with left's tail
    // meeting right's head, reversing one side where needed.
    let (left, right, connecting_squared) = if start_start <= radius_squared {
        (a.reversed(), b.clone(), start_start)
    } else if start_end <= radius_squared {
        (b.clone(), a.clone(), start_end)
    } else if end_start <= radius_squared {
        (a.clone(), b.clone(), end_start)
    } else if end_end <= radius_squared {
        (a.clone(), b.reversed(), end_end)
    } else {
        return None;
    };

    let tail = tail_direction(left.picks(), right.picks())?;
    let head = head_direction(right.picks(), left.picks())?;
    let deviation = angular_difference(vector_angle(tail), vector_angle(head));
    if deviation >= config.filament_direction_delta {
        return None;
    }

    let mut picks = left.into_picks();
    picks.extend(right.into_picks());
    Some((Filament::new(picks), connecting_squared))
}

/// Direction of `left`'s joining tail, borrowing picks from the head of
/// `right` when `left` is too short for a stable estimate.
fn tail_direction(left: &[Pick], right: &[Pick]) -> Option<Coord<f64>> {
    if left.len() >= MERGE_LOOKBACK {
        direction_of(&left[left.len() - MERGE_LOOKBACK..])
    } else {
        let mut run: Vec<Pick> = left.to_vec();
        run.extend(right.iter().take(MERGE_LOOKBACK - left.len()).cloned());
        direction_of(&run)
    }
}

/// Direction of `right`'s joining head, borrowing picks from the tail
/// of `left` when `right` is too short for a stable estimate.
fn head_direction(right: &[Pick], left: &[Pick]) -> Option<Coord<f64>> {
    if right.len() >= MERGE_LOOKBACK {
        direction_of(&right[..MERGE_LOOKBACK])
    } else {
        let borrow = MERGE_LOOKBACK - right.len();
        let mut run: Vec<Pick> = left[left.len().saturating_sub(borrow)..].to_vec();
        run.extend(right.iter().cloned());
        direction_of(&run)
    }
}

/// Repeatedly merge the single best pair until a full scan finds none.
///
/// Each scan considers every unordered pair; among all valid merges
/// found, only the one with the minimum connecting distance is
/// performed, its inputs are removed, the result inserted, and the scan
/// restarts. Quadratic per merge, which is fine for the tens of
/// filaments typical per image.
#[must_use]
pub fn merge_filaments(mut filaments: Vec<Filament>, config: &TraceConfig) -> Vec<Filament> {
    loop {
        let mut best: Option<(usize, usize, Filament, f64)> = None;
        for i in 0..filaments.len() {
            for j in i + 1..filaments.len() {
                let Some((merged, connecting_squared)) =
                    merge_pair(&filaments[i], &filaments[j], config)
                else {
                    continue;
                };
                let better = best
                    .as_ref()
                    .is_none_or(|&(_, _, _, best_squared)| connecting_squared < best_squared);
                if better {
                    best = Some((i, j, merged, connecting_squared));
                }
            }
        }
        let Some((i, j, merged, _)) = best else {
            return filaments;
        };
        // j > i, so removing j first keeps i valid.
        filaments.remove(j);
        filaments.remove(i);
        filaments.push(merged);
    }
}
