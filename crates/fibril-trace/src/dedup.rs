//! Cross-filament non-maximum suppression.
//!
//! When two filaments claim overlapping picks, the shorter one loses:
//! it is removed, and whatever parts of it do not overlap the longer
//! filament are re-emitted as separate segments. One pass only --
//! segments created here are not re-checked within the same call, so a
//! second invocation can still find work (asserted by a test rather
//! than assumed away).

use crate::geometry::iou;
use crate::split::split_at_indices;
use crate::types::Filament;

/// Remove or split filaments that duplicate a longer one.
///
/// Every unordered pair is checked once; `short` is the filament with
/// fewer picks (on a tie, the later of the pair). If any of `short`'s
/// picks overlaps any pick of `long` above `iou_thresh`, `short` is
/// marked for removal and, when it has more than one pick, split at the
/// overlapping indices with the resulting segments collected. All
/// removals and additions are applied after the full scan.
#[must_use]
pub fn deduplicate(filaments: Vec<Filament>, iou_thresh: f64) -> Vec<Filament> {
    let mut remove = vec![false; filaments.len()];
    let mut additions = Vec::new();

    for i in 0..filaments.len() {
        for j in i + 1..filaments.len() {
            let (short_idx, long_idx) = if filaments[i].len() < filaments[j].len() {
                (i, j)
            } else {
                (j, i)
            };
            let overlapping =
                overlapping_indices(&filaments[short_idx], &filaments[long_idx], iou_thresh);
            if overlapping.is_empty() {
                continue;
            }
            remove[short_idx] = true;
            if filaments[short_idx].len() > 1 {
                additions.extend(split_at_indices(&filaments[short_idx], &overlapping));
            }
        }
    }

    let mut kept: Vec<Filament> = filaments
        .into_iter()
        .zip(remove)
        .filter_map(|(filament, removed)| (!removed).then_some(filament))
        .collect();
    kept.extend(additions);
    kept
}

/// Indices of picks in `short` that overlap any pick of `long` above
/// the threshold.
fn overlapping_indices(short: &Filament, long: &Filament, iou_thresh: f64) -> Vec<usize> {
    short
        .picks()
        .iter()
        .enumerate()
        .filter(|(_, pick)| long.picks().iter().any(|other| iou(pick, other) > iou_thresh))
        .map(|(index, _)| index)
        .collect()
}
