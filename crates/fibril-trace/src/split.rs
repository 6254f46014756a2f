//! Index-bounded segmentation of a filament.

use crate::types::Filament;

/// Contiguous sub-runs of `filament` that exclude the band
/// `[index, index + 1]` around each of `indices`.
///
/// `indices` must be sorted and unique. The run before the first index
/// is kept only when that index is positive; runs strictly between
/// consecutive bands and the run after the last band follow. Empty runs
/// are dropped. With no indices there is nothing to exclude and the
/// filament is returned whole.
#[must_use]
pub fn split_at_indices(filament: &Filament, indices: &[usize]) -> Vec<Filament> {
    let picks = filament.picks();
    let Some((&first, _)) = indices.split_first() else {
        return if picks.is_empty() {
            Vec::new()
        } else {
            vec![filament.clone()]
        };
    };

    let mut runs: Vec<&[_]> = Vec::with_capacity(indices.len() + 1);
    if first > 0 {
        runs.push(&picks[..first.min(picks.len())]);
    }
    for pair in indices.windows(2) {
        let gap_start = (pair[0] + 2).min(picks.len());
        let gap_end = pair[1].min(picks.len());
        if gap_start < gap_end {
            runs.push(&picks[gap_start..gap_end]);
        }
    }
    if let Some(&last) = indices.last() {
        let tail_start = last + 2;
        if tail_start < picks.len() {
            runs.push(&picks[tail_start..]);
        }
    }

    runs.into_iter()
        .filter(|run| !run.is_empty())
        .map(|run| Filament::new(run.to_vec()))
        .collect()
}
