//! Spatial index over one snapshot of picks.
//!
//! A [`PickIndex`] ties an R\*-tree of pick centers and a sparse
//! pairwise-distance cache to a single box-list snapshot. Every build
//! stamps a fresh generation; a handle is honored only by the index
//! whose generation it carries, so a pick kept across a rebuild falls
//! back to direct computation instead of reading a stale cache entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::types::{Pick, SpatialHandle};

/// Monotonic generation stamp shared by every index in the process.
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// A pick center tagged with its handle id for R-tree queries.
type IndexedCenter = GeomWithData<[f64; 2], usize>;

/// Derived, disposable index over a snapshot of picks.
#[derive(Debug)]
pub struct PickIndex {
    generation: u64,
    picks: Vec<Pick>,
    tree: RTree<IndexedCenter>,
    distances: HashMap<(usize, usize), f64>,
}

impl PickIndex {
    /// Build an index over `picks`.
    ///
    /// Assigns handle ids `0..n` in input order, multiplies every pick's
    /// x, y, w, h by the single scalar `rescale_factor`, bulk-loads an
    /// R\*-tree over the rescaled centers, and caches center distances
    /// for all pairs within `cache_radius` of each other.
    #[must_use]
    pub fn build(mut picks: Vec<Pick>, rescale_factor: f64, cache_radius: f64) -> Self {
        let generation = GENERATION.fetch_add(1, Ordering::Relaxed) + 1;

        for (id, pick) in picks.iter_mut().enumerate() {
            pick.x *= rescale_factor;
            pick.y *= rescale_factor;
            pick.w *= rescale_factor;
            pick.h *= rescale_factor;
            pick.handle = SpatialHandle::Indexed { generation, id };
        }

        let tree = RTree::bulk_load(
            picks
                .iter()
                .enumerate()
                .map(|(id, pick)| GeomWithData::new([pick.x, pick.y], id))
                .collect(),
        );

        let mut distances = HashMap::new();
        for (id, pick) in picks.iter().enumerate() {
            for entry in tree.locate_within_distance([pick.x, pick.y], cache_radius * cache_radius)
            {
                let other = entry.data;
                if other == id {
                    continue;
                }
                distances
                    .entry(pair_key(id, other))
                    .or_insert_with(|| pick.center_distance(&picks[other]));
            }
        }

        Self {
            generation,
            picks,
            tree,
            distances,
        }
    }

    /// The indexed picks in handle order.
    #[must_use]
    pub fn picks(&self) -> &[Pick] {
        &self.picks
    }

    /// All picks whose center lies within Euclidean `radius` of `pick`'s
    /// center, in ascending handle order. May include the query pick
    /// itself; the caller filters.
    #[must_use]
    pub fn neighbors_within(&self, pick: &Pick, radius: f64) -> Vec<&Pick> {
        let mut ids: Vec<usize> = self
            .tree
            .locate_within_distance([pick.x, pick.y], radius * radius)
            .map(|entry| entry.data)
            .collect();
        // Query order depends on tree shape; handle order keeps runs
        // reproducible.
        ids.sort_unstable();
        ids.into_iter().map(|id| &self.picks[id]).collect()
    }

    /// Euclidean distance between two picks' centers.
    ///
    /// Served from the pairwise cache when both picks carry a handle
    /// from this index's generation and the pair was within the cache
    /// radius; every other case computes directly. Both paths evaluate
    /// the same expression, so they agree bit for bit.
    #[must_use]
    pub fn distance(&self, a: &Pick, b: &Pick) -> f64 {
        if let (
            SpatialHandle::Indexed {
                generation: generation_a,
                id: id_a,
            },
            SpatialHandle::Indexed {
                generation: generation_b,
                id: id_b,
            },
        ) = (a.handle, b.handle)
            && generation_a == self.generation
            && generation_b == self.generation
            && let Some(&cached) = self.distances.get(&pair_key(id_a, id_b))
        {
            return cached;
        }
        a.center_distance(b)
    }
}

/// Symmetric cache key for an unordered pair of handle ids.
const fn pair_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}
