//! Seam for the external along-polyline resampler.

use crate::types::Filament;

/// Re-distributes a filament's picks at a fixed spacing along its
/// polyline.
///
/// Implemented outside this crate; the pipeline invokes it between
/// smoothing and de-duplication, and only when
/// [`TraceConfig::box_distance`](crate::TraceConfig::box_distance) is
/// set and a resampler was supplied to the trace call.
pub trait Resampler {
    /// Resample `filament` so consecutive picks sit `box_distance`
    /// pixels apart along the polyline.
    fn resample(&self, filament: &Filament, box_distance: f64) -> Filament;
}
