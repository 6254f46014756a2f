//! Per-pick and per-filament direction and orientation estimation.
//!
//! Orientations come from exactly one of two sources: a raster giving a
//! local direction estimate per pixel (degrees), or per-pick `"angle"`
//! metadata (radians). The enum makes the sources mutually exclusive by
//! construction; a pick neither source can answer for is fatal, because
//! the builder's angular filters are meaningless without a direction.

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::geometry::normalize;
use crate::types::{Filament, Pick, TraceError};

/// Window used for filament orientation and direction estimates.
pub const ORIENTATION_WINDOW: usize = 5;

/// Degrees-per-pixel raster on the picking image's pixel grid.
pub type OrientationRaster = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Where pick orientations come from.
#[derive(Debug, Clone)]
pub enum OrientationSource {
    /// Local direction estimate per pixel, in degrees.
    Raster(OrientationRaster),
    /// Per-pick `"angle"` metadata, in radians.
    PickAngle,
}

/// Serde proxy: `image::ImageBuffer` does not implement serde traits,
/// so the raster crosses serialization boundaries as its dimensions
/// plus raw samples.
#[derive(Serialize, Deserialize)]
enum OrientationSourceProxy {
    Raster {
        width: u32,
        height: u32,
        degrees: Vec<f32>,
    },
    PickAngle,
}

impl Serialize for OrientationSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::Raster(raster) => OrientationSourceProxy::Raster {
                width: raster.width(),
                height: raster.height(),
                degrees: raster.as_raw().clone(),
            },
            Self::PickAngle => OrientationSourceProxy::PickAngle,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OrientationSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = OrientationSourceProxy::deserialize(deserializer)?;
        Ok(match proxy {
            OrientationSourceProxy::Raster {
                width,
                height,
                degrees,
            } => Self::Raster(
                OrientationRaster::from_raw(width, height, degrees)
                    .ok_or_else(|| serde::de::Error::custom("invalid raster dimensions"))?,
            ),
            OrientationSourceProxy::PickAngle => Self::PickAngle,
        })
    }
}

/// Resolves orientations for picks and filaments against one source.
#[derive(Debug, Clone, Copy)]
pub struct OrientationOracle<'a> {
    source: &'a OrientationSource,
}

impl<'a> OrientationOracle<'a> {
    /// Create an oracle over the given source.
    #[must_use]
    pub const fn new(source: &'a OrientationSource) -> Self {
        Self { source }
    }

    /// Orientation of a single pick, in degrees normalized to [0, 360).
    ///
    /// Raster lookups clamp the pick center to the image bounds before
    /// sampling.
    ///
    /// # Errors
    ///
    /// [`TraceError::MissingOrientation`] when the raster is empty or,
    /// for the metadata source, the pick carries no `"angle"`.
    pub fn pick_orientation(&self, pick: &Pick) -> Result<f64, TraceError> {
        match self.source {
            OrientationSource::Raster(raster) => {
                let (width, height) = raster.dimensions();
                if width == 0 || height == 0 {
                    return Err(TraceError::MissingOrientation {
                        x: pick.x,
                        y: pick.y,
                    });
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let column = pick.x.clamp(0.0, f64::from(width - 1)) as u32;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let row = pick.y.clamp(0.0, f64::from(height - 1)) as u32;
                let sample = raster.get_pixel(column, row).0[0];
                Ok(f64::from(sample).rem_euclid(360.0))
            }
            OrientationSource::PickAngle => pick
                .angle()
                .map(|radians| radians.to_degrees().rem_euclid(360.0))
                .ok_or(TraceError::MissingOrientation {
                    x: pick.x,
                    y: pick.y,
                }),
        }
    }

    /// Mean pick orientation over the trailing `window`, excluding the
    /// first pick of that window, i.e. over (window - 1) samples.
    ///
    /// Returns `Ok(None)` when no samples exist (empty filament, or a
    /// single pick whose one-element window has nothing after its head).
    ///
    /// # Errors
    ///
    /// Propagates [`TraceError::MissingOrientation`] from any sampled
    /// pick.
    pub fn filament_orientation(
        &self,
        filament: &Filament,
        window: usize,
    ) -> Result<Option<f64>, TraceError> {
        self.orientation_of(filament.picks(), window)
    }

    /// [`Self::filament_orientation`] over a raw pick run.
    pub(crate) fn orientation_of(
        &self,
        picks: &[Pick],
        window: usize,
    ) -> Result<Option<f64>, TraceError> {
        if picks.is_empty() {
            return Ok(None);
        }
        let tail = &picks[picks.len().saturating_sub(window)..];
        let samples = &tail[1..];
        if samples.is_empty() {
            return Ok(None);
        }
        let mut sum = 0.0;
        for pick in samples {
            sum += self.pick_orientation(pick)?;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = samples.len() as f64;
        Ok(Some(sum / count))
    }
}

/// Mean normalized consecutive-displacement direction over the trailing
/// (or, with `from_head`, leading) `window` picks.
///
/// `None` for fewer than 2 picks. Each displacement norm gets a small
/// epsilon before dividing, so coincident picks contribute a zero
/// vector instead of NaN.
#[must_use]
pub fn filament_direction(filament: &Filament, window: usize, from_head: bool) -> Option<Coord<f64>> {
    let picks = filament.picks();
    let span = window.min(picks.len());
    let slice = if from_head {
        &picks[..span]
    } else {
        &picks[picks.len() - span..]
    };
    direction_of(slice)
}

/// Mean normalized consecutive-displacement direction of a pick run.
pub(crate) fn direction_of(picks: &[Pick]) -> Option<Coord<f64>> {
    if picks.len() < 2 {
        return None;
    }
    let mut sum = Coord { x: 0.0, y: 0.0 };
    for pair in picks.windows(2) {
        let step = normalize(pair[0].displacement_to(&pair[1]));
        sum = Coord {
            x: sum.x + step.x,
            y: sum.y + step.y,
        };
    }
    #[allow(clippy::cast_precision_loss)]
    let count = (picks.len() - 1) as f64;
    Some(Coord {
        x: sum.x / count,
        y: sum.y / count,
    })
}
