//! Scaling/format-conversion collaborator

use super::geometry::FrameGeometry;
use crate::error::Result;
use crate::media::VideoFrame;

/// Interpolation used when resizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScaleMode {
    Point,
    #[default]
    FastBilinear,
    Bilinear,
    Bicubic,
}

impl ScaleMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScaleMode::Point => "point",
            ScaleMode::FastBilinear => "fast-bilinear",
            ScaleMode::Bilinear => "bilinear",
            ScaleMode::Bicubic => "bicubic",
        }
    }
}

/// A prepared conversion between two fixed frame shapes.
pub trait Scaler: Send {
    /// Convert `src` into `dst`, reshaping `dst` as needed. Returns the number
    /// of output rows written.
    fn apply(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<u32>;
}

/// Builds [`Scaler`]s. Construction is the expensive part; the pipeline does
/// it once per converter.
pub trait ScalerFactory {
    /// Prepare a conversion from `src` to `dst` (crop margins are ignored).
    fn create(
        &self,
        src: &FrameGeometry,
        dst: &FrameGeometry,
        mode: ScaleMode,
    ) -> Result<Box<dyn Scaler>>;
}
