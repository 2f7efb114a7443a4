//! Frame transformation: geometry planning, cropping and scaling

pub mod crop;
pub mod geometry;
pub mod pipeline;
pub mod scaler;
pub mod software;

pub use geometry::{CropMargins, FrameGeometry};
pub use pipeline::{CANONICAL_LAYOUT, FrameConverter, StageKind};
pub use scaler::{ScaleMode, Scaler, ScalerFactory};
pub use software::{SoftwareScaler, SoftwareScalerFactory};
