//! Frame geometry and aspect-fit planning

use crate::error::{Error, Result};
use crate::media::{PixelLayout, VideoFrame};

/// Pixels removed from each edge of a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CropMargins {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropMargins {
    pub const NONE: CropMargins = CropMargins {
        left: 0,
        right: 0,
        top: 0,
        bottom: 0,
    };

    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Cropping happens iff any margin is nonzero.
    pub fn is_active(&self) -> bool {
        self.left != 0 || self.right != 0 || self.top != 0 || self.bottom != 0
    }

    pub fn horizontal(&self) -> u32 {
        self.left.saturating_add(self.right)
    }

    pub fn vertical(&self) -> u32 {
        self.top.saturating_add(self.bottom)
    }
}

/// Size and layout of a frame, plus the margins to crop from it.
///
/// As a conversion target, `width` x `height` is the scaled size before
/// cropping and the output size is [`output_width`](Self::output_width) x
/// [`output_height`](Self::output_height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub crop: CropMargins,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            layout,
            crop: CropMargins::NONE,
        }
    }

    pub fn with_crop(mut self, crop: CropMargins) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Geometry of an existing frame (no crop).
    pub fn of(frame: &VideoFrame) -> Self {
        Self::new(frame.width, frame.height, frame.layout)
    }

    pub fn output_width(&self) -> u32 {
        self.width.saturating_sub(self.crop.horizontal())
    }

    pub fn output_height(&self) -> u32 {
        self.height.saturating_sub(self.crop.vertical())
    }

    /// Geometry left after cropping.
    pub fn output(&self) -> FrameGeometry {
        FrameGeometry::new(self.output_width(), self.output_height(), self.layout)
    }

    /// Same width, height and layout, ignoring crop.
    pub fn same_shape(&self, other: &FrameGeometry) -> bool {
        self.width == other.width && self.height == other.height && self.layout == other.layout
    }

    pub fn matches(&self, frame: &VideoFrame) -> bool {
        self.same_shape(&FrameGeometry::of(frame))
    }

    /// Reject empty frames and margins that leave nothing behind.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        if self.crop.horizontal() >= self.width || self.crop.vertical() >= self.height {
            return Err(Error::InvalidGeometry(format!(
                "crop {:?} leaves nothing of {}x{}",
                self.crop, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Plan a scale plus symmetric crop that brings a `src_width` x
    /// `src_height` frame to `target_aspect` without padding.
    ///
    /// Wider sources keep their height (clamped to the heights the width
    /// bounds allow) and lose width on the left and right; taller sources
    /// keep their width (clamped to `[min_width, max_width]`) and lose height
    /// at the top and bottom. An odd excess puts the extra pixel on the right
    /// or bottom.
    pub fn aspect_fit(
        src_width: u32,
        src_height: u32,
        target_aspect: f64,
        min_width: u32,
        max_width: u32,
        layout: PixelLayout,
    ) -> Result<Self> {
        if src_width == 0 || src_height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "empty source {}x{}",
                src_width, src_height
            )));
        }
        if !target_aspect.is_finite() || target_aspect <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "invalid aspect ratio {}",
                target_aspect
            )));
        }
        if min_width == 0 || min_width > max_width {
            return Err(Error::InvalidGeometry(format!(
                "invalid width bounds [{}, {}]",
                min_width, max_width
            )));
        }

        let src_aspect = src_width as f64 / src_height as f64;

        if src_aspect > target_aspect {
            let min_height = ((min_width as f64 / target_aspect).round() as u32).max(1);
            let max_height = ((max_width as f64 / target_aspect).round() as u32).max(min_height);
            let height = src_height.clamp(min_height, max_height);
            let width = (height as f64 * src_aspect).round() as u32;
            let kept = ((height as f64 * target_aspect).round() as u32).clamp(1, width);
            let excess = width - kept;
            let left = excess / 2;
            Ok(Self::new(width, height, layout).with_crop(CropMargins::new(
                left,
                excess - left,
                0,
                0,
            )))
        } else {
            let width = src_width.clamp(min_width, max_width);
            let height = ((width as f64 / src_aspect).round() as u32).max(1);
            let kept = ((width as f64 / target_aspect).round() as u32).clamp(1, height);
            let excess = height - kept;
            let top = excess / 2;
            Ok(Self::new(width, height, layout).with_crop(CropMargins::new(
                0,
                0,
                top,
                excess - top,
            )))
        }
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.layout)?;
        if self.crop.is_active() {
            write!(
                f,
                " crop l{} r{} t{} b{}",
                self.crop.left, self.crop.right, self.crop.top, self.crop.bottom
            )?;
        }
        Ok(())
    }
}
