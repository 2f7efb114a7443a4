//! Three-stage frame converter: normalize, crop, finalize
//!
//! Stages are chosen once, when the converter is built, by comparing the
//! source shape with the target:
//!
//! - **Normalize** rescales the source to the target's pre-crop size in the
//!   working layout. Only needed when cropping and the source is not already
//!   in that shape.
//! - **Crop** cuts the margins out with row copies.
//! - **Finalize** converts to the target layout, or, when nothing is cropped,
//!   rescales the source straight to the target.
//!
//! The working layout is the target layout when the crop can operate on it
//! directly, and [`CANONICAL_LAYOUT`] otherwise.

use std::borrow::Cow;

use log::debug;

use super::crop::{crop_into, supports};
use super::geometry::{CropMargins, FrameGeometry};
use super::scaler::{ScaleMode, Scaler, ScalerFactory};
use crate::error::{Error, Result};
use crate::media::{PixelLayout, VideoFrame};

/// Intermediate layout used when the target layout cannot be cropped directly
pub const CANONICAL_LAYOUT: PixelLayout = PixelLayout::Rgba;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Normalize,
    Crop,
    Finalize,
}

pub struct FrameConverter {
    source: FrameGeometry,
    target: FrameGeometry,
    normalize: Option<Box<dyn Scaler>>,
    crop: Option<CropMargins>,
    finalize: Option<Box<dyn Scaler>>,
    /// Reused between calls when a later stage follows
    normalized: VideoFrame,
    cropped: VideoFrame,
    closed: bool,
}

impl FrameConverter {
    /// Plan the stages converting frames shaped like `source` into `target`
    /// and build the scalers they need.
    pub fn new(
        source: FrameGeometry,
        target: FrameGeometry,
        factory: &dyn ScalerFactory,
        mode: ScaleMode,
    ) -> Result<Self> {
        let source = FrameGeometry::new(source.width, source.height, source.layout);
        source.validate()?;
        target.validate()?;

        let mut normalize = None;
        let mut crop = None;
        let mut finalize = None;

        if target.crop.is_active() {
            let working = if supports(target.layout, &target.crop) {
                target.layout
            } else {
                CANONICAL_LAYOUT
            };
            let scaled = target.with_crop(CropMargins::NONE).with_layout(working);
            if !source.same_shape(&scaled) {
                normalize = Some(factory.create(&source, &scaled, mode)?);
            }
            crop = Some(target.crop);
            if working != target.layout {
                let cropped = scaled.with_crop(target.crop).output();
                finalize = Some(factory.create(&cropped, &target.output(), mode)?);
            }
        } else if !source.same_shape(&target) {
            finalize = Some(factory.create(&source, &target, mode)?);
        }

        let converter = Self {
            source,
            target,
            normalize,
            crop,
            finalize,
            normalized: VideoFrame::default(),
            cropped: VideoFrame::default(),
            closed: false,
        };
        debug!(
            "Frame converter {} -> {}: stages {:?}",
            converter.source,
            converter.target,
            converter.stages()
        );
        Ok(converter)
    }

    /// Converter that crops and scales `source` to `target_aspect` within
    /// `[min_width, max_width]`, see [`FrameGeometry::aspect_fit`].
    pub fn aspect_fit(
        source: FrameGeometry,
        target_aspect: f64,
        min_width: u32,
        max_width: u32,
        layout: PixelLayout,
        factory: &dyn ScalerFactory,
        mode: ScaleMode,
    ) -> Result<Self> {
        let target = FrameGeometry::aspect_fit(
            source.width,
            source.height,
            target_aspect,
            min_width,
            max_width,
            layout,
        )?;
        Self::new(source, target, factory, mode)
    }

    pub fn stages(&self) -> Vec<StageKind> {
        let mut stages = Vec::with_capacity(3);
        if self.normalize.is_some() {
            stages.push(StageKind::Normalize);
        }
        if self.crop.is_some() {
            stages.push(StageKind::Crop);
        }
        if self.finalize.is_some() {
            stages.push(StageKind::Finalize);
        }
        stages
    }

    /// True when frames pass through untouched.
    pub fn is_noop(&self) -> bool {
        self.normalize.is_none() && self.crop.is_none() && self.finalize.is_none()
    }

    pub fn source(&self) -> &FrameGeometry {
        &self.source
    }

    pub fn target(&self) -> &FrameGeometry {
        &self.target
    }

    /// Shape of converted frames.
    pub fn output_geometry(&self) -> FrameGeometry {
        self.target.output()
    }

    /// Convert one frame. A no-op converter hands the input back borrowed.
    pub fn convert<'a>(&mut self, frame: &'a VideoFrame) -> Result<Cow<'a, VideoFrame>> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.source.matches(frame) {
            return Err(Error::InvalidGeometry(format!(
                "converter built for {}, got {}",
                self.source,
                FrameGeometry::of(frame)
            )));
        }
        if self.is_noop() {
            return Ok(Cow::Borrowed(frame));
        }

        let Self {
            normalize,
            crop,
            finalize,
            normalized,
            cropped,
            ..
        } = self;

        let mut current: &VideoFrame = frame;
        if let Some(scaler) = normalize {
            scaler.apply(current, normalized)?;
            normalized.pts = frame.pts;
            current = &*normalized;
        }

        if let Some(margins) = crop {
            if finalize.is_none() {
                let mut out = VideoFrame::default();
                crop_into(current, margins, &mut out)?;
                out.pts = frame.pts;
                return Ok(Cow::Owned(out));
            }
            crop_into(current, margins, cropped)?;
            current = &*cropped;
        }

        let mut out = VideoFrame::default();
        if let Some(scaler) = finalize {
            scaler.apply(current, &mut out)?;
        }
        out.pts = frame.pts;
        Ok(Cow::Owned(out))
    }

    /// Release scalers and intermediate buffers. Later calls are no-ops and
    /// `convert` fails with [`Error::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.normalize = None;
        self.finalize = None;
        self.crop = None;
        self.normalized = VideoFrame::default();
        self.cropped = VideoFrame::default();
        debug!("Frame converter {} -> {} closed", self.source, self.target);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FrameConverter {
    fn drop(&mut self) {
        self.close();
    }
}
