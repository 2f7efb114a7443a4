//! Sub-rectangle extraction with per-row block copies

use super::geometry::{CropMargins, FrameGeometry};
use crate::error::{Error, Result};
use crate::media::frame::copy_rows;
use crate::media::{PixelLayout, VideoFrame};

/// Whether [`crop_into`] can cut `layout` directly. Subsampled chroma planes
/// need even margins.
pub fn supports(layout: PixelLayout, margins: &CropMargins) -> bool {
    layout.is_packed()
        || [margins.left, margins.right, margins.top, margins.bottom]
            .iter()
            .all(|m| m % 2 == 0)
}

/// Copy the part of `src` inside `margins` into `dst`, reshaping `dst` to the
/// cropped size in the source layout.
pub fn crop_into(src: &VideoFrame, margins: &CropMargins, dst: &mut VideoFrame) -> Result<()> {
    let geometry = FrameGeometry::of(src).with_crop(*margins);
    geometry.validate()?;
    if !supports(src.layout, margins) {
        return Err(Error::InvalidGeometry(format!(
            "{} needs even crop margins, got {:?}",
            src.layout, margins
        )));
    }
    if src.planes.len() != src.layout.plane_count() {
        return Err(Error::InvalidGeometry(format!(
            "{} frame with {} planes",
            src.layout,
            src.planes.len()
        )));
    }

    let (out_width, out_height) = (geometry.output_width(), geometry.output_height());
    dst.ensure_layout(out_width, out_height, src.layout);

    for (i, (from, to)) in src.planes.iter().zip(dst.planes.iter_mut()).enumerate() {
        let (x_offset, y_offset) =
            src.layout
                .plane_dims(i, margins.left as usize, margins.top as usize);
        let (row_bytes, rows) =
            src.layout
                .plane_dims(i, out_width as usize, out_height as usize);
        copy_rows(
            &mut to.data,
            to.stride,
            &from.data,
            from.stride,
            y_offset * from.stride + x_offset,
            row_bytes,
            rows,
        );
    }
    dst.pts = src.pts;
    Ok(())
}
