//! Pure Rust nearest-neighbour scaler
//!
//! Reads any supported layout (packed RGB variants, gray, and YUV 4:2:0
//! through a BT.601 fixed-point conversion) and writes packed layouts.
//! Planar output is left to the native scaler.

use super::geometry::FrameGeometry;
use super::scaler::{ScaleMode, Scaler, ScalerFactory};
use crate::error::{Error, Result};
use crate::media::{PixelLayout, VideoFrame};

// BT.601 limited range, 8 bits of fractional precision
//   R = 1.164 * (Y - 16) + 1.596 * (V - 128)
//   G = 1.164 * (Y - 16) - 0.392 * (U - 128) - 0.813 * (V - 128)
//   B = 1.164 * (Y - 16) + 2.017 * (U - 128)
const Y_SCALE: i32 = 298;
const V_TO_R: i32 = 409;
const U_TO_G: i32 = 100;
const V_TO_G: i32 = 208;
const U_TO_B: i32 = 516;

#[inline(always)]
fn clamp_u8(val: i32) -> u8 {
    val.clamp(0, 255) as u8
}

#[inline]
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = Y_SCALE * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((c + V_TO_R * e + 128) >> 8),
        clamp_u8((c - U_TO_G * d - V_TO_G * e + 128) >> 8),
        clamp_u8((c + U_TO_B * d + 128) >> 8),
        255,
    ]
}

#[inline]
fn luma(rgba: [u8; 4]) -> u8 {
    ((77 * rgba[0] as u32 + 150 * rgba[1] as u32 + 29 * rgba[2] as u32) >> 8) as u8
}

/// Pixel at (`x`, `y`) of `frame` as RGBA.
fn read_pixel(frame: &VideoFrame, x: usize, y: usize) -> [u8; 4] {
    let planes = &frame.planes;
    match frame.layout {
        PixelLayout::Yuv420p => {
            let y_val = planes[0].data[y * planes[0].stride + x];
            let u = planes[1].data[(y / 2) * planes[1].stride + x / 2];
            let v = planes[2].data[(y / 2) * planes[2].stride + x / 2];
            yuv_to_rgba(y_val, u, v)
        }
        PixelLayout::Nv12 => {
            let y_val = planes[0].data[y * planes[0].stride + x];
            let uv = (y / 2) * planes[1].stride + (x / 2) * 2;
            yuv_to_rgba(y_val, planes[1].data[uv], planes[1].data[uv + 1])
        }
        layout => {
            let bpp = layout.bytes_per_pixel().unwrap_or(4);
            let i = y * planes[0].stride + x * bpp;
            let px = &planes[0].data[i..i + bpp];
            match layout {
                PixelLayout::Rgb24 => [px[0], px[1], px[2], 255],
                PixelLayout::Bgr24 => [px[2], px[1], px[0], 255],
                PixelLayout::Bgra => [px[2], px[1], px[0], px[3]],
                PixelLayout::Gray8 => [px[0], px[0], px[0], 255],
                _ => [px[0], px[1], px[2], px[3]],
            }
        }
    }
}

fn write_pixel(layout: PixelLayout, rgba: [u8; 4], out: &mut [u8]) {
    match layout {
        PixelLayout::Rgb24 => out.copy_from_slice(&rgba[..3]),
        PixelLayout::Bgr24 => out.copy_from_slice(&[rgba[2], rgba[1], rgba[0]]),
        PixelLayout::Bgra => out.copy_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]),
        PixelLayout::Gray8 => out[0] = luma(rgba),
        _ => out.copy_from_slice(&rgba),
    }
}

/// Nearest-neighbour scaler between two fixed shapes.
pub struct SoftwareScaler {
    src: FrameGeometry,
    dst: FrameGeometry,
    /// Source column for every output column
    x_map: Vec<usize>,
    /// Source row for every output row
    y_map: Vec<usize>,
}

impl SoftwareScaler {
    pub fn new(src: &FrameGeometry, dst: &FrameGeometry) -> Result<Self> {
        src.validate()?;
        dst.validate()?;
        if !dst.layout.is_packed() {
            return Err(Error::UnsupportedConversion {
                from: src.layout,
                to: dst.layout,
            });
        }
        let map = |src_len: u32, dst_len: u32| -> Vec<usize> {
            (0..dst_len as u64)
                .map(|i| ((i * src_len as u64) / dst_len as u64) as usize)
                .collect()
        };
        Ok(Self {
            x_map: map(src.width, dst.width),
            y_map: map(src.height, dst.height),
            src: FrameGeometry::new(src.width, src.height, src.layout),
            dst: FrameGeometry::new(dst.width, dst.height, dst.layout),
        })
    }
}

impl Scaler for SoftwareScaler {
    fn apply(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<u32> {
        if !self.src.matches(src) {
            return Err(Error::InvalidGeometry(format!(
                "scaler expects {}, got {}",
                self.src,
                FrameGeometry::of(src)
            )));
        }
        dst.ensure_layout(self.dst.width, self.dst.height, self.dst.layout);
        let bpp = self.dst.layout.bytes_per_pixel().unwrap_or(4);
        let stride = dst.planes[0].stride;
        let out = &mut dst.planes[0].data;

        for (dy, &sy) in self.y_map.iter().enumerate() {
            let row = &mut out[dy * stride..dy * stride + self.x_map.len() * bpp];
            for (px, &sx) in row.chunks_exact_mut(bpp).zip(&self.x_map) {
                write_pixel(self.dst.layout, read_pixel(src, sx, sy), px);
            }
        }
        dst.pts = src.pts;
        Ok(self.dst.height)
    }
}

/// Factory producing [`SoftwareScaler`]s; every [`ScaleMode`] maps to
/// nearest-neighbour.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareScalerFactory;

impl ScalerFactory for SoftwareScalerFactory {
    fn create(
        &self,
        src: &FrameGeometry,
        dst: &FrameGeometry,
        _mode: ScaleMode,
    ) -> Result<Box<dyn Scaler>> {
        Ok(Box::new(SoftwareScaler::new(src, dst)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_frame(width: u32, height: u32, pixels: &[[u8; 4]]) -> VideoFrame {
        let mut frame = VideoFrame::allocate(width, height, PixelLayout::Rgba);
        for (dst, px) in frame.planes[0].data.chunks_exact_mut(4).zip(pixels) {
            dst.copy_from_slice(px);
        }
        frame
    }

    #[test]
    fn test_downscale_picks_nearest() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        // 4x2: left half red, right half blue
        let src = rgba_frame(4, 2, &[red, red, blue, blue, red, red, blue, blue]);
        let mut scaler = SoftwareScaler::new(
            &FrameGeometry::of(&src),
            &FrameGeometry::new(2, 1, PixelLayout::Rgba),
        )
        .unwrap();
        let mut dst = VideoFrame::default();

        assert_eq!(scaler.apply(&src, &mut dst).unwrap(), 1);
        assert_eq!(dst.planes[0].data, [red, blue].concat());
    }

    #[test]
    fn test_layout_conversions() {
        let src = rgba_frame(1, 1, &[[10, 20, 30, 40]]);
        let convert = |layout: PixelLayout| {
            let mut scaler = SoftwareScaler::new(
                &FrameGeometry::of(&src),
                &FrameGeometry::new(1, 1, layout),
            )
            .unwrap();
            let mut dst = VideoFrame::default();
            scaler.apply(&src, &mut dst).unwrap();
            dst.planes[0].data.clone()
        };

        assert_eq!(convert(PixelLayout::Rgb24), vec![10, 20, 30]);
        assert_eq!(convert(PixelLayout::Bgr24), vec![30, 20, 10]);
        assert_eq!(convert(PixelLayout::Bgra), vec![30, 20, 10, 40]);
        assert_eq!(convert(PixelLayout::Gray8), vec![18]);
    }

    #[test]
    fn test_yuv_gray_maps_to_gray() {
        let mut src = VideoFrame::allocate(2, 2, PixelLayout::Yuv420p);
        src.planes[0].data.fill(235);
        src.planes[1].data.fill(128);
        src.planes[2].data.fill(128);
        let mut scaler = SoftwareScaler::new(
            &FrameGeometry::of(&src),
            &FrameGeometry::new(2, 2, PixelLayout::Rgba),
        )
        .unwrap();
        let mut dst = VideoFrame::default();
        scaler.apply(&src, &mut dst).unwrap();
        assert!(dst.planes[0].data.chunks(4).all(|px| px == [255, 255, 255, 255]));
    }

    #[test]
    fn test_planar_output_unsupported() {
        let err = SoftwareScaler::new(
            &FrameGeometry::new(2, 2, PixelLayout::Rgba),
            &FrameGeometry::new(2, 2, PixelLayout::Yuv420p),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::UnsupportedConversion { .. }));
    }

    #[test]
    fn test_rejects_mismatched_source() {
        let mut scaler = SoftwareScaler::new(
            &FrameGeometry::new(4, 4, PixelLayout::Rgba),
            &FrameGeometry::new(2, 2, PixelLayout::Rgba),
        )
        .unwrap();
        let src = VideoFrame::allocate(3, 3, PixelLayout::Rgba);
        let mut dst = VideoFrame::default();
        assert!(matches!(
            scaler.apply(&src, &mut dst),
            Err(Error::InvalidGeometry(_))
        ));
    }
}
