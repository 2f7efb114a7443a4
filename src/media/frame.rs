//! Decoded media units
//!
//! Units are owned, reusable containers: the decode step refills an existing
//! unit in place, growing its buffers only when the stream geometry grows.

use smallvec::SmallVec;

use super::types::Timestamp;

/// Pixel layout of a decoded video frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// Planar Y, U, V with 2x2 chroma subsampling
    Yuv420p,
    /// Y plane followed by an interleaved UV plane
    Nv12,
    Rgb24,
    Bgr24,
    #[default]
    Rgba,
    Bgra,
    Gray8,
}

impl PixelLayout {
    /// FFmpeg pixel format name
    pub fn name(&self) -> &'static str {
        match self {
            PixelLayout::Yuv420p => "yuv420p",
            PixelLayout::Nv12 => "nv12",
            PixelLayout::Rgb24 => "rgb24",
            PixelLayout::Bgr24 => "bgr24",
            PixelLayout::Rgba => "rgba",
            PixelLayout::Bgra => "bgra",
            PixelLayout::Gray8 => "gray",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "yuv420p" | "yuvj420p" => Some(PixelLayout::Yuv420p),
            "nv12" => Some(PixelLayout::Nv12),
            "rgb24" => Some(PixelLayout::Rgb24),
            "bgr24" => Some(PixelLayout::Bgr24),
            "rgba" => Some(PixelLayout::Rgba),
            "bgra" => Some(PixelLayout::Bgra),
            "gray" | "gray8" => Some(PixelLayout::Gray8),
            _ => None,
        }
    }

    pub fn plane_count(&self) -> usize {
        match self {
            PixelLayout::Yuv420p => 3,
            PixelLayout::Nv12 => 2,
            _ => 1,
        }
    }

    /// Bytes per pixel for single-plane (packed) layouts, `None` for planar ones.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelLayout::Rgb24 | PixelLayout::Bgr24 => Some(3),
            PixelLayout::Rgba | PixelLayout::Bgra => Some(4),
            PixelLayout::Gray8 => Some(1),
            PixelLayout::Yuv420p | PixelLayout::Nv12 => None,
        }
    }

    pub fn is_packed(&self) -> bool {
        self.bytes_per_pixel().is_some()
    }

    /// Visible bytes per row and number of rows of `plane` for a frame of
    /// `width` x `height` pixels.
    pub fn plane_dims(&self, plane: usize, width: usize, height: usize) -> (usize, usize) {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        match (self, plane) {
            (PixelLayout::Yuv420p, 0) | (PixelLayout::Nv12, 0) => (width, height),
            (PixelLayout::Yuv420p, _) => (cw, ch),
            (PixelLayout::Nv12, _) => (cw * 2, ch),
            (packed, _) => (width * packed.bytes_per_pixel().unwrap_or(1), height),
        }
    }
}

impl std::fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One image plane with its row stride in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

/// Decoded raster image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub planes: SmallVec<[Plane; 4]>,
    pub pts: Timestamp,
}

impl VideoFrame {
    /// Allocate a zeroed frame with tightly packed rows.
    pub fn allocate(width: u32, height: u32, layout: PixelLayout) -> Self {
        let mut frame = VideoFrame::default();
        frame.ensure_layout(width, height, layout);
        frame
    }

    /// Reshape this frame for the given geometry, reusing existing plane
    /// allocations where possible. Pixel contents are unspecified afterwards.
    pub fn ensure_layout(&mut self, width: u32, height: u32, layout: PixelLayout) {
        self.width = width;
        self.height = height;
        self.layout = layout;
        self.planes.resize_with(layout.plane_count(), Plane::default);
        for (i, plane) in self.planes.iter_mut().enumerate() {
            let (row_bytes, rows) = layout.plane_dims(i, width as usize, height as usize);
            plane.stride = row_bytes;
            plane.data.resize(row_bytes * rows, 0);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.planes.is_empty()
    }

    /// Visible bytes of row `y` in `plane`.
    pub fn row(&self, plane: usize, y: usize) -> &[u8] {
        let (row_bytes, _) = self
            .layout
            .plane_dims(plane, self.width as usize, self.height as usize);
        let p = &self.planes[plane];
        &p.data[y * p.stride..y * p.stride + row_bytes]
    }

    /// Total bytes held by all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Decoded audio samples, interleaved `f32`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub pts: Timestamp,
}

impl AudioFrame {
    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Playback duration of this packet.
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(
            self.samples_per_channel() as f64 / self.sample_rate as f64,
        )
    }
}

/// Copy `rows` rows of `row_bytes` bytes from a strided source into a strided
/// destination, starting `src_offset` bytes into the source.
///
/// Fast path: both sides tightly packed -> single memcpy.
/// Fallback: row-by-row copy, stopping early on short buffers.
#[inline]
pub(crate) fn copy_rows(
    dst: &mut [u8],
    dst_stride: usize,
    src: &[u8],
    src_stride: usize,
    src_offset: usize,
    row_bytes: usize,
    rows: usize,
) {
    let total = row_bytes * rows;
    if src_stride == row_bytes
        && dst_stride == row_bytes
        && src.len() >= src_offset + total
        && dst.len() >= total
    {
        dst[..total].copy_from_slice(&src[src_offset..src_offset + total]);
        return;
    }

    for r in 0..rows {
        let src_start = src_offset + r * src_stride;
        let dst_start = r * dst_stride;
        if src_start + row_bytes > src.len() || dst_start + row_bytes > dst.len() {
            break;
        }
        dst[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }
}
