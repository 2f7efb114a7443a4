//! Buffered background decoding of audio, video and still images.
//!
//! A [`BackgroundDecoder`] keeps a bounded ring of decoded units filled by a
//! producer thread so consumers read at their own pace. [`DecodeLoop`]
//! drives a codec engine through the submit/receive protocol, and
//! [`FrameConverter`] adapts decoded pictures to a target size, crop and
//! pixel layout.

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod media;
pub mod transform;

pub use buffer::{AnyRing, FastRingBuffer, RingBuffer, SlotRing};
pub use config::DecoderConfig;
pub use decoder::{
    AudioDecoder, BackgroundDecoder, DecodeLoop, DecoderHealth, DecoderState, ImageDecoder,
    UnitProducer, VideoDecoder, decode_image,
};
pub use error::{EngineError, Error, Result};
pub use media::{AudioFrame, MediaKind, PixelLayout, Timestamp, VideoFrame};
pub use transform::{CropMargins, FrameConverter, FrameGeometry, ScaleMode};
