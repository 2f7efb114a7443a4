//! Media unit types: timestamps, decoded video frames and audio packets

pub mod frame;
pub mod types;

pub use frame::{AudioFrame, PixelLayout, Plane, VideoFrame};
pub use types::{MediaKind, Timestamp};
