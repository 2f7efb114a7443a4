//! Codec engine collaborator
//!
//! The decoding framework never talks to a native library directly. It drives
//! these narrow traits instead: a [`MediaEngine`] opens sources, a
//! [`Demuxer`] yields encoded packets, and a [`Codec`] turns packets into
//! decoded units through a submit/receive protocol.
//!
//! With the `ffmpeg` feature, [`ffmpeg::FfmpegEngine`] implements them on top
//! of the system FFmpeg libraries.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::EngineError;
use crate::media::{AudioFrame, MediaKind, PixelLayout, Timestamp, VideoFrame};

/// Compressed input chunk read from a source.
pub trait EncodedPacket: Send {
    /// Index of the stream this packet belongs to.
    fn stream_index(&self) -> usize;
}

/// Input handed to [`Codec::submit`].
#[derive(Debug)]
pub enum CodecInput<'a, P> {
    /// An encoded packet of the selected stream
    Packet(&'a P),
    /// End-of-input signal; the codec must drain what it still buffers
    Flush,
}

/// Outcome of a successful [`Codec::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// The input was consumed
    Accepted,
    /// The codec is full; decoded output must be received before this input
    /// can be accepted
    NeedsDrain,
}

/// Outcome of a successful [`Codec::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The unit was filled with decoded output
    Unit,
    /// The codec needs more input before it can output anything
    NeedsMoreInput,
    /// The codec was flushed and fully drained
    EndOfStream,
}

/// Static description of one stream of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
    pub layout: Option<PixelLayout>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Option<Duration>,
}

impl StreamInfo {
    pub fn video(index: usize, width: u32, height: u32, layout: Option<PixelLayout>) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            width,
            height,
            layout,
            sample_rate: 0,
            channels: 0,
            duration: None,
        }
    }

    pub fn audio(index: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            width: 0,
            height: 0,
            layout: None,
            sample_rate,
            channels,
            duration: None,
        }
    }
}

/// An opened, probed media source.
pub trait Demuxer: Send {
    type Packet: EncodedPacket;

    /// Choose the stream to decode for `kind`, if the source has one.
    fn select_best_stream(&self, kind: MediaKind) -> Option<usize>;

    fn stream_info(&self, stream_index: usize) -> Option<StreamInfo>;

    /// Next encoded packet, `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, EngineError>;

    /// Coarse seek to the nearest sync point at or before `timestamp`.
    fn seek(&mut self, stream_index: usize, timestamp: Timestamp) -> Result<(), EngineError>;
}

/// A stateful decoder for one stream.
pub trait Codec: Send {
    type Packet: EncodedPacket;
    type Unit: Default + Send + Sync + 'static;

    fn submit(&mut self, input: CodecInput<'_, Self::Packet>) -> Result<SubmitStatus, EngineError>;

    /// Decode into `unit` in place, reusing its buffers.
    fn receive(&mut self, unit: &mut Self::Unit) -> Result<ReceiveStatus, EngineError>;

    /// Discard all buffered state (after a seek or a drained flush).
    fn reset(&mut self) -> Result<(), EngineError>;
}

/// Factory for sources and the codecs that decode them.
pub trait MediaEngine {
    type Packet: EncodedPacket + 'static;
    type Demuxer: Demuxer<Packet = Self::Packet> + 'static;
    type AudioCodec: Codec<Packet = Self::Packet, Unit = AudioFrame> + 'static;
    type VideoCodec: Codec<Packet = Self::Packet, Unit = VideoFrame> + 'static;

    /// Open and probe the source at `url`.
    fn open_stream(&self, url: &str) -> Result<Self::Demuxer, EngineError>;

    fn open_audio_decoder(
        &self,
        demuxer: &Self::Demuxer,
        stream_index: usize,
    ) -> Result<Self::AudioCodec, EngineError>;

    fn open_video_decoder(
        &self,
        demuxer: &Self::Demuxer,
        stream_index: usize,
    ) -> Result<Self::VideoCodec, EngineError>;
}
