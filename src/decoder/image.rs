//! Synchronous still-image decoding

use log::debug;

use super::{DecodeLoop, open_stream};
use crate::config::DecoderConfig;
use crate::engine::{MediaEngine, StreamInfo};
use crate::error::{Error, Result};
use crate::media::{MediaKind, VideoFrame};

/// Decodes the first frame of the best video stream of a source on the
/// calling thread. Meant for still images, where a background thread and a
/// ring would only add latency.
pub struct ImageDecoder<E: MediaEngine> {
    producer: DecodeLoop<E::Demuxer, E::VideoCodec>,
    info: StreamInfo,
}

impl<E: MediaEngine> ImageDecoder<E> {
    pub fn open(engine: &E, url: &str) -> Result<Self> {
        let demuxer = engine.open_stream(url)?;
        let opened = open_stream(
            demuxer,
            MediaKind::Video,
            &DecoderConfig::default(),
            |demuxer, stream| engine.open_video_decoder(demuxer, stream),
        )?;
        debug!(
            "Opened image {}: {}x{}",
            url, opened.info.width, opened.info.height
        );
        Ok(Self {
            producer: opened.producer,
            info: opened.info,
        })
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    /// Decode the first frame. Fails with [`Error::NoItemAvailable`] when the
    /// source ends before producing one.
    pub fn decode(mut self) -> Result<VideoFrame> {
        let mut frame = VideoFrame::default();
        if self.producer.decode_next(&mut frame)? {
            Ok(frame)
        } else {
            Err(Error::NoItemAvailable)
        }
    }
}

/// Open `url` and decode its first video frame.
pub fn decode_image<E: MediaEngine>(engine: &E, url: &str) -> Result<VideoFrame> {
    ImageDecoder::open(engine, url)?.decode()
}
