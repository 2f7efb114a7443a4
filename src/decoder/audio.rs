//! Background audio decoding

use std::ops::Deref;

use log::info;

use super::{BackgroundDecoder, DecodeLoop, open_stream};
use crate::config::DecoderConfig;
use crate::engine::{MediaEngine, StreamInfo};
use crate::error::Result;
use crate::media::{MediaKind, Timestamp};

type AudioLoop<E> = DecodeLoop<<E as MediaEngine>::Demuxer, <E as MediaEngine>::AudioCodec>;

/// Decodes the best audio stream of a source into a ring of
/// [`AudioFrame`](crate::media::AudioFrame)s of interleaved `f32` samples.
///
/// Dereferences to the underlying [`BackgroundDecoder`] for the consumer API.
pub struct AudioDecoder<E: MediaEngine> {
    inner: BackgroundDecoder<AudioLoop<E>>,
    info: StreamInfo,
}

impl<E: MediaEngine> AudioDecoder<E> {
    /// Open `url` and prepare the decoder. Call `start` to begin decoding.
    pub fn open(engine: &E, url: &str, config: DecoderConfig) -> Result<Self> {
        let demuxer = engine.open_stream(url)?;
        let opened = open_stream(demuxer, MediaKind::Audio, &config, |demuxer, stream| {
            engine.open_audio_decoder(demuxer, stream)
        })?;
        info!(
            "Opened audio stream {} of {}: {} Hz, {} channels",
            opened.info.index, url, opened.info.sample_rate, opened.info.channels
        );

        Ok(Self {
            inner: BackgroundDecoder::new(opened.producer, config).with_health(opened.health),
            info: opened.info,
        })
    }

    /// Jump to the nearest sync point at or before `timestamp`, discarding
    /// everything buffered so far.
    pub fn seek(&self, timestamp: Timestamp) -> Result<()> {
        self.inner.reposition(|producer| producer.seek(timestamp))
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.info.channels
    }
}

impl<E: MediaEngine> Deref for AudioDecoder<E> {
    type Target = BackgroundDecoder<AudioLoop<E>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
