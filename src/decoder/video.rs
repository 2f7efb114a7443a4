//! Background video decoding

use std::ops::Deref;

use log::info;

use super::{BackgroundDecoder, DecodeLoop, open_stream};
use crate::config::DecoderConfig;
use crate::engine::{MediaEngine, StreamInfo};
use crate::error::Result;
use crate::media::{MediaKind, PixelLayout, Timestamp, VideoFrame};
use crate::transform::{FrameConverter, FrameGeometry};

type VideoLoop<E> = DecodeLoop<<E as MediaEngine>::Demuxer, <E as MediaEngine>::VideoCodec>;

/// Decodes the best video stream of a source into a ring of [`VideoFrame`]s.
///
/// Dereferences to the underlying [`BackgroundDecoder`] for the consumer API.
pub struct VideoDecoder<E: MediaEngine> {
    inner: BackgroundDecoder<VideoLoop<E>>,
    info: StreamInfo,
}

impl<E: MediaEngine> VideoDecoder<E> {
    /// Open `url` and prepare the decoder. Call `start` to begin decoding.
    pub fn open(engine: &E, url: &str, config: DecoderConfig) -> Result<Self> {
        let demuxer = engine.open_stream(url)?;
        let opened = open_stream(demuxer, MediaKind::Video, &config, |demuxer, stream| {
            engine.open_video_decoder(demuxer, stream)
        })?;
        info!(
            "Opened video stream {} of {}: {}x{} {}",
            opened.info.index,
            url,
            opened.info.width,
            opened.info.height,
            opened.info.layout.map(|l| l.name()).unwrap_or("native")
        );

        Ok(Self {
            inner: BackgroundDecoder::new(opened.producer, config).with_health(opened.health),
            info: opened.info,
        })
    }

    /// Jump to the nearest keyframe at or before `timestamp`, discarding
    /// everything buffered so far.
    pub fn seek(&self, timestamp: Timestamp) -> Result<()> {
        self.inner.reposition(|producer| producer.seek(timestamp))
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    /// Shape of decoded frames, for building a [`FrameConverter`]. Streams
    /// whose native layout has no [`PixelLayout`] counterpart are delivered
    /// as RGBA.
    pub fn source_geometry(&self) -> FrameGeometry {
        FrameGeometry::new(
            self.info.width,
            self.info.height,
            self.info.layout.unwrap_or(PixelLayout::Rgba),
        )
    }

    /// Take the next buffered frame and run it through `converter`.
    pub fn next_frame_converted(&self, converter: &mut FrameConverter) -> Result<VideoFrame> {
        let frame = self.inner.next_item()?;
        Ok(converter.convert(&frame)?.into_owned())
    }
}

impl<E: MediaEngine> Deref for VideoDecoder<E> {
    type Target = BackgroundDecoder<VideoLoop<E>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::error::Error;
    use crate::transform::{ScaleMode, SoftwareScalerFactory};
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_decodes_video_stream_only() {
        let engine = MockEngine::new(3);
        let decoder = VideoDecoder::open(&engine, "mock://clip", DecoderConfig::default()).unwrap();
        assert_eq!(decoder.stream_info().index, 0);
        assert_eq!((decoder.width(), decoder.height()), (4, 2));
        decoder.start().unwrap();

        assert!(wait_for(|| !decoder.decoder_running()));
        let frames = decoder.next_items(10);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].pts, Timestamp::from_micros(2000));
        assert_eq!(frames[0].layout, PixelLayout::Rgba);
        assert!(matches!(decoder.next_item(), Err(Error::NoItemAvailable)));
    }

    #[test]
    fn test_next_frame_converted() {
        let engine = MockEngine::new(2);
        let decoder = VideoDecoder::open(&engine, "mock://clip", DecoderConfig::default()).unwrap();
        let mut converter = FrameConverter::new(
            decoder.source_geometry(),
            FrameGeometry::new(2, 1, PixelLayout::Rgb24),
            &SoftwareScalerFactory,
            ScaleMode::Point,
        )
        .unwrap();
        decoder.start().unwrap();
        assert!(wait_for(|| decoder.items_count() == 2));

        let first = decoder.next_frame_converted(&mut converter).unwrap();
        assert_eq!((first.width, first.height, first.layout), (2, 1, PixelLayout::Rgb24));
        assert_eq!(first.planes[0].data, vec![0; 6]);

        let second = decoder.next_frame_converted(&mut converter).unwrap();
        assert_eq!(second.pts, Timestamp::from_micros(1000));
        assert!(matches!(
            decoder.next_frame_converted(&mut converter),
            Err(Error::NoItemAvailable)
        ));
    }

    #[test]
    fn test_source_geometry_defaults_to_rgba() {
        let mut engine = MockEngine::new(1);
        engine.streams[0].layout = None;
        let decoder = VideoDecoder::open(&engine, "mock://clip", DecoderConfig::default()).unwrap();
        assert_eq!(
            decoder.source_geometry(),
            FrameGeometry::new(4, 2, PixelLayout::Rgba)
        );
    }

    #[test]
    fn test_missing_video_stream() {
        let mut engine = MockEngine::new(1);
        engine.streams.retain(|s| s.kind == MediaKind::Audio);
        let result = VideoDecoder::open(&engine, "mock://radio", DecoderConfig::default());
        assert!(matches!(result, Err(Error::NoStream(MediaKind::Video))));
    }

    #[test]
    fn test_seek_discards_buffered_frames() {
        let engine = MockEngine::endless();
        let config = DecoderConfig::default().with_buffer_size(4);
        let decoder = VideoDecoder::open(&engine, "mock://live", config).unwrap();
        decoder.start().unwrap();
        assert!(wait_for(|| decoder.buffer_full()));

        decoder.seek(Timestamp::from_micros(7_000)).unwrap();
        assert!(wait_for(|| decoder.items_available()));
        assert_eq!(decoder.next_item().unwrap().pts, Timestamp::from_micros(7_000));
        decoder.stop();
    }
}
