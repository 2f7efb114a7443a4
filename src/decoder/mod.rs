//! Buffered background decoding
//!
//! [`BackgroundDecoder`] owns a ring of decoded units and a producer thread;
//! [`DecodeLoop`] is the producer that drives a codec engine. The concrete
//! [`AudioDecoder`], [`VideoDecoder`] and [`ImageDecoder`] wire the two to a
//! [`MediaEngine`](crate::engine::MediaEngine) source.

pub mod audio;
pub mod background;
pub mod decode_loop;
pub mod health;
pub mod image;
pub mod state;
pub mod video;

use std::sync::Arc;

pub use audio::AudioDecoder;
pub use background::{BackgroundDecoder, UnitProducer};
pub use decode_loop::DecodeLoop;
pub use health::{DecoderHealth, HealthSummary};
pub use image::{ImageDecoder, decode_image};
pub use state::DecoderState;
pub use video::VideoDecoder;

use crate::config::DecoderConfig;
use crate::engine::{Codec, Demuxer, StreamInfo};
use crate::error::{EngineError, Error, Result};
use crate::media::MediaKind;

/// Producer for one stream of an opened source, with the health instance it
/// reports to.
pub(crate) struct OpenedStream<D, C>
where
    D: Demuxer,
    C: Codec<Packet = D::Packet>,
{
    pub producer: DecodeLoop<D, C>,
    pub info: StreamInfo,
    pub health: Arc<DecoderHealth>,
}

/// Select the best stream of `kind` and open a codec for it.
pub(crate) fn open_stream<D, C>(
    demuxer: D,
    kind: MediaKind,
    config: &DecoderConfig,
    open_codec: impl FnOnce(&D, usize) -> std::result::Result<C, EngineError>,
) -> Result<OpenedStream<D, C>>
where
    D: Demuxer,
    C: Codec<Packet = D::Packet>,
{
    let stream_index = demuxer
        .select_best_stream(kind)
        .ok_or(Error::NoStream(kind))?;
    let info = demuxer
        .stream_info(stream_index)
        .ok_or(Error::NoStream(kind))?;
    let codec = open_codec(&demuxer, stream_index)?;

    let health = Arc::new(DecoderHealth::new());
    let producer = DecodeLoop::new(demuxer, codec, stream_index)
        .with_health(Arc::clone(&health))
        .with_max_consecutive_rejections(config.max_consecutive_rejections);

    Ok(OpenedStream {
        producer,
        info,
        health,
    })
}
