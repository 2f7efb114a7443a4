//! Codec engine backed by the system FFmpeg libraries through `ac-ffmpeg`.
//!
//! Sources are local files, given either as a path or as a `file://` URL.
//! Decoded pictures are copied out of FFmpeg's padded planes into the
//! crate's [`VideoFrame`]; pixel formats without a [`PixelLayout`]
//! counterpart are converted to RGBA first. Audio is converted to
//! interleaved `f32`.

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use ac_ffmpeg::codec::audio::{AudioDecoder, AudioFrame as FfAudioFrame};
use ac_ffmpeg::codec::video::frame::{PixelFormat, get_pixel_format};
use ac_ffmpeg::codec::video::scaler::{Algorithm, VideoFrameScaler};
use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame as FfVideoFrame, VideoFrameMut};
use ac_ffmpeg::codec::{AudioCodecParameters, CodecError, Decoder, VideoCodecParameters};
use ac_ffmpeg::format::demuxer::{Demuxer as FfDemuxer, DemuxerWithStreamInfo, SeekTarget};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::packet::Packet;
use ac_ffmpeg::time::{TimeBase, Timestamp as FfTimestamp};
use log::{debug, info};
use url::Url;

use super::{
    Codec, CodecInput, Demuxer, EncodedPacket, MediaEngine, ReceiveStatus, StreamInfo,
    SubmitStatus,
};
use crate::error::{EngineError, Error, Result};
use crate::media::frame::copy_rows;
use crate::media::{AudioFrame, MediaKind, PixelLayout, Timestamp, VideoFrame};
use crate::transform::{FrameGeometry, ScaleMode, Scaler, ScalerFactory};

type EngineResult<T> = std::result::Result<T, EngineError>;

/// `EIO`, used when the OS does not report an error number
const EIO: i32 = 5;

/// `ac-ffmpeg` keeps the `AVERROR` value private and only exposes its
/// `av_strerror` text, so library failures carry [`EngineError::UNKNOWN`]
/// with that text. Failures raised by the OS before FFmpeg is involved, such
/// as opening the source file, keep their errno (see `open_stream`).
fn engine_error(err: ac_ffmpeg::Error) -> EngineError {
    EngineError::unknown(err.to_string())
}

/// Same limitation as [`engine_error`]; `EAGAIN` is told apart with
/// `CodecError::is_again` before getting here.
fn codec_error(err: CodecError) -> EngineError {
    EngineError::unknown(err.to_string())
}

/// Local path behind `url`. Plain paths (including Windows drive paths) are
/// returned as they are.
fn resolve_path(url: &str) -> EngineResult<PathBuf> {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "file" => parsed
            .to_file_path()
            .map_err(|_| EngineError::new(-22, format!("{url}: not a local file URL"))),
        Ok(parsed) if parsed.scheme().len() > 1 => Err(EngineError::new(
            -22,
            format!("{url}: unsupported scheme {}", parsed.scheme()),
        )),
        _ => Ok(PathBuf::from(url)),
    }
}

fn to_timestamp(ts: FfTimestamp) -> Timestamp {
    ts.as_micros()
        .map(Timestamp::from_micros)
        .unwrap_or(Timestamp::ZERO)
}

/// Opens local media files with FFmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MediaEngine for FfmpegEngine {
    type Packet = FfmpegPacket;
    type Demuxer = FfmpegDemuxer;
    type AudioCodec = FfmpegAudioCodec;
    type VideoCodec = FfmpegVideoCodec;

    fn open_stream(&self, url: &str) -> EngineResult<FfmpegDemuxer> {
        let path = resolve_path(url)?;
        let file = File::open(&path).map_err(|e| {
            EngineError::new(-e.raw_os_error().unwrap_or(EIO), format!("{url}: {e}"))
        })?;

        let io = IO::from_seekable_read_stream(file);
        let demuxer = FfDemuxer::builder()
            .build(io)
            .map_err(engine_error)?
            .find_stream_info(None)
            .map_err(|(_, e)| engine_error(e))?;

        let mut streams = Vec::new();
        let mut time_bases = Vec::new();
        let mut video_params = Vec::new();
        let mut audio_params = Vec::new();
        for (index, stream) in demuxer.streams().iter().enumerate() {
            let params = stream.codec_parameters();
            let duration = stream
                .duration()
                .as_micros()
                .and_then(|us| u64::try_from(us).ok())
                .map(Duration::from_micros);
            let info = if let Some(video) = params.as_video_codec_parameters() {
                video_params.push((index, video.clone()));
                Some(StreamInfo::video(
                    index,
                    video.width() as u32,
                    video.height() as u32,
                    PixelLayout::from_name(video.pixel_format().name()),
                ))
            } else if let Some(audio) = params.as_audio_codec_parameters() {
                audio_params.push((index, audio.clone()));
                Some(StreamInfo::audio(
                    index,
                    audio.sample_rate(),
                    audio.channel_layout().channels() as u16,
                ))
            } else {
                None
            };
            if let Some(mut info) = info {
                info.duration = duration;
                streams.push(info);
            }
            time_bases.push((index, stream.time_base()));
        }
        info!("Opened {} with {} decodable streams", url, streams.len());

        Ok(FfmpegDemuxer {
            inner: demuxer,
            streams,
            time_bases,
            video_params,
            audio_params,
        })
    }

    fn open_audio_decoder(
        &self,
        demuxer: &FfmpegDemuxer,
        stream_index: usize,
    ) -> EngineResult<FfmpegAudioCodec> {
        let params = demuxer
            .audio_params
            .iter()
            .find(|(i, _)| *i == stream_index)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| EngineError::new(-22, format!("stream {stream_index} is not audio")))?;
        FfmpegAudioCodec::new(params, demuxer.time_base(stream_index))
    }

    fn open_video_decoder(
        &self,
        demuxer: &FfmpegDemuxer,
        stream_index: usize,
    ) -> EngineResult<FfmpegVideoCodec> {
        let params = demuxer
            .video_params
            .iter()
            .find(|(i, _)| *i == stream_index)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| EngineError::new(-22, format!("stream {stream_index} is not video")))?;
        FfmpegVideoCodec::new(params, demuxer.time_base(stream_index))
    }
}

pub struct FfmpegPacket(Packet);

unsafe impl Send for FfmpegPacket {}

impl EncodedPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.stream_index()
    }
}

pub struct FfmpegDemuxer {
    inner: DemuxerWithStreamInfo<File>,
    streams: Vec<StreamInfo>,
    time_bases: Vec<(usize, TimeBase)>,
    video_params: Vec<(usize, VideoCodecParameters)>,
    audio_params: Vec<(usize, AudioCodecParameters)>,
}

unsafe impl Send for FfmpegDemuxer {}

impl FfmpegDemuxer {
    fn time_base(&self, stream_index: usize) -> TimeBase {
        self.time_bases
            .iter()
            .find(|(i, _)| *i == stream_index)
            .map(|(_, tb)| *tb)
            .unwrap_or(TimeBase::MICROSECONDS)
    }
}

impl Demuxer for FfmpegDemuxer {
    type Packet = FfmpegPacket;

    /// Largest picture for video, most channels for audio; the lowest index
    /// wins ties.
    fn select_best_stream(&self, kind: MediaKind) -> Option<usize> {
        let score = |s: &StreamInfo| match kind {
            MediaKind::Video => s.width as u64 * s.height as u64,
            MediaKind::Audio => s.channels as u64,
        };
        self.streams
            .iter()
            .filter(|s| s.kind == kind)
            .fold(None, |best: Option<&StreamInfo>, s| match best {
                Some(b) if score(b) >= score(s) => Some(b),
                _ => Some(s),
            })
            .map(|s| s.index)
    }

    fn stream_info(&self, stream_index: usize) -> Option<StreamInfo> {
        self.streams.iter().find(|s| s.index == stream_index).cloned()
    }

    fn read_packet(&mut self) -> EngineResult<Option<FfmpegPacket>> {
        self.inner
            .take()
            .map(|packet| packet.map(FfmpegPacket))
            .map_err(engine_error)
    }

    fn seek(&mut self, _stream_index: usize, timestamp: Timestamp) -> EngineResult<()> {
        debug!("Seeking to {}", timestamp);
        self.inner
            .seek_to_timestamp(FfTimestamp::from_micros(timestamp.micros), SeekTarget::UpTo)
            .map_err(engine_error)
    }
}

/// Push a packet or the flush signal, mapping `EAGAIN` to
/// [`SubmitStatus::NeedsDrain`].
fn submit_to<D: Decoder>(
    decoder: &mut D,
    input: CodecInput<'_, FfmpegPacket>,
    flushed: &mut bool,
) -> EngineResult<SubmitStatus> {
    let result = match input {
        CodecInput::Packet(packet) => decoder.try_push(packet.0.clone()),
        CodecInput::Flush => decoder.try_flush().map(|()| *flushed = true),
    };
    match result {
        Ok(()) => Ok(SubmitStatus::Accepted),
        Err(e) if e.is_again() => Ok(SubmitStatus::NeedsDrain),
        Err(e) => Err(codec_error(e)),
    }
}

/// Nothing came out: either the flushed decoder is dry or it wants input.
fn empty_status(flushed: bool) -> ReceiveStatus {
    if flushed {
        ReceiveStatus::EndOfStream
    } else {
        ReceiveStatus::NeedsMoreInput
    }
}

pub struct FfmpegVideoCodec {
    decoder: VideoDecoder,
    params: VideoCodecParameters,
    time_base: TimeBase,
    flushed: bool,
    /// Converter for pixel formats without a native layout, keyed by source
    /// format and size
    to_rgba: Option<((PixelFormat, usize, usize), VideoFrameScaler)>,
}

unsafe impl Send for FfmpegVideoCodec {}

impl FfmpegVideoCodec {
    fn new(params: VideoCodecParameters, time_base: TimeBase) -> EngineResult<Self> {
        let decoder = Self::build(&params, time_base)?;
        Ok(Self {
            decoder,
            params,
            time_base,
            flushed: false,
            to_rgba: None,
        })
    }

    fn build(params: &VideoCodecParameters, time_base: TimeBase) -> EngineResult<VideoDecoder> {
        VideoDecoder::from_codec_parameters(params)
            .and_then(|builder| builder.time_base(time_base).build())
            .map_err(engine_error)
    }

    fn copy_out(&mut self, frame: FfVideoFrame, unit: &mut VideoFrame) -> EngineResult<()> {
        let pts = to_timestamp(frame.pts());
        let (frame, layout) = match PixelLayout::from_name(frame.pixel_format().name()) {
            Some(layout) => (frame, layout),
            None => (self.convert_to_rgba(&frame)?, PixelLayout::Rgba),
        };
        copy_from_ffmpeg(&frame, layout, unit);
        unit.pts = pts;
        Ok(())
    }

    fn convert_to_rgba(&mut self, frame: &FfVideoFrame) -> EngineResult<FfVideoFrame> {
        let key = (frame.pixel_format(), frame.width(), frame.height());
        let stale = !matches!(&self.to_rgba, Some((k, _)) if *k == key);
        if stale {
            debug!(
                "Converting {} frames to rgba",
                frame.pixel_format().name()
            );
            let scaler = VideoFrameScaler::builder()
                .source_pixel_format(key.0)
                .source_width(key.1)
                .source_height(key.2)
                .target_pixel_format(get_pixel_format(PixelLayout::Rgba.name()))
                .target_width(key.1)
                .target_height(key.2)
                .algorithm(Algorithm::Point)
                .build()
                .map_err(engine_error)?;
            self.to_rgba = Some((key, scaler));
        }
        match &mut self.to_rgba {
            Some((_, scaler)) => scaler.scale(frame).map_err(engine_error),
            None => Err(EngineError::unknown("rgba converter missing")),
        }
    }
}

impl Codec for FfmpegVideoCodec {
    type Packet = FfmpegPacket;
    type Unit = VideoFrame;

    fn submit(&mut self, input: CodecInput<'_, FfmpegPacket>) -> EngineResult<SubmitStatus> {
        submit_to(&mut self.decoder, input, &mut self.flushed)
    }

    fn receive(&mut self, unit: &mut VideoFrame) -> EngineResult<ReceiveStatus> {
        match self.decoder.take().map_err(engine_error)? {
            Some(frame) => {
                self.copy_out(frame, unit)?;
                Ok(ReceiveStatus::Unit)
            }
            None => Ok(empty_status(self.flushed)),
        }
    }

    fn reset(&mut self) -> EngineResult<()> {
        self.decoder = Self::build(&self.params, self.time_base)?;
        self.flushed = false;
        Ok(())
    }
}

pub struct FfmpegAudioCodec {
    decoder: AudioDecoder,
    params: AudioCodecParameters,
    time_base: TimeBase,
    flushed: bool,
}

unsafe impl Send for FfmpegAudioCodec {}

impl FfmpegAudioCodec {
    fn new(params: AudioCodecParameters, time_base: TimeBase) -> EngineResult<Self> {
        let decoder = Self::build(&params, time_base)?;
        Ok(Self {
            decoder,
            params,
            time_base,
            flushed: false,
        })
    }

    fn build(params: &AudioCodecParameters, time_base: TimeBase) -> EngineResult<AudioDecoder> {
        AudioDecoder::from_codec_parameters(params)
            .and_then(|builder| builder.time_base(time_base).build())
            .map_err(engine_error)
    }
}

impl Codec for FfmpegAudioCodec {
    type Packet = FfmpegPacket;
    type Unit = AudioFrame;

    fn submit(&mut self, input: CodecInput<'_, FfmpegPacket>) -> EngineResult<SubmitStatus> {
        submit_to(&mut self.decoder, input, &mut self.flushed)
    }

    fn receive(&mut self, unit: &mut AudioFrame) -> EngineResult<ReceiveStatus> {
        match self.decoder.take().map_err(engine_error)? {
            Some(frame) => {
                copy_audio(&frame, unit)?;
                Ok(ReceiveStatus::Unit)
            }
            None => Ok(empty_status(self.flushed)),
        }
    }

    fn reset(&mut self) -> EngineResult<()> {
        self.decoder = Self::build(&self.params, self.time_base)?;
        self.flushed = false;
        Ok(())
    }
}

/// Copy the visible part of every plane, dropping FFmpeg's row padding.
fn copy_from_ffmpeg(frame: &FfVideoFrame, layout: PixelLayout, unit: &mut VideoFrame) {
    let (width, height) = (frame.width(), frame.height());
    unit.ensure_layout(width as u32, height as u32, layout);
    let planes = frame.planes();
    for (i, dst) in unit.planes.iter_mut().enumerate() {
        let (row_bytes, rows) = layout.plane_dims(i, width, height);
        copy_rows(
            &mut dst.data,
            dst.stride,
            planes[i].data(),
            planes[i].line_size(),
            0,
            row_bytes,
            rows,
        );
    }
}

/// Sample encodings FFmpeg decoders produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleKind {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl SampleKind {
    /// Parse an FFmpeg sample format name; the flag tells whether it is planar.
    fn from_name(name: &str) -> Option<(Self, bool)> {
        let (base, planar) = match name.strip_suffix('p') {
            Some(base) => (base, true),
            None => (name, false),
        };
        let kind = match base {
            "u8" => SampleKind::U8,
            "s16" => SampleKind::S16,
            "s32" => SampleKind::S32,
            "flt" => SampleKind::F32,
            "dbl" => SampleKind::F64,
            _ => return None,
        };
        Some((kind, planar))
    }

    fn size(self) -> usize {
        match self {
            SampleKind::U8 => 1,
            SampleKind::S16 => 2,
            SampleKind::S32 | SampleKind::F32 => 4,
            SampleKind::F64 => 8,
        }
    }

    fn read(self, bytes: &[u8]) -> f32 {
        match self {
            SampleKind::U8 => (bytes[0] as f32 - 128.0) / 128.0,
            SampleKind::S16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            SampleKind::S32 => {
                i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2147483648.0
            }
            SampleKind::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            SampleKind::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                f64::from_ne_bytes(raw) as f32
            }
        }
    }
}

/// Write `samples` frames of `channels` channels as interleaved `f32`.
/// Planar input has one plane per channel, packed input a single plane.
fn interleave(
    planes: &[&[u8]],
    kind: SampleKind,
    planar: bool,
    channels: usize,
    samples: usize,
    out: &mut Vec<f32>,
) {
    let size = kind.size();
    out.clear();
    out.reserve(samples * channels);
    for s in 0..samples {
        for c in 0..channels {
            let (plane, offset) = if planar {
                (planes.get(c), s * size)
            } else {
                (planes.first(), (s * channels + c) * size)
            };
            let value = plane
                .and_then(|p| p.get(offset..offset + size))
                .map(|bytes| kind.read(bytes))
                .unwrap_or(0.0);
            out.push(value);
        }
    }
}

fn copy_audio(frame: &FfAudioFrame, unit: &mut AudioFrame) -> EngineResult<()> {
    let format = frame.sample_format().name();
    let (kind, planar) = SampleKind::from_name(format)
        .ok_or_else(|| EngineError::unknown(format!("unsupported sample format {format}")))?;
    let channels = frame.channel_layout().channels() as usize;
    let planes = frame.planes();
    let data: Vec<&[u8]> = planes.iter().map(|p| p.data()).collect();

    interleave(&data, kind, planar, channels, frame.samples(), &mut unit.samples);
    unit.channels = channels as u16;
    unit.sample_rate = frame.sample_rate();
    unit.pts = to_timestamp(frame.pts());
    Ok(())
}

fn algorithm(mode: ScaleMode) -> Algorithm {
    match mode {
        ScaleMode::Point => Algorithm::Point,
        ScaleMode::FastBilinear => Algorithm::FastBilinear,
        ScaleMode::Bilinear => Algorithm::Bilinear,
        ScaleMode::Bicubic => Algorithm::Bicubic,
    }
}

/// [`Scaler`] backed by libswscale.
pub struct FfmpegScaler {
    scaler: VideoFrameScaler,
    src: FrameGeometry,
    dst: FrameGeometry,
    src_format: PixelFormat,
}

unsafe impl Send for FfmpegScaler {}

impl Scaler for FfmpegScaler {
    fn apply(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> Result<u32> {
        if !self.src.matches(src) {
            return Err(Error::InvalidGeometry(format!(
                "scaler expects {}, got {}",
                self.src,
                FrameGeometry::of(src)
            )));
        }

        let mut input =
            VideoFrameMut::black(self.src_format, src.width as usize, src.height as usize);
        {
            let mut planes = input.planes_mut();
            for (i, from) in src.planes.iter().enumerate() {
                let (row_bytes, rows) =
                    src.layout
                        .plane_dims(i, src.width as usize, src.height as usize);
                let stride = planes[i].line_size();
                copy_rows(
                    planes[i].data_mut(),
                    stride,
                    &from.data,
                    from.stride,
                    0,
                    row_bytes,
                    rows,
                );
            }
        }

        let output = self
            .scaler
            .scale(&input.freeze())
            .map_err(|e| Error::Engine(engine_error(e)))?;
        copy_from_ffmpeg(&output, self.dst.layout, dst);
        dst.pts = src.pts;
        Ok(self.dst.height)
    }
}

/// Builds [`FfmpegScaler`]s for the frame converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegScalerFactory;

impl ScalerFactory for FfmpegScalerFactory {
    fn create(
        &self,
        src: &FrameGeometry,
        dst: &FrameGeometry,
        mode: ScaleMode,
    ) -> Result<Box<dyn Scaler>> {
        src.validate()?;
        dst.validate()?;
        let src_format = get_pixel_format(src.layout.name());
        let scaler = VideoFrameScaler::builder()
            .source_pixel_format(src_format)
            .source_width(src.width as usize)
            .source_height(src.height as usize)
            .target_pixel_format(get_pixel_format(dst.layout.name()))
            .target_width(dst.width as usize)
            .target_height(dst.height as usize)
            .algorithm(algorithm(mode))
            .build()
            .map_err(|_| Error::UnsupportedConversion {
                from: src.layout,
                to: dst.layout,
            })?;
        debug!("Created {} scaler {} -> {}", mode.name(), src, dst);

        Ok(Box::new(FfmpegScaler {
            scaler,
            src: FrameGeometry::new(src.width, src.height, src.layout),
            dst: FrameGeometry::new(dst.width, dst.height, dst.layout),
            src_format,
        }))
    }
}
