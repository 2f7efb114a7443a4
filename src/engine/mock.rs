//! Scripted in-memory codec engine for tests

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    Codec, CodecInput, Demuxer, EncodedPacket, MediaEngine, ReceiveStatus, StreamInfo,
    SubmitStatus,
};
use crate::error::EngineError;
use crate::media::{AudioFrame, MediaKind, PixelLayout, Timestamp, VideoFrame};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockPacket {
    pub stream: usize,
    pub pts: i64,
}

impl EncodedPacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream
    }
}

/// Scripted result of one `read_packet` call
#[derive(Debug, Clone)]
pub(crate) enum Read {
    Packet(MockPacket),
    Eos,
    Err(i32),
}

/// Scripted result of one `receive` call
#[derive(Debug, Clone)]
pub(crate) enum Recv {
    Unit(i64),
    NeedMore,
    Eos,
    Err(i32),
}

/// Everything the engine was asked to do
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub reads: usize,
    pub submitted: Vec<i64>,
    pub flushes: usize,
    pub receives: usize,
    pub seeks: Vec<Timestamp>,
    pub resets: usize,
}

pub(crate) type SharedLog = Arc<Mutex<MockLog>>;

pub(crate) struct MockDemuxer {
    script: VecDeque<Read>,
    /// Generates packets forever once the script is exhausted
    endless: bool,
    next_pts: i64,
    next_stream: usize,
    streams: Vec<StreamInfo>,
    fail_seek: bool,
    log: SharedLog,
}

impl MockDemuxer {
    pub fn scripted(reads: Vec<Read>, log: SharedLog) -> Self {
        Self {
            script: reads.into(),
            endless: false,
            next_pts: 0,
            next_stream: 0,
            streams: vec![StreamInfo::video(0, 4, 2, Some(PixelLayout::Rgba))],
            fail_seek: false,
            log,
        }
    }

    /// Packets for stream 0 with pts 0, 1000, 2000, ...
    pub fn packets(count: usize, log: SharedLog) -> Self {
        let reads = (0..count as i64)
            .map(|i| {
                Read::Packet(MockPacket {
                    stream: 0,
                    pts: i * 1000,
                })
            })
            .collect();
        Self::scripted(reads, log)
    }
}

impl Demuxer for MockDemuxer {
    type Packet = MockPacket;

    fn select_best_stream(&self, kind: MediaKind) -> Option<usize> {
        self.streams.iter().find(|s| s.kind == kind).map(|s| s.index)
    }

    fn stream_info(&self, stream_index: usize) -> Option<StreamInfo> {
        self.streams.iter().find(|s| s.index == stream_index).cloned()
    }

    fn read_packet(&mut self) -> Result<Option<MockPacket>, EngineError> {
        self.log.lock().reads += 1;
        if let Some(read) = self.script.pop_front() {
            return match read {
                Read::Packet(p) => Ok(Some(p)),
                Read::Eos => Ok(None),
                Read::Err(code) => Err(EngineError::new(code, "scripted read failure")),
            };
        }
        if !self.endless || self.streams.is_empty() {
            return Ok(None);
        }
        let stream = self.streams[self.next_stream].index;
        let packet = MockPacket {
            stream,
            pts: self.next_pts,
        };
        self.next_stream += 1;
        if self.next_stream == self.streams.len() {
            self.next_stream = 0;
            self.next_pts += 1000;
        }
        Ok(Some(packet))
    }

    fn seek(&mut self, _stream_index: usize, timestamp: Timestamp) -> Result<(), EngineError> {
        if self.fail_seek {
            return Err(EngineError::new(-5, "Input/output error"));
        }
        self.log.lock().seeks.push(timestamp);
        self.script.clear();
        self.next_pts = timestamp.micros;
        self.next_stream = 0;
        Ok(())
    }
}

/// Unit types the mock codec knows how to fill
pub(crate) trait MockUnit: Default + Send + Sync + 'static {
    fn fill(&mut self, pts: i64);
}

impl MockUnit for VideoFrame {
    fn fill(&mut self, pts: i64) {
        self.ensure_layout(4, 2, PixelLayout::Rgba);
        self.planes[0].data.fill(pts as u8);
        self.pts = Timestamp::from_micros(pts);
    }
}

impl MockUnit for AudioFrame {
    fn fill(&mut self, pts: i64) {
        self.channels = 2;
        self.sample_rate = 48_000;
        self.samples.clear();
        self.samples.resize(8, pts as f32);
        self.pts = Timestamp::from_micros(pts);
    }
}

/// Codec that emits one unit per accepted packet, unless a receive script is
/// present, in which case the script is replayed first.
pub(crate) struct MockCodec<U> {
    script: VecDeque<Recv>,
    submit_script: VecDeque<Result<SubmitStatus, EngineError>>,
    flush_script: VecDeque<Result<SubmitStatus, EngineError>>,
    queued: VecDeque<i64>,
    /// Units kept back until a flush is attempted
    hold_back: usize,
    /// A flush was attempted, whatever its outcome
    releasing: bool,
    flushed: bool,
    delay: Option<Duration>,
    log: SharedLog,
    _unit: PhantomData<fn() -> U>,
}

impl<U: MockUnit> MockCodec<U> {
    pub fn passthrough(log: SharedLog) -> Self {
        Self {
            script: VecDeque::new(),
            submit_script: VecDeque::new(),
            flush_script: VecDeque::new(),
            queued: VecDeque::new(),
            hold_back: 0,
            releasing: false,
            flushed: false,
            delay: None,
            log,
            _unit: PhantomData,
        }
    }

    pub fn scripted(recvs: Vec<Recv>, log: SharedLog) -> Self {
        let mut codec = Self::passthrough(log);
        codec.script = recvs.into();
        codec
    }

    pub fn with_submit_script(mut self, results: Vec<Result<SubmitStatus, EngineError>>) -> Self {
        self.submit_script = results.into();
        self
    }

    /// Outcomes of successive flush requests; `Accepted` once exhausted.
    pub fn with_flush_script(mut self, results: Vec<Result<SubmitStatus, EngineError>>) -> Self {
        self.flush_script = results.into();
        self
    }

    pub fn with_hold_back(mut self, units: usize) -> Self {
        self.hold_back = units;
        self
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }
}

impl<U: MockUnit> Codec for MockCodec<U> {
    type Packet = MockPacket;
    type Unit = U;

    fn submit(&mut self, input: CodecInput<'_, MockPacket>) -> Result<SubmitStatus, EngineError> {
        match input {
            CodecInput::Packet(packet) => {
                self.log.lock().submitted.push(packet.pts);
                let result = self
                    .submit_script
                    .pop_front()
                    .unwrap_or(Ok(SubmitStatus::Accepted));
                if let Ok(SubmitStatus::Accepted) = result {
                    self.queued.push_back(packet.pts);
                }
                result
            }
            CodecInput::Flush => {
                self.log.lock().flushes += 1;
                self.releasing = true;
                let result = self
                    .flush_script
                    .pop_front()
                    .unwrap_or(Ok(SubmitStatus::Accepted));
                if let Ok(SubmitStatus::Accepted) = result {
                    self.flushed = true;
                }
                result
            }
        }
    }

    fn receive(&mut self, unit: &mut U) -> Result<ReceiveStatus, EngineError> {
        self.log.lock().receives += 1;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(recv) = self.script.pop_front() {
            return match recv {
                Recv::Unit(pts) => {
                    unit.fill(pts);
                    Ok(ReceiveStatus::Unit)
                }
                Recv::NeedMore => Ok(ReceiveStatus::NeedsMoreInput),
                Recv::Eos => Ok(ReceiveStatus::EndOfStream),
                Recv::Err(code) => Err(EngineError::new(code, "scripted decode failure")),
            };
        }
        let ready = self.queued.len() > self.hold_back || self.releasing;
        if let Some(pts) = ready.then(|| self.queued.pop_front()).flatten() {
            unit.fill(pts);
            Ok(ReceiveStatus::Unit)
        } else if self.flushed {
            Ok(ReceiveStatus::EndOfStream)
        } else {
            Ok(ReceiveStatus::NeedsMoreInput)
        }
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.log.lock().resets += 1;
        self.queued.clear();
        self.script.clear();
        self.releasing = false;
        self.flushed = false;
        Ok(())
    }
}

/// Engine exposing one video stream (index 0) and one audio stream (index 1)
pub(crate) struct MockEngine {
    pub log: SharedLog,
    /// Packets per stream; `None` generates packets forever
    pub packets: Option<usize>,
    pub fail_open: bool,
    pub fail_seek: bool,
    pub decode_delay: Option<Duration>,
    pub streams: Vec<StreamInfo>,
}

impl MockEngine {
    pub fn new(packets: usize) -> Self {
        Self {
            log: SharedLog::default(),
            packets: Some(packets),
            fail_open: false,
            fail_seek: false,
            decode_delay: None,
            streams: vec![
                StreamInfo::video(0, 4, 2, Some(PixelLayout::Rgba)),
                StreamInfo::audio(1, 48_000, 2),
            ],
        }
    }

    pub fn endless() -> Self {
        Self {
            packets: None,
            ..Self::new(0)
        }
    }
}

impl MediaEngine for MockEngine {
    type Packet = MockPacket;
    type Demuxer = MockDemuxer;
    type AudioCodec = MockCodec<AudioFrame>;
    type VideoCodec = MockCodec<VideoFrame>;

    fn open_stream(&self, url: &str) -> Result<MockDemuxer, EngineError> {
        if self.fail_open {
            return Err(EngineError::new(
                -2,
                format!("{url}: No such file or directory"),
            ));
        }
        let mut reads = Vec::new();
        for i in 0..self.packets.unwrap_or(0) as i64 {
            for stream in &self.streams {
                reads.push(Read::Packet(MockPacket {
                    stream: stream.index,
                    pts: i * 1000,
                }));
            }
        }
        let mut demuxer = MockDemuxer::scripted(reads, self.log.clone());
        demuxer.streams = self.streams.clone();
        demuxer.endless = self.packets.is_none();
        demuxer.fail_seek = self.fail_seek;
        Ok(demuxer)
    }

    fn open_audio_decoder(
        &self,
        _demuxer: &MockDemuxer,
        _stream_index: usize,
    ) -> Result<MockCodec<AudioFrame>, EngineError> {
        Ok(MockCodec::passthrough(self.log.clone()).with_delay(self.decode_delay))
    }

    fn open_video_decoder(
        &self,
        _demuxer: &MockDemuxer,
        _stream_index: usize,
    ) -> Result<MockCodec<VideoFrame>, EngineError> {
        Ok(MockCodec::passthrough(self.log.clone()).with_delay(self.decode_delay))
    }
}
