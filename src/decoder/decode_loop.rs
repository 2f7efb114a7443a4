//! Receive/feed state machine that turns packets into decoded units
//!
//! Each call to [`DecodeLoop::decode_next`] produces exactly one unit, or
//! reports that the stream is exhausted. The outer loop asks the codec for
//! output; whenever the codec needs more input, the inner loop reads packets
//! from the demuxer until one of the selected stream is accepted. Reaching the
//! end of input sends a single flush, after which the codec is drained until
//! it reports end of stream.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::background::UnitProducer;
use super::health::DecoderHealth;
use crate::engine::{
    Codec, CodecInput, Demuxer, EncodedPacket, ReceiveStatus, StreamInfo, SubmitStatus,
};
use crate::error::{EngineError, Result};
use crate::media::{MediaKind, Timestamp};

/// Default number of consecutive refused packets before giving up
pub const DEFAULT_MAX_CONSECUTIVE_REJECTIONS: u32 = 10;

/// Where the loop stands with respect to the end of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputState {
    /// Packets are still being read
    Open,
    /// Input is exhausted but the codec has not accepted the flush yet
    FlushPending,
    /// The flush was delivered; only draining remains
    Flushed,
}

pub struct DecodeLoop<D, C>
where
    D: Demuxer,
    C: Codec<Packet = D::Packet>,
{
    demuxer: D,
    codec: C,
    stream_index: usize,
    kind: MediaKind,
    /// One error is forgiven until the first `decode_next` call completes
    startup_grace: bool,
    input: InputState,
    /// Packet refused with `NeedsDrain`, resubmitted on the next feed
    pending: Option<D::Packet>,
    consecutive_rejections: u32,
    max_consecutive_rejections: u32,
    health: Arc<DecoderHealth>,
}

impl<D, C> DecodeLoop<D, C>
where
    D: Demuxer,
    C: Codec<Packet = D::Packet>,
{
    pub fn new(demuxer: D, codec: C, stream_index: usize) -> Self {
        let kind = demuxer
            .stream_info(stream_index)
            .map(|info| info.kind)
            .unwrap_or(MediaKind::Video);
        Self {
            demuxer,
            codec,
            stream_index,
            kind,
            startup_grace: true,
            input: InputState::Open,
            pending: None,
            consecutive_rejections: 0,
            max_consecutive_rejections: DEFAULT_MAX_CONSECUTIVE_REJECTIONS,
            health: Arc::new(DecoderHealth::new()),
        }
    }

    pub fn with_health(mut self, health: Arc<DecoderHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn with_max_consecutive_rejections(mut self, max: u32) -> Self {
        self.max_consecutive_rejections = max.max(1);
        self
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.demuxer.stream_info(self.stream_index)
    }

    pub fn health(&self) -> &Arc<DecoderHealth> {
        &self.health
    }

    /// Decode the next unit into `unit`.
    ///
    /// Returns `Ok(true)` when `unit` was filled, `Ok(false)` once the stream
    /// is exhausted, and an error when decoding cannot continue.
    pub fn decode_next(&mut self, unit: &mut C::Unit) -> Result<bool> {
        let result = self.run(unit);
        self.startup_grace = false;
        result
    }

    /// Reposition the source at the nearest sync point at or before
    /// `timestamp` and discard everything the codec still buffers.
    pub fn seek(&mut self, timestamp: Timestamp) -> Result<()> {
        self.demuxer.seek(self.stream_index, timestamp)?;
        self.codec.reset()?;
        self.pending = None;
        self.input = InputState::Open;
        self.consecutive_rejections = 0;
        info!("{} stream {}: seeked to {}", self.kind, self.stream_index, timestamp);
        Ok(())
    }

    fn run(&mut self, unit: &mut C::Unit) -> Result<bool> {
        loop {
            match self.codec.receive(unit) {
                Ok(ReceiveStatus::Unit) => {
                    self.health.record_unit();
                    return Ok(true);
                }
                Ok(ReceiveStatus::EndOfStream) => {
                    debug!("{} stream {}: end of stream", self.kind, self.stream_index);
                    return Ok(false);
                }
                Ok(ReceiveStatus::NeedsMoreInput) => {
                    if !self.feed()? {
                        return Ok(false);
                    }
                }
                Err(e) => self.tolerate(e, "receive")?,
            }
        }
    }

    /// Deliver one input to the codec. `Ok(false)` means there is nothing
    /// left to deliver.
    fn feed(&mut self) -> Result<bool> {
        match self.input {
            InputState::Flushed => {
                // Asking for input after a delivered flush: nothing more will come
                debug!(
                    "{} stream {}: codec wants input after flush",
                    self.kind, self.stream_index
                );
                return Ok(false);
            }
            InputState::FlushPending => return Ok(self.flush(true)),
            InputState::Open => {}
        }

        if let Some(packet) = self.pending.take() {
            match self.codec.submit(CodecInput::Packet(&packet)) {
                Ok(SubmitStatus::Accepted) => {
                    self.consecutive_rejections = 0;
                    return Ok(true);
                }
                Ok(SubmitStatus::NeedsDrain) => {
                    self.reject(EngineError::unknown("codec refused resubmitted packet"))?
                }
                Err(e) => self.reject(e)?,
            }
        }

        loop {
            let packet = match self.demuxer.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    debug!(
                        "{} stream {}: input exhausted, flushing",
                        self.kind, self.stream_index
                    );
                    self.input = InputState::FlushPending;
                    return Ok(self.flush(false));
                }
                Err(e) => {
                    self.tolerate(e, "read")?;
                    continue;
                }
            };

            if packet.stream_index() != self.stream_index {
                continue;
            }

            match self.codec.submit(CodecInput::Packet(&packet)) {
                Ok(SubmitStatus::Accepted) => {
                    self.consecutive_rejections = 0;
                    return Ok(true);
                }
                Ok(SubmitStatus::NeedsDrain) => {
                    self.pending = Some(packet);
                    return Ok(true);
                }
                Err(e) => self.reject(e)?,
            }
        }
    }

    fn flush(&mut self, retry: bool) -> bool {
        match self.codec.submit(CodecInput::Flush) {
            Ok(SubmitStatus::Accepted) => {
                self.input = InputState::Flushed;
                self.health.record_flush();
                true
            }
            Ok(SubmitStatus::NeedsDrain) if !retry => true,
            Ok(SubmitStatus::NeedsDrain) => {
                warn!(
                    "{} stream {}: codec refused flush twice, draining anyway",
                    self.kind, self.stream_index
                );
                self.input = InputState::Flushed;
                true
            }
            Err(e) => {
                // Units the codec already holds can still be drained
                warn!(
                    "{} stream {}: flush failed, draining anyway: {}",
                    self.kind, self.stream_index, e
                );
                self.input = InputState::Flushed;
                true
            }
        }
    }

    fn tolerate(&mut self, err: EngineError, during: &str) -> Result<()> {
        if self.startup_grace {
            self.startup_grace = false;
            self.health.record_startup_error();
            warn!(
                "{} stream {}: ignoring {} error on first decode: {}",
                self.kind, self.stream_index, during, err
            );
            return Ok(());
        }
        Err(err.into())
    }

    fn reject(&mut self, err: EngineError) -> Result<()> {
        self.consecutive_rejections += 1;
        self.health.record_rejected_packet();
        if self.consecutive_rejections >= self.max_consecutive_rejections {
            error!(
                "{} stream {}: {} consecutive packets rejected, giving up",
                self.kind, self.stream_index, self.consecutive_rejections
            );
            return Err(err.into());
        }
        warn!(
            "{} stream {}: packet rejected ({}/{}): {}",
            self.kind,
            self.stream_index,
            self.consecutive_rejections,
            self.max_consecutive_rejections,
            err
        );
        Ok(())
    }
}

impl<D, C> UnitProducer for DecodeLoop<D, C>
where
    D: Demuxer + 'static,
    C: Codec<Packet = D::Packet> + 'static,
{
    type Unit = C::Unit;

    fn produce(&mut self, unit: &mut C::Unit) -> Result<bool> {
        self.decode_next(unit)
    }

    fn name(&self) -> &'static str {
        match self.kind {
            MediaKind::Video => "video-decoder",
            MediaKind::Audio => "audio-decoder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockCodec, MockDemuxer, MockPacket, Read, Recv, SharedLog};
    use crate::error::Error;
    use crate::media::VideoFrame;

    type TestLoop = DecodeLoop<MockDemuxer, MockCodec<VideoFrame>>;

    fn scripted(reads: Vec<Read>, recvs: Vec<Recv>) -> (TestLoop, SharedLog) {
        let log = SharedLog::default();
        let demuxer = MockDemuxer::scripted(reads, log.clone());
        let codec = MockCodec::scripted(recvs, log.clone());
        (DecodeLoop::new(demuxer, codec, 0), log)
    }

    fn packet(stream: usize, pts: i64) -> Read {
        Read::Packet(MockPacket { stream, pts })
    }

    #[test]
    fn test_needs_more_input_then_end_of_stream() {
        let (mut decoder, log) = scripted(
            vec![packet(0, 0)],
            vec![Recv::NeedMore, Recv::NeedMore, Recv::Eos],
        );
        let mut frame = VideoFrame::default();

        assert!(!decoder.decode_next(&mut frame).unwrap());
        assert_eq!(log.lock().flushes, 1);
        assert_eq!(log.lock().submitted, vec![0]);
        assert_eq!(decoder.health().units_decoded(), 0);
    }

    #[test]
    fn test_drains_stream_and_stays_exhausted() {
        let log = SharedLog::default();
        let mut decoder = DecodeLoop::new(
            MockDemuxer::packets(3, log.clone()),
            MockCodec::<VideoFrame>::passthrough(log.clone()),
            0,
        );
        let mut frame = VideoFrame::default();

        for pts in [0, 1000, 2000] {
            assert!(decoder.decode_next(&mut frame).unwrap());
            assert_eq!(frame.pts, Timestamp::from_micros(pts));
        }
        assert!(!decoder.decode_next(&mut frame).unwrap());
        assert!(!decoder.decode_next(&mut frame).unwrap());
        assert_eq!(log.lock().flushes, 1);
        assert_eq!(decoder.health().units_decoded(), 3);
    }

    #[test]
    fn test_first_error_is_forgiven_once() {
        let (mut decoder, _log) = scripted(
            vec![],
            vec![Recv::Err(-22), Recv::Unit(5), Recv::Err(-22)],
        );
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert_eq!(frame.pts, Timestamp::from_micros(5));
        assert_eq!(decoder.health().startup_errors_ignored(), 1);

        let err = decoder.decode_next(&mut frame).unwrap_err();
        assert_eq!(err.engine_code(), Some(-22));
    }

    #[test]
    fn test_second_startup_error_is_terminal() {
        let (mut decoder, _log) = scripted(vec![], vec![Recv::Err(-1094995529), Recv::Err(-22)]);
        let mut frame = VideoFrame::default();

        let err = decoder.decode_next(&mut frame).unwrap_err();
        assert!(matches!(err, Error::Engine(EngineError { code: -22, .. })));
    }

    #[test]
    fn test_grace_ends_after_successful_first_call() {
        let (mut decoder, _log) = scripted(vec![], vec![Recv::Unit(1), Recv::Err(-5)]);
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert!(decoder.decode_next(&mut frame).is_err());
        assert_eq!(decoder.health().startup_errors_ignored(), 0);
    }

    #[test]
    fn test_read_error_on_first_attempt_is_skipped() {
        let log = SharedLog::default();
        let mut decoder = DecodeLoop::new(
            MockDemuxer::scripted(vec![Read::Err(-5), packet(0, 7), Read::Err(-5)], log.clone()),
            MockCodec::<VideoFrame>::passthrough(log.clone()),
            0,
        );
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert_eq!(frame.pts, Timestamp::from_micros(7));
        assert_eq!(decoder.decode_next(&mut frame).unwrap_err().engine_code(), Some(-5));
    }

    #[test]
    fn test_packets_of_other_streams_are_skipped() {
        let log = SharedLog::default();
        let mut decoder = DecodeLoop::new(
            MockDemuxer::scripted(vec![packet(1, 1), packet(2, 2), packet(0, 3)], log.clone()),
            MockCodec::<VideoFrame>::passthrough(log.clone()),
            0,
        );
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert_eq!(frame.pts, Timestamp::from_micros(3));
        assert_eq!(log.lock().submitted, vec![3]);
    }

    #[test]
    fn test_needs_drain_packet_is_resubmitted() {
        let log = SharedLog::default();
        let codec = MockCodec::<VideoFrame>::passthrough(log.clone())
            .with_submit_script(vec![Ok(SubmitStatus::NeedsDrain)]);
        let mut decoder = DecodeLoop::new(MockDemuxer::packets(2, log.clone()), codec, 0);
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert_eq!(frame.pts, Timestamp::ZERO);
        assert_eq!(log.lock().submitted, vec![0, 0]);
        assert_eq!(decoder.health().packets_rejected(), 0);
    }

    #[test]
    fn test_rejections_recover_below_threshold() {
        let log = SharedLog::default();
        let codec = MockCodec::<VideoFrame>::passthrough(log.clone()).with_submit_script(vec![
            Err(EngineError::new(-22, "Invalid data")),
            Err(EngineError::new(-22, "Invalid data")),
        ]);
        let mut decoder = DecodeLoop::new(MockDemuxer::packets(4, log.clone()), codec, 0)
            .with_max_consecutive_rejections(3);
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert_eq!(frame.pts, Timestamp::from_micros(2000));
        assert_eq!(decoder.health().packets_rejected(), 2);
    }

    #[test]
    fn test_rejections_at_threshold_are_terminal() {
        let log = SharedLog::default();
        let codec = MockCodec::<VideoFrame>::passthrough(log.clone()).with_submit_script(vec![
            Err(EngineError::new(-22, "Invalid data")),
            Err(EngineError::new(-22, "Invalid data")),
            Err(EngineError::new(-22, "Invalid data")),
        ]);
        let mut decoder = DecodeLoop::new(MockDemuxer::packets(5, log.clone()), codec, 0)
            .with_max_consecutive_rejections(3);
        let mut frame = VideoFrame::default();

        assert_eq!(decoder.decode_next(&mut frame).unwrap_err().engine_code(), Some(-22));
        assert_eq!(log.lock().submitted, vec![0, 1000, 2000]);
    }

    /// Codec that keeps one unit back until a flush is attempted
    fn held_back(
        packets: usize,
        flush: Vec<std::result::Result<SubmitStatus, EngineError>>,
    ) -> (TestLoop, SharedLog) {
        let log = SharedLog::default();
        let codec = MockCodec::<VideoFrame>::passthrough(log.clone())
            .with_hold_back(1)
            .with_flush_script(flush);
        (DecodeLoop::new(MockDemuxer::packets(packets, log.clone()), codec, 0), log)
    }

    fn drain(decoder: &mut TestLoop) -> Vec<i64> {
        let mut frame = VideoFrame::default();
        let mut pts = Vec::new();
        while decoder.decode_next(&mut frame).unwrap() {
            pts.push(frame.pts.micros);
        }
        pts
    }

    #[test]
    fn test_flush_refused_once_is_retried() {
        let (mut decoder, log) = held_back(2, vec![Ok(SubmitStatus::NeedsDrain)]);

        assert_eq!(drain(&mut decoder), vec![0, 1000]);
        assert_eq!(log.lock().flushes, 2);
        assert_eq!(decoder.health().flushes(), 1);
    }

    #[test]
    fn test_flush_refused_twice_counts_as_delivered() {
        let (mut decoder, log) = held_back(
            2,
            vec![Ok(SubmitStatus::NeedsDrain), Ok(SubmitStatus::NeedsDrain)],
        );

        assert_eq!(drain(&mut decoder), vec![0, 1000]);
        assert_eq!(log.lock().flushes, 2);
        assert_eq!(decoder.health().flushes(), 0);
        // Nothing more is submitted once the stream is over
        assert!(!decoder.decode_next(&mut VideoFrame::default()).unwrap());
        assert_eq!(log.lock().flushes, 2);
    }

    #[test]
    fn test_failed_flush_still_drains_held_units() {
        let (mut decoder, log) = held_back(2, vec![Err(EngineError::new(-5, "I/O error"))]);

        assert_eq!(drain(&mut decoder), vec![0, 1000]);
        assert_eq!(log.lock().flushes, 1);
        assert_eq!(log.lock().submitted, vec![0, 1000]);
        assert_eq!(decoder.health().flushes(), 0);
    }

    #[test]
    fn test_scripted_end_of_input_flushes() {
        let log = SharedLog::default();
        let mut decoder = DecodeLoop::new(
            MockDemuxer::scripted(vec![packet(0, 0), Read::Eos, packet(0, 1000)], log.clone()),
            MockCodec::<VideoFrame>::passthrough(log.clone()),
            0,
        );

        assert_eq!(drain(&mut decoder), vec![0]);
        assert_eq!(log.lock().flushes, 1);
        assert_eq!(log.lock().submitted, vec![0]);
    }

    #[test]
    fn test_seek_reopens_input() {
        let log = SharedLog::default();
        let mut decoder = DecodeLoop::new(
            MockDemuxer::packets(1, log.clone()),
            MockCodec::<VideoFrame>::passthrough(log.clone()),
            0,
        );
        let mut frame = VideoFrame::default();

        assert!(decoder.decode_next(&mut frame).unwrap());
        assert!(!decoder.decode_next(&mut frame).unwrap());

        decoder.seek(Timestamp::from_micros(5000)).unwrap();
        assert_eq!(log.lock().seeks, vec![Timestamp::from_micros(5000)]);
        assert_eq!(log.lock().resets, 1);

        // Input is read again and flushed a second time
        assert!(!decoder.decode_next(&mut frame).unwrap());
        assert_eq!(log.lock().flushes, 2);
    }
}
