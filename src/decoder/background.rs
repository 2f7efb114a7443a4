//! Background decoder: a producer thread filling a bounded ring
//!
//! One dedicated thread repeatedly asks a [`UnitProducer`] for the next unit
//! and pushes it into the ring. When the ring holds `capacity - lookahead`
//! undelivered units the thread parks on a condition variable until a
//! consumer pops or the decoder is stopped; every wake re-checks the
//! predicate. Consumers never block.
//!
//! Lock order is always producer, then buffer. The buffer lock is never held
//! while a unit is being produced.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};

use super::health::DecoderHealth;
use super::state::DecoderState;
use crate::buffer::{AnyRing, SlotRing};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};

/// Source of decoded units driven by the producer thread.
pub trait UnitProducer: Send + 'static {
    type Unit: Default + Send + Sync + 'static;

    /// Fill `unit` in place with the next unit.
    ///
    /// `Ok(false)` ends production cleanly; an error ends it as a failure.
    /// `unit` is either a recycled unit whose buffers may be reused, or a
    /// fresh default.
    fn produce(&mut self, unit: &mut Self::Unit) -> Result<bool>;

    fn name(&self) -> &'static str {
        "producer"
    }
}

struct BufferState<U> {
    ring: AnyRing<Option<Arc<U>>>,
    state: DecoderState,
    /// Bumped by every reposition; units produced under an older value are dropped
    generation: u64,
    /// Set by the producer thread right before it exits
    thread_done: bool,
}

impl<U> BufferState<U> {
    /// Move to `target` if the lifecycle allows it.
    fn transition(&mut self, target: DecoderState) -> bool {
        if !self.state.can_transition_to(&target) {
            return false;
        }
        debug!("decoder state {} -> {}", self.state, target);
        self.state = target;
        true
    }
}

struct Shared<U> {
    buffer: Mutex<BufferState<U>>,
    /// Signalled when space frees up or the decoder stops
    space: Condvar,
    /// Signalled when the producer thread exits
    done: Condvar,
}

/// Thread-backed decoder exposing a non-blocking consumer API.
///
/// Items are handed out as `Arc<U>`; a slot's allocation is recycled by the
/// producer once every consumer has dropped its handle.
pub struct BackgroundDecoder<P: UnitProducer> {
    shared: Arc<Shared<P::Unit>>,
    producer: Arc<Mutex<P>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    config: DecoderConfig,
    health: Arc<DecoderHealth>,
    name: &'static str,
}

impl<P: UnitProducer> BackgroundDecoder<P> {
    pub fn new(producer: P, config: DecoderConfig) -> Self {
        let name = producer.name();
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(BufferState {
                    ring: AnyRing::new(1, config.fast_buffer),
                    state: DecoderState::Idle,
                    generation: 0,
                    thread_done: false,
                }),
                space: Condvar::new(),
                done: Condvar::new(),
            }),
            producer: Arc::new(Mutex::new(producer)),
            worker: Mutex::new(None),
            config,
            health: Arc::new(DecoderHealth::new()),
            name,
        }
    }

    /// Share a health instance with the producer.
    pub fn with_health(mut self, health: Arc<DecoderHealth>) -> Self {
        self.health = health;
        self
    }

    /// Allocate the ring and spawn the producer thread.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;
        {
            let mut buf = self.shared.buffer.lock();
            let running = DecoderState::Running {
                started_at: Instant::now(),
            };
            if !buf.transition(running) {
                return Err(Error::AlreadyStarted);
            }
            buf.ring.resize(self.config.buffer_size);
            buf.thread_done = false;
        }

        let shared = Arc::clone(&self.shared);
        let producer = Arc::clone(&self.producer);
        let health = Arc::clone(&self.health);
        let lookahead = self.config.lookahead;
        let full_wait = self.config.full_wait();
        let name = self.name;

        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", crate::config::app_name(), name))
            .spawn(move || {
                producer_main(name, &shared, &producer, &health, lookahead, full_wait)
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!(
                    "{}: started (buffer {}, lookahead {})",
                    name, self.config.buffer_size, lookahead
                );
                Ok(())
            }
            Err(e) => {
                let mut buf = self.shared.buffer.lock();
                buf.transition(DecoderState::Stopped);
                buf.thread_done = true;
                Err(Error::Io(e))
            }
        }
    }

    /// Stop the producer and wait for it up to the configured join timeout.
    ///
    /// Safe to call any number of times; only the first call joins. A thread
    /// still inside a decode call when the timeout expires is detached and
    /// exits on its own once that call returns.
    pub fn stop(&self) {
        {
            let mut buf = self.shared.buffer.lock();
            buf.transition(DecoderState::Stopped);
            self.shared.space.notify_all();
        }

        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        let deadline = Instant::now() + self.config.join_timeout();
        let mut buf = self.shared.buffer.lock();
        while !buf.thread_done {
            if self.shared.done.wait_until(&mut buf, deadline).timed_out() {
                break;
            }
        }
        let finished = buf.thread_done;
        drop(buf);

        if finished {
            if handle.join().is_err() {
                error!("{}: producer thread panicked", self.name);
            }
            debug!("{}: producer thread joined", self.name);
        } else {
            warn!(
                "{}: producer still busy after {:?}, detaching",
                self.name,
                self.config.join_timeout()
            );
        }
    }

    /// Run `f` against the producer while it is idle, then drop every
    /// buffered unit and any unit produced before `f` ran.
    pub fn reposition<T>(&self, f: impl FnOnce(&mut P) -> Result<T>) -> Result<T> {
        if !self.decoder_running() {
            return Err(Error::NotRunning);
        }
        let mut producer = self.producer.lock();
        let out = f(&mut producer)?;

        let mut buf = self.shared.buffer.lock();
        buf.generation += 1;
        buf.ring.clear();
        self.shared.space.notify_all();
        Ok(out)
    }

    /// Pop the oldest unit.
    pub fn next_item(&self) -> Result<Arc<P::Unit>> {
        let mut buf = self.shared.buffer.lock();
        if buf.ring.is_empty() {
            return Err(Error::NoItemAvailable);
        }
        let item = buf.ring.pop();
        self.shared.space.notify_one();
        item.ok_or(Error::NoItemAvailable)
    }

    /// Pop up to `max_count` units, oldest first.
    pub fn next_items(&self, max_count: usize) -> Vec<Arc<P::Unit>> {
        let mut buf = self.shared.buffer.lock();
        let n = max_count.min(buf.ring.len());
        let items: Vec<_> = (0..n).filter_map(|_| buf.ring.pop()).collect();
        if !items.is_empty() {
            self.shared.space.notify_one();
        }
        items
    }

    /// Oldest unit without removing it.
    pub fn peek_next_item(&self) -> Result<Arc<P::Unit>> {
        self.shared
            .buffer
            .lock()
            .ring
            .last()
            .ok_or(Error::NoItemAvailable)
    }

    /// Up to `max_count` of the oldest units without removing them.
    pub fn peek_next_items(&self, max_count: usize) -> Vec<Arc<P::Unit>> {
        self.shared
            .buffer
            .lock()
            .ring
            .to_vec(max_count)
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn items_available(&self) -> bool {
        !self.shared.buffer.lock().ring.is_empty()
    }

    /// True once the usable depth (`capacity - lookahead`) is reached.
    pub fn buffer_full(&self) -> bool {
        let buf = self.shared.buffer.lock();
        buf.ring.len() >= usable_depth(&buf.ring, self.config.lookahead)
    }

    pub fn items_count(&self) -> usize {
        self.shared.buffer.lock().ring.len()
    }

    pub fn decoder_running(&self) -> bool {
        self.shared.buffer.lock().state.is_running()
    }

    pub fn state(&self) -> DecoderState {
        self.shared.buffer.lock().state
    }

    /// Number of ring slots (rounded up for fast buffers).
    pub fn capacity(&self) -> usize {
        self.shared.buffer.lock().ring.capacity()
    }

    pub fn health(&self) -> &Arc<DecoderHealth> {
        &self.health
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

impl<P: UnitProducer> Drop for BackgroundDecoder<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn usable_depth<T: Default + Clone + Send>(ring: &AnyRing<T>, lookahead: usize) -> usize {
    ring.capacity().saturating_sub(lookahead).max(1)
}

/// Take back a unit evicted from the ring, or start fresh if a consumer
/// still holds it.
fn reclaim<U: Default>(slot: Option<Arc<U>>, health: &DecoderHealth) -> U {
    match slot.map(Arc::try_unwrap) {
        Some(Ok(unit)) => {
            health.record_slot_reuse();
            unit
        }
        _ => U::default(),
    }
}

fn producer_main<P: UnitProducer>(
    name: &str,
    shared: &Shared<P::Unit>,
    producer: &Mutex<P>,
    health: &DecoderHealth,
    lookahead: usize,
    full_wait: Duration,
) {
    debug!("{}: producer thread running", name);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        produce_units(shared, producer, health, lookahead, full_wait)
    }));

    match outcome {
        Ok(Ok(())) => info!("{}: producer finished", name),
        Ok(Err(e)) => {
            health.record_terminal_error();
            error!("{}: decoding stopped: {}", name, e);
        }
        Err(payload) => {
            health.record_terminal_error();
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{}: producer panicked: {}", name, msg);
        }
    }

    let mut buf = shared.buffer.lock();
    buf.transition(DecoderState::Stopped);
    buf.thread_done = true;
    shared.done.notify_all();
    shared.space.notify_all();
}

fn produce_units<P: UnitProducer>(
    shared: &Shared<P::Unit>,
    producer: &Mutex<P>,
    health: &DecoderHealth,
    lookahead: usize,
    full_wait: Duration,
) -> Result<()> {
    loop {
        let mut unit = {
            let mut buf = shared.buffer.lock();
            let mut parked = false;
            loop {
                if !buf.state.is_running() {
                    return Ok(());
                }
                if buf.ring.len() < usable_depth(&buf.ring, lookahead) {
                    break;
                }
                if !parked {
                    parked = true;
                    health.record_producer_wait();
                }
                // Timed wait: a lost wakeup only costs one interval
                shared.space.wait_for(&mut buf, full_wait);
            }
            let slot = buf.ring.take_next_slot();
            reclaim(slot, health)
        };

        let (more, generation) = {
            let mut producer = producer.lock();
            let generation = shared.buffer.lock().generation;
            (producer.produce(&mut unit)?, generation)
        };

        let mut buf = shared.buffer.lock();
        if !more || !buf.state.is_running() {
            return Ok(());
        }
        if buf.generation != generation {
            debug!("dropping unit produced before reposition");
            continue;
        }
        buf.ring.push(Some(Arc::new(unit)));
    }
}
