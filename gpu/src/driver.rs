// SPDX-License-Identifier: MPL-2.0

//! The driver: the thread-facing side of a backend.
//!
//! A [`Dispatcher`] owns one [`Backend`] and runs the dispatch loop: it takes buffers off the
//! [`Ring`] in order, interprets them, hands the work to the backend and retires them. Frontends
//! see it only as `Arc<dyn Driver>`.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crossbeam_channel::{Receiver, Sender};
use ringbuffer::{GrowableAllocRingBuffer, RingBuffer as _};

use crate::{
    backend::{self, Backend, Flush},
    exec::{Executor, Fault},
    CommandBuffer, Item, Retire, Ring,
};

/// The number of recent frames the FPS estimate is averaged over.
const FPS_WINDOW: usize = 60;

/// The capabilities every driver offers, whatever its backend.
pub trait Driver: Send + Sync {
    /// Runs the dispatch loop on the calling thread until [`stop`](Driver::stop) is called or
    /// the device is lost.
    fn run(&self) -> Result<(), Error>;

    /// Asks the dispatch loop to finish. Buffers the ring already accepted are still executed and
    /// retired; further pushes are refused.
    fn stop(&self);

    /// Tells the driver that the CPU wrote `addr..(addr + size)`.
    fn notify_cpu_flush(&self, addr: u32, size: u32);

    /// Tells the driver that the GPU wrote `addr..(addr + size)`.
    fn notify_gpu_flush(&self, addr: u32, size: u32);

    /// Frames per second over the last few presented frames, or zero before two frames.
    fn average_fps(&self) -> f32;

    fn state(&self) -> State;

    /// The name of the backend, for diagnostics.
    fn backend_name(&self) -> &'static str;
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Stopped = 0,
    Running = 1,
    /// The device was lost; the driver can't run again.
    Faulted = 2,
}

impl State {
    fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::Running,
            2 => Self::Faulted,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    AlreadyRunning,
    Faulted,
    DeviceLost(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => f.write_str("the driver is already running"),
            Self::Faulted => f.write_str("the driver lost its device earlier"),
            Self::DeviceLost(reason) => write!(f, "device lost: {}", reason),
        }
    }
}

impl std::error::Error for Error {}

/// State only the dispatch loop touches.
struct Worker<B> {
    backend: B,
    executor: Executor,
    swaps: GrowableAllocRingBuffer<instant::Instant>,
}

/// Runs command buffers from a ring against a `B`.
pub struct Dispatcher<B> {
    name: &'static str,
    ring: Arc<Ring>,
    retire: Arc<dyn Retire>,
    worker: Mutex<Worker<B>>,
    stop_requested: AtomicBool,
    state: AtomicU8,
    flush_tx: Sender<Flush>,
    flush_rx: Receiver<Flush>,
    fps_bits: AtomicU32,
}

impl<B: Backend> Dispatcher<B> {
    pub fn new(ring: Arc<Ring>, retire: Arc<dyn Retire>, backend: B) -> Self {
        let (flush_tx, flush_rx) = crossbeam_channel::unbounded();

        Self {
            name: backend.name(),
            ring,
            retire,
            worker: Mutex::new(Worker {
                backend,
                executor: Executor::new(),
                swaps: GrowableAllocRingBuffer::new(),
            }),
            stop_requested: AtomicBool::new(false),
            state: AtomicU8::new(State::Stopped as u8),
            flush_tx,
            flush_rx,
            fps_bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    /// Calls `f` with the backend. Blocks while the dispatch loop is running.
    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        f(&worker.backend)
    }

    /// Calls `f` with the executor. Blocks while the dispatch loop is running.
    pub fn with_executor<R>(&self, f: impl FnOnce(&Executor) -> R) -> R {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        f(&worker.executor)
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn dispatch_loop(&self, worker: &mut Worker<B>) -> Result<(), Error> {
        while !self.stop_requested.load(Ordering::Acquire) {
            match self.ring.wait_for_item() {
                Item::Buffer(buffer) => self.dispatch(worker, buffer)?,
                Item::Wake if self.ring.is_closed() => break,
                Item::Wake => {}
            }
        }

        // A push can race with `stop`; closing here guarantees the drain below sees everything
        // that will ever be accepted.
        self.ring.close();
        let mut drained = 0;
        while let Some(buffer) = self.ring.try_pop() {
            self.dispatch(worker, buffer)?;
            drained += 1;
        }
        tracing::debug!("drained {} buffers on stop", drained);

        Ok(())
    }

    fn dispatch(&self, worker: &mut Worker<B>, buffer: CommandBuffer) -> Result<(), Error> {
        let context = buffer.context();
        if buffer.is_empty() {
            tracing::trace!("skipping empty buffer {:?}", context);
            return Ok(());
        }
        tracing::debug!("executing {:?} ({} words)", context, buffer.num_words());

        self.forward_flushes(worker)?;

        if let Err(fault) = worker.executor.execute(&mut worker.backend, buffer.words()) {
            if fault.error.is_fatal() {
                return Err(self.fail(fault.error));
            }
            self.report(&buffer, &fault);
        }
        if let Err(e) = worker.backend.submit() {
            if e.is_fatal() {
                return Err(self.fail(e));
            }
            tracing::warn!("{:?}: submission failed: {}", context, e);
        }

        let Worker { executor, swaps, .. } = worker;
        for at in executor.drain_swaps() {
            self.record_swap(swaps, at);
        }

        self.retire.notify_retire(context);

        Ok(())
    }

    fn forward_flushes(&self, worker: &mut Worker<B>) -> Result<(), Error> {
        for flush in self.flush_rx.try_iter() {
            tracing::trace!("forwarding {:?}", flush);
            if let Err(e) = worker.backend.invalidate(flush) {
                if e.is_fatal() {
                    return Err(self.fail(e));
                }
                tracing::warn!("{:?} failed: {}", flush, e);
            }
        }

        Ok(())
    }

    fn report(&self, buffer: &CommandBuffer, fault: &Fault) {
        tracing::warn!(
            "{:?}: skipping the rest of the buffer after an error {}",
            buffer.context(),
            fault,
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let start = fault.offset.min(buffer.num_words());
            let end = (start + 16).min(buffer.num_words());
            let words = buffer.words()[start..end]
                .iter()
                .map(|word| word.get())
                .collect::<Vec<u32>>();

            let mut dump = Vec::new();
            if latte_util::dump_words(&mut dump, start, &words).is_ok() {
                tracing::debug!("{}", String::from_utf8_lossy(&dump));
            }
        }
    }

    fn fail(&self, error: backend::Error) -> Error {
        tracing::error!("{} backend failed: {}", self.name, error);
        self.set_state(State::Faulted);
        self.ring.close();

        match error {
            backend::Error::DeviceLost(reason) => Error::DeviceLost(reason),
            other => Error::DeviceLost(other.to_string()),
        }
    }

    /// Adds a swap that completed `at` to the window and republishes the estimate.
    fn record_swap(
        &self,
        swaps: &mut GrowableAllocRingBuffer<instant::Instant>,
        at: instant::Instant,
    ) {
        swaps.push(at);
        while swaps.len() > FPS_WINDOW {
            swaps.dequeue();
        }

        let fps = match (swaps.front(), swaps.back()) {
            (Some(first), Some(last)) if swaps.len() >= 2 => {
                let elapsed = last.duration_since(*first).as_secs_f32();
                if elapsed > 0.0 {
                    (swaps.len() - 1) as f32 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }
}

impl<B: Backend> Driver for Dispatcher<B> {
    fn run(&self) -> Result<(), Error> {
        if let Err(code) = self.state.compare_exchange(
            State::Stopped as u8,
            State::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match State::from_u8(code) {
                State::Faulted => Error::Faulted,
                _ => Error::AlreadyRunning,
            });
        }
        tracing::info!("{} driver running", self.name);

        let mut guard = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.dispatch_loop(&mut guard);
        if result.is_ok() {
            self.set_state(State::Stopped);
            tracing::info!("{} driver stopped", self.name);
        }

        result
    }

    fn stop(&self) {
        tracing::debug!("stopping {} driver", self.name);
        self.stop_requested.store(true, Ordering::Release);
        self.ring.close();
        self.ring.awaken();
    }

    fn notify_cpu_flush(&self, addr: u32, size: u32) {
        // The receiver lives as long as `self`, so sending can't fail.
        let _ = self.flush_tx.send(Flush::Cpu { addr, size });
    }

    fn notify_gpu_flush(&self, addr: u32, size: u32) {
        let _ = self.flush_tx.send(Flush::Gpu { addr, size });
    }

    fn average_fps(&self) -> f32 {
        f32::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    fn backend_name(&self) -> &'static str {
        self.name
    }
}
