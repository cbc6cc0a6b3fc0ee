// SPDX-License-Identifier: MPL-2.0

//! Retirement: telling the emulation core that a command buffer has been fully executed.

use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use ringbuffer::{AllocRingBuffer, RingBuffer as _};

use crate::Context;

/// Receives a notification for every executed command buffer.
///
/// The driver calls [`notify_retire`](Retire::notify_retire) once per non-empty buffer, in push
/// order, after the backend has been handed all of that buffer's work. Implementations run on the
/// driver thread and must not block for long.
pub trait Retire: Send + Sync {
    fn notify_retire(&self, context: Context);
}

impl<F> Retire for F
where
    F: Fn(Context) + Send + Sync,
{
    fn notify_retire(&self, context: Context) {
        (self)(context)
    }
}

/// The number of recent retirements a [`RetireLog`] holds by default.
pub const DEFAULT_HISTORY: usize = 4096;

struct Log {
    recent: AllocRingBuffer<Context>,
    total: usize,
}

/// Records retirements so that CPU-side code can wait on them.
///
/// Only the most recent retirements are held; older ones age out, so a context that retired long
/// ago is no longer [`is_retired`](RetireLog::is_retired). [`count`](RetireLog::count) keeps
/// counting regardless.
pub struct RetireLog {
    log: Mutex<Log>,
    changed: Condvar,
}

impl Default for RetireLog {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl RetireLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log holding the last `history` retirements. A zero `history` holds one.
    pub fn with_history(history: usize) -> Self {
        Self {
            log: Mutex::new(Log {
                recent: AllocRingBuffer::new(history.max(1)),
                total: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// The retired contexts still held, oldest first.
    pub fn retired(&self) -> Vec<Context> {
        self.lock().recent.iter().copied().collect()
    }

    /// The number of buffers retired so far, including those no longer held.
    pub fn count(&self) -> usize {
        self.lock().total
    }

    pub fn last(&self) -> Option<Context> {
        self.lock().recent.back().copied()
    }

    pub fn is_retired(&self, context: Context) -> bool {
        self.lock().holds(context)
    }

    /// Blocks until `context` retires or `timeout` passes, and returns whether it retired.
    pub fn wait_for(&self, context: Context, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.lock();
        while !log.holds(context) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            log = self.changed
                .wait_timeout(log, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }

    /// Blocks until at least `count` buffers have retired or `timeout` passes.
    pub fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.lock();
        while log.total < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            log = self.changed
                .wait_timeout(log, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        true
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Log {
    fn holds(&self, context: Context) -> bool {
        self.recent.iter().any(|it| *it == context)
    }
}

impl Retire for RetireLog {
    fn notify_retire(&self, context: Context) {
        let mut log = self.lock();
        // The oldest entry is overwritten once the history is full.
        log.recent.push(context);
        log.total += 1;
        drop(log);

        self.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        thread,
    };

    use super::*;

    #[test]
    fn closures_are_notifiers() {
        let sum = Arc::new(AtomicU64::new(0));
        let notifier = {
            let sum = Arc::clone(&sum);
            move |context: Context| {
                sum.fetch_add(context.0, Ordering::Relaxed);
            }
        };
        let notifier: &dyn Retire = &notifier;
        notifier.notify_retire(Context(2));
        notifier.notify_retire(Context(3));

        assert_eq!(sum.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn log_keeps_retirement_order() {
        let log = RetireLog::new();
        for context in [3, 1, 2] {
            log.notify_retire(Context(context));
        }

        assert_eq!(log.retired(), vec![Context(3), Context(1), Context(2)]);
        assert_eq!(log.last(), Some(Context(2)));
        assert_eq!(log.count(), 3);
        assert!(log.is_retired(Context(1)));
        assert!(!log.is_retired(Context(4)));
    }

    #[test]
    fn waiters_wake_on_retirement() {
        let log = Arc::new(RetireLog::new());
        let waiter = {
            let log = Arc::clone(&log);
            thread::spawn(move || log.wait_for(Context(5), Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        log.notify_retire(Context(4));
        log.notify_retire(Context(5));

        assert!(waiter.join().unwrap());
        assert!(log.wait_for_count(2, Duration::ZERO));
    }

    #[test]
    fn history_is_bounded() {
        let log = RetireLog::with_history(8);
        for context in 0..100_000 {
            log.notify_retire(Context(context));
        }

        assert_eq!(log.count(), 100_000);
        assert_eq!(log.retired(), (99_992..100_000).map(Context).collect::<Vec<_>>());
        assert_eq!(log.last(), Some(Context(99_999)));
        assert!(log.is_retired(Context(99_992)));
        assert!(!log.is_retired(Context(99_991)));
        assert!(log.wait_for_count(100_000, Duration::ZERO));
    }

    #[test]
    fn wait_times_out() {
        let log = RetireLog::new();
        assert!(!log.wait_for(Context(1), Duration::from_millis(10)));
        assert!(!log.wait_for_count(1, Duration::from_millis(10)));
    }
}
