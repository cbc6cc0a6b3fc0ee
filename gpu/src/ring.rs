// SPDX-License-Identifier: MPL-2.0

//! The command ring: an ordered handoff of command buffers from the emulation threads to the
//! driver thread.

use std::{
    fmt,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use ringbuffer::{GrowableAllocRingBuffer, RingBuffer as _};

use crate::CommandBuffer;

/// Returned by [`Ring::push`] once the ring has been closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingClosed;

impl fmt::Display for RingClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the command ring is closed")
    }
}

impl std::error::Error for RingClosed {}

/// The result of [`Ring::wait_for_item`].
#[derive(Debug)]
pub enum Item {
    /// The oldest pending buffer.
    Buffer(CommandBuffer),
    /// The consumer was awakened without new data.
    Wake,
}

/// A pending buffer and its position in the push order.
struct RingSlot {
    seq: u64,
    buffer: CommandBuffer,
}

struct Inner {
    slots: GrowableAllocRingBuffer<RingSlot>,
    /// The sequence number of the next accepted push.
    next_seq: u64,
    /// The sequence number the consumer expects next.
    next_pop: u64,
    wake_pending: bool,
    closed: bool,
}

impl Default for Ring {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: GrowableAllocRingBuffer::new(),
                next_seq: 0,
                next_pop: 0,
                wake_pending: false,
                closed: false,
            }),
            item_ready: Condvar::new(),
        }
    }
}

/// A FIFO of command buffers shared between producers and one consumer.
///
/// The ring grows as needed, so pushing never waits for the consumer. It stores references to
/// buffers, never copies of their words.
pub struct Ring {
    inner: Mutex<Inner>,
    item_ready: Condvar,
}

impl Ring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `buffer` to the tail of the ring.
    pub fn push(&self, buffer: CommandBuffer) -> Result<(), RingClosed> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RingClosed);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        tracing::trace!(seq, words = buffer.num_words(), "push");
        inner.slots.push(RingSlot { seq, buffer });
        drop(inner);

        self.item_ready.notify_one();

        Ok(())
    }

    /// Blocks until a buffer is available or the ring is awakened.
    ///
    /// Pending buffers always come out before a pending wake. A closed, empty ring returns
    /// [`Item::Wake`] without blocking.
    pub fn wait_for_item(&self) -> Item {
        let mut inner = self.lock();
        loop {
            if let Some(buffer) = Self::pop_slot(&mut inner) {
                return Item::Buffer(buffer);
            }
            if inner.wake_pending {
                inner.wake_pending = false;
                return Item::Wake;
            }
            if inner.closed {
                return Item::Wake;
            }

            inner = self.item_ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Takes the oldest pending buffer without blocking.
    pub fn try_pop(&self) -> Option<CommandBuffer> {
        Self::pop_slot(&mut self.lock())
    }

    /// Releases the consumer from [`wait_for_item`](Self::wait_for_item) without new data.
    ///
    /// A wake requested while nobody is waiting is kept until the consumer next waits; further
    /// calls before then have no additional effect.
    pub fn awaken(&self) {
        self.lock().wake_pending = true;
        self.item_ready.notify_all();
    }

    /// Permanently refuses further pushes. Buffers already in the ring can still be taken.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            tracing::debug!(pending = inner.slots.len(), "closing command ring");
            inner.closed = true;
        }
        drop(inner);

        self.item_ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// The number of pending buffers.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// The total number of buffers ever accepted.
    pub fn pushed(&self) -> u64 {
        self.lock().next_seq
    }

    fn pop_slot(inner: &mut Inner) -> Option<CommandBuffer> {
        let slot = inner.slots.dequeue()?;
        debug_assert_eq!(slot.seq, inner.next_pop, "command ring reordered a buffer");
        inner.next_pop = slot.seq + 1;

        Some(slot.buffer)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a panic elsewhere can't corrupt it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
