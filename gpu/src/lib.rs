// SPDX-License-Identifier: MPL-2.0

//! The GPU command pipeline.
//!
//! The emulation core pushes [`CommandBuffer`]s onto a [`Ring`]; a [`Driver`] drains the ring on
//! its own thread, runs each buffer's packets through an [`Executor`] against a [`Backend`], and
//! reports every finished buffer through [`Retire`].

pub mod backend;
pub mod cmd;
pub mod driver;
pub mod exec;
pub mod gfx;
pub mod retire;
pub mod ring;

use std::sync::Arc;

use latte_gx2::Be;

pub use backend::{Backend, NullBackend};
pub use driver::{Dispatcher, Driver};
pub use exec::Executor;
pub use retire::{Retire, RetireLog};
pub use ring::{Item, Ring, RingClosed};

/// Correlates a command buffer with the unit of guest work that submitted it.
///
/// The pipeline never looks inside a context; it only hands it back on retirement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Context(pub u64);

impl CommandBuffer {
    /// Wraps a region of guest words. The region stays alive until the buffer is retired and
    /// every clone of it has been dropped.
    pub fn new(words: Arc<[Be<u32>]>, context: Context) -> Self {
        Self { words, context }
    }

    /// Lays out host-order `words` as a guest region would hold them.
    pub fn from_words(words: &[u32], context: Context) -> Self {
        Self::new(words.iter().copied().map(Be::new).collect(), context)
    }

    /// Wraps guest bytes, which must be a whole number of words.
    pub fn from_bytes(bytes: &[u8], context: Context) -> Option<Self> {
        let words: &[Be<u32>] = bytemuck::try_cast_slice(bytes).ok()?;

        Some(Self::new(words.into(), context))
    }
}

/// A reference to a block of encoded packets in guest memory.
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    words: Arc<[Be<u32>]>,
    context: Context,
}

impl CommandBuffer {
    pub fn words(&self) -> &[Be<u32>] {
        &self.words
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Whether this buffer has no words, and so carries no work.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// The guest region backing this buffer.
    pub fn region(&self) -> &Arc<[Be<u32>]> {
        &self.words
    }
}
