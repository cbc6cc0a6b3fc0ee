// SPDX-License-Identifier: MPL-2.0

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use latte_gx2::{Surface, Texture};

use super::{Backend, Draw, Error, Flush};

/// Operation counts of a [`NullBackend`], readable from any thread.
#[derive(Debug, Default)]
pub struct Counters {
    pub registers: AtomicU64,
    pub color_buffers: AtomicU64,
    pub textures: AtomicU64,
    pub clears: AtomicU64,
    pub draws: AtomicU64,
    pub vertices: AtomicU64,
    pub swaps: AtomicU64,
    pub invalidations: AtomicU64,
    pub submits: AtomicU64,
}

impl Counters {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Acquire)
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::AcqRel);
    }
}

/// A backend that checks what it is given and draws nothing.
///
/// Invalid descriptors are reported like any other backend would report them, but the device can
/// never be lost.
#[derive(Debug, Default)]
pub struct NullBackend {
    counters: Arc<Counters>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn set_register(&mut self, _: u32, _: u32) -> Result<(), Error> {
        Counters::bump(&self.counters.registers, 1);

        Ok(())
    }

    fn set_color_buffer(&mut self, _: u32, surface: &Surface) -> Result<(), Error> {
        surface.validate()?;
        Counters::bump(&self.counters.color_buffers, 1);

        Ok(())
    }

    fn set_pixel_texture(&mut self, _: u32, texture: &Texture) -> Result<(), Error> {
        texture.surface.validate()?;
        texture.view()?;
        Counters::bump(&self.counters.textures, 1);

        Ok(())
    }

    fn clear_color(&mut self, _: u32, _: [f32; 4]) -> Result<(), Error> {
        Counters::bump(&self.counters.clears, 1);

        Ok(())
    }

    fn draw(&mut self, draw: Draw) -> Result<(), Error> {
        Counters::bump(&self.counters.draws, 1);
        Counters::bump(
            &self.counters.vertices,
            u64::from(draw.vertex_count) * u64::from(draw.instance_count),
        );

        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), Error> {
        Counters::bump(&self.counters.swaps, 1);

        Ok(())
    }

    fn invalidate(&mut self, _: Flush) -> Result<(), Error> {
        Counters::bump(&self.counters.invalidations, 1);

        Ok(())
    }

    fn submit(&mut self) -> Result<(), Error> {
        Counters::bump(&self.counters.submits, 1);

        Ok(())
    }
}
