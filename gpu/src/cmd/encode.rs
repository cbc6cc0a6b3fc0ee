// SPDX-License-Identifier: MPL-2.0

use latte_gx2::{Be, Surface, Texture};

use super::{reg, Header, Opcode};
use crate::{CommandBuffer, Context};

/// Emits packets into a command buffer.
///
/// Methods append one packet each and can be chained:
///
/// ```
/// use latte_gpu::{cmd::Builder, Context};
///
/// let buffer = Builder::new()
///     .clear_color(0, [0.0, 0.0, 0.0, 1.0])
///     .swap_buffers()
///     .into_buffer(Context(1));
/// assert_eq!(buffer.num_words(), 8);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Builder {
    words: Vec<u32>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `values` to the registers starting at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty or longer than [`MAX_COUNT`](super::MAX_COUNT), or if `base`
    /// doesn't fit in 16 bits.
    pub fn type0(mut self, base: u32, values: &[u32]) -> Self {
        self.words.push(Header::Type0 { base, count: values.len() }.encode());
        self.words.extend_from_slice(values);

        self
    }

    pub fn filler(mut self) -> Self {
        self.words.push(Header::Type2.encode());

        self
    }

    /// Emits a type 3 packet. The header can't describe an empty body, so an empty `body` is
    /// padded with a zero word.
    ///
    /// # Panics
    ///
    /// Panics if `body` is longer than [`MAX_COUNT`](super::MAX_COUNT).
    pub fn type3(mut self, opcode: Opcode, body: &[u32]) -> Self {
        let body = if body.is_empty() { &[0][..] } else { body };
        self.words.push(Header::Type3 { opcode, count: body.len(), predicate: false }.encode());
        self.words.extend_from_slice(body);

        self
    }

    pub fn nop(self) -> Self {
        self.type3(Opcode::Nop, &[])
    }

    /// Writes `values` starting at config register `index`.
    pub fn set_config_reg(self, index: u32, values: &[u32]) -> Self {
        self.set_reg(Opcode::SetConfigReg, reg::CONFIG.start, index, values)
    }

    /// Writes `values` starting at context register `index`.
    pub fn set_context_reg(self, index: u32, values: &[u32]) -> Self {
        self.set_reg(Opcode::SetContextReg, reg::CONTEXT.start, index, values)
    }

    fn set_reg(self, opcode: Opcode, window: u32, index: u32, values: &[u32]) -> Self {
        let mut body = Vec::with_capacity(1 + values.len());
        body.push(index.wrapping_sub(window));
        body.extend_from_slice(values);

        self.type3(opcode, &body)
    }

    /// Draws `vertex_count` auto-generated vertices of the current primitive type.
    pub fn draw_auto(self, vertex_count: u32) -> Self {
        self.type3(Opcode::DrawIndexAuto, &[vertex_count, 0])
    }

    pub fn num_instances(self, count: u32) -> Self {
        self.type3(Opcode::NumInstances, &[count])
    }

    pub fn surface_sync(self, base: u32, size: u32) -> Self {
        // Base and size travel in 256-byte units.
        self.type3(Opcode::SurfaceSync, &[0, size >> 8, base >> 8, 10])
    }

    pub fn event_write(self, event: u32) -> Self {
        self.type3(Opcode::EventWrite, &[event])
    }

    pub fn set_color_buffer(self, index: u32, surface: &Surface) -> Self {
        self.type3_with_record(Opcode::SetColorBuffer, index, surface)
    }

    pub fn clear_color(self, index: u32, rgba: [f32; 4]) -> Self {
        let [r, g, b, a] = rgba.map(f32::to_bits);

        self.type3(Opcode::ClearColor, &[index, r, g, b, a])
    }

    pub fn set_pixel_texture(self, unit: u32, texture: &Texture) -> Self {
        self.type3_with_record(Opcode::SetTexture, unit, texture)
    }

    pub fn swap_buffers(self) -> Self {
        self.type3(Opcode::SwapBuffers, &[])
    }

    /// Appends words as-is.
    pub fn raw(mut self, words: &[u32]) -> Self {
        self.words.extend_from_slice(words);

        self
    }

    fn type3_with_record<T: bytemuck::Pod>(self, opcode: Opcode, slot: u32, record: &T) -> Self {
        // Records are already in guest byte order.
        let record: &[Be<u32>] = bytemuck::cast_slice(bytemuck::bytes_of(record));
        let mut body = Vec::with_capacity(1 + record.len());
        body.push(slot);
        body.extend(record.iter().map(|word| word.get()));

        self.type3(opcode, &body)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn finish(self) -> Vec<u32> {
        self.words
    }

    pub fn into_buffer(self, context: Context) -> CommandBuffer {
        CommandBuffer::from_words(&self.words, context)
    }
}
