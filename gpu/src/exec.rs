// SPDX-License-Identifier: MPL-2.0

//! Interpretation of command buffers.

use std::fmt;

use latte_gx2::{Be, Surface, Texture};

use crate::{
    backend::{self, Backend, Draw, Flush, PrimitiveType},
    cmd::{reg, DecodeError, Opcode, Packet, Packets},
};

/// A translation error and the word offset of the packet that raised it.
#[derive(Debug)]
pub struct Fault {
    pub offset: usize,
    pub error: backend::Error,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at word {}: {}", self.offset, self.error)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            registers: vec![0; reg::COUNT].into_boxed_slice(),
            num_instances: 1,
            frames: 0,
            swaps: Vec::new(),
        }
    }
}

/// The register file and draw state shared by all buffers of a session.
///
/// State written by a buffer persists into the next one, including when the buffer fails partway.
pub struct Executor {
    registers: Box<[u32]>,
    num_instances: u32,
    frames: u64,
    /// When each swap not yet collected by [`drain_swaps`](Executor::drain_swaps) completed.
    swaps: Vec<instant::Instant>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f
            .debug_struct("Executor")
            .field("num_instances", &self.num_instances)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, index: u32) -> u32 {
        self.registers.get(index as usize).copied().unwrap_or(0)
    }

    pub fn num_instances(&self) -> u32 {
        self.num_instances
    }

    /// The number of `SWAP_BUFFERS` packets executed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Takes the completion times of the swaps executed since the last call, oldest first.
    pub fn drain_swaps(&mut self) -> std::vec::Drain<'_, instant::Instant> {
        self.swaps.drain(..)
    }

    /// Runs every packet of `words` against `backend`, stopping at the first error.
    ///
    /// This doesn't call [`Backend::submit`]; the caller decides when work is handed over.
    pub fn execute<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        words: &[Be<u32>],
    ) -> Result<(), Fault> {
        for packet in Packets::new(words) {
            let (offset, packet) = packet.map_err(|e| Fault {
                offset: e.offset().unwrap_or(0),
                error: e.into(),
            })?;

            self.execute_packet(backend, packet)
                .map_err(|error| Fault { offset, error })?;
        }

        Ok(())
    }

    fn execute_packet<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        packet: Packet<'_>,
    ) -> Result<(), backend::Error> {
        match packet {
            Packet::Filler => Ok(()),
            Packet::SetRegisters { base, values } => {
                tracing::trace!("type 0: {} registers at {:#06x}", values.len(), base);
                self.write_registers(backend, base, values)
            }
            Packet::Op { opcode, predicate, body } => {
                tracing::trace!("type 3: {:?} ({} words)", opcode, body.len());
                if predicate {
                    // Predication state is never set, so predicated packets always execute.
                    tracing::trace!("ignoring predicate on {:?}", opcode);
                }

                self.execute_op(backend, opcode, body)
            }
        }
    }

    fn execute_op<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        opcode: Opcode,
        body: &[Be<u32>],
    ) -> Result<(), backend::Error> {
        macro_rules! process_opcode {
            (
                $(
                    {
                        name: $name:ident,
                        $(
                            min_len: $min_len:expr,
                        )?
                        fn: $fn:expr $(,)?
                    }
                ),* $(,)?
            ) => {
                match opcode {
                    $(
                        Opcode::$name => {
                            $(
                                if body.len() < $min_len {
                                    return Err(DecodeError::ShortBody {
                                        opcode,
                                        len: body.len(),
                                        needed: $min_len,
                                    }.into());
                                }
                            )?

                            $fn(self, backend, body)
                        }
                    )*
                    Opcode::Unknown(code) => Err(backend::Error::UnknownOpcode(code)),
                }
            };
        }

        process_opcode!(
            {
                name: Nop,
                fn: |_: &mut Self, _: &mut B, _: &[Be<u32>]| Ok(()),
            },
            {
                name: EventWrite,
                min_len: 1,
                fn: |_: &mut Self, _: &mut B, body: &[Be<u32>]| {
                    // Events only matter to queries and timestamps, which aren't emulated.
                    tracing::trace!("event {:#x}", body[0].get());

                    Ok(())
                },
            },
            {
                name: SurfaceSync,
                min_len: 4,
                fn: |_: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    let size = body[1].get() << 8;
                    let addr = body[2].get() << 8;

                    backend.invalidate(Flush::Gpu { addr, size })
                },
            },
            {
                name: NumInstances,
                min_len: 1,
                fn: |this: &mut Self, _: &mut B, body: &[Be<u32>]| {
                    this.num_instances = body[0].get();

                    Ok(())
                },
            },
            {
                name: DrawIndexAuto,
                min_len: 1,
                fn: |this: &mut Self, backend: &mut B, body: &[Be<u32>]| -> Result<(), backend::Error> {
                    let code = this.register(reg::VGT_PRIMITIVE_TYPE);
                    let primitive = PrimitiveType::decode(code).ok_or_else(|| {
                        backend::Error::Unsupported(format!("primitive type {:#x}", code))
                    })?;

                    backend.draw(Draw {
                        primitive,
                        vertex_count: body[0].get(),
                        instance_count: this.num_instances.max(1),
                    })
                },
            },
            {
                name: SetConfigReg,
                min_len: 1,
                fn: |this: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    this.write_window(backend, &reg::CONFIG, body)
                },
            },
            {
                name: SetContextReg,
                min_len: 1,
                fn: |this: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    this.write_window(backend, &reg::CONTEXT, body)
                },
            },
            {
                name: SetColorBuffer,
                min_len: 1 + Surface::SIZE / 4,
                fn: |_: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    let surface: Surface = read_record(&body[1..]);

                    backend.set_color_buffer(body[0].get(), &surface)
                },
            },
            {
                name: ClearColor,
                min_len: 5,
                fn: |_: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    let rgba = [1, 2, 3, 4].map(|idx| f32::from_bits(body[idx].get()));

                    backend.clear_color(body[0].get(), rgba)
                },
            },
            {
                name: SetTexture,
                min_len: 1 + Texture::SIZE / 4,
                fn: |_: &mut Self, backend: &mut B, body: &[Be<u32>]| {
                    let texture: Texture = read_record(&body[1..]);

                    backend.set_pixel_texture(body[0].get(), &texture)
                },
            },
            {
                name: SwapBuffers,
                fn: |this: &mut Self, backend: &mut B, _: &[Be<u32>]| -> Result<(), backend::Error> {
                    backend.swap_buffers()?;
                    this.frames += 1;
                    this.swaps.push(instant::Instant::now());

                    Ok(())
                },
            },
        )
    }

    /// Handles `SET_*_REG`, whose first body word is an offset into `window`.
    fn write_window<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        window: &std::ops::Range<u32>,
        body: &[Be<u32>],
    ) -> Result<(), backend::Error> {
        let values = &body[1..];
        let base = window.start.checked_add(body[0].get());
        match base {
            Some(base) if reg::check_window(window, base, values.len()) => {
                self.write_registers(backend, base, values)
            }
            _ => Err(DecodeError::RegisterOutOfRange {
                index: window.start.wrapping_add(body[0].get()),
                count: values.len(),
            }
            .into()),
        }
    }

    fn write_registers<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        base: u32,
        values: &[Be<u32>],
    ) -> Result<(), backend::Error> {
        let start = base as usize;
        let slots = self
            .registers
            .get_mut(start..(start + values.len()))
            .ok_or(DecodeError::RegisterOutOfRange { index: base, count: values.len() })?;

        for (idx, (slot, value)) in slots.iter_mut().zip(values).enumerate() {
            *slot = value.get();
            backend.set_register(base + idx as u32, value.get())?;
        }

        Ok(())
    }
}

/// Reads a record embedded in a packet body. `words` must hold at least `size_of::<T>()` bytes.
fn read_record<T: bytemuck::Pod>(words: &[Be<u32>]) -> T {
    let bytes: &[u8] = bytemuck::cast_slice(words);

    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()])
}
