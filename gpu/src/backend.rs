// SPDX-License-Identifier: MPL-2.0

//! The seam between the command stream and a graphics API.

mod null;

use std::fmt;

use latte_gx2::{InvalidValue, Surface, Texture};

use crate::cmd::DecodeError;

pub use null::{Counters, NullBackend};

/// A graphics API implementation.
///
/// The executor translates packets into calls on this trait, all from the driver thread. A
/// buffer's calls are followed by exactly one [`submit`](Backend::submit).
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Called for every register write, after the executor has stored the value.
    fn set_register(&mut self, index: u32, value: u32) -> Result<(), Error>;

    fn set_color_buffer(&mut self, index: u32, surface: &Surface) -> Result<(), Error>;

    fn set_pixel_texture(&mut self, unit: u32, texture: &Texture) -> Result<(), Error>;

    fn clear_color(&mut self, index: u32, rgba: [f32; 4]) -> Result<(), Error>;

    fn draw(&mut self, draw: Draw) -> Result<(), Error>;

    fn swap_buffers(&mut self) -> Result<(), Error>;

    /// Drops any cached copy of guest memory covered by `flush`.
    fn invalidate(&mut self, flush: Flush) -> Result<(), Error>;

    /// Hands all work recorded since the previous call to the device.
    fn submit(&mut self) -> Result<(), Error>;
}

/// A range of guest memory written by one side and about to be read by the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flush {
    /// The CPU wrote the range.
    Cpu { addr: u32, size: u32 },
    /// The GPU wrote the range.
    Gpu { addr: u32, size: u32 },
}

impl Flush {
    pub fn addr(self) -> u32 {
        match self {
            Self::Cpu { addr, .. } | Self::Gpu { addr, .. } => addr,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            Self::Cpu { size, .. } | Self::Gpu { size, .. } => size,
        }
    }

    /// Whether the flushed range intersects `addr..(addr + size)`.
    pub fn overlaps(self, addr: u32, size: u32) -> bool {
        let (a0, a1) = (u64::from(self.addr()), u64::from(self.addr()) + u64::from(self.size()));
        let (b0, b1) = (u64::from(addr), u64::from(addr) + u64::from(size));

        a0 < b1 && b0 < a1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Draw {
    pub primitive: PrimitiveType,
    pub vertex_count: u32,
    pub instance_count: u32,
}

macro_rules! def_primitive_type {
    ($($name:ident = $code:literal),* $(,)?) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum PrimitiveType {
            $($name = $code,)*
        }

        impl PrimitiveType {
            pub fn decode(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

def_primitive_type!(
    PointList = 0x01,
    LineList = 0x02,
    LineStrip = 0x03,
    TriangleList = 0x04,
    TriangleFan = 0x05,
    TriangleStrip = 0x06,
    RectList = 0x11,
    QuadList = 0x13,
);

/// A failure while translating a buffer.
#[derive(Debug)]
pub enum Error {
    Decode(DecodeError),
    InvalidDescriptor(InvalidValue),
    UnknownOpcode(u8),
    /// The backend can't express the requested operation.
    Unsupported(String),
    /// The device is gone; nothing further can be executed.
    DeviceLost(String),
}

impl Error {
    /// Whether the driver must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceLost(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "malformed packet: {}", e),
            Self::InvalidDescriptor(e) => write!(f, "invalid descriptor: {}", e),
            Self::UnknownOpcode(code) => write!(f, "unknown opcode {:#04x}", code),
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
            Self::DeviceLost(reason) => write!(f, "device lost: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::InvalidDescriptor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<InvalidValue> for Error {
    fn from(e: InvalidValue) -> Self {
        Self::InvalidDescriptor(e)
    }
}
