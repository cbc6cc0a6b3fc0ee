// SPDX-License-Identifier: MPL-2.0

//! Typed views of the enumerated fields of surface records.

use std::fmt;

use bitflags::bitflags;

/// A raw field value outside the documented set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidValue {
    pub field: &'static str,
    pub value: u32,
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} {:#x}", self.field, self.value)
    }
}

impl std::error::Error for InvalidValue {}

macro_rules! def_raw_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($field:literal) {
            $($variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u32)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),*
        }

        impl TryFrom<u32> for $name {
            type Error = InvalidValue;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)*
                    _ => Err(InvalidValue { field: $field, value }),
                }
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value as u32
            }
        }
    };
}

def_raw_enum! {
    /// The dimensionality of a surface.
    SurfaceDim ("surface dimension") {
        Texture1d = 0,
        Texture2d = 1,
        Texture3d = 2,
        TextureCube = 3,
        Texture1dArray = 4,
        Texture2dArray = 5,
        Texture2dMsaa = 6,
        Texture2dMsaaArray = 7,
    }
}

impl SurfaceDim {
    /// Whether `depth` counts array slices rather than volume depth.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Self::TextureCube | Self::Texture1dArray | Self::Texture2dArray | Self::Texture2dMsaaArray,
        )
    }
}

def_raw_enum! {
    /// Multisample mode.
    AaMode ("anti-aliasing mode") {
        X1 = 0,
        X2 = 1,
        X4 = 2,
        X8 = 3,
    }
}

impl AaMode {
    pub fn sample_count(self) -> u32 {
        1 << (self as u32)
    }
}

def_raw_enum! {
    /// Memory tiling of a surface.
    TileMode ("tile mode") {
        Default = 0x00,
        LinearAligned = 0x01,
        Tiled1dThin1 = 0x02,
        Tiled1dThick = 0x03,
        Tiled2dThin1 = 0x04,
        Tiled2dThin2 = 0x05,
        Tiled2dThin4 = 0x06,
        Tiled2dThick = 0x07,
        Tiled2bThin1 = 0x08,
        Tiled2bThin2 = 0x09,
        Tiled2bThin4 = 0x0a,
        Tiled2bThick = 0x0b,
        Tiled3dThin1 = 0x0c,
        Tiled3dThick = 0x0d,
        Tiled3bThin1 = 0x0e,
        Tiled3bThick = 0x0f,
        LinearSpecial = 0x10,
    }
}

impl TileMode {
    pub fn is_linear(self) -> bool {
        matches!(self, Self::LinearAligned | Self::LinearSpecial)
    }
}

bitflags! {
    /// How a surface may be bound.
    #[derive(Default)]
    pub struct SurfaceUse: u32 {
        const TEXTURE = 1 << 0;
        const COLOR_BUFFER = 1 << 1;
        const DEPTH_BUFFER = 1 << 2;
        const SCAN_BUFFER = 1 << 3;
        const TV = 1 << 31;
    }
}

/// A surface format code.
///
/// The low six bits select the data layout; bits 8 and up select the numeric interpretation
/// (normalized, integer, sRGB, float).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat(pub u32);

impl SurfaceFormat {
    pub const INVALID: Self = Self(0x000);
    pub const UNORM_R8: Self = Self(0x001);
    pub const UNORM_R4_G4: Self = Self(0x002);
    pub const UNORM_R16: Self = Self(0x005);
    pub const UNORM_R8_G8: Self = Self(0x007);
    pub const UNORM_R5_G6_B5: Self = Self(0x008);
    pub const UNORM_R10_G10_B10_A2: Self = Self(0x019);
    pub const UNORM_R8_G8_B8_A8: Self = Self(0x01a);
    pub const UNORM_BC1: Self = Self(0x031);
    pub const UNORM_BC2: Self = Self(0x032);
    pub const UNORM_BC3: Self = Self(0x033);
    pub const UNORM_BC4: Self = Self(0x034);
    pub const UNORM_BC5: Self = Self(0x035);
    pub const UINT_R32: Self = Self(0x10d);
    pub const UINT_R8_G8_B8_A8: Self = Self(0x11a);
    pub const SRGB_R8_G8_B8_A8: Self = Self(0x41a);
    pub const SRGB_BC1: Self = Self(0x431);
    pub const SRGB_BC2: Self = Self(0x432);
    pub const SRGB_BC3: Self = Self(0x433);
    pub const FLOAT_R32: Self = Self(0x80e);
    pub const FLOAT_R16_G16_B16_A16: Self = Self(0x81f);
    pub const FLOAT_R32_G32_B32_A32: Self = Self(0x823);
    pub const FLOAT_D24_S8: Self = Self(0x811);

    /// The data layout, without the numeric interpretation.
    pub fn layout(self) -> u32 {
        self.0 & 0x3f
    }

    pub fn is_srgb(self) -> bool {
        self.0 & 0x400 != 0
    }

    /// Whether the format stores 4x4 compressed blocks.
    pub fn is_compressed(self) -> bool {
        (0x31..=0x35).contains(&self.layout())
    }

    /// The size in bytes of one element: a pixel, or a 4x4 block for compressed formats.
    ///
    /// Returns `None` for layouts this emulator doesn't know.
    pub fn element_size(self) -> Option<u32> {
        let bits = match self.layout() {
            0x01 | 0x02 => 8,
            0x05 | 0x07 | 0x08 => 16,
            0x0d | 0x0e | 0x11 | 0x19 | 0x1a => 32,
            0x1f => 64,
            0x23 => 128,
            0x31 | 0x34 => 64,
            0x32 | 0x33 | 0x35 => 128,
            _ => return None,
        };

        Some(bits / 8)
    }
}

impl fmt::Debug for SurfaceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceFormat({:#05x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_enums_reject_unknown_values() {
        assert_eq!(SurfaceDim::try_from(5), Ok(SurfaceDim::Texture2dArray));
        assert_eq!(
            SurfaceDim::try_from(8),
            Err(InvalidValue { field: "surface dimension", value: 8 }),
        );
        assert_eq!(TileMode::try_from(0x10), Ok(TileMode::LinearSpecial));
        assert!(TileMode::try_from(0x11).is_err());
        assert_eq!(AaMode::X8.sample_count(), 8);
    }

    #[test]
    fn format_queries() {
        assert_eq!(SurfaceFormat::SRGB_R8_G8_B8_A8.layout(), SurfaceFormat::UNORM_R8_G8_B8_A8.layout());
        assert!(SurfaceFormat::SRGB_BC1.is_srgb());
        assert!(SurfaceFormat::SRGB_BC1.is_compressed());
        assert!(!SurfaceFormat::FLOAT_R32.is_compressed());
        assert_eq!(SurfaceFormat::UNORM_BC1.element_size(), Some(8));
        assert_eq!(SurfaceFormat::FLOAT_R32_G32_B32_A32.element_size(), Some(16));
        assert_eq!(SurfaceFormat(0x3e).element_size(), None);
    }

    #[test]
    fn surface_use_keeps_unknown_bits_out() {
        let usage = SurfaceUse::from_bits_truncate(0x8000_0003 | 0x100);
        assert_eq!(usage, SurfaceUse::TEXTURE | SurfaceUse::COLOR_BUFFER | SurfaceUse::TV);
    }
}
