// SPDX-License-Identifier: MPL-2.0

use latte_proc_macro::Layout;

use crate::{Be, InvalidValue, Surface};

/// A texture: a surface plus the range of mips and slices visible through it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Layout)]
#[layout(size = 0x9c)]
pub struct Texture {
    #[layout(offset = 0x00)]
    pub surface: Surface,
    #[layout(offset = 0x74)]
    pub view_first_mip: Be<u32>,
    #[layout(offset = 0x78)]
    pub view_num_mips: Be<u32>,
    #[layout(offset = 0x7c)]
    pub view_first_slice: Be<u32>,
    #[layout(offset = 0x80)]
    pub view_num_slices: Be<u32>,
    /// Register state derived by the guest library; its encoding is undocumented.
    #[layout(offset = 0x84)]
    _unk0x84: [u8; 24],
}

/// The mips and slices a texture exposes, already clamped to its surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewRange {
    pub first_mip: u32,
    pub num_mips: u32,
    pub first_slice: u32,
    pub num_slices: u32,
}

impl Texture {
    /// Creates a texture that views every mip and slice of `surface`.
    pub fn new(surface: Surface) -> Self {
        let mut texture = Self { surface, ..Default::default() };
        texture.init_defaults();

        texture
    }

    /// Resets the view to cover the whole surface.
    pub fn init_defaults(&mut self) {
        self.view_first_mip.set(0);
        self.view_num_mips.set(self.surface.mip_count());
        self.view_first_slice.set(0);
        self.view_num_slices.set(self.surface.slice_count());
    }

    /// The view range, after checking it against the surface.
    ///
    /// A zero count selects everything from the first mip or slice onwards.
    pub fn view(&self) -> Result<ViewRange, InvalidValue> {
        let mip_count = self.surface.mip_count();
        let slice_count = self.surface.slice_count();

        let first_mip = self.view_first_mip.get();
        if first_mip >= mip_count {
            return Err(InvalidValue { field: "first mip", value: first_mip });
        }
        let first_slice = self.view_first_slice.get();
        if first_slice >= slice_count {
            return Err(InvalidValue { field: "first slice", value: first_slice });
        }

        let num_mips = match self.view_num_mips.get() {
            0 => mip_count - first_mip,
            n if n <= mip_count - first_mip => n,
            n => return Err(InvalidValue { field: "mip count", value: n }),
        };
        let num_slices = match self.view_num_slices.get() {
            0 => slice_count - first_slice,
            n if n <= slice_count - first_slice => n,
            n => return Err(InvalidValue { field: "slice count", value: n }),
        };

        Ok(ViewRange { first_mip, num_mips, first_slice, num_slices })
    }
}
