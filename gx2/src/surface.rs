// SPDX-License-Identifier: MPL-2.0

use latte_proc_macro::Layout;

use crate::{AaMode, Be, InvalidValue, SurfaceDim, SurfaceFormat, SurfaceUse, TileMode};

/// The maximum number of mip levels a surface can describe.
pub const MAX_MIP_LEVELS: usize = 14;

/// A surface: the memory image of a texture, color buffer, or depth buffer.
///
/// `image` and `mipmaps` are guest addresses; the record never owns the memory it describes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Layout)]
#[layout(size = 0x74)]
pub struct Surface {
    #[layout(offset = 0x00)]
    pub dim: Be<u32>,
    #[layout(offset = 0x04)]
    pub width: Be<u32>,
    #[layout(offset = 0x08)]
    pub height: Be<u32>,
    #[layout(offset = 0x0c)]
    pub depth: Be<u32>,
    #[layout(offset = 0x10)]
    pub mip_levels: Be<u32>,
    #[layout(offset = 0x14)]
    pub format: Be<u32>,
    #[layout(offset = 0x18)]
    pub aa: Be<u32>,
    #[layout(offset = 0x1c)]
    pub usage: Be<u32>,
    #[layout(offset = 0x20)]
    pub image_size: Be<u32>,
    #[layout(offset = 0x24)]
    pub image: Be<u32>,
    #[layout(offset = 0x28)]
    pub mipmap_size: Be<u32>,
    #[layout(offset = 0x2c)]
    pub mipmaps: Be<u32>,
    #[layout(offset = 0x30)]
    pub tile_mode: Be<u32>,
    #[layout(offset = 0x34)]
    pub swizzle: Be<u32>,
    #[layout(offset = 0x38)]
    pub alignment: Be<u32>,
    #[layout(offset = 0x3c)]
    pub pitch: Be<u32>,
    /// Byte offsets of mip levels 1 and up. Level 1 is relative to `mipmaps`; the rest are
    /// relative to level 1.
    #[layout(offset = 0x40)]
    pub mip_level_offset: [Be<u32>; MAX_MIP_LEVELS - 1],
}

impl Surface {
    pub fn dim(&self) -> Result<SurfaceDim, InvalidValue> {
        SurfaceDim::try_from(self.dim.get())
    }

    pub fn format(&self) -> SurfaceFormat {
        SurfaceFormat(self.format.get())
    }

    pub fn aa(&self) -> Result<AaMode, InvalidValue> {
        AaMode::try_from(self.aa.get())
    }

    pub fn usage(&self) -> SurfaceUse {
        SurfaceUse::from_bits_truncate(self.usage.get())
    }

    pub fn tile_mode(&self) -> Result<TileMode, InvalidValue> {
        TileMode::try_from(self.tile_mode.get())
    }

    /// The number of mip levels, counting the base level. A stored zero means one level.
    pub fn mip_count(&self) -> u32 {
        self.mip_levels.get().max(1)
    }

    /// The number of array slices, or the volume depth for 3D surfaces. A stored zero means one.
    pub fn slice_count(&self) -> u32 {
        self.depth.get().max(1)
    }

    /// The `(width, height, depth)` of mip `level`, never smaller than one in any dimension.
    ///
    /// Array slices don't shrink with the mip level; volume depth does.
    pub fn mip_extent(&self, level: u32) -> (u32, u32, u32) {
        let shrink = |value: u32| value.checked_shr(level).unwrap_or(0).max(1);
        let depth = match self.dim() {
            Ok(SurfaceDim::Texture3d) => shrink(self.depth.get()),
            Ok(dim) if dim.is_array() => self.slice_count(),
            _ => 1,
        };

        (shrink(self.width.get()), shrink(self.height.get()), depth)
    }

    /// Checks the fields a backend needs before it can create a resource for this surface.
    pub fn validate(&self) -> Result<(), InvalidValue> {
        self.dim()?;
        self.aa()?;
        let tile_mode = self.tile_mode()?;

        if self.width.get() == 0 {
            return Err(InvalidValue { field: "surface width", value: 0 });
        }
        if self.height.get() == 0 {
            return Err(InvalidValue { field: "surface height", value: 0 });
        }
        if self.mip_levels.get() as usize > MAX_MIP_LEVELS {
            return Err(InvalidValue { field: "mip level count", value: self.mip_levels.get() });
        }
        // Linear rows are addressed through the pitch directly, so it must cover a full row.
        if tile_mode.is_linear() && self.pitch.get() < self.width.get() {
            return Err(InvalidValue { field: "surface pitch", value: self.pitch.get() });
        }
        if self.format().element_size().is_none() {
            return Err(InvalidValue { field: "surface format", value: self.format.get() });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    fn sample() -> Surface {
        let mut surface = Surface::default();
        surface.dim.set(SurfaceDim::Texture2d.into());
        surface.width.set(1280);
        surface.height.set(720);
        surface.depth.set(1);
        surface.mip_levels.set(3);
        surface.format.set(SurfaceFormat::UNORM_R8_G8_B8_A8.0);
        surface.aa.set(AaMode::X1.into());
        surface.usage.set(SurfaceUse::TEXTURE.bits());
        surface.image_size.set(0x0038_4000);
        surface.image.set(0x1000_0000);
        surface.mipmap_size.set(0x0012_c000);
        surface.mipmaps.set(0x1040_0000);
        surface.tile_mode.set(TileMode::Tiled2dThin1.into());
        surface.swizzle.set(0x0000_0d00);
        surface.alignment.set(0x800);
        surface.pitch.set(1280);
        surface.mip_level_offset[0].set(0);
        surface.mip_level_offset[1].set(0x000e_1000);

        surface
    }

    #[test]
    fn field_offsets_match_hardware() {
        assert_eq!(Surface::SIZE, 0x74);
        assert_eq!(std::mem::size_of::<Surface>(), 0x74);
        assert_eq!(offset_of!(Surface, format), 0x14);
        assert_eq!(offset_of!(Surface, image), 0x24);
        assert_eq!(offset_of!(Surface, pitch), 0x3c);
        assert_eq!(offset_of!(Surface, mip_level_offset), 0x40);
        assert_eq!(Surface::FIELD_OFFSETS.len(), 17);
        assert_eq!(Surface::FIELD_OFFSETS[16], ("mip_level_offset", 0x40));
    }

    #[test]
    fn byte_image_is_big_endian() {
        let surface = sample();
        let bytes = bytemuck::bytes_of(&surface);

        let mut expected = [0u8; 0x74];
        let words: [(usize, u32); 18] = [
            (0x00, 1),
            (0x04, 1280),
            (0x08, 720),
            (0x0c, 1),
            (0x10, 3),
            (0x14, 0x1a),
            (0x18, 0),
            (0x1c, 1),
            (0x20, 0x0038_4000),
            (0x24, 0x1000_0000),
            (0x28, 0x0012_c000),
            (0x2c, 0x1040_0000),
            (0x30, 4),
            (0x34, 0x0000_0d00),
            (0x38, 0x800),
            (0x3c, 1280),
            (0x40, 0),
            (0x44, 0x000e_1000),
        ];
        for (offset, word) in words {
            expected[offset..(offset + 4)].copy_from_slice(&word.to_be_bytes());
        }

        assert_eq!(bytes, &expected[..]);
        assert_eq!(&bytes[0x04..0x08], &[0x00, 0x00, 0x05, 0x00]);
    }

    #[test]
    fn parses_from_guest_bytes() {
        let image = bytemuck::bytes_of(&sample()).to_vec();
        let surface: Surface = bytemuck::pod_read_unaligned(&image);

        assert_eq!(surface.width, 1280);
        assert_eq!(surface.dim(), Ok(SurfaceDim::Texture2d));
        assert_eq!(surface.format(), SurfaceFormat::UNORM_R8_G8_B8_A8);
        assert_eq!(surface.tile_mode(), Ok(TileMode::Tiled2dThin1));
        assert!(surface.validate().is_ok());
    }

    #[test]
    fn only_arrays_and_volumes_have_depth() {
        let mut surface = sample();
        surface.depth.set(6);
        assert_eq!(surface.mip_extent(0), (1280, 720, 1));

        surface.dim.set(SurfaceDim::TextureCube.into());
        assert_eq!(surface.mip_extent(3), (160, 90, 6));
    }

    #[test]
    fn linear_surfaces_need_a_full_pitch() {
        let mut surface = sample();
        surface.tile_mode.set(TileMode::LinearAligned.into());
        surface.pitch.set(640);
        assert_eq!(surface.validate(), Err(InvalidValue { field: "surface pitch", value: 640 }));

        // Tiled surfaces derive their row layout from the tile mode instead.
        surface.tile_mode.set(TileMode::Tiled2dThin1.into());
        assert!(surface.validate().is_ok());
    }

    #[test]
    fn mip_extent_clamps_to_one() {
        let surface = sample();
        assert_eq!(surface.mip_extent(0), (1280, 720, 1));
        assert_eq!(surface.mip_extent(2), (320, 180, 1));
        assert_eq!(surface.mip_extent(12), (1, 1, 1));
        assert_eq!(surface.mip_extent(40), (1, 1, 1));

        let mut volume = sample();
        volume.dim.set(SurfaceDim::Texture3d.into());
        volume.depth.set(8);
        assert_eq!(volume.mip_extent(1), (640, 360, 4));

        let mut array = sample();
        array.dim.set(SurfaceDim::Texture2dArray.into());
        array.depth.set(6);
        assert_eq!(array.mip_extent(1), (640, 360, 6));
    }

    #[test]
    fn validate_rejects_garbage() {
        let mut surface = sample();
        surface.dim.set(42);
        assert_eq!(surface.validate(), Err(InvalidValue { field: "surface dimension", value: 42 }));

        let mut surface = sample();
        surface.width.set(0);
        assert!(surface.validate().is_err());

        let mut surface = sample();
        surface.format.set(0x3e);
        assert!(surface.validate().is_err());
    }
}
