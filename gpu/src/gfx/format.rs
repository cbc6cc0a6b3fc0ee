// SPDX-License-Identifier: MPL-2.0

use latte_gx2::{SurfaceDim, SurfaceFormat};
use wgpu::{TextureDimension, TextureFormat, TextureViewDimension};

/// The host format that stores `format` without conversion, if there is one.
pub fn texture_format(format: SurfaceFormat) -> Option<TextureFormat> {
    let srgb = format.is_srgb();
    let format = match format.0 & !0x400 {
        0x001 => TextureFormat::R8Unorm,
        0x007 => TextureFormat::Rg8Unorm,
        0x019 => TextureFormat::Rgb10a2Unorm,
        0x01a if srgb => TextureFormat::Rgba8UnormSrgb,
        0x01a => TextureFormat::Rgba8Unorm,
        0x031 if srgb => TextureFormat::Bc1RgbaUnormSrgb,
        0x031 => TextureFormat::Bc1RgbaUnorm,
        0x032 if srgb => TextureFormat::Bc2RgbaUnormSrgb,
        0x032 => TextureFormat::Bc2RgbaUnorm,
        0x033 if srgb => TextureFormat::Bc3RgbaUnormSrgb,
        0x033 => TextureFormat::Bc3RgbaUnorm,
        0x034 => TextureFormat::Bc4RUnorm,
        0x035 => TextureFormat::Bc5RgUnorm,
        0x10d => TextureFormat::R32Uint,
        0x11a => TextureFormat::Rgba8Uint,
        0x80e => TextureFormat::R32Float,
        0x811 => TextureFormat::Depth24PlusStencil8,
        0x81f => TextureFormat::Rgba16Float,
        0x823 => TextureFormat::Rgba32Float,
        // R4G4, R16 and R5G6B5 have no host equivalent without a conversion pass.
        _ => return None,
    };

    // sRGB only exists for the formats matched with a guard above.
    if srgb && !format.is_srgb() {
        return None;
    }

    Some(format)
}

/// The dimension a resource for `dim` is created with.
pub fn texture_dimension(dim: SurfaceDim) -> TextureDimension {
    match dim {
        SurfaceDim::Texture1d => TextureDimension::D1,
        SurfaceDim::Texture3d => TextureDimension::D3,
        _ => TextureDimension::D2,
    }
}

/// The view dimension a texture of `dim` is sampled through, if the host supports it.
pub fn view_dimension(dim: SurfaceDim) -> Option<TextureViewDimension> {
    match dim {
        SurfaceDim::Texture1d => Some(TextureViewDimension::D1),
        SurfaceDim::Texture2d | SurfaceDim::Texture2dMsaa => Some(TextureViewDimension::D2),
        SurfaceDim::Texture3d => Some(TextureViewDimension::D3),
        SurfaceDim::TextureCube => Some(TextureViewDimension::Cube),
        SurfaceDim::Texture2dArray | SurfaceDim::Texture2dMsaaArray => {
            Some(TextureViewDimension::D2Array)
        }
        SurfaceDim::Texture1dArray => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_color_formats() {
        assert_eq!(
            texture_format(SurfaceFormat::UNORM_R8_G8_B8_A8),
            Some(TextureFormat::Rgba8Unorm),
        );
        assert_eq!(
            texture_format(SurfaceFormat::SRGB_R8_G8_B8_A8),
            Some(TextureFormat::Rgba8UnormSrgb),
        );
        assert_eq!(texture_format(SurfaceFormat::SRGB_BC3), Some(TextureFormat::Bc3RgbaUnormSrgb));
        assert_eq!(
            texture_format(SurfaceFormat::FLOAT_R32_G32_B32_A32),
            Some(TextureFormat::Rgba32Float),
        );
    }

    #[test]
    fn rejects_formats_without_a_host_equivalent() {
        assert_eq!(texture_format(SurfaceFormat::UNORM_R5_G6_B5), None);
        assert_eq!(texture_format(SurfaceFormat::INVALID), None);
        // There is no sRGB variant of a single-channel format.
        assert_eq!(texture_format(SurfaceFormat(0x401)), None);
    }

    #[test]
    fn array_dims_use_array_views() {
        assert_eq!(
            view_dimension(SurfaceDim::Texture2dArray),
            Some(TextureViewDimension::D2Array),
        );
        assert_eq!(texture_dimension(SurfaceDim::TextureCube), TextureDimension::D2);
        assert_eq!(view_dimension(SurfaceDim::Texture1dArray), None);
    }
}
