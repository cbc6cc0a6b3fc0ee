// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware descriptor records.
//!
//! Every record here mirrors a block of guest memory byte for byte: fields are stored big-endian
//! through [`Be`], reserved ranges are explicit byte arrays, and `#[derive(Layout)]` pins every
//! field offset and the total size at compile time. Records can therefore be read straight out of
//! a command stream or guest memory with [`bytemuck`].

pub mod be;
pub mod enums;
pub mod surface;
pub mod texture;

pub use be::Be;
pub use enums::{AaMode, InvalidValue, SurfaceDim, SurfaceFormat, SurfaceUse, TileMode};
pub use surface::Surface;
pub use texture::{Texture, ViewRange};
