// SPDX-License-Identifier: MPL-2.0

//! Register indices, in words.

use std::ops::Range;

/// The size of the register file.
pub const COUNT: usize = 0x1_0000;

/// The window written by `SET_CONFIG_REG`.
pub const CONFIG: Range<u32> = 0x2000..0x2c00;

/// The window written by `SET_CONTEXT_REG`.
pub const CONTEXT: Range<u32> = 0xa000..0xa400;

pub const VGT_PRIMITIVE_TYPE: u32 = 0x2256;

/// Checks that `count` registers starting at `base` lie inside `window`.
pub fn check_window(window: &Range<u32>, base: u32, count: usize) -> bool {
    let Ok(count) = u32::try_from(count) else {
        return false;
    };

    window.contains(&base) && base.checked_add(count).map_or(false, |end| end <= window.end)
}
