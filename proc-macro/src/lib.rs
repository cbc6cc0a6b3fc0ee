// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod layout;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Pins the byte layout of a hardware record.
///
/// The struct must be `#[repr(C)]` and carry `#[layout(size = N)]`; every field carries
/// `#[layout(offset = N)]`. The derive emits `const` assertions for each field offset, for the
/// total size, and for the absence of padding, so any drift fails the build. Because padding is
/// ruled out at compile time, the derive also implements `bytemuck::Pod` and
/// `bytemuck::Zeroable`.
#[proc_macro_derive(Layout, attributes(layout))]
pub fn derive_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    layout::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
