// SPDX-License-Identifier: MPL-2.0

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    spanned::Spanned as _,
    Attribute,
    Data,
    DeriveInput,
    Fields,
    Lit,
    LitInt,
    Meta,
    NestedMeta,
};

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "hardware records cannot be generic",
        ));
    }
    if !has_repr_c(&input.attrs) {
        return Err(syn::Error::new(
            name.span(),
            "hardware records must be `#[repr(C)]`",
        ));
    }

    let size = find_layout_value(&input.attrs, "size")?.ok_or_else(|| {
        syn::Error::new(name.span(), "expected `#[layout(size = ...)]`")
    })?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(name.span(), "only structs have a hardware layout"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(data.fields.span(), "expected named fields"));
    };

    let mut offset_checks = Vec::new();
    let mut field_sizes = Vec::new();
    let mut offset_entries = Vec::new();
    for field in fields.named.iter() {
        // Named fields always have an identifier.
        let ident = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new(field.span(), "expected a named field")
        })?;
        let ty = &field.ty;
        let offset = find_layout_value(&field.attrs, "offset")?.ok_or_else(|| {
            syn::Error::new(ident.span(), "expected `#[layout(offset = ...)]`")
        })?;

        offset_checks.push(quote! {
            assert!(
                ::core::mem::offset_of!(#name, #ident) == #offset,
                concat!("`", stringify!(#name), "::", stringify!(#ident), "` is at the wrong offset"),
            );
        });
        field_sizes.push(quote! { ::core::mem::size_of::<#ty>() });
        offset_entries.push(quote! { (stringify!(#ident), #offset) });
    }

    Ok(quote! {
        const _: () = {
            #(#offset_checks)*
            assert!(
                ::core::mem::size_of::<#name>() == #size,
                concat!("`", stringify!(#name), "` has the wrong size"),
            );
            assert!(
                0 #(+ #field_sizes)* == #size,
                concat!("`", stringify!(#name), "` contains padding"),
            );
        };

        // SAFETY: the assertions above prove that every byte of the record belongs to a field, and
        // every field is itself `Pod`.
        unsafe impl ::bytemuck::Zeroable for #name {}
        unsafe impl ::bytemuck::Pod for #name {}

        impl #name {
            /// The size, in bytes, of this record.
            pub const SIZE: usize = #size;

            /// The name and byte offset of every field, in declaration order.
            pub const FIELD_OFFSETS: &'static [(&'static str, usize)] = &[#(#offset_entries),*];
        }
    })
}

fn has_repr_c(attrs: &[Attribute]) -> bool {
    attrs.iter()
        .filter(|attr| attr.path.is_ident("repr"))
        .filter_map(|attr| attr.parse_meta().ok())
        .any(|meta| match meta {
            Meta::List(list) => list.nested.iter().any(|nested| {
                matches!(nested, NestedMeta::Meta(Meta::Path(path)) if path.is_ident("C"))
            }),
            _ => false,
        })
}

/// Finds `key = <int>` inside any `#[layout(...)]` attribute.
fn find_layout_value(attrs: &[Attribute], key: &str) -> syn::Result<Option<LitInt>> {
    for attr in attrs.iter().filter(|attr| attr.path.is_ident("layout")) {
        let Meta::List(list) = attr.parse_meta()? else {
            return Err(syn::Error::new(attr.span(), "expected `#[layout(key = value)]`"));
        };

        for nested in list.nested.iter() {
            let NestedMeta::Meta(Meta::NameValue(pair)) = nested else {
                return Err(syn::Error::new(nested.span(), "expected `key = value`"));
            };
            if !pair.path.is_ident(key) {
                continue;
            }

            let Lit::Int(value) = &pair.lit else {
                return Err(syn::Error::new(pair.lit.span(), "expected an integer"));
            };

            // Strip any suffix so the literal compares against `usize`.
            let value = LitInt::new(value.base10_digits(), value.span());
            return Ok(Some(value));
        }
    }

    Ok(None)
}
