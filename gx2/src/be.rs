// SPDX-License-Identifier: MPL-2.0

//! Big-endian storage for scalar fields of hardware records.

use std::{cmp::Ordering, fmt};

/// A scalar that can be stored in big-endian byte order.
pub trait Scalar: Copy + 'static {
    /// The raw storage; always a byte array, so its alignment is 1.
    type Bytes: bytemuck::Pod + Default + PartialEq;

    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// A `T` stored in big-endian byte order.
///
/// The value is converted on every [`get`](Be::get) and [`set`](Be::set), so the bytes in memory
/// always match what the guest wrote regardless of the host's byte order.
#[repr(transparent)]
pub struct Be<T: Scalar>(T::Bytes);

impl<T: Scalar> Be<T> {
    pub fn new(value: T) -> Self {
        Self(value.to_be_bytes())
    }

    /// Reads the logical value.
    pub fn get(self) -> T {
        T::from_be_bytes(self.0)
    }

    /// Replaces the logical value.
    pub fn set(&mut self, value: T) {
        self.0 = value.to_be_bytes();
    }

    /// The bytes as they appear in guest memory.
    pub fn to_raw(self) -> T::Bytes {
        self.0
    }

    pub fn from_raw(bytes: T::Bytes) -> Self {
        Self(bytes)
    }
}

impl<T: Scalar> Clone for Be<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Scalar> Copy for Be<T> {}

impl<T: Scalar> Default for Be<T> {
    fn default() -> Self {
        Self(T::Bytes::default())
    }
}

impl<T: Scalar> From<T> for Be<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Scalar + fmt::Debug> fmt::Debug for Be<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.get(), f)
    }
}

impl<T: Scalar + PartialEq> PartialEq for Be<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: Scalar + PartialEq> PartialEq<T> for Be<T> {
    fn eq(&self, other: &T) -> bool {
        self.get() == *other
    }
}

impl<T: Scalar + PartialOrd> PartialOrd<T> for Be<T> {
    fn partial_cmp(&self, other: &T) -> Option<Ordering> {
        self.get().partial_cmp(other)
    }
}

// SAFETY: `Be<T>` is a transparent wrapper around `T::Bytes`, which is `Pod`.
unsafe impl<T: Scalar> bytemuck::Zeroable for Be<T> {}
unsafe impl<T: Scalar> bytemuck::Pod for Be<T> {}
