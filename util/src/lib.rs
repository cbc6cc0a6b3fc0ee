// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

/// An integer treated as a stack of bits.
///
/// Bits are popped from, and pushed onto, the least-significant end. Decoding a packed field is a
/// sequence of [`pop_bits`](BitStack::pop_bits) calls from the lowest field upwards; encoding is
/// the same sequence of [`push_bits`](BitStack::push_bits) calls in reverse.
pub trait BitStack: Sized {
    /// Removes the lowest `count` bits and returns them.
    fn pop_bits(&mut self, count: u32) -> Self;

    /// Shifts the stack up by `count` bits and places the lowest `count` bits of `value` at the
    /// bottom.
    fn push_bits(&mut self, count: u32, value: Self);
}

macro_rules! impl_bit_stack {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BitStack for $ty {
                fn pop_bits(&mut self, count: u32) -> Self {
                    let value = *self & mask::<$ty>(count);
                    *self = self.checked_shr(count).unwrap_or(0);

                    value
                }

                fn push_bits(&mut self, count: u32, value: Self) {
                    *self = self.checked_shl(count).unwrap_or(0) | (value & mask::<$ty>(count));
                }
            }
        )*
    };
}

impl_bit_stack!(u8, u16, u32, u64);

fn mask<T>(count: u32) -> T
where
    T: TryFrom<u64>,
    <T as TryFrom<u64>>::Error: std::fmt::Debug,
{
    let bits = (std::mem::size_of::<T>() * 8) as u32;
    let mask = if count >= bits {
        u64::MAX >> (64 - bits)
    } else {
        (1u64 << count) - 1
    };

    // `mask` never exceeds the width of `T`.
    T::try_from(mask).unwrap_or_else(|_| unreachable!())
}

/// Writes `words` as a hex dump, one word per line, prefixed by the index of the first word of
/// each line relative to `base`.
pub fn dump_words(w: &mut impl io::Write, base: usize, words: &[u32]) -> io::Result<()> {
    for (idx, word) in words.iter().enumerate() {
        let bytes = word.to_be_bytes();
        writeln!(
            w,
            "{:06x}   {}   {}",
            base + idx,
            bytes
                .iter()
                .map(|byte| format!("{:02x}", byte))
                .collect::<Vec<String>>()
                .join(" "),
            bytes
                .iter()
                .map(|byte| {
                    if byte.is_ascii_graphic() {
                        char::from(*byte)
                    } else {
                        '.'
                    }
                })
                .collect::<String>(),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_takes_lowest_bits_first() {
        let mut code: u32 = 0xc012_3456;
        assert_eq!(code.pop_bits(16), 0x3456);
        assert_eq!(code.pop_bits(14), 0x0012);
        assert_eq!(code.pop_bits(2), 0b11);
        assert_eq!(code, 0);
    }

    #[test]
    fn push_then_pop_restores_fields() {
        for _ in 0..1000 {
            let hi: u32 = rand::random::<u32>() & 0xff;
            let lo: u32 = rand::random::<u32>() & 0xff_ffff;

            let mut code = 0u32;
            code.push_bits(8, hi);
            code.push_bits(24, lo);

            assert_eq!(code.pop_bits(24), lo);
            assert_eq!(code.pop_bits(8), hi);
        }
    }

    #[test]
    fn full_width_pop_empties_the_stack() {
        let mut code: u16 = 0xbeef;
        assert_eq!(code.pop_bits(16), 0xbeef);
        assert_eq!(code, 0);
    }

    #[test]
    fn dump_shows_big_endian_bytes() {
        let mut out = Vec::new();
        dump_words(&mut out, 0x10, &[0x4142_0001]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "000010   41 42 00 01   AB..\n");
    }
}
