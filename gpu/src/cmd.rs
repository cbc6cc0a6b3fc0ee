// SPDX-License-Identifier: MPL-2.0

//! The packet format of command buffers.
//!
//! A buffer is a sequence of packets, each starting with a one-word header whose top two bits
//! select the packet type:
//!
//! - type 0 writes consecutive registers starting at a base index;
//! - type 2 is a one-word filler;
//! - type 3 carries an opcode and a body of one or more words.
//!
//! Type 1 is reserved and never valid.

pub mod encode;
pub mod reg;

use std::fmt;

use latte_gx2::Be;
use latte_util::BitStack as _;

pub use encode::Builder;

/// A malformed packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// A header at word `offset` announces more words than the buffer has left.
    Truncated { offset: usize, needed: usize, available: usize },
    /// A header at word `offset` has the reserved packet type.
    ReservedType { offset: usize },
    /// A type 3 body is shorter than its opcode requires.
    ShortBody { opcode: Opcode, len: usize, needed: usize },
    /// A register write falls outside the register file or its window.
    RegisterOutOfRange { index: u32, count: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset, needed, available } => write!(
                f,
                "packet at word {} needs {} words but only {} remain",
                offset, needed, available,
            ),
            Self::ReservedType { offset } => {
                write!(f, "packet at word {} has the reserved type 1", offset)
            }
            Self::ShortBody { opcode, len, needed } => write!(
                f,
                "{:?} body has {} words, expected at least {}",
                opcode, len, needed,
            ),
            Self::RegisterOutOfRange { index, count } => write!(
                f,
                "write of {} registers at {:#06x} is out of range",
                count, index,
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

impl DecodeError {
    /// The word offset of the offending header, when the error is tied to one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Truncated { offset, .. } | Self::ReservedType { offset } => Some(*offset),
            _ => None,
        }
    }
}

/// The most words one packet can carry after its header.
pub const MAX_COUNT: usize = 1 << 14;

impl Header {
    pub fn decode(mut code: u32) -> Result<Self, u32> {
        // Type 3: predicate, reserved, opcode, count, type.
        // Type 0: base index, count, type.
        let low = code.pop_bits(16);
        let count = code.pop_bits(14) as usize + 1;
        let ty = code.pop_bits(2);

        match ty {
            0 => Ok(Self::Type0 { base: low, count }),
            2 => Ok(Self::Type2),
            3 => {
                let mut low = low;
                let predicate = low.pop_bits(1) != 0;
                low.pop_bits(7);
                let opcode = Opcode::decode(low.pop_bits(8) as u8);

                Ok(Self::Type3 { opcode, count, predicate })
            }
            _ => Err(ty),
        }
    }

    /// Encodes the header.
    ///
    /// # Panics
    ///
    /// Panics if a count is outside `1..=MAX_COUNT` or a type 0 base doesn't fit in 16 bits,
    /// since the header would describe a different packet than the one that follows it.
    pub fn encode(self) -> u32 {
        let mut code = 0;
        match self {
            Self::Type0 { base, count } => {
                assert!((1..=MAX_COUNT).contains(&count), "type 0 packet with {} values", count);
                assert!(base <= 0xffff, "register base {:#x} out of range", base);
                code.push_bits(2, 0);
                code.push_bits(14, count as u32 - 1);
                code.push_bits(16, base);
            }
            Self::Type2 => {
                code.push_bits(2, 2);
                code.push_bits(30, 0);
            }
            Self::Type3 { opcode, count, predicate } => {
                assert!(
                    (1..=MAX_COUNT).contains(&count),
                    "type 3 packet with {} body words",
                    count,
                );
                code.push_bits(2, 3);
                code.push_bits(14, count as u32 - 1);
                code.push_bits(8, opcode.encode().into());
                code.push_bits(7, 0);
                code.push_bits(1, predicate.into());
            }
        }

        code
    }
}

/// A decoded packet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Header {
    /// `count` register values follow, for registers `base..(base + count)`.
    Type0 { base: u32, count: usize },
    Type2,
    /// `count` body words follow.
    Type3 { opcode: Opcode, count: usize, predicate: bool },
}

/// A packet borrowed from a command buffer.
#[derive(Clone, Copy, Debug)]
pub enum Packet<'a> {
    SetRegisters { base: u32, values: &'a [Be<u32>] },
    Filler,
    Op { opcode: Opcode, predicate: bool, body: &'a [Be<u32>] },
}

impl<'a> Packets<'a> {
    pub fn new(words: &'a [Be<u32>]) -> Self {
        Self { words, offset: 0 }
    }
}

/// Iterates over the packets of a buffer, yielding each with the word offset of its header.
///
/// The iterator ends after the first error.
pub struct Packets<'a> {
    words: &'a [Be<u32>],
    offset: usize,
}

impl<'a> Iterator for Packets<'a> {
    type Item = Result<(usize, Packet<'a>), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let header = self.words.get(offset)?.get();
        let rest = &self.words[(offset + 1)..];

        let result = match Header::decode(header) {
            Ok(Header::Type2) => Ok((0, Packet::Filler)),
            Ok(Header::Type0 { base, count }) => Self::take(rest, offset, count)
                .map(|values| (count, Packet::SetRegisters { base, values })),
            Ok(Header::Type3 { opcode, count, predicate }) => Self::take(rest, offset, count)
                .map(|body| (count, Packet::Op { opcode, predicate, body })),
            Err(_) => Err(DecodeError::ReservedType { offset }),
        };

        match result {
            Ok((len, packet)) => {
                self.offset = offset + 1 + len;
                Some(Ok((offset, packet)))
            }
            Err(e) => {
                self.offset = self.words.len();
                Some(Err(e))
            }
        }
    }
}

impl<'a> Packets<'a> {
    fn take(
        rest: &'a [Be<u32>],
        offset: usize,
        count: usize,
    ) -> Result<&'a [Be<u32>], DecodeError> {
        rest.get(..count).ok_or(DecodeError::Truncated {
            offset,
            needed: count,
            available: rest.len(),
        })
    }
}

/// A type 3 opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    SurfaceSync,
    DrawIndexAuto,
    NumInstances,
    EventWrite,
    SetConfigReg,
    SetContextReg,
    // The rest are host-level packets with no hardware equivalent. They carry whole descriptor
    // records so the driver never has to chase guest pointers.
    SetColorBuffer,
    ClearColor,
    SetTexture,
    SwapBuffers,
    Unknown(u8),
}

impl Opcode {
    pub fn decode(code: u8) -> Self {
        match code {
            0x10 => Self::Nop,
            0x2d => Self::DrawIndexAuto,
            0x2f => Self::NumInstances,
            0x43 => Self::SurfaceSync,
            0x46 => Self::EventWrite,
            0x68 => Self::SetConfigReg,
            0x69 => Self::SetContextReg,
            0xe0 => Self::SetColorBuffer,
            0xe1 => Self::ClearColor,
            0xe2 => Self::SetTexture,
            0xe3 => Self::SwapBuffers,
            code => Self::Unknown(code),
        }
    }

    pub fn encode(self) -> u8 {
        match self {
            Self::Nop => 0x10,
            Self::DrawIndexAuto => 0x2d,
            Self::NumInstances => 0x2f,
            Self::SurfaceSync => 0x43,
            Self::EventWrite => 0x46,
            Self::SetConfigReg => 0x68,
            Self::SetContextReg => 0x69,
            Self::SetColorBuffer => 0xe0,
            Self::ClearColor => 0xe1,
            Self::SetTexture => 0xe2,
            Self::SwapBuffers => 0xe3,
            Self::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &[u32]) -> Vec<Be<u32>> {
        raw.iter().copied().map(Be::new).collect()
    }

    #[test]
    fn decodes_known_headers() {
        assert_eq!(
            Header::decode(0xc000_1000),
            Ok(Header::Type3 { opcode: Opcode::Nop, count: 1, predicate: false }),
        );
        assert_eq!(
            Header::decode(0xc001_2d01),
            Ok(Header::Type3 { opcode: Opcode::DrawIndexAuto, count: 2, predicate: true }),
        );
        assert_eq!(Header::decode(0x0002_2256), Ok(Header::Type0 { base: 0x2256, count: 3 }));
        assert_eq!(Header::decode(0x8000_0000), Ok(Header::Type2));
        assert_eq!(Header::decode(0x4000_0000), Err(1));
    }

    #[test]
    fn encode_matches_decode() {
        let headers = [
            Header::Type0 { base: 0xa000, count: 16 },
            Header::Type2,
            Header::Type3 { opcode: Opcode::SetTexture, count: 40, predicate: false },
            Header::Type3 { opcode: Opcode::Unknown(0x99), count: 1, predicate: true },
        ];
        for header in headers {
            assert_eq!(Header::decode(header.encode()), Ok(header));
        }
    }

    #[test]
    fn largest_counts_still_encode() {
        let header = Header::Type3 { opcode: Opcode::Nop, count: MAX_COUNT, predicate: false };
        assert_eq!(Header::decode(header.encode()), Ok(header));
    }

    #[test]
    #[should_panic(expected = "type 0 packet with 0 values")]
    fn empty_register_writes_are_refused() {
        Header::Type0 { base: reg::VGT_PRIMITIVE_TYPE, count: 0 }.encode();
    }

    #[test]
    #[should_panic(expected = "type 3 packet with 16385 body words")]
    fn oversized_bodies_are_refused() {
        Header::Type3 { opcode: Opcode::Nop, count: MAX_COUNT + 1, predicate: false }.encode();
    }

    #[test]
    #[should_panic(expected = "register base 0x10000 out of range")]
    fn wide_register_bases_are_refused() {
        Header::Type0 { base: 0x1_0000, count: 1 }.encode();
    }

    #[test]
    fn opcodes_round_trip_through_their_codes() {
        for code in 0..=u8::MAX {
            assert_eq!(Opcode::decode(code).encode(), code);
        }
    }

    #[test]
    fn walks_a_mixed_buffer() {
        let buffer = words(&[
            0x8000_0000,
            0x0001_2256, 4, 5,
            0xc000_1000, 0,
        ]);
        let packets = Packets::new(&buffer).collect::<Result<Vec<_>, _>>().unwrap();

        assert_eq!(packets.len(), 3);
        assert!(matches!(packets[0], (0, Packet::Filler)));
        match packets[1] {
            (1, Packet::SetRegisters { base, values }) => {
                assert_eq!(base, 0x2256);
                assert_eq!(values.len(), 2);
                assert_eq!(values[1], 5_u32);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(packets[2], (4, Packet::Op { opcode: Opcode::Nop, .. })));
    }

    #[test]
    fn stops_at_a_truncated_packet() {
        let buffer = words(&[0xc000_1000, 0, 0xc003_1000, 0]);
        let mut packets = Packets::new(&buffer);

        assert!(matches!(packets.next(), Some(Ok((0, _)))));
        assert_eq!(
            packets.next().map(|it| it.map(|(offset, _)| offset)),
            Some(Err(DecodeError::Truncated { offset: 2, needed: 4, available: 1 })),
        );
        assert!(packets.next().is_none());
    }

    #[test]
    fn rejects_the_reserved_type() {
        let buffer = words(&[0x4000_0000, 0xc000_1000, 0]);
        let mut packets = Packets::new(&buffer);

        assert!(matches!(
            packets.next(),
            Some(Err(DecodeError::ReservedType { offset: 0 })),
        ));
        assert!(packets.next().is_none());
    }
}
