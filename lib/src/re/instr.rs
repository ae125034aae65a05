/*!
This module defines the instructions executed by [`crate::re::vm::RegexVm`],
together with the types needed for encoding and decoding them.

Instruction encoding format
---------------------------

Each instruction starts with a one-byte opcode, followed by zero or more
operands. The number, type and size of the operands depend only on the
opcode, see [`Instr::operand_types`].

| Opcode | Mnemonic      | Operands                       |
|--------|---------------|--------------------------------|
| `0x00` | `BRA`         | offset (i16)                   |
| `0x01` | `BSR`         | offset (i16)                   |
| `0x04` | `JMP`         | address (u32)                  |
| `0x05` | `JSR`         | address (u32)                  |
| `0x06` | `RTS`         |                                |
| `0x07` | `ACCEPT`      | token key (u32)                |
| `0x08` | `FORK`        | offset (i16), offset (i16)     |
| `0x09` | `PFORK`       | offset (i16), offset (i16)     |
| `0x0A` | `SKIP`        |                                |
| `0x0B` | `CONSUME`     |                                |
| `0x0E` | `BEGIN_GROUP` | group index (u8)               |
| `0x0F` | `END_GROUP`   | group index (u8)               |
| `0x10` | `TEST_CODE`   | code point (u32)               |
| `0x12` | `TEST_RANGE`  | index of interval (u32)        |
| `0x13` | `TEST_RANGES` | index of interval set (u32)    |

Opcodes `0x02`, `0x03`, `0x0C`, `0x0D` and `0x11` are reserved. Opcodes whose
high nibble is `1` are the ones that test the current input character, after
executing them the thread must wait until the next character is available.

Offsets are relative to the address that follows the operands of the
instruction, addresses are absolute. Multi-byte operands are encoded in the
byte order indicated by [`ByteOrder`].
 */

use serde::{Deserialize, Serialize};

use crate::re::{Error, TokenKey};

/// Offset for branch and fork instructions.
pub type Offset = i16;

/// Absolute address within the bytecode.
pub type Addr = u32;

/// Byte order used for encoding multi-byte operands.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn from_little_endian(yes: bool) -> Self {
        if yes {
            Self::LittleEndian
        } else {
            Self::BigEndian
        }
    }
}

/// Types of the instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Offset,
    Address,
    ByteIndex,
    Index,
    CharacterCode,
    IntegerLiteral,
}

impl OperandType {
    /// Size of the operand in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Offset => 2,
            Self::Address => 4,
            Self::ByteIndex => 1,
            Self::Index => 4,
            Self::CharacterCode => 4,
            Self::IntegerLiteral => 4,
        }
    }
}

/// Instructions supported by the regexp VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    /// Relative branch.
    Bra(Offset),

    /// Relative call to a subroutine. Not supported by the VM.
    Bsr(Offset),

    /// Absolute jump. Not supported by the VM.
    Jmp(Addr),

    /// Absolute call to a subroutine. Pushes a new frame whose return
    /// address is the instruction that follows this one.
    Jsr(Addr),

    /// Returns from a subroutine.
    Rts,

    /// Accepts the token identified by the key, with the text consumed so
    /// far. The thread finishes after this instruction.
    Accept(TokenKey),

    /// Creates a new thread. The current thread continues at `goto`, and
    /// the new thread at `new_thread`. Neither is preferred over the other.
    Fork { goto: Offset, new_thread: Offset },

    /// Same as [`Instr::Fork`], but the current thread is preferred over
    /// the new one.
    PFork { goto: Offset, new_thread: Offset },

    /// Marks that the input consumed since the previous mark must not be
    /// part of the accepted text.
    Skip,

    /// Marks that the input consumed since the previous mark is part of the
    /// accepted text.
    Consume,

    /// Start of a group.
    BeginGroup(u8),

    /// End of a group.
    EndGroup(u8),

    /// Tests whether the current character is the given code point.
    TestCode(u32),

    /// Tests whether the current character is in the interval with the given
    /// index.
    TestRange(u32),

    /// Tests whether the current character is in any of the intervals in the
    /// set with the given index.
    TestRanges(u32),
}

impl Instr {
    pub const BRA: u8 = 0x00;
    pub const BSR: u8 = 0x01;
    pub const JMP: u8 = 0x04;
    pub const JSR: u8 = 0x05;
    pub const RTS: u8 = 0x06;
    pub const ACCEPT: u8 = 0x07;
    pub const FORK: u8 = 0x08;
    pub const PFORK: u8 = 0x09;
    pub const SKIP: u8 = 0x0A;
    pub const CONSUME: u8 = 0x0B;
    pub const BEGIN_GROUP: u8 = 0x0E;
    pub const END_GROUP: u8 = 0x0F;
    pub const TEST_CODE: u8 = 0x10;
    pub const TEST_RANGE: u8 = 0x12;
    pub const TEST_RANGES: u8 = 0x13;

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Bra(_) => Self::BRA,
            Self::Bsr(_) => Self::BSR,
            Self::Jmp(_) => Self::JMP,
            Self::Jsr(_) => Self::JSR,
            Self::Rts => Self::RTS,
            Self::Accept(_) => Self::ACCEPT,
            Self::Fork { .. } => Self::FORK,
            Self::PFork { .. } => Self::PFORK,
            Self::Skip => Self::SKIP,
            Self::Consume => Self::CONSUME,
            Self::BeginGroup(_) => Self::BEGIN_GROUP,
            Self::EndGroup(_) => Self::END_GROUP,
            Self::TestCode(_) => Self::TEST_CODE,
            Self::TestRange(_) => Self::TEST_RANGE,
            Self::TestRanges(_) => Self::TEST_RANGES,
        }
    }

    /// Returns the types of the operands for the given opcode, or `None` if
    /// the opcode is reserved or unknown.
    pub fn operand_types(opcode: u8) -> Option<&'static [OperandType]> {
        use OperandType::*;
        let types: &'static [OperandType] = match opcode {
            Self::BRA | Self::BSR => &[Offset],
            Self::JMP | Self::JSR => &[Address],
            Self::RTS | Self::SKIP | Self::CONSUME => &[],
            Self::ACCEPT => &[IntegerLiteral],
            Self::FORK | Self::PFORK => &[Offset, Offset],
            Self::BEGIN_GROUP | Self::END_GROUP => &[ByteIndex],
            Self::TEST_CODE => &[CharacterCode],
            Self::TEST_RANGE | Self::TEST_RANGES => &[Index],
            _ => return None,
        };
        Some(types)
    }

    /// Size in bytes of the instructions with the given opcode, including
    /// the opcode itself.
    pub fn size_of(opcode: u8) -> Option<usize> {
        Self::operand_types(opcode)
            .map(|types| 1 + types.iter().map(|t| t.size()).sum::<usize>())
    }

    /// Size in bytes of the instruction, including the opcode.
    pub fn size(&self) -> usize {
        // Every variant has a known opcode.
        Self::size_of(self.opcode()).unwrap_or(1)
    }

    pub fn mnemonic(opcode: u8) -> Option<&'static str> {
        let mnemonic = match opcode {
            Self::BRA => "BRA",
            Self::BSR => "BSR",
            Self::JMP => "JMP",
            Self::JSR => "JSR",
            Self::RTS => "RTS",
            Self::ACCEPT => "ACCEPT",
            Self::FORK => "FORK",
            Self::PFORK => "PFORK",
            Self::SKIP => "SKIP",
            Self::CONSUME => "CONSUME",
            Self::BEGIN_GROUP => "BEGIN_GROUP",
            Self::END_GROUP => "END_GROUP",
            Self::TEST_CODE => "TEST_CODE",
            Self::TEST_RANGE => "TEST_RANGE",
            Self::TEST_RANGES => "TEST_RANGES",
            _ => return None,
        };
        Some(mnemonic)
    }

    /// Returns true if the instruction with the given opcode tests the
    /// current input character.
    #[inline]
    pub fn tests_input(opcode: u8) -> bool {
        opcode >> 4 == 1
    }

    /// Appends the encoded instruction to `code`.
    pub fn encode(&self, order: ByteOrder, code: &mut Vec<u8>) {
        code.push(self.opcode());
        match *self {
            Self::Bra(offset) | Self::Bsr(offset) => {
                encode_i16(order, offset, code)
            }
            Self::Jmp(addr) | Self::Jsr(addr) => encode_u32(order, addr, code),
            Self::Accept(value)
            | Self::TestCode(value)
            | Self::TestRange(value)
            | Self::TestRanges(value) => encode_u32(order, value, code),
            Self::Fork { goto, new_thread }
            | Self::PFork { goto, new_thread } => {
                encode_i16(order, goto, code);
                encode_i16(order, new_thread, code);
            }
            Self::BeginGroup(index) | Self::EndGroup(index) => {
                code.push(index)
            }
            Self::Rts | Self::Skip | Self::Consume => {}
        }
    }
}

fn encode_i16(order: ByteOrder, value: i16, code: &mut Vec<u8>) {
    match order {
        ByteOrder::LittleEndian => code.extend(value.to_le_bytes()),
        ByteOrder::BigEndian => code.extend(value.to_be_bytes()),
    }
}

fn encode_u32(order: ByteOrder, value: u32, code: &mut Vec<u8>) {
    match order {
        ByteOrder::LittleEndian => code.extend(value.to_le_bytes()),
        ByteOrder::BigEndian => code.extend(value.to_be_bytes()),
    }
}

/// Parses a slice of bytes that contains VM instructions, returning
/// individual instructions and their addresses.
pub struct InstrParser<'a> {
    code: &'a [u8],
    addr: usize,
    order: ByteOrder,
}

impl<'a> InstrParser<'a> {
    pub fn new(code: &'a [u8], order: ByteOrder) -> Self {
        Self { code, addr: 0, order }
    }

    /// Decodes the instruction at `addr`, returning the instruction and its
    /// size.
    pub fn decode_instr(
        code: &[u8],
        addr: usize,
        order: ByteOrder,
    ) -> Result<(Instr, usize), Error> {
        let opcode =
            *code.get(addr).ok_or(Error::TruncatedInstruction(addr))?;

        let size = Instr::size_of(opcode)
            .ok_or(Error::InvalidOpcode { opcode, addr })?;

        let operands = code
            .get(addr + 1..addr + size)
            .ok_or(Error::TruncatedInstruction(addr))?;

        let instr = match opcode {
            Instr::BRA => Instr::Bra(decode_i16(order, operands)),
            Instr::BSR => Instr::Bsr(decode_i16(order, operands)),
            Instr::JMP => Instr::Jmp(decode_u32(order, operands)),
            Instr::JSR => Instr::Jsr(decode_u32(order, operands)),
            Instr::RTS => Instr::Rts,
            Instr::ACCEPT => Instr::Accept(decode_u32(order, operands)),
            Instr::FORK => Instr::Fork {
                goto: decode_i16(order, operands),
                new_thread: decode_i16(order, &operands[2..]),
            },
            Instr::PFORK => Instr::PFork {
                goto: decode_i16(order, operands),
                new_thread: decode_i16(order, &operands[2..]),
            },
            Instr::SKIP => Instr::Skip,
            Instr::CONSUME => Instr::Consume,
            Instr::BEGIN_GROUP => Instr::BeginGroup(operands[0]),
            Instr::END_GROUP => Instr::EndGroup(operands[0]),
            Instr::TEST_CODE => Instr::TestCode(decode_u32(order, operands)),
            Instr::TEST_RANGE => Instr::TestRange(decode_u32(order, operands)),
            Instr::TEST_RANGES => {
                Instr::TestRanges(decode_u32(order, operands))
            }
            _ => return Err(Error::InvalidOpcode { opcode, addr }),
        };

        Ok((instr, size))
    }
}

/// Decodes an `i16` from the first two bytes of `bytes`. The caller
/// guarantees that the slice is large enough.
fn decode_i16(order: ByteOrder, bytes: &[u8]) -> i16 {
    let bytes = [bytes[0], bytes[1]];
    match order {
        ByteOrder::LittleEndian => i16::from_le_bytes(bytes),
        ByteOrder::BigEndian => i16::from_be_bytes(bytes),
    }
}

/// Decodes an `u32` from the first four bytes of `bytes`. The caller
/// guarantees that the slice is large enough.
fn decode_u32(order: ByteOrder, bytes: &[u8]) -> u32 {
    let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match order {
        ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        ByteOrder::BigEndian => u32::from_be_bytes(bytes),
    }
}

impl<'a> Iterator for InstrParser<'a> {
    type Item = Result<(Instr, usize), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.addr >= self.code.len() {
            return None;
        }
        let addr = self.addr;
        match InstrParser::decode_instr(self.code, addr, self.order) {
            Ok((instr, size)) => {
                self.addr += size;
                Some(Ok((instr, addr)))
            }
            Err(err) => {
                // Stop after the first error.
                self.addr = self.code.len();
                Some(Err(err))
            }
        }
    }
}
