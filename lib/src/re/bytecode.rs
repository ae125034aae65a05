/*! Compiled program executed by the regexp VM.

A [`Bytecode`] contains the encoded instructions together with the tables
referenced by them: the intervals used by `TEST_RANGE`, and the sets of
intervals used by `TEST_RANGES`. Each set is a list of indexes into the
interval table.
*/

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::re::instr::{ByteOrder, Instr, InstrParser};
use crate::re::intervals::Interval;
use crate::re::Error;

/// Code and tables produced by [`crate::re::emitter::CodeEmitter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytecode {
    intervals: Vec<Interval>,
    interval_sets: Vec<Vec<u32>>,
    byte_order: ByteOrder,
    code: Vec<u8>,
}

impl Bytecode {
    pub(crate) fn new(
        intervals: Vec<Interval>,
        interval_sets: Vec<Vec<u32>>,
        byte_order: ByteOrder,
        code: Vec<u8>,
    ) -> Self {
        Self { intervals, interval_sets, byte_order, code }
    }

    /// The encoded instructions.
    #[inline]
    pub fn code(&self) -> &[u8] {
        self.code.as_slice()
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    #[inline]
    pub fn is_little_endian(&self) -> bool {
        self.byte_order == ByteOrder::LittleEndian
    }

    /// Table of intervals referenced by `TEST_RANGE` instructions.
    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        self.intervals.as_slice()
    }

    /// Table of interval sets referenced by `TEST_RANGES` instructions.
    #[inline]
    pub fn interval_sets(&self) -> &[Vec<u32>] {
        self.interval_sets.as_slice()
    }

    #[inline]
    pub fn interval(&self, index: u32) -> Option<&Interval> {
        self.intervals.get(index as usize)
    }

    /// Returns an iterator over the intervals in the set with the given
    /// index, or `None` if the set doesn't exist. Indexes in the set that
    /// don't correspond to any interval are ignored.
    pub fn interval_set(
        &self,
        index: u32,
    ) -> Option<impl Iterator<Item = &Interval>> {
        let set = self.interval_sets.get(index as usize)?;
        Some(set.iter().filter_map(|i| self.intervals.get(*i as usize)))
    }

    /// Returns an iterator that yields every instruction in the code
    /// together with its address.
    pub fn instructions(&self) -> InstrParser<'_> {
        InstrParser::new(self.code.as_slice(), self.byte_order)
    }

    /// Decodes the instruction at `addr`, returning the instruction and its
    /// size.
    #[inline]
    pub fn decode(&self, addr: usize) -> Result<(Instr, usize), Error> {
        InstrParser::decode_instr(self.code.as_slice(), addr, self.byte_order)
    }
}

/// Computes the target of a relative jump from the address of the jump
/// instruction.
fn target(addr: usize, size: usize, offset: i16) -> isize {
    (addr + size) as isize + offset as isize
}

impl Display for Bytecode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;

        for item in self.instructions() {
            let (instr, addr) = match item {
                Ok(item) => item,
                Err(err) => {
                    writeln!(f, "{}", err)?;
                    break;
                }
            };

            let size = instr.size();
            let mnemonic = Instr::mnemonic(instr.opcode()).unwrap_or("???");

            write!(f, "{:05x}: {}", addr, mnemonic)?;

            match instr {
                Instr::Bra(offset) | Instr::Bsr(offset) => {
                    write!(f, " {:05x}", target(addr, size, offset))?;
                }
                Instr::Jmp(dest) | Instr::Jsr(dest) => {
                    write!(f, " {:05x}", dest)?;
                }
                Instr::Fork { goto, new_thread }
                | Instr::PFork { goto, new_thread } => {
                    write!(
                        f,
                        " {:05x} {:05x}",
                        target(addr, size, goto),
                        target(addr, size, new_thread)
                    )?;
                }
                Instr::Accept(key) => {
                    write!(f, " {}", key)?;
                }
                Instr::BeginGroup(index) | Instr::EndGroup(index) => {
                    write!(f, " {}", index)?;
                }
                Instr::TestCode(c) => {
                    write!(f, " {:#x}", c)?;
                }
                Instr::TestRange(index) => {
                    write!(f, " {}", index)?;
                    if let Some(interval) = self.interval(index) {
                        write!(f, " {}", interval)?;
                    }
                }
                Instr::TestRanges(index) => {
                    write!(f, " {}", index)?;
                    if let Some(set) = self.interval_set(index) {
                        for interval in set {
                            write!(f, " {}", interval)?;
                        }
                    }
                }
                Instr::Rts | Instr::Skip | Instr::Consume => {}
            }

            writeln!(f)?;
        }

        Ok(())
    }
}
