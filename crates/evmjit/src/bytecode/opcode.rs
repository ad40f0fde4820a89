use super::op::{imm_len, OPCODE_NAMES};
use evmjit_backend::ir::Pc;
use alloy_primitives::hex;
use std::fmt;

/// Decodes raw code into opcodes, yielding each together with its program counter.
///
/// A `PUSH` whose immediate runs past the end of the code yields the bytes that are left, e.g.
/// `PUSH2 0x69` yields `PUSH2, Some([0x69])`. The missing bytes are zero when decoded.
#[derive(Clone, Debug)]
pub struct Opcodes<'a> {
    code: &'a [u8],
    pc: Pc,
}

impl<'a> Opcodes<'a> {
    /// Starts decoding at the beginning of `code`.
    #[inline]
    pub const fn new(code: &'a [u8]) -> Self {
        Self { code, pc: 0 }
    }
}

impl<'a> Iterator for Opcodes<'a> {
    type Item = (Pc, Opcode<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let pc = self.pc;
        let &opcode = self.code.get(pc)?;
        let imm_start = pc + 1;
        let immediate = match imm_len(opcode) as usize {
            0 => None,
            n => Some(&self.code[imm_start..(imm_start + n).min(self.code.len())]),
        };
        self.pc = imm_start + immediate.map_or(0, <[u8]>::len);
        Some((pc, Opcode { opcode, immediate }))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.code.len() - self.pc;
        ((left != 0) as usize, Some(left))
    }
}

impl std::iter::FusedIterator for Opcodes<'_> {}

/// An opcode and its immediate data. Returned by [`Opcodes`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Opcode<'a> {
    /// The opcode.
    pub opcode: u8,
    /// The immediate data, if any.
    pub immediate: Option<&'a [u8]>,
}

impl fmt::Debug for Opcode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Opcode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name)?,
            None => write!(f, "UNKNOWN(0x{:02x})", self.opcode)?,
        }
        if let Some(imm) = self.immediate {
            write!(f, " {}", hex::encode_prefixed(imm))?;
        }
        Ok(())
    }
}

impl Opcode<'_> {
    /// Returns the mnemonic, or `None` for undefined opcodes.
    #[inline]
    pub const fn name(&self) -> Option<&'static str> {
        OPCODE_NAMES[self.opcode as usize]
    }

    /// Returns `true` if this is a `PUSH1..=PUSH32` with fewer immediate bytes than it needs.
    pub fn is_truncated(&self) -> bool {
        self.immediate.is_some_and(|imm| imm.len() < imm_len(self.opcode) as usize)
    }
}

/// Returns a disassembly listing of `code`, one `pc: opcode` line per instruction.
pub fn format_bytecode(code: &[u8]) -> String {
    let width = code.len().saturating_sub(1).max(1).ilog10() as usize + 1;
    let mut s = String::with_capacity(code.len() * 8);
    for (pc, opcode) in Opcodes::new(code) {
        s += &format!("{pc:>width$}: {opcode}");
        if opcode.is_truncated() {
            s += " (truncated)";
        }
        s.push('\n');
    }
    s
}
