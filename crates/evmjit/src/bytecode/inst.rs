use super::{op, Opcode};
use evmjit_backend::{
    ir::{BinOp, Builtin, Pc, TernOp, UnOp},
    U256,
};
use std::fmt;

/// A decoded instruction.
///
/// One variant per opcode family, carrying the decoded immediate where there is one. Opcodes
/// whose inputs and outputs map one to one onto the parameters and result of an out-of-line
/// helper decode to [`Instruction::Builtin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// `STOP`.
    Stop,
    /// `ISZERO`, `NOT`.
    Unary(UnOp),
    /// Arithmetic, comparison, bitwise and shift operations.
    Binary(BinOp),
    /// `ADDMOD`, `MULMOD`.
    Ternary(TernOp),
    /// An instruction implemented by a builtin.
    Builtin(Builtin),
    /// `POP`.
    Pop,
    /// `SSTORE`. Metered by the compiler before calling the builtin.
    SStore,
    /// `JUMP`.
    Jump,
    /// `JUMPI`.
    JumpI,
    /// `PC`.
    Pc,
    /// `GAS`.
    Gas,
    /// `JUMPDEST`.
    JumpDest,
    /// `PUSH0..=PUSH32` with the zero-padded immediate.
    Push(U256),
    /// `DUP1..=DUP16`, with `n` in `1..=16`.
    Dup(u8),
    /// `SWAP1..=SWAP16`, with `n` in `1..=16`.
    Swap(u8),
    /// `RETURN`.
    Return,
    /// `REVERT`.
    Revert,
    /// `INVALID`.
    Invalid,
    /// `SELFDESTRUCT`.
    SelfDestruct,
    /// An undefined opcode.
    Unknown(u8),
}

impl Instruction {
    /// Decodes an opcode and its immediate data.
    pub fn decode(opcode: u8, imm: Option<&[u8]>) -> Self {
        match opcode {
            op::STOP => Self::Stop,

            op::ADD => Self::Binary(BinOp::Add),
            op::MUL => Self::Binary(BinOp::Mul),
            op::SUB => Self::Binary(BinOp::Sub),
            op::DIV => Self::Binary(BinOp::UDiv),
            op::SDIV => Self::Binary(BinOp::SDiv),
            op::MOD => Self::Binary(BinOp::URem),
            op::SMOD => Self::Binary(BinOp::SRem),
            op::ADDMOD => Self::Ternary(TernOp::AddMod),
            op::MULMOD => Self::Ternary(TernOp::MulMod),
            op::EXP => Self::Builtin(Builtin::Exp),
            op::SIGNEXTEND => Self::Binary(BinOp::SignExtend),

            op::LT => Self::Binary(BinOp::Lt),
            op::GT => Self::Binary(BinOp::Gt),
            op::SLT => Self::Binary(BinOp::SLt),
            op::SGT => Self::Binary(BinOp::SGt),
            op::EQ => Self::Binary(BinOp::Eq),
            op::ISZERO => Self::Unary(UnOp::IsZero),
            op::AND => Self::Binary(BinOp::And),
            op::OR => Self::Binary(BinOp::Or),
            op::XOR => Self::Binary(BinOp::Xor),
            op::NOT => Self::Unary(UnOp::Not),
            op::BYTE => Self::Binary(BinOp::Byte),
            op::SHL => Self::Binary(BinOp::Shl),
            op::SHR => Self::Binary(BinOp::Shr),
            op::SAR => Self::Binary(BinOp::Sar),

            op::KECCAK256 => Self::Builtin(Builtin::Keccak256),

            op::ADDRESS => Self::Builtin(Builtin::Address),
            op::BALANCE => Self::Builtin(Builtin::Balance),
            op::ORIGIN => Self::Builtin(Builtin::Origin),
            op::CALLER => Self::Builtin(Builtin::Caller),
            op::CALLVALUE => Self::Builtin(Builtin::CallValue),
            op::CALLDATALOAD => Self::Builtin(Builtin::CallDataLoad),
            op::CALLDATASIZE => Self::Builtin(Builtin::CallDataSize),
            op::CALLDATACOPY => Self::Builtin(Builtin::CallDataCopy),
            op::CODESIZE => Self::Builtin(Builtin::CodeSize),
            op::CODECOPY => Self::Builtin(Builtin::CodeCopy),
            op::GASPRICE => Self::Builtin(Builtin::GasPrice),
            op::EXTCODESIZE => Self::Builtin(Builtin::ExtCodeSize),
            op::EXTCODECOPY => Self::Builtin(Builtin::ExtCodeCopy),

            op::BLOCKHASH => Self::Builtin(Builtin::BlockHash),
            op::COINBASE => Self::Builtin(Builtin::Coinbase),
            op::TIMESTAMP => Self::Builtin(Builtin::Timestamp),
            op::NUMBER => Self::Builtin(Builtin::Number),
            op::DIFFICULTY => Self::Builtin(Builtin::Difficulty),
            op::GASLIMIT => Self::Builtin(Builtin::GasLimit),

            op::POP => Self::Pop,
            op::MLOAD => Self::Builtin(Builtin::MLoad),
            op::MSTORE => Self::Builtin(Builtin::MStore),
            op::MSTORE8 => Self::Builtin(Builtin::MStore8),
            op::SLOAD => Self::Builtin(Builtin::SLoad),
            op::SSTORE => Self::SStore,
            op::JUMP => Self::Jump,
            op::JUMPI => Self::JumpI,
            op::PC => Self::Pc,
            op::MSIZE => Self::Builtin(Builtin::MSize),
            op::GAS => Self::Gas,
            op::JUMPDEST => Self::JumpDest,

            op::PUSH0..=op::PUSH32 => Self::Push(decode_push(opcode, imm.unwrap_or_default())),
            op::DUP1..=op::DUP16 => Self::Dup(opcode - op::DUP1 + 1),
            op::SWAP1..=op::SWAP16 => Self::Swap(opcode - op::SWAP1 + 1),

            op::LOG0 => Self::Builtin(Builtin::Log0),
            op::LOG1 => Self::Builtin(Builtin::Log1),
            op::LOG2 => Self::Builtin(Builtin::Log2),
            op::LOG3 => Self::Builtin(Builtin::Log3),
            op::LOG4 => Self::Builtin(Builtin::Log4),

            op::CREATE => Self::Builtin(Builtin::Create),
            op::CALL => Self::Builtin(Builtin::Call),
            op::CALLCODE => Self::Builtin(Builtin::CallCode),
            op::RETURN => Self::Return,
            op::DELEGATECALL => Self::Builtin(Builtin::DelegateCall),
            op::STATICCALL => Self::Builtin(Builtin::StaticCall),
            op::REVERT => Self::Revert,
            op::INVALID => Self::Invalid,
            op::SELFDESTRUCT => Self::SelfDestruct,

            _ => Self::Unknown(opcode),
        }
    }
}

/// Decodes a `PUSH` immediate. Bytes missing at the end of the code are zero.
fn decode_push(opcode: u8, imm: &[u8]) -> U256 {
    let len = op::imm_len(opcode) as usize;
    let mut word = [0u8; 32];
    word[32 - len..][..imm.len()].copy_from_slice(imm);
    U256::from_be_bytes(word)
}

/// A single decoded instruction in the bytecode.
#[derive(Clone)]
pub struct InstData<'a> {
    /// The program counter, meaning `code[pc]` is this instruction's opcode.
    pub pc: Pc,
    /// The opcode byte.
    pub opcode: u8,
    /// The immediate data, if any. May be shorter than required at the end of the code.
    pub imm: Option<&'a [u8]>,
    /// The decoded instruction.
    pub inst: Instruction,
    /// Flags.
    pub flags: InstFlags,
}

impl fmt::Debug for InstData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstData")
            .field("pc", &self.pc)
            .field("inst", &self.inst)
            .field("flags", &format_args!("{:?}", self.flags))
            .finish()
    }
}

impl<'a> InstData<'a> {
    /// Decodes an instruction.
    pub fn new(pc: Pc, opcode: Opcode<'a>) -> Self {
        Self {
            pc,
            opcode: opcode.opcode,
            imm: opcode.immediate,
            inst: Instruction::decode(opcode.opcode, opcode.immediate),
            flags: InstFlags::empty(),
        }
    }

    /// Converts this instruction back to a raw opcode.
    #[inline]
    pub const fn to_op(&self) -> Opcode<'a> {
        Opcode { opcode: self.opcode, immediate: self.imm }
    }

    /// Returns the program counter of the next instruction.
    #[inline]
    pub fn next_pc(&self) -> Pc {
        self.pc + 1 + self.imm.map_or(0, <[u8]>::len)
    }

    /// Returns `true` if this instruction is a push instruction.
    #[inline]
    pub const fn is_push(&self) -> bool {
        matches!(self.inst, Instruction::Push(_))
    }

    /// Returns `true` if this instruction is `JUMP` or `JUMPI`.
    #[inline]
    pub const fn is_jump(&self) -> bool {
        matches!(self.inst, Instruction::Jump | Instruction::JumpI)
    }

    /// Returns `true` if this instruction ends a basic block.
    #[inline]
    pub const fn is_block_end(&self) -> bool {
        matches!(
            self.inst,
            Instruction::Stop
                | Instruction::Jump
                | Instruction::JumpI
                | Instruction::Return
                | Instruction::Revert
                | Instruction::Invalid
                | Instruction::SelfDestruct
        )
    }

    /// Returns `true` if execution never continues to the next instruction.
    #[inline]
    pub const fn is_diverging(&self) -> bool {
        match self.inst {
            Instruction::JumpI => false,
            Instruction::Unknown(_) => true,
            _ => self.is_block_end(),
        }
    }

    /// Returns `true` if this instruction is dead code.
    #[inline]
    pub const fn is_dead_code(&self) -> bool {
        self.flags.contains(InstFlags::DEAD_CODE)
    }
}

bitflags::bitflags! {
    /// [`InstData`] flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InstFlags: u8 {
        /// The `JUMP`/`JUMPI` target is known at compile time.
        const STATIC_JUMP = 1 << 0;
        /// The jump target is known to be invalid.
        /// Always returns [`InvalidJump`](evmjit_context::InstructionResult::InvalidJump) when
        /// taken.
        const INVALID_JUMP = 1 << 1;
        /// Don't generate any code.
        const DEAD_CODE = 1 << 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_all() {
        for opcode in 0..=u8::MAX {
            let inst = Instruction::decode(opcode, None);
            let known = op::OPCODE_NAMES[opcode as usize].is_some();
            assert_eq!(!matches!(inst, Instruction::Unknown(_)), known, "{opcode:#04x}");
            if let Instruction::Builtin(builtin) = inst {
                let (inputs, outputs) = op::stack_io(opcode);
                assert_eq!(builtin.num_params(), inputs as usize, "{builtin:?}");
                assert_eq!(builtin.has_result(), outputs == 1, "{builtin:?}");
            }
        }
        assert_eq!(Instruction::decode(op::DUP16, None), Instruction::Dup(16));
        assert_eq!(Instruction::decode(op::SWAP1, None), Instruction::Swap(1));
    }

    #[test]
    fn push_padding() {
        let push = |opcode, imm: &[u8]| Instruction::decode(opcode, Some(imm));
        assert_eq!(Instruction::decode(op::PUSH0, None), Instruction::Push(U256::ZERO));
        assert_eq!(push(op::PUSH1, &[0x69]), Instruction::Push(U256::from(0x69)));
        assert_eq!(push(op::PUSH2, &[0x01, 0x02]), Instruction::Push(U256::from(0x0102)));
        assert_eq!(push(op::PUSH3, &[0x69]), Instruction::Push(U256::from(0x690000)));
        assert_eq!(push(op::PUSH32, &[0xff; 32]), Instruction::Push(U256::MAX));
    }
}
