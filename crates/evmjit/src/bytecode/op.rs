//! Opcode constants of the instruction set.

macro_rules! opcodes {
    ($($val:literal => $name:ident ($inputs:literal, $outputs:literal)),* $(,)?) => {
        $(
            #[doc = concat!("The `", stringify!($name), "` opcode.")]
            pub const $name: u8 = $val;
        )*

        /// Opcode mnemonics, indexed by opcode byte. `None` for undefined opcodes.
        pub const OPCODE_NAMES: [Option<&str>; 256] = {
            let mut names = [None; 256];
            $(names[$val] = Some(stringify!($name));)*
            names
        };

        /// `(inputs, outputs)` of every opcode, indexed by opcode byte.
        const STACK_IO: [(u8, u8); 256] = {
            let mut io = [(0, 0); 256];
            $(io[$val] = ($inputs, $outputs);)*
            io
        };
    };
}

opcodes! {
    0x00 => STOP         (0, 0),
    0x01 => ADD          (2, 1),
    0x02 => MUL          (2, 1),
    0x03 => SUB          (2, 1),
    0x04 => DIV          (2, 1),
    0x05 => SDIV         (2, 1),
    0x06 => MOD          (2, 1),
    0x07 => SMOD         (2, 1),
    0x08 => ADDMOD       (3, 1),
    0x09 => MULMOD       (3, 1),
    0x0a => EXP          (2, 1),
    0x0b => SIGNEXTEND   (2, 1),
    0x10 => LT           (2, 1),
    0x11 => GT           (2, 1),
    0x12 => SLT          (2, 1),
    0x13 => SGT          (2, 1),
    0x14 => EQ           (2, 1),
    0x15 => ISZERO       (1, 1),
    0x16 => AND          (2, 1),
    0x17 => OR           (2, 1),
    0x18 => XOR          (2, 1),
    0x19 => NOT          (1, 1),
    0x1a => BYTE         (2, 1),
    0x1b => SHL          (2, 1),
    0x1c => SHR          (2, 1),
    0x1d => SAR          (2, 1),
    0x20 => KECCAK256    (2, 1),
    0x30 => ADDRESS      (0, 1),
    0x31 => BALANCE      (1, 1),
    0x32 => ORIGIN       (0, 1),
    0x33 => CALLER       (0, 1),
    0x34 => CALLVALUE    (0, 1),
    0x35 => CALLDATALOAD (1, 1),
    0x36 => CALLDATASIZE (0, 1),
    0x37 => CALLDATACOPY (3, 0),
    0x38 => CODESIZE     (0, 1),
    0x39 => CODECOPY     (3, 0),
    0x3a => GASPRICE     (0, 1),
    0x3b => EXTCODESIZE  (1, 1),
    0x3c => EXTCODECOPY  (4, 0),
    0x40 => BLOCKHASH    (1, 1),
    0x41 => COINBASE     (0, 1),
    0x42 => TIMESTAMP    (0, 1),
    0x43 => NUMBER       (0, 1),
    0x44 => DIFFICULTY   (0, 1),
    0x45 => GASLIMIT     (0, 1),
    0x50 => POP          (1, 0),
    0x51 => MLOAD        (1, 1),
    0x52 => MSTORE       (2, 0),
    0x53 => MSTORE8      (2, 0),
    0x54 => SLOAD        (1, 1),
    0x55 => SSTORE       (2, 0),
    0x56 => JUMP         (1, 0),
    0x57 => JUMPI        (2, 0),
    0x58 => PC           (0, 1),
    0x59 => MSIZE        (0, 1),
    0x5a => GAS          (0, 1),
    0x5b => JUMPDEST     (0, 0),
    0x5f => PUSH0        (0, 1),
    0x60 => PUSH1        (0, 1),
    0x61 => PUSH2        (0, 1),
    0x62 => PUSH3        (0, 1),
    0x63 => PUSH4        (0, 1),
    0x64 => PUSH5        (0, 1),
    0x65 => PUSH6        (0, 1),
    0x66 => PUSH7        (0, 1),
    0x67 => PUSH8        (0, 1),
    0x68 => PUSH9        (0, 1),
    0x69 => PUSH10       (0, 1),
    0x6a => PUSH11       (0, 1),
    0x6b => PUSH12       (0, 1),
    0x6c => PUSH13       (0, 1),
    0x6d => PUSH14       (0, 1),
    0x6e => PUSH15       (0, 1),
    0x6f => PUSH16       (0, 1),
    0x70 => PUSH17       (0, 1),
    0x71 => PUSH18       (0, 1),
    0x72 => PUSH19       (0, 1),
    0x73 => PUSH20       (0, 1),
    0x74 => PUSH21       (0, 1),
    0x75 => PUSH22       (0, 1),
    0x76 => PUSH23       (0, 1),
    0x77 => PUSH24       (0, 1),
    0x78 => PUSH25       (0, 1),
    0x79 => PUSH26       (0, 1),
    0x7a => PUSH27       (0, 1),
    0x7b => PUSH28       (0, 1),
    0x7c => PUSH29       (0, 1),
    0x7d => PUSH30       (0, 1),
    0x7e => PUSH31       (0, 1),
    0x7f => PUSH32       (0, 1),
    0x80 => DUP1         (1, 2),
    0x81 => DUP2         (2, 3),
    0x82 => DUP3         (3, 4),
    0x83 => DUP4         (4, 5),
    0x84 => DUP5         (5, 6),
    0x85 => DUP6         (6, 7),
    0x86 => DUP7         (7, 8),
    0x87 => DUP8         (8, 9),
    0x88 => DUP9         (9, 10),
    0x89 => DUP10        (10, 11),
    0x8a => DUP11        (11, 12),
    0x8b => DUP12        (12, 13),
    0x8c => DUP13        (13, 14),
    0x8d => DUP14        (14, 15),
    0x8e => DUP15        (15, 16),
    0x8f => DUP16        (16, 17),
    0x90 => SWAP1        (2, 2),
    0x91 => SWAP2        (3, 3),
    0x92 => SWAP3        (4, 4),
    0x93 => SWAP4        (5, 5),
    0x94 => SWAP5        (6, 6),
    0x95 => SWAP6        (7, 7),
    0x96 => SWAP7        (8, 8),
    0x97 => SWAP8        (9, 9),
    0x98 => SWAP9        (10, 10),
    0x99 => SWAP10       (11, 11),
    0x9a => SWAP11       (12, 12),
    0x9b => SWAP12       (13, 13),
    0x9c => SWAP13       (14, 14),
    0x9d => SWAP14       (15, 15),
    0x9e => SWAP15       (16, 16),
    0x9f => SWAP16       (17, 17),
    0xa0 => LOG0         (2, 0),
    0xa1 => LOG1         (3, 0),
    0xa2 => LOG2         (4, 0),
    0xa3 => LOG3         (5, 0),
    0xa4 => LOG4         (6, 0),
    0xf0 => CREATE       (3, 1),
    0xf1 => CALL         (7, 1),
    0xf2 => CALLCODE     (7, 1),
    0xf3 => RETURN       (2, 0),
    0xf4 => DELEGATECALL (6, 1),
    0xfa => STATICCALL   (6, 1),
    0xfd => REVERT       (2, 0),
    0xfe => INVALID      (0, 0),
    0xff => SELFDESTRUCT (1, 0),
}

/// Alias of [`KECCAK256`].
pub const SHA3: u8 = KECCAK256;
/// Alias of [`BLOCKHASH`].
pub const PREVHASH: u8 = BLOCKHASH;
/// Alias of [`SELFDESTRUCT`].
pub const SUICIDE: u8 = SELFDESTRUCT;

/// Returns the number of input and output stack elements of the given opcode.
///
/// Undefined opcodes have no stack effect.
#[inline]
pub const fn stack_io(op: u8) -> (u8, u8) {
    STACK_IO[op as usize]
}

/// Returns the length of the immediate data of the given opcode, or `0` if none.
#[inline]
pub const fn imm_len(op: u8) -> u8 {
    if op >= PUSH1 && op <= PUSH32 {
        op - PUSH0
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(OPCODE_NAMES[ADD as usize], Some("ADD"));
        assert_eq!(OPCODE_NAMES[0x0c], None);
        assert_eq!(OPCODE_NAMES[SUICIDE as usize], Some("SELFDESTRUCT"));
        assert_eq!(OPCODE_NAMES.iter().flatten().count(), 137);
    }

    #[test]
    fn io() {
        assert_eq!(stack_io(STOP), (0, 0));
        assert_eq!(stack_io(DUP3), (3, 4));
        assert_eq!(stack_io(SWAP16), (17, 17));
        assert_eq!(stack_io(LOG4), (6, 0));
        assert_eq!(stack_io(CALL), (7, 1));
        assert_eq!(stack_io(0xef), (0, 0));
    }

    #[test]
    fn immediates() {
        assert_eq!(imm_len(PUSH0), 0);
        assert_eq!(imm_len(PUSH1), 1);
        assert_eq!(imm_len(PUSH32), 32);
        assert_eq!(imm_len(DUP1), 0);
    }
}
