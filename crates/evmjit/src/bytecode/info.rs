use super::op;
use evmjit_context::gas;

/// Opcode information: the static gas cost and a few flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeInfo(u16);

impl OpcodeInfo {
    /// The unknown flag.
    pub const UNKNOWN: u16 = 0b1000_0000_0000_0000;
    /// The dynamic flag.
    pub const DYNAMIC: u16 = 0b0100_0000_0000_0000;
    /// The cost-block-end flag.
    ///
    /// Accumulated static gas is checked right after counting an opcode with this flag, before
    /// its effect runs.
    pub const COST_BLOCK_END: u16 = 0b0010_0000_0000_0000;
    /// The mask for the gas cost.
    pub const MASK: u16 = 0b0001_1111_1111_1111;

    /// Creates a new opcode info with the given gas cost and flags.
    #[inline]
    pub const fn new(gas: u16) -> Self {
        Self(gas)
    }

    /// Returns `true` if the opcode is unknown.
    #[inline]
    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Returns `true` if the gas cost is dynamic.
    #[inline]
    pub const fn is_dynamic(self) -> bool {
        self.0 & Self::DYNAMIC != 0
    }

    /// Returns `true` if the opcode ends a cost block.
    #[inline]
    pub const fn is_cost_block_end(self) -> bool {
        self.0 & Self::COST_BLOCK_END != 0
    }

    /// Returns the base gas cost of the opcode.
    ///
    /// This may not be the final/full gas cost of the opcode as it may also have a dynamic cost.
    #[inline]
    pub const fn base_gas(self) -> u16 {
        self.0 & Self::MASK
    }

    /// Sets the unknown flag.
    #[inline]
    pub fn set_unknown(&mut self) {
        self.0 = Self::UNKNOWN;
    }

    /// Sets the dynamic flag.
    #[inline]
    pub fn set_dynamic(&mut self) {
        self.0 |= Self::DYNAMIC;
    }

    /// Sets or clears the cost-block-end flag.
    #[inline]
    pub fn set_cost_block_end(&mut self, yes: bool) {
        if yes {
            self.0 |= Self::COST_BLOCK_END;
        } else {
            self.0 &= !Self::COST_BLOCK_END;
        }
    }

    /// Sets the gas cost.
    ///
    /// # Panics
    ///
    /// Panics if the gas cost is greater than [`Self::MASK`].
    #[inline]
    #[track_caller]
    pub fn set_gas(&mut self, gas: u16) {
        assert!(gas <= Self::MASK);
        self.0 = (self.0 & !Self::MASK) | (gas & Self::MASK);
    }
}

/// The default opcode info map.
pub static OP_INFO_MAP: [OpcodeInfo; 256] = make_map();

const fn make_map() -> [OpcodeInfo; 256] {
    const DYNAMIC: u16 = OpcodeInfo::DYNAMIC;
    const END: u16 = OpcodeInfo::COST_BLOCK_END;

    let mut map = [OpcodeInfo(OpcodeInfo::UNKNOWN); 256];
    macro_rules! set {
        ($($op:ident = $gas:expr;)*) => {
            $(
                map[op::$op as usize] = OpcodeInfo::new($gas);
            )*
        };
    }
    // [1]: Touches host state, checked before the host is asked.
    // [2]: Dynamic with a base cost. Only the dynamic part is paid in builtins.
    // [3]: The whole cost depends on the current slot value, see `GasMeter::count_sstore`.
    // [4]: Must observe every static cost before it.
    // [5]: The base cost does not fit into the mask and is paid in the builtin.
    set! {
        STOP         = 0;

        ADD          = 3;
        MUL          = 5;
        SUB          = 3;
        DIV          = 5;
        SDIV         = 5;
        MOD          = 5;
        SMOD         = 5;
        ADDMOD       = 8;
        MULMOD       = 8;
        EXP          = 10 | DYNAMIC | END;     // [2]
        SIGNEXTEND   = 5;

        LT           = 3;
        GT           = 3;
        SLT          = 3;
        SGT          = 3;
        EQ           = 3;
        ISZERO       = 3;
        AND          = 3;
        OR           = 3;
        XOR          = 3;
        NOT          = 3;
        BYTE         = 3;
        SHL          = 3;
        SHR          = 3;
        SAR          = 3;

        KECCAK256    = 30 | DYNAMIC | END;     // [2]

        ADDRESS      = 2;
        BALANCE      = 20 | END;               // [1]
        ORIGIN       = 2;
        CALLER       = 2;
        CALLVALUE    = 2;
        CALLDATALOAD = 3;
        CALLDATASIZE = 2;
        CALLDATACOPY = 3 | DYNAMIC | END;      // [2]
        CODESIZE     = 2;
        CODECOPY     = 3 | DYNAMIC | END;      // [2]
        GASPRICE     = 2;
        EXTCODESIZE  = 20 | END;               // [1]
        EXTCODECOPY  = 20 | DYNAMIC | END;     // [2]

        BLOCKHASH    = 20 | END;               // [1]
        COINBASE     = 2;
        TIMESTAMP    = 2;
        NUMBER       = 2;
        DIFFICULTY   = 2;
        GASLIMIT     = 2;

        POP          = 2;
        MLOAD        = 3 | DYNAMIC | END;      // [2]
        MSTORE       = 3 | DYNAMIC | END;      // [2]
        MSTORE8      = 3 | DYNAMIC | END;      // [2]
        SLOAD        = 50 | END;               // [1]
        SSTORE       = DYNAMIC | END;          // [3]
        JUMP         = 8;
        JUMPI        = 10;
        PC           = 2;
        MSIZE        = 2;
        GAS          = 2 | END;                // [4]
        JUMPDEST     = 1;

        PUSH0        = 2;
        PUSH1        = 3;
        PUSH2        = 3;
        PUSH3        = 3;
        PUSH4        = 3;
        PUSH5        = 3;
        PUSH6        = 3;
        PUSH7        = 3;
        PUSH8        = 3;
        PUSH9        = 3;
        PUSH10       = 3;
        PUSH11       = 3;
        PUSH12       = 3;
        PUSH13       = 3;
        PUSH14       = 3;
        PUSH15       = 3;
        PUSH16       = 3;
        PUSH17       = 3;
        PUSH18       = 3;
        PUSH19       = 3;
        PUSH20       = 3;
        PUSH21       = 3;
        PUSH22       = 3;
        PUSH23       = 3;
        PUSH24       = 3;
        PUSH25       = 3;
        PUSH26       = 3;
        PUSH27       = 3;
        PUSH28       = 3;
        PUSH29       = 3;
        PUSH30       = 3;
        PUSH31       = 3;
        PUSH32       = 3;

        DUP1         = 3;
        DUP2         = 3;
        DUP3         = 3;
        DUP4         = 3;
        DUP5         = 3;
        DUP6         = 3;
        DUP7         = 3;
        DUP8         = 3;
        DUP9         = 3;
        DUP10        = 3;
        DUP11        = 3;
        DUP12        = 3;
        DUP13        = 3;
        DUP14        = 3;
        DUP15        = 3;
        DUP16        = 3;

        SWAP1        = 3;
        SWAP2        = 3;
        SWAP3        = 3;
        SWAP4        = 3;
        SWAP5        = 3;
        SWAP6        = 3;
        SWAP7        = 3;
        SWAP8        = 3;
        SWAP9        = 3;
        SWAP10       = 3;
        SWAP11       = 3;
        SWAP12       = 3;
        SWAP13       = 3;
        SWAP14       = 3;
        SWAP15       = 3;
        SWAP16       = 3;

        LOG0         = log_cost(0) | DYNAMIC | END; // [2]
        LOG1         = log_cost(1) | DYNAMIC | END; // [2]
        LOG2         = log_cost(2) | DYNAMIC | END; // [2]
        LOG3         = log_cost(3) | DYNAMIC | END; // [2]
        LOG4         = log_cost(4) | DYNAMIC | END; // [2]

        CREATE       = DYNAMIC | END;          // [5]
        CALL         = 40 | DYNAMIC | END;     // [2]
        CALLCODE     = 40 | DYNAMIC | END;     // [2]
        RETURN       = DYNAMIC | END;
        DELEGATECALL = 40 | DYNAMIC | END;     // [2]
        STATICCALL   = 40 | DYNAMIC | END;     // [2]
        REVERT       = DYNAMIC | END;
        INVALID      = 0;
        SELFDESTRUCT = DYNAMIC | END;
    }
    map
}

const fn log_cost(n: u16) -> u16 {
    (gas::LOG + gas::LOGTOPIC * n as u64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let info = OP_INFO_MAP[op::ADD as usize];
        assert_eq!(info.base_gas(), 3);
        assert!(!info.is_dynamic() && !info.is_cost_block_end());

        let info = OP_INFO_MAP[op::MSTORE as usize];
        assert_eq!(info.base_gas(), 3);
        assert!(info.is_dynamic() && info.is_cost_block_end());

        assert_eq!(OP_INFO_MAP[op::LOG4 as usize].base_gas(), 1875);
        assert!(OP_INFO_MAP[0x0c].is_unknown());
        assert!(!OP_INFO_MAP[op::INVALID as usize].is_unknown());
        assert_eq!(OP_INFO_MAP.iter().filter(|info| !info.is_unknown()).count(), 137);
    }

    #[test]
    fn host_reads_end_cost_blocks() {
        for opcode in [op::BALANCE, op::EXTCODESIZE, op::SLOAD, op::BLOCKHASH] {
            let info = OP_INFO_MAP[opcode as usize];
            assert!(info.is_cost_block_end(), "{}", op::OPCODE_NAMES[opcode as usize].unwrap());
            assert!(!info.is_dynamic());
        }
        assert_eq!(OP_INFO_MAP[op::BLOCKHASH as usize].base_gas(), 20);
    }

    #[test]
    fn setters() {
        let mut info = OP_INFO_MAP[op::SLOAD as usize];
        info.set_gas(800);
        info.set_cost_block_end(false);
        assert_eq!(info.base_gas(), 800);
        assert!(!info.is_cost_block_end());
        info.set_dynamic();
        assert!(info.is_dynamic());
        info.set_unknown();
        assert!(info.is_unknown());
    }
}
