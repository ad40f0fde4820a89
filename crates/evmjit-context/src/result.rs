use alloy_primitives::Bytes;
use core::fmt;

/// Raw status returned by a compiled function.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstructionResult {
    /// Execution should continue. Never returned by a finished function.
    #[default]
    Continue = 0x00,
    /// `STOP`, or falling off the end of the code.
    Stop,
    /// `RETURN`. The range is stored in [`EvmContext::return_range`](crate::EvmContext).
    Return,
    /// `SELFDESTRUCT`.
    SelfDestruct,

    /// `REVERT`. The range is stored in [`EvmContext::return_range`](crate::EvmContext).
    Revert = 0x10,
    /// A nested call or create exceeded the call depth limit.
    CallTooDeep,
    /// A nested call or create transferred more value than the balance.
    OutOfFunds,

    /// A gas check failed.
    OutOfGas = 0x50,
    /// Memory growth was too large to be represented or paid for.
    MemoryOOG,
    /// An operand such as a memory offset did not fit into a machine word.
    InvalidOperandOOG,
    /// `INVALID` (`0xfe`).
    InvalidFEOpcode,
    /// An opcode without a definition.
    OpcodeNotFound,
    /// Jump into the immediate data of a `PUSH`.
    InvalidJump,
    /// The runtime stack height exceeded 1024.
    StackOverflow,
    /// The compiled function read below the empty entry stack.
    StackUnderflow,
    /// State modification inside of a `STATICCALL`.
    StateChangeDuringStaticCall,
    /// The host reported an error it could not map onto EVM semantics.
    FatalExternalError,
}

impl InstructionResult {
    /// Returns `true` if execution should continue.
    #[inline]
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Returns `true` if this is a successful halt.
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Stop | Self::Return | Self::SelfDestruct)
    }

    /// Returns `true` if this is a revert.
    #[inline]
    pub const fn is_revert(self) -> bool {
        matches!(self, Self::Revert | Self::CallTooDeep | Self::OutOfFunds)
    }

    /// Returns `true` if this is an error.
    #[inline]
    pub const fn is_error(self) -> bool {
        (self as u8) >= Self::OutOfGas as u8
    }
}

/// The decoded outcome of an execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionResult {
    /// `STOP`, `SELFDESTRUCT`, or the end of the code was reached.
    Stop,
    /// `RETURN` with the given range of memory.
    Return {
        /// Offset into memory. With a zero `size` this is the popped offset, or 0 if it does
        /// not fit in a `usize`.
        offset: usize,
        /// Size of the returned data.
        size: usize,
    },
    /// `REVERT` with the given range of memory.
    Revert {
        /// Offset into memory. With a zero `size` this is the popped offset, or 0 if it does
        /// not fit in a `usize`.
        offset: usize,
        /// Size of the returned data.
        size: usize,
    },
    /// A gas check failed. No state changes after the check were performed.
    OutOfGas,
    /// Any other fatal status.
    Failure(InstructionResult),
}

impl ExecutionResult {
    /// Decodes the raw status of a compiled function.
    ///
    /// `return_range` is only consulted for `Return` and `Revert`.
    pub fn from_raw(result: InstructionResult, return_range: core::ops::Range<usize>) -> Self {
        let offset = return_range.start;
        let size = return_range.len();
        match result {
            InstructionResult::Stop
            | InstructionResult::SelfDestruct
            | InstructionResult::Continue => Self::Stop,
            InstructionResult::Return => Self::Return { offset, size },
            InstructionResult::Revert => Self::Revert { offset, size },
            InstructionResult::OutOfGas
            | InstructionResult::MemoryOOG
            | InstructionResult::InvalidOperandOOG => Self::OutOfGas,
            r => Self::Failure(r),
        }
    }

    /// Returns `true` if the execution halted successfully.
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Stop | Self::Return { .. })
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("stop"),
            Self::Return { offset, size } => write!(f, "return({offset}, {size})"),
            Self::Revert { offset, size } => write!(f, "revert({offset}, {size})"),
            Self::OutOfGas => f.write_str("out of gas"),
            Self::Failure(r) => write!(f, "failure({r:?})"),
        }
    }
}

/// The result of an execution together with the final gas and returned data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// The decoded result.
    pub result: ExecutionResult,
    /// The gas left after execution.
    ///
    /// On [`ExecutionResult::OutOfGas`] this is the value before the failing check.
    pub gas_remaining: u64,
    /// The gas limit the execution started with.
    pub gas_limit: u64,
    /// The accumulated storage refund.
    pub gas_refunded: u64,
    /// Data returned by `RETURN` or `REVERT`, re-sliced from memory.
    pub output: Bytes,
    /// The memory size at the end of execution.
    pub memory_size: usize,
}

impl ExecutionOutcome {
    /// Returns the amount of gas spent.
    #[inline]
    pub const fn gas_used(&self) -> u64 {
        self.gas_limit - self.gas_remaining
    }
}
