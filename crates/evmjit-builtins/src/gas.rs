//! Gas calculation utilities.

use alloy_primitives::U256;

pub use evmjit_context::gas::*;

// These only account for the dynamic part of the cost. The static part is charged by the
// compiled code's cost blocks.

/// `EXP` opcode cost calculation.
#[inline]
pub fn dyn_exp_cost(power: U256) -> Option<u64> {
    let bytes = (power.bit_len() as u64).div_ceil(8);
    EXP_BYTE.checked_mul(bytes)
}

/// `LOG` opcode cost calculation.
#[inline]
pub const fn dyn_log_cost(len: u64) -> Option<u64> {
    LOGDATA.checked_mul(len)
}

/// `KECCAK256` opcode cost calculation.
#[inline]
pub const fn dyn_keccak256_cost(len: u64) -> Option<u64> {
    cost_per_word(len, KECCAK256WORD)
}

/// `*COPY` opcodes cost calculation.
#[inline]
pub const fn dyn_verylowcopy_cost(len: u64) -> Option<u64> {
    cost_per_word(len, COPY)
}
