//! Gas accounting.

pub const ZERO: u64 = 0;
pub const BASE: u64 = 2;
pub const VERYLOW: u64 = 3;
pub const LOW: u64 = 5;
pub const MID: u64 = 8;
pub const HIGH: u64 = 10;
pub const JUMPDEST: u64 = 1;
pub const EXT: u64 = 20;

pub const EXP: u64 = 10;
pub const EXP_BYTE: u64 = 10;

pub const KECCAK256: u64 = 30;
pub const KECCAK256WORD: u64 = 6;
pub const COPY: u64 = 3;
pub const MEMORY: u64 = 3;

pub const SLOAD: u64 = 50;
/// Base storage cost. Creating a new slot costs twice as much.
pub const SSTORE_BASE: u64 = 10_000;
/// Refund credited when a slot is cleared.
pub const SSTORE_REFUND: u64 = 15_000;

pub const LOG: u64 = 375;
pub const LOGTOPIC: u64 = 375;
pub const LOGDATA: u64 = 8;

pub const CREATE: u64 = 32_000;
pub const CALL: u64 = 40;
pub const CALLVALUE: u64 = 9_000;
pub const CALL_STIPEND: u64 = 2_300;

/// Returns the number of 32-byte words needed to hold `len` bytes.
#[inline]
pub const fn num_words(len: u64) -> u64 {
    len.saturating_add(31) / 32
}

/// Cost of `len` bytes at `multiple` gas per word.
#[inline]
pub const fn cost_per_word(len: u64, multiple: u64) -> Option<u64> {
    multiple.checked_mul(num_words(len))
}

/// Cost of growing memory from `old_words` to `new_words` words.
#[inline]
pub const fn memory_growth_cost(old_words: u64, new_words: u64) -> Option<u64> {
    if new_words <= old_words {
        return Some(0);
    }
    MEMORY.checked_mul(new_words - old_words)
}

/// The gas counter of a single execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Gas {
    limit: u64,
    remaining: u64,
    refunded: u64,
}

impl Gas {
    /// Creates a new counter with the given limit.
    #[inline]
    pub const fn new(limit: u64) -> Self {
        Self { limit, remaining: limit, refunded: 0 }
    }

    /// Returns the gas limit.
    #[inline]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the remaining gas.
    #[inline]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Returns the spent gas.
    #[inline]
    pub const fn spent(&self) -> u64 {
        self.limit - self.remaining
    }

    /// Returns the accumulated refund.
    #[inline]
    pub const fn refunded(&self) -> u64 {
        self.refunded
    }

    /// Records a cost. Returns `false` and leaves the counter unchanged if there is not enough gas.
    #[inline]
    #[must_use = "out of gas must be handled"]
    pub fn record_cost(&mut self, cost: u64) -> bool {
        match self.remaining.checked_sub(cost) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            }
            None => false,
        }
    }

    /// Credits unused gas, e.g. from a nested call.
    ///
    /// The remaining gas is capped at the limit.
    #[inline]
    pub fn give_back(&mut self, amount: u64) {
        self.remaining = self.remaining.saturating_add(amount).min(self.limit);
    }

    /// Records a storage refund. Refunds do not change the remaining gas.
    #[inline]
    pub fn record_refund(&mut self, amount: u64) {
        self.refunded = self.refunded.saturating_add(amount);
    }
}
