use crate::{gas, Gas, InstructionResult};
use core::{fmt, ops::Range};

/// Upper bound on the memory size. Larger requests fail with
/// [`InstructionResult::MemoryOOG`].
pub const MEMORY_LIMIT: usize = u32::MAX as usize;

/// EVM linear memory.
///
/// The length is always a multiple of 32: growth is rounded up to whole words, and `MSIZE` reports
/// the rounded size.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Memory {
    data: Vec<u8>,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("len", &self.len())
            .field("data", &alloy_primitives::hex::encode(&self.data))
            .finish()
    }
}

impl Memory {
    /// Creates a new empty memory.
    #[inline]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates a new empty memory with preallocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    /// Returns the logical size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing was touched yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the logical size in words.
    #[inline]
    pub fn words(&self) -> usize {
        self.data.len() / 32
    }

    /// Returns the full contents.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Makes `[offset, offset + len)` resident, charging for any new words first.
    ///
    /// Zero-length ranges are always valid and never grow memory.
    pub fn resize(&mut self, gas: &mut Gas, offset: usize, len: usize) -> InstructionResult {
        if len == 0 {
            return InstructionResult::Continue;
        }
        let Some(end) = offset.checked_add(len) else {
            return InstructionResult::MemoryOOG;
        };
        if end <= self.data.len() {
            return InstructionResult::Continue;
        }
        if end > MEMORY_LIMIT {
            return InstructionResult::MemoryOOG;
        }
        let new_words = gas::num_words(end as u64);
        let Some(cost) = gas::memory_growth_cost(self.words() as u64, new_words) else {
            return InstructionResult::MemoryOOG;
        };
        if !gas.record_cost(cost) {
            return InstructionResult::OutOfGas;
        }
        self.data.resize(new_words as usize * 32, 0);
        InstructionResult::Continue
    }

    /// Returns a slice of resident memory.
    ///
    /// # Panics
    ///
    /// Panics if the range was not made resident with [`resize`](Self::resize).
    #[inline]
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    /// Returns a mutable slice of resident memory.
    ///
    /// # Panics
    ///
    /// Panics if the range was not made resident with [`resize`](Self::resize).
    #[inline]
    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }

    /// Reads a 32-byte word.
    #[inline]
    pub fn get_word(&self, offset: usize) -> [u8; 32] {
        let mut word = [0u8; 32];
        word.copy_from_slice(self.slice(offset..offset + 32));
        word
    }

    /// Writes a 32-byte word.
    #[inline]
    pub fn set_word(&mut self, offset: usize, word: &[u8; 32]) {
        self.slice_mut(offset..offset + 32).copy_from_slice(word);
    }

    /// Writes a single byte.
    #[inline]
    pub fn set_byte(&mut self, offset: usize, byte: u8) {
        self.data[offset] = byte;
    }

    /// Writes `value` at `offset`.
    #[inline]
    pub fn set(&mut self, offset: usize, value: &[u8]) {
        if !value.is_empty() {
            self.slice_mut(offset..offset + value.len()).copy_from_slice(value);
        }
    }

    /// Copies `len` bytes of `data` starting at `data_offset` into memory at `memory_offset`.
    ///
    /// Bytes past the end of `data` are written as zero.
    pub fn set_data(&mut self, memory_offset: usize, data_offset: usize, len: usize, data: &[u8]) {
        let dst = self.slice_mut(memory_offset..memory_offset + len);
        let src = data.get(data_offset..).unwrap_or_default();
        let n = src.len().min(len);
        dst[..n].copy_from_slice(&src[..n]);
        dst[n..].fill(0);
    }
}
