//! Runtime context of functions produced by the EVM bytecode compiler.
//!
//! Compiled functions receive an [`EvmContext`] which owns nothing: the gas counter, the memory and
//! the [`Ext`] host are all borrowed from the caller, so that independent executions never share
//! state.

#![cfg_attr(not(test), warn(unused_extern_crates))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{Address, Bytes, B256, U256};
use core::{fmt, ops::Range};
use std::sync::Arc;

mod ext;
pub use ext::{
    BlockEnv, CallInputs, CallKind, CallOutcome, CreateInputs, CreateOutcome, DummyExt, Ext,
    LogEntry,
};

pub mod gas;
pub use gas::Gas;

mod memory;
pub use memory::{Memory, MEMORY_LIMIT};

mod result;
pub use result::{ExecutionOutcome, ExecutionResult, InstructionResult};

/// Maximum depth of nested calls and creates.
pub const CALL_DEPTH_LIMIT: usize = 1024;

/// Maximum height of the EVM stack.
pub const STACK_LIMIT: usize = 1024;

/// The EVM bytecode compiler runtime context.
pub struct EvmContext<'a> {
    /// The memory.
    pub memory: &'a mut Memory,
    /// The gas.
    pub gas: &'a mut Gas,
    /// The host.
    pub ext: &'a mut dyn Ext,
    /// Depth of the current call frame. The outermost frame has depth 0.
    pub depth: usize,
    /// Whether state modifications are forbidden.
    pub is_static: bool,
    /// The memory range set by `RETURN` or `REVERT`.
    pub return_range: Range<usize>,
}

impl fmt::Debug for EvmContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmContext")
            .field("memory", &self.memory)
            .field("gas", &self.gas)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl<'a> EvmContext<'a> {
    /// Creates a new context.
    #[inline]
    pub fn new(memory: &'a mut Memory, gas: &'a mut Gas, ext: &'a mut dyn Ext) -> Self {
        Self { memory, gas, ext, depth: 0, is_static: false, return_range: 0..0 }
    }
}

/// Everything needed to execute a compiled function once.
pub struct ExecutionEnv<'a> {
    /// The gas budget.
    pub gas_limit: u64,
    /// The host. Call data and code are read through it.
    pub ext: &'a mut dyn Ext,
    /// Depth of the call frame.
    pub depth: usize,
    /// Whether state modifications are forbidden.
    pub is_static: bool,
}

impl fmt::Debug for ExecutionEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEnv")
            .field("gas_limit", &self.gas_limit)
            .field("depth", &self.depth)
            .field("is_static", &self.is_static)
            .finish_non_exhaustive()
    }
}

impl<'a> ExecutionEnv<'a> {
    /// Creates a new top-level environment.
    pub fn new(gas_limit: u64, ext: &'a mut dyn Ext) -> Self {
        Self { gas_limit, ext, depth: 0, is_static: false }
    }
}

/// A function produced by a backend.
pub trait RawEvmFn: fmt::Debug + Send + Sync {
    /// Runs the function to completion.
    fn call(&self, ecx: &mut EvmContext<'_>) -> InstructionResult;
}

/// An EVM bytecode function.
#[derive(Clone, Debug)]
pub struct EvmCompilerFn(Arc<dyn RawEvmFn>);

impl EvmCompilerFn {
    /// Wraps the function.
    #[inline]
    pub fn new(f: impl RawEvmFn + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Calls the function.
    ///
    /// Use of this method is discouraged, as setup and cleanup need to be done manually. See
    /// [`execute`](Self::execute).
    #[inline]
    pub fn call(&self, ecx: &mut EvmContext<'_>) -> InstructionResult {
        self.0.call(ecx)
    }

    /// Executes the function with fresh memory and gas, and decodes the result.
    pub fn execute(&self, env: ExecutionEnv<'_>) -> ExecutionOutcome {
        let mut memory = Memory::new();
        let mut gas = Gas::new(env.gas_limit);
        let mut ecx = EvmContext::new(&mut memory, &mut gas, env.ext);
        ecx.depth = env.depth;
        ecx.is_static = env.is_static;
        let raw = self.call(&mut ecx);
        let return_range = ecx.return_range.clone();
        let result = ExecutionResult::from_raw(raw, return_range.clone());
        let output = match result {
            ExecutionResult::Return { .. } | ExecutionResult::Revert { .. } => {
                Bytes::copy_from_slice(memory.as_slice().get(return_range).unwrap_or_default())
            }
            _ => Bytes::new(),
        };
        ExecutionOutcome {
            result,
            gas_remaining: gas.remaining(),
            gas_limit: gas.limit(),
            gas_refunded: gas.refunded(),
            output,
            memory_size: memory.len(),
        }
    }
}

/// A 256-bit value as exchanged with compiled code: four 64-bit limbs, least significant first.
///
/// The representation does not depend on the host byte order. Conversions to big-endian host
/// words happen in the builtins, right before calling into [`Ext`].
#[repr(C, align(8))]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EvmWord([u64; 4]);

macro_rules! impl_fmt {
    ($($trait:ident),* $(,)?) => {
        $(
            impl fmt::$trait for EvmWord {
                #[inline]
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.to_u256().fmt(f)
                }
            }
        )*
    };
}

impl_fmt!(Debug, Display, LowerHex, UpperHex);

macro_rules! impl_conversions_through_u256 {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for EvmWord {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self::from_u256(U256::from(value))
                }
            }

            impl TryFrom<EvmWord> for $ty {
                type Error = ();

                #[inline]
                fn try_from(value: EvmWord) -> Result<Self, Self::Error> {
                    value.to_u256().try_into().map_err(drop)
                }
            }
        )*
    };
}

impl_conversions_through_u256!(bool, u8, u64, usize);

impl From<U256> for EvmWord {
    #[inline]
    fn from(value: U256) -> Self {
        Self::from_u256(value)
    }
}

impl From<EvmWord> for U256 {
    #[inline]
    fn from(value: EvmWord) -> Self {
        value.to_u256()
    }
}

impl From<Address> for EvmWord {
    #[inline]
    fn from(value: Address) -> Self {
        Self::from_be_bytes(value.into_word().0)
    }
}

impl From<B256> for EvmWord {
    #[inline]
    fn from(value: B256) -> Self {
        Self::from_be_bytes(value.0)
    }
}

impl EvmWord {
    /// The zero value.
    pub const ZERO: Self = Self([0; 4]);

    /// Creates a new value from limbs, least significant first.
    #[inline]
    pub const fn from_limbs(limbs: [u64; 4]) -> Self {
        Self(limbs)
    }

    /// Returns the limbs, least significant first.
    #[inline]
    pub const fn into_limbs(self) -> [u64; 4] {
        self.0
    }

    /// Converts a [`U256`].
    #[inline]
    pub const fn from_u256(value: U256) -> Self {
        Self(*value.as_limbs())
    }

    /// Converts this value to a [`U256`].
    #[inline]
    pub const fn to_u256(self) -> U256 {
        U256::from_limbs(self.0)
    }

    /// Creates a new value from big-endian bytes.
    #[inline]
    pub fn from_be_bytes(x: [u8; 32]) -> Self {
        Self::from_u256(U256::from_be_bytes(x))
    }

    /// Returns the big-endian byte representation.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 32] {
        self.to_u256().to_be_bytes()
    }

    /// Converts this value to a big-endian [`B256`].
    #[inline]
    pub fn to_b256(self) -> B256 {
        B256::from(self.to_be_bytes())
    }

    /// Converts this value to an [`Address`], keeping the low 160 bits.
    #[inline]
    pub fn to_address(self) -> Address {
        Address::from_word(self.to_b256())
    }

    /// Returns `true` if the value is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        (self.0[0] | self.0[1] | self.0[2] | self.0[3]) == 0
    }

    /// Converts to `usize`, returning `None` if the value does not fit.
    #[inline]
    pub const fn to_usize(self) -> Option<usize> {
        if (self.0[1] | self.0[2] | self.0[3]) != 0 || self.0[0] > usize::MAX as u64 {
            return None;
        }
        Some(self.0[0] as usize)
    }

    /// Converts to `u64`, saturating at `u64::MAX`.
    #[inline]
    pub const fn to_u64_saturated(self) -> u64 {
        if (self.0[1] | self.0[2] | self.0[3]) != 0 {
            return u64::MAX;
        }
        self.0[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn word_limbs_are_little_endian() {
        let word = EvmWord::from_u256(U256::from(0x0102_0304_0506_0708_u64) << 64);
        assert_eq!(word.into_limbs(), [0, 0x0102_0304_0506_0708, 0, 0]);
        let mut be = [0u8; 32];
        be[16..24].copy_from_slice(&0x0102_0304_0506_0708_u64.to_be_bytes());
        assert_eq!(word.to_be_bytes(), be);
        assert_eq!(EvmWord::from_be_bytes(be), word);
    }

    #[test]
    fn word_address() {
        let addr = address!("00000000000000000000000000000000000000ba");
        let word = EvmWord::from(addr);
        assert_eq!(word.to_u256(), U256::from(0xba));
        assert_eq!(word.to_address(), addr);

        let dirty = EvmWord::from_u256(U256::MAX);
        assert_eq!(dirty.to_address(), Address::repeat_byte(0xff));
    }

    #[test]
    fn word_usize() {
        assert_eq!(EvmWord::from(69usize).to_usize(), Some(69));
        assert_eq!(EvmWord::from_limbs([0, 1, 0, 0]).to_usize(), None);
        assert_eq!(EvmWord::from_limbs([5, 1, 0, 0]).to_u64_saturated(), u64::MAX);
        assert_eq!(u8::try_from(EvmWord::from(256u64)), Err(()));
    }

    #[derive(Debug)]
    struct ReturnFirstWord;

    impl RawEvmFn for ReturnFirstWord {
        fn call(&self, ecx: &mut EvmContext<'_>) -> InstructionResult {
            if !ecx.gas.record_cost(7) {
                return InstructionResult::OutOfGas;
            }
            let r = ecx.memory.resize(ecx.gas, 0, 32);
            if !r.is_continue() {
                return r;
            }
            ecx.memory.set_word(0, &U256::from(5).to_be_bytes());
            ecx.return_range = 0..32;
            InstructionResult::Return
        }
    }

    #[test]
    fn execute_decodes() {
        let f = EvmCompilerFn::new(ReturnFirstWord);
        let mut ext = DummyExt::default();
        let outcome = f.execute(ExecutionEnv::new(100, &mut ext));
        assert_eq!(outcome.result, ExecutionResult::Return { offset: 0, size: 32 });
        assert_eq!(outcome.output[..], U256::from(5).to_be_bytes::<32>()[..]);
        assert_eq!(outcome.gas_remaining, 100 - 7 - gas::MEMORY);
        assert_eq!(outcome.gas_used(), 7 + gas::MEMORY);
        assert_eq!(outcome.memory_size, 32);

        let outcome = f.execute(ExecutionEnv::new(8, &mut ext));
        assert_eq!(outcome.result, ExecutionResult::OutOfGas);
        assert_eq!(outcome.gas_remaining, 1);
        assert!(outcome.output.is_empty());
    }
}
