//! Out-of-line helpers called by compiled EVM code.
//!
//! Every builtin takes its operands as [`EvmWord`]s in the order the EVM pops them, and returns
//! `Err` with the halting status on failure. This crate is the only place where words are
//! converted to and from the host types of [`Ext`](evmjit_context::Ext).

#![allow(missing_docs)]
#![cfg_attr(not(test), warn(unused_extern_crates))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

use alloy_primitives::{Bytes, U256};
use evmjit_context::{
    CallInputs, CallKind, CreateInputs, EvmContext, EvmWord, InstructionResult, LogEntry,
    CALL_DEPTH_LIMIT,
};

#[macro_use]
mod macros;

pub mod gas;

mod ir;
pub use ir::*;

mod utils;
use utils::*;

/// The result of a builtin. `Err` halts the compiled function with the given status.
pub type BuiltinResult<T = ()> = Result<T, InstructionResult>;

pub fn mload(ecx: &mut EvmContext<'_>, offset: EvmWord) -> BuiltinResult<EvmWord> {
    let offset = try_into_usize!(offset);
    ensure_memory!(ecx, offset, 32);
    Ok(EvmWord::from_be_bytes(ecx.memory.get_word(offset)))
}

pub fn mstore(ecx: &mut EvmContext<'_>, offset: EvmWord, value: EvmWord) -> BuiltinResult {
    let offset = try_into_usize!(offset);
    ensure_memory!(ecx, offset, 32);
    ecx.memory.set_word(offset, &value.to_be_bytes());
    Ok(())
}

pub fn mstore8(ecx: &mut EvmContext<'_>, offset: EvmWord, value: EvmWord) -> BuiltinResult {
    let offset = try_into_usize!(offset);
    ensure_memory!(ecx, offset, 1);
    ecx.memory.set_byte(offset, value.into_limbs()[0] as u8);
    Ok(())
}

pub fn msize(ecx: &mut EvmContext<'_>) -> BuiltinResult<EvmWord> {
    Ok(ecx.memory.len().into())
}

/// Makes `[offset, offset + len)` resident. Used before `RETURN` and `REVERT`.
pub fn memory_require(ecx: &mut EvmContext<'_>, offset: EvmWord, len: EvmWord) -> BuiltinResult {
    memory_range(ecx.memory, ecx.gas, offset, len).map(drop)
}

pub fn keccak256(ecx: &mut EvmContext<'_>, offset: EvmWord, len: EvmWord) -> BuiltinResult<EvmWord> {
    let n = try_into_usize!(len);
    gas_opt!(ecx, gas::dyn_keccak256_cost(n as u64));
    let range = memory_range(ecx.memory, ecx.gas, offset, len)?;
    Ok(ecx.ext.sha3(ecx.memory.slice(range)).into())
}

pub fn exp(ecx: &mut EvmContext<'_>, base: EvmWord, exponent: EvmWord) -> BuiltinResult<EvmWord> {
    let exponent = exponent.to_u256();
    gas_opt!(ecx, gas::dyn_exp_cost(exponent));
    Ok(base.to_u256().wrapping_pow(exponent).into())
}

macro_rules! env_getters {
    ($($name:ident => |$ext:ident| $e:expr),* $(,)?) => {
        $(
            pub fn $name(ecx: &mut EvmContext<'_>) -> BuiltinResult<EvmWord> {
                let $ext = &*ecx.ext;
                Ok($e.into())
            }
        )*
    };
}

env_getters! {
    address => |ext| ext.address(),
    origin => |ext| ext.origin(),
    caller => |ext| ext.caller(),
    callvalue => |ext| ext.call_value(),
    calldatasize => |ext| ext.call_data().len(),
    codesize => |ext| ext.code().len(),
    gasprice => |ext| ext.gas_price(),
    coinbase => |ext| ext.coinbase(),
    timestamp => |ext| ext.timestamp(),
    number => |ext| ext.number(),
    difficulty => |ext| ext.difficulty(),
    gaslimit => |ext| ext.gas_limit(),
}

pub fn balance(ecx: &mut EvmContext<'_>, address: EvmWord) -> BuiltinResult<EvmWord> {
    Ok(ecx.ext.balance(address.to_address()).into())
}

pub fn calldataload(ecx: &mut EvmContext<'_>, offset: EvmWord) -> BuiltinResult<EvmWord> {
    Ok(EvmWord::from_be_bytes(read_padded(ecx.ext.call_data(), offset)))
}

pub fn extcodesize(ecx: &mut EvmContext<'_>, address: EvmWord) -> BuiltinResult<EvmWord> {
    Ok(ecx.ext.ext_code(address.to_address()).len().into())
}

/// Only the 256 most recent complete blocks are available. Anything else is zero.
pub fn blockhash(ecx: &mut EvmContext<'_>, number: EvmWord) -> BuiltinResult<EvmWord> {
    let number = number.to_u256();
    let available = match ecx.ext.number().checked_sub(number) {
        Some(diff) => !diff.is_zero() && diff <= U256::from(256),
        None => false,
    };
    if !available {
        return Ok(EvmWord::ZERO);
    }
    Ok(ecx.ext.block_hash(number.saturating_to::<u64>()).into())
}

pub fn calldatacopy(
    ecx: &mut EvmContext<'_>,
    memory_offset: EvmWord,
    data_offset: EvmWord,
    len: EvmWord,
) -> BuiltinResult {
    let cx = CopyCx { memory: &mut *ecx.memory, gas: &mut *ecx.gas };
    copy_operation(cx, memory_offset, data_offset, len, ecx.ext.call_data())
}

pub fn codecopy(
    ecx: &mut EvmContext<'_>,
    memory_offset: EvmWord,
    code_offset: EvmWord,
    len: EvmWord,
) -> BuiltinResult {
    let cx = CopyCx { memory: &mut *ecx.memory, gas: &mut *ecx.gas };
    copy_operation(cx, memory_offset, code_offset, len, ecx.ext.code())
}

pub fn extcodecopy(
    ecx: &mut EvmContext<'_>,
    address: EvmWord,
    memory_offset: EvmWord,
    code_offset: EvmWord,
    len: EvmWord,
) -> BuiltinResult {
    let code = ecx.ext.ext_code(address.to_address());
    let cx = CopyCx { memory: &mut *ecx.memory, gas: &mut *ecx.gas };
    copy_operation(cx, memory_offset, code_offset, len, &code)
}

pub fn sload(ecx: &mut EvmContext<'_>, key: EvmWord) -> BuiltinResult<EvmWord> {
    Ok(ecx.ext.sload(key.to_b256()).into())
}

/// The cost and refund were already accounted for by the compiled code.
pub fn sstore(ecx: &mut EvmContext<'_>, key: EvmWord, value: EvmWord) -> BuiltinResult {
    ensure_non_staticcall!(ecx);
    ecx.ext.sstore(key.to_b256(), value.to_b256());
    Ok(())
}

fn log(
    ecx: &mut EvmContext<'_>,
    offset: EvmWord,
    len: EvmWord,
    topics: &[EvmWord],
) -> BuiltinResult {
    ensure_non_staticcall!(ecx);
    let n = try_into_usize!(len);
    gas_opt!(ecx, gas::dyn_log_cost(n as u64));
    let range = memory_range(ecx.memory, ecx.gas, offset, len)?;
    let entry = LogEntry {
        address: ecx.ext.address(),
        topics: topics.iter().map(|topic| topic.to_b256()).collect(),
        data: Bytes::copy_from_slice(ecx.memory.slice(range)),
    };
    ecx.ext.log(entry);
    Ok(())
}

macro_rules! log_builtins {
    ($($n:literal => [$($topic:ident),*]),* $(,)?) => {
        paste::paste! {
            $(
                pub fn [<log $n>](
                    ecx: &mut EvmContext<'_>,
                    offset: EvmWord,
                    len: EvmWord,
                    $($topic: EvmWord,)*
                ) -> BuiltinResult {
                    log(ecx, offset, len, &[$($topic),*])
                }
            )*
        }
    };
}

log_builtins! {
    0 => [],
    1 => [topic1],
    2 => [topic1, topic2],
    3 => [topic1, topic2, topic3],
    4 => [topic1, topic2, topic3, topic4],
}

/// Passes all remaining gas to the initialization code and takes back what it leaves.
pub fn create(
    ecx: &mut EvmContext<'_>,
    value: EvmWord,
    offset: EvmWord,
    len: EvmWord,
) -> BuiltinResult<EvmWord> {
    ensure_non_staticcall!(ecx);
    gas!(ecx, gas::CREATE);
    let range = memory_range(ecx.memory, ecx.gas, offset, len)?;

    if ecx.depth >= CALL_DEPTH_LIMIT {
        trace!(depth = ecx.depth, "create too deep");
        return Ok(EvmWord::ZERO);
    }
    let value = value.to_u256();
    let caller = ecx.ext.address();
    if value > ecx.ext.balance(caller) {
        trace!(%value, "create out of funds");
        return Ok(EvmWord::ZERO);
    }

    let gas_limit = ecx.gas.remaining();
    gas!(ecx, gas_limit);
    let outcome = ecx.ext.create(CreateInputs {
        caller,
        value,
        init_code: ecx.memory.slice(range),
        gas_limit,
        depth: ecx.depth + 1,
    });
    ecx.gas.give_back(outcome.gas_remaining.min(gas_limit));
    trace!(address = ?outcome.address, gas_remaining = outcome.gas_remaining, "create");
    Ok(outcome.address.map_or(EvmWord::ZERO, EvmWord::from))
}

#[allow(clippy::too_many_arguments)]
pub fn call(
    ecx: &mut EvmContext<'_>,
    gas_limit: EvmWord,
    to: EvmWord,
    value: EvmWord,
    in_offset: EvmWord,
    in_len: EvmWord,
    out_offset: EvmWord,
    out_len: EvmWord,
) -> BuiltinResult<EvmWord> {
    let value = value.to_u256();
    call_inner(ecx, CallKind::Call, gas_limit, to, value, in_offset, in_len, out_offset, out_len)
}

#[allow(clippy::too_many_arguments)]
pub fn callcode(
    ecx: &mut EvmContext<'_>,
    gas_limit: EvmWord,
    to: EvmWord,
    value: EvmWord,
    in_offset: EvmWord,
    in_len: EvmWord,
    out_offset: EvmWord,
    out_len: EvmWord,
) -> BuiltinResult<EvmWord> {
    let value = value.to_u256();
    call_inner(ecx, CallKind::CallCode, gas_limit, to, value, in_offset, in_len, out_offset, out_len)
}

pub fn delegatecall(
    ecx: &mut EvmContext<'_>,
    gas_limit: EvmWord,
    to: EvmWord,
    in_offset: EvmWord,
    in_len: EvmWord,
    out_offset: EvmWord,
    out_len: EvmWord,
) -> BuiltinResult<EvmWord> {
    let kind = CallKind::DelegateCall;
    call_inner(ecx, kind, gas_limit, to, U256::ZERO, in_offset, in_len, out_offset, out_len)
}

pub fn staticcall(
    ecx: &mut EvmContext<'_>,
    gas_limit: EvmWord,
    to: EvmWord,
    in_offset: EvmWord,
    in_len: EvmWord,
    out_offset: EvmWord,
    out_len: EvmWord,
) -> BuiltinResult<EvmWord> {
    let kind = CallKind::StaticCall;
    call_inner(ecx, kind, gas_limit, to, U256::ZERO, in_offset, in_len, out_offset, out_len)
}

#[allow(clippy::too_many_arguments)]
fn call_inner(
    ecx: &mut EvmContext<'_>,
    kind: CallKind,
    gas_limit: EvmWord,
    to: EvmWord,
    value: U256,
    in_offset: EvmWord,
    in_len: EvmWord,
    out_offset: EvmWord,
    out_len: EvmWord,
) -> BuiltinResult<EvmWord> {
    let to = to.to_address();
    if kind == CallKind::Call && ecx.is_static && !value.is_zero() {
        return Err(InstructionResult::StateChangeDuringStaticCall);
    }

    let in_range = memory_range(ecx.memory, ecx.gas, in_offset, in_len)?;
    let out_range = memory_range(ecx.memory, ecx.gas, out_offset, out_len)?;

    let transfers_value = !value.is_zero();
    if transfers_value {
        gas!(ecx, gas::CALLVALUE);
    }
    let gas_limit = gas_limit.to_u64_saturated();
    gas!(ecx, gas_limit);
    let callee_gas = gas_limit + if transfers_value { gas::CALL_STIPEND } else { 0 };

    if ecx.depth >= CALL_DEPTH_LIMIT {
        trace!(depth = ecx.depth, "call too deep");
        ecx.gas.give_back(gas_limit);
        return Ok(EvmWord::ZERO);
    }
    let address = ecx.ext.address();
    if transfers_value && value > ecx.ext.balance(address) {
        trace!(%value, "call out of funds");
        ecx.gas.give_back(gas_limit);
        return Ok(EvmWord::ZERO);
    }

    let (target, caller, value) = match kind {
        CallKind::Call => (to, address, value),
        CallKind::CallCode => (address, address, value),
        CallKind::DelegateCall => (address, ecx.ext.caller(), ecx.ext.call_value()),
        CallKind::StaticCall => (to, address, U256::ZERO),
    };
    let outcome = ecx.ext.call(CallInputs {
        kind,
        code_address: to,
        target,
        caller,
        value,
        input: ecx.memory.slice(in_range),
        gas_limit: callee_gas,
        depth: ecx.depth + 1,
        is_static: ecx.is_static || kind == CallKind::StaticCall,
    });

    let n = out_range.len().min(outcome.output.len());
    ecx.memory.set(out_range.start, &outcome.output[..n]);
    ecx.gas.give_back(outcome.gas_remaining.min(callee_gas));
    trace!(?kind, %to, success = outcome.success, gas_remaining = outcome.gas_remaining, "call");
    Ok(outcome.success.into())
}

pub fn selfdestruct(ecx: &mut EvmContext<'_>, beneficiary: EvmWord) -> BuiltinResult {
    ensure_non_staticcall!(ecx);
    ecx.ext.selfdestruct(beneficiary.to_address());
    Ok(())
}
