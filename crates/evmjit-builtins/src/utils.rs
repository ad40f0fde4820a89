use crate::{gas, BuiltinResult};
use evmjit_context::{EvmWord, Gas, InstructionResult, Memory};

/// Borrowed pieces of the context a copy writes through, disjoint from the host.
pub(crate) struct CopyCx<'a> {
    pub(crate) memory: &'a mut Memory,
    pub(crate) gas: &'a mut Gas,
}

/// Copies `len` bytes of `data` at `data_offset` into memory at `memory_offset`, charging the
/// per-word copy cost and memory growth. Out of bounds source bytes are zero.
pub(crate) fn copy_operation(
    mut ecx: CopyCx<'_>,
    memory_offset: EvmWord,
    data_offset: EvmWord,
    len: EvmWord,
    data: &[u8],
) -> BuiltinResult {
    let len = try_into_usize!(len);
    if len != 0 {
        gas_opt!(ecx, gas::dyn_verylowcopy_cost(len as u64));
        let memory_offset = try_into_usize!(memory_offset);
        ensure_memory!(ecx, memory_offset, len);
        let data_offset = data_offset.to_usize().unwrap_or(usize::MAX);
        ecx.memory.set_data(memory_offset, data_offset, len, data);
    }
    Ok(())
}

/// Resolves an `(offset, len)` pair into a resident memory range.
///
/// A zero length never touches memory, regardless of the offset.
pub(crate) fn memory_range(
    memory: &mut Memory,
    gas: &mut Gas,
    offset: EvmWord,
    len: EvmWord,
) -> BuiltinResult<core::ops::Range<usize>> {
    let len = try_into_usize!(len);
    if len == 0 {
        return Ok(0..0);
    }
    let offset = try_into_usize!(offset);
    try_ir!(memory.resize(gas, offset, len));
    Ok(offset..offset + len)
}

/// Reads 32 bytes of `data` at `offset`, zero padded.
pub(crate) fn read_padded(data: &[u8], offset: EvmWord) -> [u8; 32] {
    let mut word = [0u8; 32];
    if let Some(src) = offset.to_usize().and_then(|offset| data.get(offset..)) {
        let n = src.len().min(32);
        word[..n].copy_from_slice(&src[..n]);
    }
    word
}
