use crate::*;
use evmjit_backend::ir::Builtin;

trait IntoOutput {
    fn into_output(self) -> BuiltinResult<Option<EvmWord>>;
}

impl IntoOutput for BuiltinResult {
    #[inline]
    fn into_output(self) -> BuiltinResult<Option<EvmWord>> {
        self.map(|()| None)
    }
}

impl IntoOutput for BuiltinResult<EvmWord> {
    #[inline]
    fn into_output(self) -> BuiltinResult<Option<EvmWord>> {
        self.map(Some)
    }
}

macro_rules! dispatch {
    ($builtin:expr, $ecx:expr, $args:expr; $($variant:ident => $f:ident($($i:literal),*)),* $(,)?) => {
        match $builtin {
            $(Builtin::$variant => $f($ecx $(, $args[$i])*).into_output(),)*
        }
    };
}

/// Calls `builtin` with `args` in pop order.
///
/// Returns the produced value for builtins that have one. An argument count that does not match
/// [`Builtin::num_params`] fails with `FatalExternalError`.
pub fn call_builtin(
    builtin: Builtin,
    ecx: &mut EvmContext<'_>,
    args: &[EvmWord],
) -> BuiltinResult<Option<EvmWord>> {
    if args.len() != builtin.num_params() {
        error!(
            builtin = builtin.name(),
            expected = builtin.num_params(),
            got = args.len(),
            "wrong number of builtin arguments"
        );
        return Err(InstructionResult::FatalExternalError);
    }
    dispatch! { builtin, ecx, args;
        MLoad => mload(0),
        MStore => mstore(0, 1),
        MStore8 => mstore8(0, 1),
        MSize => msize(),
        MemoryRequire => memory_require(0, 1),

        Keccak256 => keccak256(0, 1),
        Exp => exp(0, 1),

        Address => address(),
        Origin => origin(),
        Caller => caller(),
        CallValue => callvalue(),
        CallDataSize => calldatasize(),
        CodeSize => codesize(),
        GasPrice => gasprice(),
        Coinbase => coinbase(),
        Timestamp => timestamp(),
        Number => number(),
        Difficulty => difficulty(),
        GasLimit => gaslimit(),

        Balance => balance(0),
        CallDataLoad => calldataload(0),
        ExtCodeSize => extcodesize(0),
        BlockHash => blockhash(0),
        CallDataCopy => calldatacopy(0, 1, 2),
        CodeCopy => codecopy(0, 1, 2),
        ExtCodeCopy => extcodecopy(0, 1, 2, 3),

        SLoad => sload(0),
        SStore => sstore(0, 1),

        Log0 => log0(0, 1),
        Log1 => log1(0, 1, 2),
        Log2 => log2(0, 1, 2, 3),
        Log3 => log3(0, 1, 2, 3, 4),
        Log4 => log4(0, 1, 2, 3, 4, 5),

        Create => create(0, 1, 2),
        Call => call(0, 1, 2, 3, 4, 5, 6),
        CallCode => callcode(0, 1, 2, 3, 4, 5, 6),
        DelegateCall => delegatecall(0, 1, 2, 3, 4, 5),
        StaticCall => staticcall(0, 1, 2, 3, 4, 5),
        SelfDestruct => selfdestruct(0),
    }
}
