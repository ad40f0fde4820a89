macro_rules! try_ir {
    ($e:expr) => {
        match $e {
            InstructionResult::Continue => {}
            ir => return Err(ir),
        }
    };
}

macro_rules! gas {
    ($ecx:expr, $gas:expr) => {
        if !$ecx.gas.record_cost($gas) {
            return Err(InstructionResult::OutOfGas);
        }
    };
}

macro_rules! gas_opt {
    ($ecx:expr, $gas:expr) => {
        match $gas {
            Some(gas) => gas!($ecx, gas),
            None => return Err(InstructionResult::OutOfGas),
        }
    };
}

macro_rules! ensure_non_staticcall {
    ($ecx:expr) => {
        if $ecx.is_static {
            return Err(InstructionResult::StateChangeDuringStaticCall);
        }
    };
}

macro_rules! ensure_memory {
    ($ecx:expr, $offset:expr, $len:expr) => {
        try_ir!($ecx.memory.resize($ecx.gas, $offset, $len))
    };
}

macro_rules! try_into_usize {
    ($x:expr) => {
        match $x.to_usize() {
            Some(x) => x,
            None => return Err(InstructionResult::InvalidOperandOOG),
        }
    };
}
