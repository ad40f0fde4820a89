use super::*;
use similar_asserts::assert_eq;
use std::{fmt, path::Path};

pub struct TestCase<'a> {
    pub bytecode: &'a [u8],
    pub gas_limit: u64,
    pub call_data: &'a [u8],
    pub depth: usize,
    pub is_static: bool,

    pub modify_ext: Option<fn(&mut DummyExt)>,

    pub expected_result: ExecutionResult,
    pub expected_output: &'a [u8],
    pub expected_gas: u64,
    pub expected_refund: u64,
    pub assert_ext: Option<fn(&DummyExt)>,
}

impl Default for TestCase<'_> {
    fn default() -> Self {
        Self {
            bytecode: &[],
            gas_limit: DEF_GAS_LIMIT,
            call_data: &[],
            depth: 0,
            is_static: false,
            modify_ext: None,
            expected_result: ExecutionResult::Stop,
            expected_output: &[],
            expected_gas: 0,
            expected_refund: 0,
            assert_ext: None,
        }
    }
}

impl fmt::Debug for TestCase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("bytecode", &format_bytecode(self.bytecode))
            .field("gas_limit", &self.gas_limit)
            .field("call_data", &hex::encode(self.call_data))
            .field("depth", &self.depth)
            .field("is_static", &self.is_static)
            .field("modify_ext", &self.modify_ext.is_some())
            .field("expected_result", &self.expected_result)
            .field("expected_output", &hex::encode(self.expected_output))
            .field("expected_gas", &self.expected_gas)
            .field("expected_refund", &self.expected_refund)
            .field("assert_ext", &self.assert_ext.is_some())
            .finish()
    }
}

// Default values.
pub const DEF_GAS_LIMIT: u64 = 100_000;
pub const DEF_ADDR: Address = Address::repeat_byte(0xba);
pub const OTHER_ADDR: Address = Address::repeat_byte(0x69);

/// `PUSH0 MSTORE PUSH1 32 PUSH0 RETURN`: returns the top of the stack as a word.
pub const RETURN_TOP: [u8; 6] = [op::PUSH0, op::MSTORE, op::PUSH1, 32, op::PUSH0, op::RETURN];
/// Gas of [`RETURN_TOP`] when memory is still empty.
pub const RETURN_TOP_GAS: u64 = 2 + 3 + gas::MEMORY + 3 + 2;

/// Appends [`RETURN_TOP`] to `code`.
pub fn return_top(code: &[u8]) -> Vec<u8> {
    [code, &RETURN_TOP[..]].concat()
}

/// Big-endian bytes of `x`.
pub fn word(x: U256) -> [u8; 32] {
    x.to_be_bytes()
}

pub fn def_ext(bytecode: &[u8], call_data: &[u8]) -> DummyExt {
    let mut ext = DummyExt::new(bytecode.to_vec()).with_call_data(call_data.to_vec());
    ext.address = DEF_ADDR;
    ext
}

pub fn with_threaded_backend(
    opt_level: OptimizationLevel,
    f: fn(&mut EvmCompiler<ThreadedBackend>),
) {
    f(&mut EvmCompiler::new(ThreadedBackend::new(opt_level)));
}

pub fn set_test_dump<B: Backend>(compiler: &mut EvmCompiler<B>, module_path: &str) {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap().parent().unwrap();
    let mut dump_path = root.to_path_buf();
    dump_path.push("target");
    dump_path.push("tests_dump");
    // Skip `evmjit::tests`.
    dump_path.extend(module_path.split("::").skip(2));
    dump_path.push(format!("{:?}", compiler.opt_level()));
    compiler.set_dump_to(Some(dump_path));
}

pub fn run_test_case<B: Backend>(test_case: &TestCase<'_>, compiler: &mut EvmCompiler<B>) {
    let f = compiler.jit(Some("test"), test_case.bytecode).unwrap();
    run_compiled_test_case(test_case, f);
}

fn run_compiled_test_case(test_case: &TestCase<'_>, f: EvmCompilerFn) {
    let TestCase {
        bytecode,
        gas_limit,
        call_data,
        depth,
        is_static,
        modify_ext,
        expected_result,
        expected_output,
        expected_gas,
        expected_refund,
        assert_ext,
    } = *test_case;

    let mut ext = def_ext(bytecode, call_data);
    if let Some(modify_ext) = modify_ext {
        modify_ext(&mut ext);
    }

    let mut env = ExecutionEnv::new(gas_limit, &mut ext);
    env.depth = depth;
    env.is_static = is_static;
    let outcome = f.execute(env);

    assert_eq!(outcome.result, expected_result, "result mismatch");
    assert_eq!(hex::encode(&outcome.output), hex::encode(expected_output), "output mismatch");
    assert_eq!(outcome.gas_used(), expected_gas, "gas mismatch");
    assert_eq!(outcome.gas_refunded, expected_refund, "refund mismatch");
    assert_eq!(outcome.gas_limit, gas_limit);

    if let Some(assert_ext) = assert_ext {
        assert_ext(&ext);
    }
}
