//! Tests of the translated modules and of compilation errors.

use super::*;
use evmjit_backend::ir::{Dest, InstKind, Module, Terminator};

fn translate(code: &[u8]) -> Module {
    EvmCompiler::new(ThreadedBackend::default()).translate(None, code).unwrap()
}

fn translate_err(code: &[u8]) -> String {
    let err = EvmCompiler::new(ThreadedBackend::default()).translate(None, code).unwrap_err();
    format!("{err:#}")
}

fn execute(f: &EvmCompilerFn, gas_limit: u64) -> ExecutionOutcome {
    let mut ext = DummyExt::default();
    f.execute(ExecutionEnv::new(gas_limit, &mut ext))
}

#[test]
fn compile_errors() {
    let err = translate_err(&[op::ADD]);
    assert!(err.contains("stack underflow"), "{err}");

    let err = translate_err(&[op::PUSH0; STACK_LIMIT + 1]);
    assert!(err.contains("stack overflow"), "{err}");

    let err = translate_err(&[op::CALLDATASIZE, op::JUMP]);
    assert!(err.contains("dynamic jump unsupported at pc 1"), "{err}");
    assert!(err.starts_with("failed to compile"), "{err}");
}

#[test]
fn underflow_through_predecessor() {
    // The jump target reads one item, but the entry block leaves none.
    let err = translate_err(&[op::PUSH1, 3, op::JUMP, op::JUMPDEST, op::POP]);
    assert!(err.contains("stack underflow: the entry block reads 1 items"), "{err}");
}

#[test]
fn block_partition() {
    let module = translate(&BRANCH);
    let starts = module.blocks.keys().copied().collect::<Vec<_>>();
    assert_eq!(starts, [0, 5, 10, 13, BRANCH.len()]);
    assert!(module.blocks.values().all(|block| block.terminator.is_some()));
    assert!(matches!(
        module.blocks[&0].terminator,
        Some(Terminator::Branch { then_dest: Dest::Block(10), else_dest: Dest::Block(5), .. })
    ));
    assert_eq!(module.blocks[&10].terminator, Some(Terminator::Jump(Dest::Block(13))));
}

#[test]
fn phis_at_merge() {
    let module = translate(&BRANCH);
    let merge = &module.blocks[&13];
    assert_eq!(merge.phis.len(), 1);
    let phi = &merge.phis[0];
    assert_eq!(phi.depth, 0);
    let preds = phi.incoming.iter().map(|&(pred, _)| pred).collect::<Vec<_>>();
    assert_eq!(preds, [5, 10]);
    for block in [0, 5, 10] {
        assert!(module.blocks[&block].phis.is_empty());
    }
}

#[test]
fn phis_in_loop() {
    let module = translate(&SUM_LOOP);
    let header = &module.blocks[&3];
    let depths = header.phis.iter().map(|phi| phi.depth).collect::<Vec<_>>();
    assert_eq!(depths, [0, 1]);
    for phi in &header.phis {
        let preds = phi.incoming.iter().map(|&(pred, _)| pred).collect::<Vec<_>>();
        assert_eq!(preds, [0, 9]);
    }
    // The loop exit reads both values through the header.
    assert_eq!(module.blocks[&20].phis.len(), 2);
    module.verify().unwrap();
}

#[test]
fn unreachable_blocks() {
    // Only the dead `JUMP` at pc 3 leads to pc 4.
    let module = translate(&[op::STOP, op::PUSH1, 4, op::JUMP, op::POP, op::STOP]);
    assert!(!module.blocks[&1].reachable);
    let dead = &module.blocks[&4];
    assert!(!dead.reachable);
    assert!(dead.phis.is_empty());
    assert!(matches!(dead.insts[0].kind, InstKind::Const(_)));
}

#[test]
fn stack_checks() {
    let module = translate(&[op::PUSH0, op::PUSH0, op::POP]);
    let check = module.blocks[&0].insts[0].kind.clone();
    assert_eq!(check, InstKind::StackCheck { max_growth: 2, diff: 1 });

    let mut compiler = EvmCompiler::new(ThreadedBackend::default());
    compiler.stack_checks(false);
    let module = compiler.translate(None, &[op::PUSH0, op::PUSH0, op::POP]).unwrap();
    assert!(!module.blocks[&0].insts.iter().any(|i| matches!(i.kind, InstKind::StackCheck { .. })));
}

#[test]
fn gas_is_monotonic() {
    let f = EvmCompiler::new(ThreadedBackend::default()).jit(None, &ROUND_TRIP).unwrap();
    let mut last = 0;
    for gas_limit in 0..=30 {
        let outcome = execute(&f, gas_limit);
        let expected = match gas_limit {
            0..=14 => 0,
            15..=17 => 15,
            18..=23 => 18,
            _ => 24,
        };
        assert_eq!(outcome.gas_used(), expected, "gas_limit={gas_limit}");
        assert_eq!(outcome.result.is_success(), gas_limit >= 24, "gas_limit={gas_limit}");
        assert!(outcome.gas_used() >= last);
        last = outcome.gas_used();
    }
}

#[test]
fn no_gas_metering() {
    let mut compiler = EvmCompiler::new(ThreadedBackend::default());
    compiler.gas_metering(false);
    let module = compiler.translate(None, &ROUND_TRIP).unwrap();
    let gas_checks = module
        .blocks
        .values()
        .flat_map(|block| &block.insts)
        .filter(|inst| matches!(inst.kind, InstKind::GasCheck(_) | InstKind::GasCheckDyn(_)))
        .count();
    assert_eq!(gas_checks, 0);

    let f = compiler.jit(None, &ROUND_TRIP).unwrap();
    let outcome = execute(&f, 100);
    assert_eq!(outcome.result, ExecutionResult::Return { offset: 0, size: 32 });
    // Only memory growth is charged.
    assert_eq!(outcome.gas_used(), gas::MEMORY);
}

#[test]
fn reuse_compiled_function() {
    let f = EvmCompiler::new(ThreadedBackend::default()).jit(None, &ROUND_TRIP).unwrap();
    for _ in 0..3 {
        let outcome = execute(&f, DEF_GAS_LIMIT);
        assert_eq!(outcome.output[..], word(U256::from(5))[..]);
        assert_eq!(outcome.gas_used(), 24);
        assert_eq!(outcome.memory_size, 32);
    }
}

#[test]
fn dump() {
    let dir = tempfile::tempdir().unwrap();
    let mut compiler = EvmCompiler::new(ThreadedBackend::default());
    compiler.set_dump_to(Some(dir.path().to_path_buf()));
    compiler.jit(Some("dumped fn"), &BRANCH).unwrap();

    let out = dir.path().join("dumped_fn");
    for file in ["bytecode.txt", "bytecode.dbg.txt", "module.ir", "cfg.dot", "module.prog"] {
        assert!(out.join(file).exists(), "{file} was not dumped");
    }
    let ir = std::fs::read_to_string(out.join("module.ir")).unwrap();
    assert!(ir.starts_with("module \"dumped fn\""), "{ir}");
}

#[test]
fn engine() {
    let module = translate(&ROUND_TRIP);
    let mut engine = ExecutionEngine::new(ThreadedBackend::default());
    let mut ext = DummyExt::default();
    let outcome = engine.run(&module, ExecutionEnv::new(16, &mut ext)).unwrap();
    assert_eq!(outcome.result, ExecutionResult::OutOfGas);
    assert_eq!(outcome.gas_remaining, 1);
    assert!(outcome.output.is_empty());

    let outcome = engine.run(&module, ExecutionEnv::new(DEF_GAS_LIMIT, &mut ext)).unwrap();
    assert_eq!(outcome.result, ExecutionResult::Return { offset: 0, size: 32 });
    assert_eq!(outcome.gas_used(), 24);
}
