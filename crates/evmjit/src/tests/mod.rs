#![allow(
    clippy::needless_update,
    unreachable_pub,
    dead_code,
    missing_docs,
    missing_debug_implementations
)]

use crate::*;
use alloy_primitives::{hex, keccak256, Address, B256};


mod compile;

mod runner;
pub use runner::*;

tests! {
    ret {
        empty(@raw {}),
        no_stop(@raw {
            bytecode: &[op::PUSH0],
            expected_gas: 2,
        }),
        stop(@raw {
            bytecode: &[op::STOP],
            expected_gas: 0,
        }),
        invalid(@raw {
            bytecode: &[op::INVALID],
            expected_result: ExecutionResult::Failure(InstructionResult::InvalidFEOpcode),
            expected_gas: 0,
        }),
        unknown(@raw {
            bytecode: &[0x0c],
            expected_result: ExecutionResult::Failure(InstructionResult::OpcodeNotFound),
            expected_gas: 0,
        }),
        unknown_after_code(@raw {
            bytecode: &[op::PUSH0, 0x0c, op::PUSH0],
            expected_result: ExecutionResult::Failure(InstructionResult::OpcodeNotFound),
            expected_gas: 2,
        }),
        revert(@raw {
            bytecode: &[op::PUSH1, 0x42, op::PUSH0, op::MSTORE, op::PUSH1, 32, op::PUSH0, op::REVERT],
            expected_result: ExecutionResult::Revert { offset: 0, size: 32 },
            expected_output: &word(0x42_U256),
            expected_gas: 3 + 2 + 3 + gas::MEMORY + 3 + 2,
        }),
        return_empty(@raw {
            bytecode: &[op::PUSH0, op::PUSH1, 0xff, op::RETURN],
            expected_result: ExecutionResult::Return { offset: 0xff, size: 0 },
            expected_gas: 2 + 3,
        }),
        revert_empty_huge_offset(@raw {
            bytecode: &[op::PUSH0, op::PUSH1, 1, op::PUSH0, op::SUB, op::REVERT],
            expected_result: ExecutionResult::Revert { offset: 0, size: 0 },
            expected_gas: 2 + 3 + 2 + 3,
        }),
        stack_limit(@raw {
            bytecode: &[op::PUSH0; 1024],
            expected_gas: 2 * 1024,
        }),
        stack_overflow_loop(@raw {
            bytecode: &[op::JUMPDEST, op::PUSH0, op::PUSH1, 0, op::JUMP],
            expected_result: ExecutionResult::Failure(InstructionResult::StackOverflow),
            expected_gas: 1023 * (1 + 2 + 3 + 8),
        }),
    }

    arith {
        add(op::ADD, 3_U256, 2_U256 => 5_U256),
        sub(op::SUB, 5_U256, 3_U256 => 2_U256),
        sub_wrap(op::SUB, 0_U256, 1_U256 => U256::MAX),
        mul(op::MUL, 6_U256, 7_U256 => 42_U256),
        div(op::DIV, 10_U256, 3_U256 => 3_U256),
        div_by_zero(op::DIV, 5_U256, 0_U256 => 0_U256),
        rem(op::MOD, 10_U256, 3_U256 => 1_U256),
        lt(op::LT, 1_U256, 2_U256 => 1_U256),
        gt(op::GT, 1_U256, 2_U256 => 0_U256),
        eq(op::EQ, 7_U256, 7_U256 => 1_U256),
        byte(op::BYTE, 31_U256, 0xff_U256 => 0xff_U256),
        shl(op::SHL, 4_U256, 1_U256 => 16_U256),
        shr(op::SHR, 4_U256, 16_U256 => 1_U256),
        signextend(op::SIGNEXTEND, 0_U256, 0xff_U256 => U256::MAX),
        sdiv_neg(op::SDIV, U256::MAX - 5_U256, 3_U256 => U256::MAX - 1_U256),
        sdiv_min(
            op::SDIV,
            0x8000000000000000000000000000000000000000000000000000000000000000_U256,
            U256::MAX
            => 0x8000000000000000000000000000000000000000000000000000000000000000_U256
        ),
        smod_neg(op::SMOD, U256::MAX - 6_U256, 3_U256 => U256::MAX),
        slt_neg(op::SLT, U256::MAX, 1_U256 => 1_U256),
        sgt_neg(op::SGT, U256::MAX, 1_U256 => 0_U256),
        sar_neg(op::SAR, 4_U256, U256::MAX - 15_U256 => U256::MAX),
        byte_oob(op::BYTE, 32_U256, 0xff_U256 => 0_U256),
        exp(@raw {
            bytecode: &return_top(&[op::PUSH1, 3, op::PUSH1, 2, op::EXP]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(8_U256),
            expected_gas: 3 + 3 + 10 + 10 + RETURN_TOP_GAS,
        }),
        addmod(@raw {
            bytecode: &return_top(&[op::PUSH1, 5, op::PUSH1, 4, op::PUSH1, 3, op::ADDMOD]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(2_U256),
            expected_gas: 3 + 3 + 3 + 8 + RETURN_TOP_GAS,
        }),
    }

    stack {
        dup(@raw {
            bytecode: &return_top(&[op::PUSH1, 1, op::DUP1, op::ADD]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(2_U256),
            expected_gas: 3 + 3 + 3 + RETURN_TOP_GAS,
        }),
        swap(@raw {
            bytecode: &return_top(&[op::PUSH1, 1, op::PUSH1, 2, op::SWAP1, op::SUB]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(U256::MAX),
            expected_gas: 3 + 3 + 3 + 3 + RETURN_TOP_GAS,
        }),
        pop(@raw {
            bytecode: &return_top(&[op::PUSH1, 1, op::PUSH1, 2, op::POP]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(1_U256),
            expected_gas: 3 + 3 + 2 + RETURN_TOP_GAS,
        }),
    }

    control_flow {
        basic_jump(@raw {
            bytecode: &return_top(&[op::PUSH1, 4, op::JUMP, op::INVALID, op::JUMPDEST, op::PUSH1, 69]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(69_U256),
            expected_gas: 3 + 8 + 1 + 3 + RETURN_TOP_GAS,
        }),
        jump_without_jumpdest(@raw {
            bytecode: &[op::PUSH1, 4, op::JUMP, op::INVALID, op::PUSH1, 7],
            expected_gas: 3 + 8 + 3,
        }),
        jump_into_push_data(@raw {
            bytecode: &[op::PUSH1, 4, op::JUMP, op::PUSH1, op::JUMPDEST],
            expected_result: ExecutionResult::Failure(InstructionResult::InvalidJump),
            expected_gas: 3 + 8,
        }),
        jump_past_end(@raw {
            bytecode: &[op::PUSH1, 100, op::JUMP],
            expected_gas: 3 + 8,
        }),
        branch_not_taken(@raw {
            bytecode: &BRANCH,
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(0x11_U256),
            expected_gas: (2 + 3 + 3 + 10) + (3 + 3 + 8) + 1 + RETURN_TOP_GAS,
        }),
        branch_taken(@raw {
            bytecode: &BRANCH,
            call_data: &[1; 32],
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(0x22_U256),
            expected_gas: (2 + 3 + 3 + 10) + (1 + 3) + 1 + RETURN_TOP_GAS,
        }),
        sum_loop(@raw {
            bytecode: &SUM_LOOP,
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(15_U256),
            expected_gas: 5 + 6 * 20 + 5 * 32 + (1 + 2 + RETURN_TOP_GAS),
        }),
    }

    memory {
        mstore8_mload(@raw {
            bytecode: &return_top(&[op::PUSH1, 0xff, op::PUSH1, 31, op::MSTORE8, op::PUSH0, op::MLOAD]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(0xff_U256),
            expected_gas: (3 + 3 + 3 + gas::MEMORY) + (2 + 3) + (RETURN_TOP_GAS - gas::MEMORY),
        }),
        msize(@raw {
            bytecode: &return_top(&[op::PUSH1, 0x21, op::MLOAD, op::POP, op::MSIZE]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(96_U256),
            expected_gas: (3 + 3 + 3 * gas::MEMORY) + (2 + 2) + (RETURN_TOP_GAS - gas::MEMORY),
        }),
        huge_offset(@raw {
            bytecode: &[op::PUSH1, 1, op::PUSH4, 0xff, 0xff, 0xff, 0xff, op::MSTORE],
            expected_result: ExecutionResult::OutOfGas,
            expected_gas: 3 + 3 + 3,
        }),
        keccak256_empty(@raw {
            bytecode: &return_top(&[op::PUSH0, op::PUSH0, op::KECCAK256]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: keccak256(b"").as_slice(),
            expected_gas: 2 + 2 + 30 + RETURN_TOP_GAS,
        }),
    }

    gas_metering {
        round_trip(@raw {
            bytecode: &ROUND_TRIP,
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(5_U256),
            expected_gas: 24,
        }),
        out_of_gas(@raw {
            bytecode: &ROUND_TRIP,
            gas_limit: 16,
            expected_result: ExecutionResult::OutOfGas,
            expected_gas: 15,
        }),
        gas_opcode(@raw {
            bytecode: &return_top(&[op::GAS]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(U256::from(DEF_GAS_LIMIT - 2)),
            expected_gas: 2 + RETURN_TOP_GAS,
        }),
    }

    storage {
        sload(@raw {
            bytecode: &return_top(&[op::PUSH0, op::SLOAD]),
            modify_ext: Some(|ext| ext.set_storage(0_U256, 42_U256)),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(42_U256),
            expected_gas: 2 + gas::SLOAD + RETURN_TOP_GAS,
        }),
        sstore_create(@raw {
            bytecode: &[op::PUSH1, 1, op::PUSH0, op::SSTORE],
            expected_gas: 3 + 2 + 2 * gas::SSTORE_BASE,
            assert_ext: Some(|ext| assert_eq!(ext.storage_at(0_U256), 1_U256)),
        }),
        sstore_update(@raw {
            bytecode: &[op::PUSH1, 2, op::PUSH0, op::SSTORE],
            modify_ext: Some(|ext| ext.set_storage(0_U256, 1_U256)),
            expected_gas: 3 + 2 + gas::SSTORE_BASE,
            assert_ext: Some(|ext| assert_eq!(ext.storage_at(0_U256), 2_U256)),
        }),
        sstore_clear(@raw {
            bytecode: &[op::PUSH0, op::PUSH0, op::SSTORE],
            modify_ext: Some(|ext| ext.set_storage(0_U256, 1_U256)),
            expected_gas: 2 + 2,
            expected_refund: gas::SSTORE_REFUND,
            assert_ext: Some(|ext| assert!(ext.storage.is_empty())),
        }),
        sstore_zero_to_zero(@raw {
            bytecode: &[op::PUSH0, op::PUSH0, op::SSTORE],
            expected_gas: 2 + 2 + gas::SSTORE_BASE,
        }),
        sstore_twice(@raw {
            bytecode: &[op::PUSH1, 1, op::PUSH0, op::SSTORE, op::PUSH0, op::PUSH0, op::SSTORE],
            expected_gas: (3 + 2 + 2 * gas::SSTORE_BASE) + (2 + 2),
            expected_refund: gas::SSTORE_REFUND,
            assert_ext: Some(|ext| assert!(ext.storage.is_empty())),
        }),
        sstore_out_of_gas(@raw {
            bytecode: &[op::PUSH1, 1, op::PUSH0, op::SSTORE],
            gas_limit: 2 * gas::SSTORE_BASE + 4,
            expected_result: ExecutionResult::OutOfGas,
            expected_gas: 3 + 2,
            assert_ext: Some(|ext| assert!(ext.storage.is_empty())),
        }),
        sstore_static(@raw {
            bytecode: &[op::PUSH1, 1, op::PUSH0, op::SSTORE],
            is_static: true,
            expected_result: ExecutionResult::Failure(InstructionResult::StateChangeDuringStaticCall),
            expected_gas: 3 + 2 + 2 * gas::SSTORE_BASE,
            assert_ext: Some(|ext| assert!(ext.storage.is_empty())),
        }),
    }

    host {
        calldataload(@raw {
            bytecode: &return_top(&[op::PUSH0, op::CALLDATALOAD]),
            call_data: &[0xaa; 32],
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &[0xaa; 32],
            expected_gas: 2 + 3 + RETURN_TOP_GAS,
        }),
        calldatasize(@raw {
            bytecode: &return_top(&[op::CALLDATASIZE]),
            call_data: &[1, 2, 3],
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(3_U256),
            expected_gas: 2 + RETURN_TOP_GAS,
        }),
        address(@raw {
            bytecode: &return_top(&[op::ADDRESS]),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: DEF_ADDR.into_word().as_slice(),
            expected_gas: 2 + RETURN_TOP_GAS,
        }),
        log1(@raw {
            bytecode: &[
                op::PUSH1, 0x42, op::PUSH0, op::MSTORE,
                op::PUSH1, 7, op::PUSH1, 32, op::PUSH0, op::LOG1,
            ],
            expected_gas: (3 + 2 + 3 + gas::MEMORY)
                + (3 + 3 + 2 + gas::LOG + gas::LOGTOPIC)
                + 32 * gas::LOGDATA,
            assert_ext: Some(|ext| {
                assert_eq!(ext.logs.len(), 1);
                let log = &ext.logs[0];
                assert_eq!(log.address, DEF_ADDR);
                assert_eq!(log.topics, [B256::with_last_byte(7)]);
                assert_eq!(log.data[..], word(0x42_U256)[..]);
            }),
        }),
        selfdestruct(@raw {
            bytecode: &[op::PUSH1, 0x69, op::SELFDESTRUCT],
            expected_gas: 3,
            assert_ext: Some(|ext| assert_eq!(ext.selfdestructs, [Address::with_last_byte(0x69)])),
        }),
        create(@raw {
            bytecode: &return_top(&[op::PUSH0, op::PUSH0, op::PUSH0, op::CREATE]),
            modify_ext: Some(|ext| {
                ext.create_outcome = CreateOutcome { address: Some(OTHER_ADDR), gas_remaining: u64::MAX };
            }),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: OTHER_ADDR.into_word().as_slice(),
            expected_gas: 2 + 2 + 2 + gas::CREATE + RETURN_TOP_GAS,
            assert_ext: Some(|ext| assert_eq!(ext.creates.len(), 1)),
        }),
        call(@raw {
            bytecode: &CALL,
            modify_ext: Some(|ext| {
                ext.call_outcome = CallOutcome { success: true, gas_remaining: u64::MAX, ..Default::default() };
            }),
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(1_U256),
            expected_gas: 5 * 2 + 3 + 3 + gas::CALL + RETURN_TOP_GAS,
            assert_ext: Some(|ext| {
                assert_eq!(ext.calls.len(), 1);
                assert_eq!(ext.calls[0].0, CallKind::Call);
                assert_eq!(ext.calls[0].4, 0xff);
            }),
        }),
        call_too_deep(@raw {
            bytecode: &CALL,
            depth: CALL_DEPTH_LIMIT,
            expected_result: ExecutionResult::Return { offset: 0, size: 32 },
            expected_output: &word(0_U256),
            expected_gas: 5 * 2 + 3 + 3 + gas::CALL + RETURN_TOP_GAS,
            assert_ext: Some(|ext| assert!(ext.calls.is_empty())),
        }),
    }
}

/// `2 + 3`, stored at memory offset 0 and returned.
pub const ROUND_TRIP: [u8; 13] = [
    op::PUSH1, 2, op::PUSH1, 3, op::ADD, op::PUSH1, 0, op::MSTORE,
    op::PUSH1, 32, op::PUSH1, 0, op::RETURN,
];

/// Returns `0x22` if the first word of call data is non-zero, `0x11` otherwise.
///
/// Both paths meet in a block that reads its operand from the entry stack.
pub const BRANCH: [u8; 20] = [
    op::PUSH0, op::CALLDATALOAD, op::PUSH1, 10, op::JUMPI,
    op::PUSH1, 0x11, op::PUSH1, 13, op::JUMP,
    op::JUMPDEST, op::PUSH1, 0x22,
    op::JUMPDEST, op::PUSH0, op::MSTORE, op::PUSH1, 32, op::PUSH0, op::RETURN,
];

/// Returns `1 + 2 + 3 + 4 + 5`.
pub const SUM_LOOP: [u8; 28] = [
    // acc = 0, i = 5
    op::PUSH0, op::PUSH1, 5,
    // loop: if i == 0 goto end
    op::JUMPDEST, op::DUP1, op::ISZERO, op::PUSH1, 20, op::JUMPI,
    // acc += i; i -= 1
    op::DUP1, op::SWAP2, op::ADD, op::SWAP1, op::PUSH1, 1, op::SWAP1, op::SUB,
    op::PUSH1, 3, op::JUMP,
    // end
    op::JUMPDEST, op::POP,
    op::PUSH0, op::MSTORE, op::PUSH1, 32, op::PUSH0, op::RETURN,
];

/// `CALL` with 255 gas and no value or data to `0x69`, returning the success flag.
pub const CALL: [u8; 16] = [
    op::PUSH0, op::PUSH0, op::PUSH0, op::PUSH0, op::PUSH0,
    op::PUSH1, 0x69, op::PUSH1, 0xff, op::CALL,
    op::PUSH0, op::MSTORE, op::PUSH1, 32, op::PUSH0, op::RETURN,
];

/// `a OP b` with `a` on top of the stack, returned as a word.
pub fn bytecode_binop(op: u8, a: U256, b: U256) -> Vec<u8> {
    let mut code = Vec::with_capacity(33 * 2 + 1 + RETURN_TOP.len());
    for x in [b, a] {
        code.push(op::PUSH32);
        code.extend_from_slice(&x.to_be_bytes::<32>());
    }
    code.push(op);
    code.extend_from_slice(&RETURN_TOP);
    code
}
