//! EVM to IR translation.

use super::{builder::IrBuilder, gas::GasMeter, stack::BlockStack};
use crate::{Bytecode, InstData, Instruction, OpcodeInfo};
use evmjit_backend::{
    eyre::{ensure, eyre, WrapErr},
    ir::{BasicBlock, Builtin, Dest, InstKind, Module, Pc, Terminator, Value},
    Result,
};
use evmjit_context::{InstructionResult, STACK_LIMIT};
use std::{collections::BTreeMap, ops::Range};

/// Translation options.
#[derive(Clone, Copy, Debug)]
pub struct CompilerConfig {
    /// Whether to emit gas checks.
    pub gas_metering: bool,
    /// Whether to emit runtime stack overflow checks.
    pub stack_checks: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self { gas_metering: true, stack_checks: true }
    }
}

/// The translation of one bytecode: the module and the exit stack of every block.
pub(super) struct Translated {
    pub(super) module: Module,
    pub(super) stacks: BTreeMap<Pc, BlockStack>,
}

pub(super) struct FunctionCx<'a> {
    config: CompilerConfig,
    op_info: &'a [OpcodeInfo; 256],

    /// The bytecode being translated.
    bytecode: &'a Bytecode<'a>,
    /// The IR builder, positioned in the current block.
    bcx: IrBuilder,
    /// The stack of the current block.
    stack: BlockStack,
    /// Static gas accounting of the current block.
    gas: GasMeter,
    /// Position of the current block's `StackCheck`.
    stack_check: Option<usize>,

    /// Finished blocks with their exit stacks.
    blocks: BTreeMap<Pc, (BasicBlock, BlockStack)>,
}

impl<'a> FunctionCx<'a> {
    /// Translates every basic block of an analyzed bytecode.
    ///
    /// Blocks are translated in program order. Values coming from predecessors are left as
    /// placeholders in each block's stack, to be resolved by linking.
    #[instrument(name = "translate", level = "debug", skip_all, fields(%name))]
    pub(super) fn translate(
        name: &str,
        config: CompilerConfig,
        op_info: &'a [OpcodeInfo; 256],
        bytecode: &'a Bytecode<'a>,
    ) -> Result<Translated> {
        let mut fx = Self {
            config,
            op_info,
            bytecode,
            bcx: IrBuilder::new(Module::new(name, bytecode.len())),
            stack: BlockStack::new(),
            gas: GasMeter::new(),
            stack_check: None,
            blocks: BTreeMap::new(),
        };

        for range in bytecode.blocks() {
            fx.translate_block(range.clone())
                .wrap_err_with(|| format!("failed to translate block {range:?}"))?;
        }

        // The exit block: falling off the end of the code is `STOP`.
        let exit = bytecode.len();
        let mut block = fx.bcx.switch_to_block(exit, exit);
        block.terminator = Some(Terminator::Stop);
        debug_assert!(block.insts.is_empty());
        fx.blocks.insert(exit, (block, BlockStack::new()));

        let Self { mut bcx, blocks, .. } = fx;
        let mut stacks = BTreeMap::new();
        for (pc, (block, stack)) in blocks {
            bcx.module.blocks.insert(pc, block);
            stacks.insert(pc, stack);
        }
        Ok(Translated { module: bcx.module, stacks })
    }

    fn translate_block(&mut self, range: Range<Pc>) -> Result<()> {
        trace!(?range, "translating block");
        self.begin_block(range.start, range.end);
        let bytecode = self.bytecode;
        for data in bytecode.insts_in(range) {
            if data.is_dead_code() {
                continue;
            }
            ensure!(
                !self.bcx.is_terminated(),
                "instruction at pc {} follows the end of its block",
                data.pc
            );
            self.bcx.set_pc(data.pc);
            if self.config.gas_metering {
                self.gas.count(&mut self.bcx, self.op_info[data.opcode as usize]);
            }
            self.translate_inst(data)
                .wrap_err_with(|| format!("at pc {}: {}", data.pc, data.to_op()))?;
        }
        self.end_block()
    }

    fn begin_block(&mut self, start: Pc, end: Pc) {
        let previous = self.bcx.switch_to_block(start, end);
        debug_assert!(previous.terminator.is_none() && previous.insts.is_empty());
        self.stack = BlockStack::new();
        self.gas = GasMeter::new();
        self.stack_check = self.config.stack_checks.then(|| {
            self.bcx.void(InstKind::StackCheck { max_growth: 0, diff: 0 });
            0
        });
    }

    /// Finalizes the current block: falls through if it has no terminator, commits the open cost
    /// block and fills in the stack check.
    fn end_block(&mut self) -> Result<()> {
        let end = self.bcx.block().end;
        if !self.bcx.is_terminated() {
            self.bcx.terminate(Terminator::Jump(Dest::Block(end)));
        }
        self.gas.commit(&mut self.bcx);

        let max_growth = self.stack.max_growth();
        ensure!(
            max_growth <= STACK_LIMIT,
            "stack overflow: block grows the stack by {max_growth} items"
        );
        let diff = self.stack.height();
        if let Some(position) = self.stack_check.take() {
            if max_growth == 0 && diff == 0 {
                self.bcx.remove(position);
            } else {
                let kind = InstKind::StackCheck { max_growth: max_growth as u32, diff: diff as i32 };
                self.bcx.patch(position, kind);
            }
        }

        let start = self.bcx.block().start;
        let block = self.bcx.switch_to_block(end, end);
        let stack = std::mem::take(&mut self.stack);
        trace!(start, end, diff, max_growth, insts = block.insts.len(), "finished block");
        self.blocks.insert(start, (block, stack));
        Ok(())
    }

    fn translate_inst(&mut self, data: &InstData<'_>) -> Result<()> {
        match data.inst {
            Instruction::Stop => self.bcx.terminate(Terminator::Stop),

            Instruction::Unary(op) => {
                let a = self.pop()?;
                let r = self.bcx.unary(op, a);
                self.push(r);
            }
            Instruction::Binary(op) => {
                let [a, b] = self.popn()?;
                let r = self.bcx.binary(op, a, b);
                self.push(r);
            }
            Instruction::Ternary(op) => {
                let [a, b, c] = self.popn()?;
                let r = self.bcx.value(InstKind::Ternary(op, a, b, c));
                self.push(r);
            }
            Instruction::Builtin(builtin) => self.call_builtin(builtin)?,

            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::SStore => {
                let [key, value] = self.popn()?;
                if self.config.gas_metering {
                    self.gas.count_sstore(&mut self.bcx, key, value);
                }
                self.bcx.call(Builtin::SStore, vec![key, value]);
            }

            Instruction::Jump => {
                self.pop()?;
                let dest = self.jump_dest(data.pc)?;
                self.bcx.terminate(Terminator::Jump(dest));
            }
            Instruction::JumpI => {
                let [_, cond] = self.popn()?;
                let then_dest = self.jump_dest(data.pc)?;
                let else_dest = Dest::Block(data.next_pc());
                self.bcx.terminate(Terminator::Branch { cond, then_dest, else_dest });
            }
            Instruction::JumpDest => {}

            Instruction::Pc => {
                let pc = self.bcx.iconst_u64(data.pc as u64);
                self.push(pc);
            }
            Instruction::Gas => {
                let gas = self.bcx.value(InstKind::GasRemaining);
                self.push(gas);
            }

            Instruction::Push(value) => {
                let value = self.bcx.iconst(value);
                self.push(value);
            }
            Instruction::Dup(n) => self.stack.dup(&mut self.bcx.module, n as usize - 1)?,
            Instruction::Swap(n) => self.stack.swap(&mut self.bcx.module, n as usize)?,

            Instruction::Return => {
                let [offset, size] = self.popn()?;
                self.bcx.call(Builtin::MemoryRequire, vec![offset, size]);
                self.bcx.terminate(Terminator::Return { offset, size });
            }
            Instruction::Revert => {
                let [offset, size] = self.popn()?;
                self.bcx.call(Builtin::MemoryRequire, vec![offset, size]);
                self.bcx.terminate(Terminator::Revert { offset, size });
            }
            Instruction::SelfDestruct => {
                let beneficiary = self.pop()?;
                self.bcx.call(Builtin::SelfDestruct, vec![beneficiary]);
                self.bcx.terminate(Terminator::SelfDestruct);
            }
            Instruction::Invalid => {
                self.bcx.terminate(Terminator::Fail(InstructionResult::InvalidFEOpcode));
            }
            Instruction::Unknown(opcode) => {
                debug!(pc = data.pc, opcode, "unknown opcode");
                self.bcx.terminate(Terminator::Fail(InstructionResult::OpcodeNotFound));
            }
        }
        Ok(())
    }

    /// Pops the parameters of a builtin, calls it and pushes its result.
    fn call_builtin(&mut self, builtin: Builtin) -> Result<()> {
        let args = (0..builtin.num_params()).map(|_| self.pop()).collect::<Result<Vec<_>>>()?;
        if let Some(result) = self.bcx.call(builtin, args) {
            self.push(result);
        }
        Ok(())
    }

    fn jump_dest(&self, pc: Pc) -> Result<Dest> {
        if self.bytecode.is_invalid_jump(pc) {
            return Ok(Dest::InvalidJump);
        }
        self.bytecode
            .jump_target(pc)
            .map(Dest::Block)
            .ok_or_else(|| eyre!("unresolved jump at pc {pc}"))
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop(&mut self.bcx.module)
    }

    /// Pops `N` values, the top of the stack first.
    fn popn<const N: usize>(&mut self) -> Result<[Value; N]> {
        let mut values = [Value::from_usize(0); N];
        for value in &mut values {
            *value = self.pop()?;
        }
        Ok(values)
    }
}
