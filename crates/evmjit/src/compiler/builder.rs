//! Appends IR to the block being translated.

use evmjit_backend::{
    ir::{BasicBlock, BinOp, Builtin, Inst, InstKind, Module, Pc, Terminator, UnOp, Value},
    U256,
};

/// Builds one [`Module`] block by block.
#[derive(Debug)]
pub(super) struct IrBuilder {
    pub(super) module: Module,
    block: BasicBlock,
    /// The program counter attached to new instructions.
    pc: Pc,
}

impl IrBuilder {
    pub(super) fn new(module: Module) -> Self {
        Self { module, block: BasicBlock::new(0, 0), pc: 0 }
    }

    /// Starts a new block, returning the previous one.
    pub(super) fn switch_to_block(&mut self, start: Pc, end: Pc) -> BasicBlock {
        self.pc = start;
        std::mem::replace(&mut self.block, BasicBlock::new(start, end))
    }

    /// Returns the block being built.
    pub(super) fn block(&self) -> &BasicBlock {
        &self.block
    }

    pub(super) fn set_pc(&mut self, pc: Pc) {
        self.pc = pc;
    }

    /// Returns the position the next instruction is appended at.
    pub(super) fn position(&self) -> usize {
        self.block.insts.len()
    }

    /// Returns `true` if the block already has a terminator.
    pub(super) fn is_terminated(&self) -> bool {
        self.block.terminator.is_some()
    }

    pub(super) fn terminate(&mut self, terminator: Terminator) {
        debug_assert!(!self.is_terminated(), "block {} terminated twice", self.block.start);
        self.block.terminator = Some(terminator);
    }

    /// Appends an instruction that defines a value.
    pub(super) fn value(&mut self, kind: InstKind) -> Value {
        debug_assert!(kind.has_result(), "{kind:?}");
        let value = self.module.new_value();
        self.block.insts.push(Inst { result: Some(value), kind, pc: self.pc });
        value
    }

    /// Appends an instruction that does not define a value.
    pub(super) fn void(&mut self, kind: InstKind) {
        debug_assert!(!kind.has_result(), "{kind:?}");
        self.block.insts.push(Inst { result: None, kind, pc: self.pc });
    }

    pub(super) fn iconst(&mut self, value: U256) -> Value {
        self.value(InstKind::Const(value))
    }

    pub(super) fn iconst_u64(&mut self, value: u64) -> Value {
        self.iconst(U256::from(value))
    }

    pub(super) fn unary(&mut self, op: UnOp, a: Value) -> Value {
        self.value(InstKind::Unary(op, a))
    }

    pub(super) fn binary(&mut self, op: BinOp, a: Value, b: Value) -> Value {
        self.value(InstKind::Binary(op, a, b))
    }

    pub(super) fn select(&mut self, cond: Value, then: Value, els: Value) -> Value {
        self.value(InstKind::Select(cond, then, els))
    }

    pub(super) fn call(&mut self, builtin: Builtin, args: Vec<Value>) -> Option<Value> {
        debug_assert_eq!(builtin.num_params(), args.len(), "{builtin:?}");
        let kind = InstKind::Call(builtin, args);
        if builtin.has_result() {
            Some(self.value(kind))
        } else {
            self.void(kind);
            None
        }
    }

    /// Replaces the instruction at `position` in the current block.
    pub(super) fn patch(&mut self, position: usize, kind: InstKind) {
        self.block.insts[position].kind = kind;
    }

    /// Removes the instruction at `position` in the current block.
    pub(super) fn remove(&mut self, position: usize) {
        self.block.insts.remove(position);
    }
}
