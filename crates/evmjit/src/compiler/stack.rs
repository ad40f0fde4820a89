//! The abstract stack of a single basic block.

use evmjit_backend::{
    eyre::{bail, ensure},
    ir::{Module, Value},
    Result,
};
use evmjit_context::STACK_LIMIT;
use std::collections::BTreeMap;

/// The abstract stack of one basic block.
///
/// Only the net effect of the block is recorded. The stack as seen by the block is the entry stack,
/// minus the `pulled` items on top of it, plus `local`. Entry items are materialized lazily as
/// placeholder values, at most one per depth, the first time the block reaches that deep.
#[derive(Clone, Debug, Default)]
pub(crate) struct BlockStack {
    /// The visible top of the stack, bottom first.
    local: Vec<Value>,
    /// Number of entry items moved into `local`.
    pulled: usize,
    /// Entry placeholders by depth below the entry top.
    placeholders: BTreeMap<usize, Value>,
    /// The highest the block gets above its entry height.
    max_growth: usize,
}

impl BlockStack {
    /// Creates a new empty stack.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the net height change since block entry.
    pub(crate) fn height(&self) -> isize {
        self.local.len() as isize - self.pulled as isize
    }

    /// Returns the maximum height reached above the entry height.
    pub(crate) fn max_growth(&self) -> usize {
        self.max_growth
    }

    /// Returns the entry placeholders ordered by depth.
    pub(crate) fn placeholders(&self) -> impl Iterator<Item = (usize, Value)> + '_ {
        self.placeholders.iter().map(|(&depth, &value)| (depth, value))
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.local.push(value);
        if let Ok(height) = usize::try_from(self.height()) {
            self.max_growth = self.max_growth.max(height);
        }
    }

    pub(crate) fn pop(&mut self, module: &mut Module) -> Result<Value> {
        self.reach(module, 1)?;
        match self.local.pop() {
            Some(value) => Ok(value),
            None => bail!("stack underflow"),
        }
    }

    /// Pushes a copy of the value at `index`, 0 being the top.
    pub(crate) fn dup(&mut self, module: &mut Module, index: usize) -> Result<()> {
        self.reach(module, index + 1)?;
        let value = self.local[self.local.len() - 1 - index];
        self.push(value);
        Ok(())
    }

    /// Exchanges the top with the value at `index`.
    pub(crate) fn swap(&mut self, module: &mut Module, index: usize) -> Result<()> {
        ensure!(index != 0, "cannot swap the top of the stack with itself");
        self.reach(module, index + 1)?;
        let top = self.local.len() - 1;
        self.local.swap(top, top - index);
        Ok(())
    }

    /// Returns the value at `depth` below the top of the stack at block exit.
    ///
    /// Reaching past the local values materializes an entry placeholder without pulling it.
    pub(crate) fn exit_value(&mut self, module: &mut Module, depth: usize) -> Result<Value> {
        match self.local.len().checked_sub(depth + 1) {
            Some(i) => Ok(self.local[i]),
            None => self.placeholder(module, self.pulled + depth - self.local.len()),
        }
    }

    /// Makes sure that at least `n` values are local, pulling entry items as needed.
    fn reach(&mut self, module: &mut Module, n: usize) -> Result<()> {
        while self.local.len() < n {
            let value = self.placeholder(module, self.pulled)?;
            self.local.insert(0, value);
            self.pulled += 1;
        }
        Ok(())
    }

    fn placeholder(&mut self, module: &mut Module, depth: usize) -> Result<Value> {
        ensure!(depth < STACK_LIMIT, "stack underflow: reading {depth} items below block entry");
        Ok(*self.placeholders.entry(depth).or_insert_with(|| module.new_value()))
    }
}
