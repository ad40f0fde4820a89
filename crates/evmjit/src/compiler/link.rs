//! Cross-block value linking.
//!
//! Every placeholder a block reads from its entry stack becomes a [`Phi`] with one incoming value
//! per predecessor, taken from the predecessor's exit stack at the same depth.

use super::stack::BlockStack;
use evmjit_backend::{
    eyre::{bail, eyre, WrapErr},
    ir::{Inst, InstKind, Module, Pc, Phi, Value},
    Result, U256,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Resolves every placeholder of `module` into phis.
///
/// Reading a predecessor's exit stack deeper than its local values creates a placeholder in the
/// predecessor too, so resolution runs on a worklist until no new placeholder appears.
#[instrument(name = "link", level = "debug", skip_all, fields(name = %module.name))]
pub(super) fn link(module: &mut Module, stacks: &mut BTreeMap<Pc, BlockStack>) -> Result<()> {
    let reachable = module.reachable();
    for block in module.blocks.values_mut() {
        block.reachable = reachable.contains(&block.start);
    }
    let preds = module.predecessors();

    let mut queued = BTreeSet::<(Pc, usize)>::new();
    let mut worklist = VecDeque::new();
    let mut enqueue = |pc: Pc, stack: &BlockStack, worklist: &mut VecDeque<(Pc, usize)>| {
        for (depth, _) in stack.placeholders() {
            if queued.insert((pc, depth)) {
                worklist.push_back((pc, depth));
            }
        }
    };
    for &pc in &reachable {
        if let Some(stack) = stacks.get(&pc) {
            enqueue(pc, stack, &mut worklist);
        }
    }

    let mut incoming = BTreeMap::<(Pc, usize), Vec<(Pc, Value)>>::new();
    while let Some((pc, depth)) = worklist.pop_front() {
        if pc == Module::ENTRY {
            let n = depth + 1;
            bail!("stack underflow: the entry block reads {n} items below the empty stack");
        }
        let block_preds = preds.get(&pc).map(Vec::as_slice).unwrap_or_default();
        let mut values = Vec::with_capacity(block_preds.len());
        for &pred in block_preds {
            let stack =
                stacks.get_mut(&pred).ok_or_else(|| eyre!("missing stack of block {pred}"))?;
            let value = stack.exit_value(module, depth).wrap_err_with(|| {
                format!("stack depth mismatch: block {pred} cannot supply depth {depth} to {pc}")
            })?;
            enqueue(pred, stack, &mut worklist);
            values.push((pred, value));
        }
        trace!(pc, depth, preds = values.len(), "linked");
        incoming.insert((pc, depth), values);
    }

    let mut num_phis = 0;
    for block in module.blocks.values_mut() {
        let Some(stack) = stacks.get(&block.start) else { continue };
        if block.reachable {
            block.phis = stack
                .placeholders()
                .map(|(depth, value)| Phi {
                    value,
                    depth,
                    incoming: incoming.remove(&(block.start, depth)).unwrap_or_default(),
                })
                .collect();
            num_phis += block.phis.len();
        } else {
            // Nothing flows into an unreachable block; define its inputs as zero.
            let zeros = stack.placeholders().map(|(_, value)| Inst {
                result: Some(value),
                kind: InstKind::Const(U256::ZERO),
                pc: block.start,
            });
            block.insts.splice(0..0, zeros);
        }
    }
    debug!(phis = num_phis, "linked module");
    Ok(())
}
