//! Static gas accounting in cost blocks.

use super::builder::IrBuilder;
use crate::OpcodeInfo;
use evmjit_backend::ir::{Builtin, InstKind, UnOp, Value};
use evmjit_context::gas;

/// Batches static gas costs into one check per cost block.
///
/// A cost block is opened by the first counted instruction: a `GasCheck(0)` is emitted in front of
/// it and patched with the accumulated total when the block is committed. The static costs of a
/// cost block are therefore paid before any of its instructions run.
#[derive(Debug, Default)]
pub(super) struct GasMeter {
    /// Position of the open check in the current basic block.
    check: Option<usize>,
    /// The static cost accumulated so far.
    cost: u64,
}

impl GasMeter {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Adds the static cost of an instruction, committing if it ends the cost block.
    pub(super) fn count(&mut self, bcx: &mut IrBuilder, info: OpcodeInfo) {
        if self.check.is_none() {
            self.check = Some(bcx.position());
            bcx.void(InstKind::GasCheck(0));
        }
        self.cost = self.cost.saturating_add(info.base_gas() as u64);
        if info.is_cost_block_end() {
            self.commit(bcx);
        }
    }

    /// Closes the open cost block, if any.
    pub(super) fn commit(&mut self, bcx: &mut IrBuilder) {
        let Some(position) = self.check.take() else { return };
        let cost = std::mem::take(&mut self.cost);
        trace!(pc = bcx.block().start, cost, "commit cost block");
        if cost == 0 {
            bcx.remove(position);
        } else {
            bcx.patch(position, InstKind::GasCheck(cost));
        }
    }

    /// Charges `SSTORE` depending on the current value of the slot.
    ///
    /// Creating a slot costs twice the base cost, clearing it costs nothing and is refunded, any
    /// other write costs the base cost.
    pub(super) fn count_sstore(&mut self, bcx: &mut IrBuilder, key: Value, new: Value) {
        self.commit(bcx);

        let Some(old) = bcx.call(Builtin::SLoad, vec![key]) else { return };
        let old_is_zero = bcx.unary(UnOp::IsZero, old);
        let new_is_zero = bcx.unary(UnOp::IsZero, new);

        let base = bcx.iconst_u64(gas::SSTORE_BASE);
        let create = bcx.iconst_u64(2 * gas::SSTORE_BASE);
        let zero = bcx.iconst_u64(0);
        let from_zero = bcx.select(new_is_zero, base, create);
        let from_nonzero = bcx.select(new_is_zero, zero, base);
        let cost = bcx.select(old_is_zero, from_zero, from_nonzero);
        bcx.void(InstKind::GasCheckDyn(cost));

        let refund = bcx.iconst_u64(gas::SSTORE_REFUND);
        let refund = bcx.select(old_is_zero, zero, refund);
        let refund = bcx.select(new_is_zero, refund, zero);
        bcx.void(InstKind::Refund(refund));
    }
}
