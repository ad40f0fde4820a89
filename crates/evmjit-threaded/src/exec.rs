use crate::lower::{Op, Program, Reg, Target, Term};
use evmjit_backend::U256;
use evmjit_builtins::call_builtin;
use evmjit_context::{EvmContext, EvmWord, InstructionResult, RawEvmFn, STACK_LIMIT};

/// Mutable state of one execution of a [`Program`].
struct Frame {
    regs: Vec<U256>,
    /// Runtime stack height, maintained by the stack checks at block entry.
    height: usize,
    scratch: Vec<U256>,
}

impl RawEvmFn for Program {
    fn call(&self, ecx: &mut EvmContext<'_>) -> InstructionResult {
        let mut frame = Frame { regs: self.init.to_vec(), height: 0, scratch: Vec::new() };
        let mut current = self.entry;
        loop {
            let block = &self.blocks[current];
            for op in &block.ops {
                if let Err(result) = frame.exec(op, ecx) {
                    return result;
                }
            }

            let edge = match &block.term {
                Term::Jump(edge) => edge,
                Term::Branch { cond, then_edge, else_edge } => {
                    if frame.get(*cond).is_zero() {
                        else_edge
                    } else {
                        then_edge
                    }
                }
                Term::Stop => return InstructionResult::Stop,
                &Term::Return { offset, size } => {
                    return frame.halt_with_range(ecx, offset, size, InstructionResult::Return)
                }
                &Term::Revert { offset, size } => {
                    return frame.halt_with_range(ecx, offset, size, InstructionResult::Revert)
                }
                Term::SelfDestruct => return InstructionResult::SelfDestruct,
                Term::Fail(result) => return *result,
            };

            // Parallel copy: read every source before writing any destination.
            frame.scratch.clear();
            frame.scratch.extend(edge.copies.iter().map(|&(_, src)| frame.regs[src.index()]));
            for (&(dst, _), &value) in edge.copies.iter().zip(&frame.scratch) {
                frame.regs[dst.index()] = value;
            }

            match edge.target {
                Target::Block(next) => current = next,
                Target::InvalidJump => return InstructionResult::InvalidJump,
            }
        }
    }
}

impl Frame {
    #[inline]
    fn get(&self, reg: Reg) -> U256 {
        self.regs[reg.index()]
    }

    #[inline]
    fn set(&mut self, reg: Reg, value: U256) {
        self.regs[reg.index()] = value;
    }

    fn exec(&mut self, op: &Op, ecx: &mut EvmContext<'_>) -> Result<(), InstructionResult> {
        match *op {
            Op::Const(dst, value) => self.set(dst, value),
            Op::Copy(dst, src) => self.set(dst, self.get(src)),
            Op::Unary(op, dst, a) => self.set(dst, op.eval(self.get(a))),
            Op::Binary(op, dst, a, b) => self.set(dst, op.eval(self.get(a), self.get(b))),
            Op::Ternary(op, dst, [a, b, c]) => {
                self.set(dst, op.eval(self.get(a), self.get(b), self.get(c)))
            }
            Op::Select { dst, cond, then, els } => {
                let src = if self.get(cond).is_zero() { els } else { then };
                self.set(dst, self.get(src));
            }
            Op::GasCheck(cost) => {
                if !ecx.gas.record_cost(cost) {
                    return Err(InstructionResult::OutOfGas);
                }
            }
            Op::GasCheckDyn(cost) => {
                if !ecx.gas.record_cost(self.get(cost).saturating_to()) {
                    return Err(InstructionResult::OutOfGas);
                }
            }
            Op::GasRemaining(dst) => self.set(dst, U256::from(ecx.gas.remaining())),
            Op::Refund(amount) => ecx.gas.record_refund(self.get(amount).saturating_to()),
            Op::StackCheck { max_growth, diff } => {
                if self.height + max_growth as usize > STACK_LIMIT {
                    return Err(InstructionResult::StackOverflow);
                }
                self.height = self
                    .height
                    .checked_add_signed(diff as isize)
                    .ok_or(InstructionResult::StackUnderflow)?;
            }
            Op::Call { builtin, ref args, dst } => {
                let mut buf = [EvmWord::ZERO; 8];
                let Some(buf) = buf.get_mut(..args.len()) else {
                    return Err(InstructionResult::FatalExternalError);
                };
                for (slot, &arg) in buf.iter_mut().zip(args.iter()) {
                    *slot = EvmWord::from_u256(self.get(arg));
                }
                let output = call_builtin(builtin, ecx, buf)?;
                if let (Some(dst), Some(output)) = (dst, output) {
                    self.set(dst, output.to_u256());
                }
            }
        }
        Ok(())
    }

    /// Records the memory range of `RETURN`/`REVERT`. The range was made resident before.
    fn halt_with_range(
        &self,
        ecx: &mut EvmContext<'_>,
        offset: Reg,
        size: Reg,
        result: InstructionResult,
    ) -> InstructionResult {
        let size = self.get(size);
        if size.is_zero() {
            // Memory is not touched, so the offset is kept as-is unless it overflows `usize`.
            let offset = usize::try_from(self.get(offset)).unwrap_or(0);
            ecx.return_range = offset..offset;
            return result;
        }
        let (Ok(offset), Ok(size)) = (usize::try_from(self.get(offset)), usize::try_from(size))
        else {
            return InstructionResult::InvalidOperandOOG;
        };
        let Some(end) = offset.checked_add(size) else {
            return InstructionResult::InvalidOperandOOG;
        };
        ecx.return_range = offset..end;
        result
    }
}
