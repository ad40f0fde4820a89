//! Internal EVM bytecode and opcode representation.

use bitvec::vec::BitVec;
use evmjit_backend::{eyre::bail, ir::Pc, Result};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Range,
};

mod info;
pub use info::*;

mod inst;
pub use inst::{InstData, InstFlags, Instruction};

pub mod op;

mod opcode;
pub use opcode::*;

/// An EVM instruction is a high level internal representation of an EVM opcode.
///
/// This is an index into [`Bytecode`] instructions.
///
/// Also known as `ic`, or instruction counter; not to be confused with SSA `inst`s.
pub type Inst = usize;

/// EVM bytecode, decoded and partitioned into basic blocks.
pub struct Bytecode<'a> {
    /// The original bytecode slice.
    code: &'a [u8],
    /// The decoded instructions, ordered by program counter.
    insts: Vec<InstData<'a>>,
    /// `true` at every program counter that starts an instruction.
    inst_starts: BitVec,
    /// Program counters that start a basic block, including the code length.
    split_points: BTreeSet<Pc>,
    /// `JUMP`/`JUMPI` program counter to target block start.
    jump_targets: BTreeMap<Pc, Pc>,
    /// `JUMP`/`JUMPI` program counters whose target is not an instruction boundary.
    invalid_jumps: BTreeSet<Pc>,
}

impl<'a> Bytecode<'a> {
    /// Decodes the given code. Call [`analyze`](Self::analyze) before using the block partition.
    #[instrument(name = "new_bytecode", level = "debug", skip_all)]
    pub fn new(code: &'a [u8]) -> Self {
        let mut insts = Vec::with_capacity(code.len() + 1);
        let mut inst_starts = BitVec::repeat(false, code.len());
        for (pc, opcode) in Opcodes::new(code) {
            if opcode.is_truncated() {
                debug!(pc, %opcode, "truncated immediate");
            }
            inst_starts.set(pc, true);
            insts.push(InstData::new(pc, opcode));
        }
        Self {
            code,
            insts,
            inst_starts,
            split_points: BTreeSet::new(),
            jump_targets: BTreeMap::new(),
            invalid_jumps: BTreeSet::new(),
        }
    }

    /// Returns the raw code.
    #[inline]
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    /// Returns the length of the code, which is also the start of the exit block.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns `true` if the code is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns all decoded instructions.
    #[inline]
    pub fn insts(&self) -> &[InstData<'a>] {
        &self.insts
    }

    /// Returns the instruction at the given instruction counter.
    #[inline]
    #[track_caller]
    pub fn inst(&self, inst: Inst) -> &InstData<'a> {
        &self.insts[inst]
    }

    /// Returns the instructions whose program counters lie in `range`.
    pub fn insts_in(&self, range: Range<Pc>) -> &[InstData<'a>] {
        let start = self.insts.partition_point(|data| data.pc < range.start);
        let end = self.insts.partition_point(|data| data.pc < range.end);
        &self.insts[start..end]
    }

    /// Runs block discovery and dead code analysis.
    #[instrument(name = "analyze", level = "debug", skip_all)]
    pub fn analyze(&mut self) -> Result<()> {
        self.static_jump_analysis()?;
        self.split_blocks();
        self.mark_dead_code();
        Ok(())
    }

    /// Resolves the target of every `JUMP`/`JUMPI` from the `PUSH` right before it.
    #[instrument(name = "sja", level = "debug", skip_all)]
    fn static_jump_analysis(&mut self) -> Result<()> {
        self.jump_targets.clear();
        self.invalid_jumps.clear();
        for i in 0..self.insts.len() {
            if !self.insts[i].is_jump() {
                continue;
            }
            let pc = self.insts[i].pc;
            let Some(Instruction::Push(target)) = i.checked_sub(1).map(|prev| self.insts[prev].inst)
            else {
                bail!("dynamic jump unsupported at pc {pc}");
            };

            // Jumping out of code means STOP.
            let target = usize::try_from(target).map_or(self.len(), |t| t.min(self.len()));
            if target < self.len() && !self.inst_starts[target] {
                debug!(pc, target, "found invalid jump");
                self.invalid_jumps.insert(pc);
                self.insts[i].flags |= InstFlags::STATIC_JUMP | InstFlags::INVALID_JUMP;
                continue;
            }
            trace!(pc, target, "found jump");
            self.jump_targets.insert(pc, target);
            self.insts[i].flags |= InstFlags::STATIC_JUMP;
        }

        // A jump that is itself a jump target can be reached without the `PUSH` before it.
        let targets = self.jump_targets.values().collect::<BTreeSet<_>>();
        let jumps = self.jump_targets.keys().chain(&self.invalid_jumps);
        if let Some(pc) = jumps.filter(|pc| targets.contains(pc)).min() {
            bail!("dynamic jump unsupported at pc {pc}");
        }
        Ok(())
    }

    /// Collects the start of every basic block.
    fn split_blocks(&mut self) {
        let mut split_points = BTreeSet::from([0, self.len()]);
        split_points.extend(self.jump_targets.values().copied());
        split_points
            .extend(self.insts.iter().filter(|data| data.is_block_end()).map(InstData::next_pc));
        self.split_points = split_points;
        debug!(blocks = self.split_points.len() - 1, "split blocks");
    }

    /// Marks instructions that follow a diverging instruction and are not a jump target.
    #[instrument(name = "dce", level = "debug", skip_all)]
    fn mark_dead_code(&mut self) {
        let targets = self.jump_targets.values().copied().collect::<BTreeSet<_>>();
        let len = self.insts.len();
        let mut dead_since = None;
        for i in 0..len {
            let data = &mut self.insts[i];
            if targets.contains(&data.pc) {
                if let Some(start) = dead_since.take() {
                    debug!("found dead code: {start}..{i}");
                }
            }
            if dead_since.is_some() {
                data.flags |= InstFlags::DEAD_CODE;
            } else if data.is_diverging() && i + 1 < len {
                dead_since = Some(i + 1);
            }
        }
        if let Some(start) = dead_since {
            debug!("found dead code: {start}..{len}");
        }
    }

    /// Returns the basic block ranges. They partition `0..len`; the exit block at `len` is not
    /// included.
    pub fn blocks(&self) -> impl Iterator<Item = Range<Pc>> + '_ {
        self.split_points.iter().zip(self.split_points.iter().skip(1)).map(|(&a, &b)| a..b)
    }

    /// Returns the start of the block a `JUMP`/`JUMPI` at `pc` branches to, if it is valid.
    #[inline]
    pub fn jump_target(&self, pc: Pc) -> Option<Pc> {
        self.jump_targets.get(&pc).copied()
    }

    /// Returns `true` if the `JUMP`/`JUMPI` at `pc` has a target inside of `PUSH` data.
    #[inline]
    pub fn is_invalid_jump(&self, pc: Pc) -> bool {
        self.invalid_jumps.contains(&pc)
    }

    /// Returns all resolved jumps.
    #[inline]
    pub fn jump_targets(&self) -> &BTreeMap<Pc, Pc> {
        &self.jump_targets
    }
}

impl fmt::Display for Bytecode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!("{:^6} | {:^6} | {:^40} | {}", "ic", "pc", "opcode", "instruction");
        writeln!(f, "{header}")?;
        writeln!(f, "{}", "-".repeat(header.len()))?;
        for (inst, data) in self.insts.iter().enumerate() {
            if inst > 0 && self.split_points.contains(&data.pc) {
                writeln!(f, "{:>6} | {:>6} |", "", "")?;
            }
            let opcode = data.to_op().to_string();
            let pc = data.pc;
            writeln!(f, "{inst:>6} | {pc:>6} | {opcode:<40} | {data:?}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bytecode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytecode")
            .field("code", &alloy_primitives::hex::encode(self.code))
            .field("insts", &self.insts)
            .field("split_points", &self.split_points)
            .field("jump_targets", &self.jump_targets)
            .field("invalid_jumps", &self.invalid_jumps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmjit_backend::U256;

    fn analyze(code: &[u8]) -> Bytecode<'_> {
        let mut bytecode = Bytecode::new(code);
        bytecode.analyze().unwrap();
        bytecode
    }

    fn assert_partition(bytecode: &Bytecode<'_>) {
        let mut end = 0;
        for block in bytecode.blocks() {
            assert_eq!(block.start, end, "{bytecode}");
            assert!(block.start < block.end, "{bytecode}");
            end = block.end;
        }
        assert_eq!(end, bytecode.len());
        let starts = bytecode.blocks().map(|b| b.start).chain([bytecode.len()]);
        let starts = starts.collect::<BTreeSet<_>>();
        for target in bytecode.jump_targets().values() {
            assert!(starts.contains(target), "{target} is not a block start");
        }
    }

    #[test]
    fn straight_line() {
        let code = [op::PUSH1, 2, op::PUSH1, 3, op::ADD, op::STOP];
        let bytecode = analyze(&code);
        assert_eq!(bytecode.blocks().collect::<Vec<_>>(), [0..6]);
        assert_eq!(bytecode.insts().len(), 4);
        assert_eq!(bytecode.inst(1).inst, Instruction::Push(U256::from(3)));
        assert_eq!(bytecode.inst(3).next_pc(), 6);
        assert_partition(&bytecode);
    }

    #[test]
    fn jumps() {
        #[rustfmt::skip]
        let code = [
            /* 0 */ op::PUSH1, 1, op::PUSH1, 9, op::JUMPI,
            /* 5 */ op::PUSH1, 0x20, op::JUMP,
            /* 8 */ op::INVALID,
            /* 9 */ op::JUMPDEST, op::STOP,
        ];
        let bytecode = analyze(&code);
        assert_eq!(bytecode.blocks().collect::<Vec<_>>(), [0..5, 5..8, 8..9, 9..11]);
        assert_eq!(bytecode.jump_target(4), Some(9));
        // Out of code.
        assert_eq!(bytecode.jump_target(7), Some(11));
        assert!(bytecode.inst_starts[9]);
        assert!(bytecode.inst(2).flags.contains(InstFlags::STATIC_JUMP));
        assert_partition(&bytecode);
    }

    #[test]
    fn jump_into_push_data() {
        let code = [op::PUSH1, 1, op::JUMP, op::PUSH2, 0x5b, 0x00];
        let bytecode = analyze(&code);
        assert!(bytecode.is_invalid_jump(2));
        assert_eq!(bytecode.jump_target(2), None);
        assert!(bytecode.inst(1).flags.contains(InstFlags::INVALID_JUMP));
        // Unreachable after the jump.
        assert!(bytecode.inst(2).is_dead_code());
        assert_partition(&bytecode);
    }

    #[test]
    fn dynamic_jump() {
        let code = [op::PUSH1, 1, op::PUSH1, 2, op::ADD, op::JUMP];
        let err = Bytecode::new(&code).analyze().unwrap_err();
        assert_eq!(err.to_string(), "dynamic jump unsupported at pc 5");

        let err = Bytecode::new(&[op::JUMPI]).analyze().unwrap_err();
        assert_eq!(err.to_string(), "dynamic jump unsupported at pc 0");

        // The `JUMP` at 2 is also reached from the `JUMP` at 5, with a different target.
        let code = [op::PUSH1, 0, op::JUMP, op::PUSH1, 2, op::JUMP];
        let err = Bytecode::new(&code).analyze().unwrap_err();
        assert_eq!(err.to_string(), "dynamic jump unsupported at pc 2");
    }

    #[test]
    fn dead_code() {
        #[rustfmt::skip]
        let code = [
            /* 0 */ op::PUSH1, 6, op::JUMP,
            /* 3 */ op::ADD, op::POP, op::STOP,
            /* 6 */ op::JUMPDEST, 0x0c, op::ADD, op::STOP,
        ];
        let bytecode = analyze(&code);
        let dead = bytecode.insts().iter().map(InstData::is_dead_code).collect::<Vec<_>>();
        assert_eq!(dead, [false, false, true, true, true, false, false, true, true]);
        assert_eq!(bytecode.blocks().collect::<Vec<_>>(), [0..3, 3..6, 6..10]);
    }

    #[test]
    fn partition_is_exact() {
        let codes: [&[u8]; 5] = [
            &[],
            &[op::STOP],
            &[op::PUSH32, 1, 2, 3],
            &[op::PUSH1, 0, op::PUSH1, 4, op::JUMPI, op::JUMPDEST, op::RETURN, op::SELFDESTRUCT],
            &[op::PUSH1, 3, op::JUMP, op::JUMPDEST, op::PUSH1, 3, op::JUMP],
        ];
        for code in codes {
            assert_partition(&analyze(code));
        }
    }

    #[test]
    fn display() {
        let code = [op::PUSH1, 4, op::JUMP, op::STOP, op::JUMPDEST];
        let s = analyze(&code).to_string();
        assert!(s.contains("PUSH1 0x04"), "{s}");
        assert!(s.lines().count() > 5, "{s}");
    }
}
