//! Lowering of IR modules into register programs.

use evmjit_backend::{
    eyre::{eyre, OptionExt},
    ir::{BasicBlock, BinOp, Builtin, Dest, InstKind, Module, Pc, TernOp, Terminator, UnOp, Value},
    OptimizationLevel, Result, U256,
};
use evmjit_context::InstructionResult;
use rustc_hash::FxHashMap;
use std::fmt;

/// A register. Every IR value owns exactly one register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Reg(u32);

impl Reg {
    #[inline]
    fn new(value: Value) -> Self {
        Self(value.index() as u32)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Op {
    Const(Reg, U256),
    Copy(Reg, Reg),
    Unary(UnOp, Reg, Reg),
    Binary(BinOp, Reg, Reg, Reg),
    Ternary(TernOp, Reg, [Reg; 3]),
    Select { dst: Reg, cond: Reg, then: Reg, els: Reg },
    GasCheck(u64),
    GasCheckDyn(Reg),
    GasRemaining(Reg),
    Refund(Reg),
    StackCheck { max_growth: u32, diff: i32 },
    Call { builtin: Builtin, args: Box<[Reg]>, dst: Option<Reg> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Block(usize),
    InvalidJump,
}

/// A control-flow edge. `copies` is a parallel copy `(dst, src)` implementing the target's phis.
#[derive(Clone, Debug)]
pub(crate) struct Edge {
    pub(crate) target: Target,
    pub(crate) copies: Box<[(Reg, Reg)]>,
}

#[derive(Clone, Debug)]
pub(crate) enum Term {
    Jump(Edge),
    Branch { cond: Reg, then_edge: Edge, else_edge: Edge },
    Stop,
    Return { offset: Reg, size: Reg },
    Revert { offset: Reg, size: Reg },
    SelfDestruct,
    Fail(InstructionResult),
}

#[derive(Clone, Debug)]
pub(crate) struct Block {
    pub(crate) pc: Pc,
    pub(crate) ops: Vec<Op>,
    pub(crate) term: Term,
}

/// A module lowered into a flat register program.
///
/// Phis are gone: every edge carries the copies that set up the registers of the target block's
/// phis. Registers that hold constants may be pre-set in the initial register image.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) init: Box<[U256]>,
    pub(crate) blocks: Box<[Block]>,
    pub(crate) entry: usize,
}

impl Program {
    /// Returns the name of the lowered module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of registers.
    pub fn num_registers(&self) -> usize {
        self.init.len()
    }

    /// Returns the total number of operations, excluding terminators.
    pub fn num_ops(&self) -> usize {
        self.blocks.iter().map(|b| b.ops.len()).sum()
    }
}

/// Lowers `module`. It must be fully linked.
#[instrument(level = "debug", skip_all, fields(name = %module.name))]
pub(crate) fn lower(module: &Module, opt_level: OptimizationLevel) -> Result<Program> {
    let index = module
        .blocks
        .keys()
        .enumerate()
        .map(|(i, &pc)| (pc, i))
        .collect::<FxHashMap<Pc, usize>>();
    let entry = *index.get(&Module::ENTRY).ok_or_eyre("module has no entry block")?;

    let mut cx = LowerCx {
        index: &index,
        module,
        consts: FxHashMap::default(),
        fold: opt_level >= OptimizationLevel::Less,
    };
    let mut blocks = Vec::with_capacity(module.blocks.len());
    for block in module.blocks.values() {
        blocks.push(cx.lower_block(block)?);
    }

    let mut init = vec![U256::ZERO; module.num_values()].into_boxed_slice();
    if opt_level >= OptimizationLevel::Default {
        let mut hoisted = 0usize;
        for block in &mut blocks {
            block.ops.retain(|op| match *op {
                Op::Const(dst, value) => {
                    init[dst.index()] = value;
                    hoisted += 1;
                    false
                }
                _ => true,
            });
        }
        trace!(hoisted, "hoisted constants");
    }

    let program = Program { name: module.name.clone(), init, blocks: blocks.into(), entry };
    debug!(
        blocks = program.blocks.len(),
        registers = program.num_registers(),
        ops = program.num_ops(),
        folded = cx.consts.len(),
        "lowered"
    );
    Ok(program)
}

struct LowerCx<'a> {
    index: &'a FxHashMap<Pc, usize>,
    module: &'a Module,
    /// Values known to be constant.
    consts: FxHashMap<Value, U256>,
    fold: bool,
}

impl LowerCx<'_> {
    fn lower_block(&mut self, block: &BasicBlock) -> Result<Block> {
        if !block.reachable {
            return Ok(Block {
                pc: block.start,
                ops: Vec::new(),
                term: Term::Fail(InstructionResult::FatalExternalError),
            });
        }

        let mut ops = Vec::with_capacity(block.insts.len());
        for inst in &block.insts {
            let op = match (&inst.kind, inst.result) {
                (InstKind::Const(value), Some(dst)) => self.constant(dst, *value),
                (&InstKind::Unary(op, a), Some(dst)) => match self.get(a) {
                    Some(a) => self.constant(dst, op.eval(a)),
                    None => Op::Unary(op, Reg::new(dst), Reg::new(a)),
                },
                (&InstKind::Binary(op, a, b), Some(dst)) => match (self.get(a), self.get(b)) {
                    (Some(a), Some(b)) => self.constant(dst, op.eval(a, b)),
                    _ => Op::Binary(op, Reg::new(dst), Reg::new(a), Reg::new(b)),
                },
                (&InstKind::Ternary(op, a, b, c), Some(dst)) => {
                    match (self.get(a), self.get(b), self.get(c)) {
                        (Some(a), Some(b), Some(c)) => self.constant(dst, op.eval(a, b, c)),
                        _ => Op::Ternary(op, Reg::new(dst), [a, b, c].map(Reg::new)),
                    }
                }
                (&InstKind::Select(cond, then, els), Some(dst)) => match self.get(cond) {
                    Some(cond) => {
                        let src = if cond.is_zero() { els } else { then };
                        match self.get(src) {
                            Some(value) => self.constant(dst, value),
                            None => Op::Copy(Reg::new(dst), Reg::new(src)),
                        }
                    }
                    None => Op::Select {
                        dst: Reg::new(dst),
                        cond: Reg::new(cond),
                        then: Reg::new(then),
                        els: Reg::new(els),
                    },
                },
                (&InstKind::GasCheck(cost), None) => Op::GasCheck(cost),
                (&InstKind::GasCheckDyn(cost), None) => match self.get(cost) {
                    Some(cost) => Op::GasCheck(cost.saturating_to()),
                    None => Op::GasCheckDyn(Reg::new(cost)),
                },
                (InstKind::GasRemaining, Some(dst)) => Op::GasRemaining(Reg::new(dst)),
                (&InstKind::Refund(amount), None) => Op::Refund(Reg::new(amount)),
                (&InstKind::StackCheck { max_growth, diff }, None) => {
                    Op::StackCheck { max_growth, diff }
                }
                (InstKind::Call(builtin, args), dst) => Op::Call {
                    builtin: *builtin,
                    args: args.iter().copied().map(Reg::new).collect(),
                    dst: dst.map(Reg::new),
                },
                (kind, result) => {
                    return Err(eyre!(
                        "malformed instruction at pc {}: {kind} with result {result:?}",
                        inst.pc
                    ))
                }
            };
            ops.push(op);
        }

        let Some(terminator) = &block.terminator else {
            return Err(eyre!("block {} has no terminator", block.start));
        };
        let term = match *terminator {
            Terminator::Jump(dest) => Term::Jump(self.edge(block.start, dest)?),
            Terminator::Branch { cond, then_dest, else_dest } => {
                let then_edge = self.edge(block.start, then_dest)?;
                let else_edge = self.edge(block.start, else_dest)?;
                match self.get(cond) {
                    Some(c) if c.is_zero() => Term::Jump(else_edge),
                    Some(_) => Term::Jump(then_edge),
                    None => Term::Branch { cond: Reg::new(cond), then_edge, else_edge },
                }
            }
            Terminator::Stop => Term::Stop,
            Terminator::Return { offset, size } => {
                Term::Return { offset: Reg::new(offset), size: Reg::new(size) }
            }
            Terminator::Revert { offset, size } => {
                Term::Revert { offset: Reg::new(offset), size: Reg::new(size) }
            }
            Terminator::SelfDestruct => Term::SelfDestruct,
            Terminator::Fail(result) => Term::Fail(result),
        };
        Ok(Block { pc: block.start, ops, term })
    }

    fn edge(&self, from: Pc, dest: Dest) -> Result<Edge> {
        let Dest::Block(to) = dest else {
            return Ok(Edge { target: Target::InvalidJump, copies: Box::default() });
        };
        let target = *self.index.get(&to).ok_or_else(|| eyre!("jump to missing block {to}"))?;
        let copies = self.module.blocks[&to]
            .phis
            .iter()
            .map(|phi| {
                let (_, src) = phi
                    .incoming
                    .iter()
                    .find(|&&(pred, _)| pred == from)
                    .ok_or_else(|| eyre!("{phi} has no incoming value from block {from}"))?;
                Ok((Reg::new(phi.value), Reg::new(*src)))
            })
            .collect::<Result<_>>()?;
        Ok(Edge { target: Target::Block(target), copies })
    }

    fn get(&self, value: Value) -> Option<U256> {
        if !self.fold {
            return None;
        }
        self.consts.get(&value).copied()
    }

    fn constant(&mut self, dst: Value, value: U256) -> Op {
        if self.fold {
            self.consts.insert(dst, value);
        }
        Op::Const(Reg::new(dst), value)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(dst, value) => write!(f, "{dst} = {value:#x}"),
            Self::Copy(dst, src) => write!(f, "{dst} = {src}"),
            Self::Unary(op, dst, a) => write!(f, "{dst} = {} {a}", op.name()),
            Self::Binary(op, dst, a, b) => write!(f, "{dst} = {} {a}, {b}", op.name()),
            Self::Ternary(op, dst, [a, b, c]) => write!(f, "{dst} = {} {a}, {b}, {c}", op.name()),
            Self::Select { dst, cond, then, els } => {
                write!(f, "{dst} = select {cond}, {then}, {els}")
            }
            Self::GasCheck(cost) => write!(f, "gas {cost}"),
            Self::GasCheckDyn(cost) => write!(f, "gas {cost}"),
            Self::GasRemaining(dst) => write!(f, "{dst} = gas_remaining"),
            Self::Refund(amount) => write!(f, "refund {amount}"),
            Self::StackCheck { max_growth, diff } => write!(f, "stack +{max_growth} ({diff:+})"),
            Self::Call { builtin, args, dst } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call {}(", builtin.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Target::Block(i) => write!(f, "b{i}")?,
            Target::InvalidJump => f.write_str("<invalid jump>")?,
        }
        if !self.copies.is_empty() {
            f.write_str(" [")?;
            for (i, (dst, src)) in self.copies.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{dst} <- {src}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jump(edge) => write!(f, "jump {edge}"),
            Self::Branch { cond, then_edge, else_edge } => {
                write!(f, "br {cond}, {then_edge}, {else_edge}")
            }
            Self::Stop => f.write_str("stop"),
            Self::Return { offset, size } => write!(f, "return {offset}, {size}"),
            Self::Revert { offset, size } => write!(f, "revert {offset}, {size}"),
            Self::SelfDestruct => f.write_str("selfdestruct"),
            Self::Fail(result) => write!(f, "fail {result:?}"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "program {:?} ; {} registers", self.name, self.init.len())?;
        for (i, value) in self.init.iter().enumerate().filter(|(_, v)| !v.is_zero()) {
            writeln!(f, "init r{i} = {value:#x}")?;
        }
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "\nb{i}: ; pc {}", block.pc)?;
            for op in &block.ops {
                writeln!(f, "    {op}")?;
            }
            writeln!(f, "    {}", block.term)?;
        }
        Ok(())
    }
}
