//! Intermediate representation.
//!
//! A [`Module`] is an arena of [`BasicBlock`]s keyed by the program counter they start at. Values
//! are in SSA form: every [`Value`] is defined exactly once, either by an [`Inst`] or by a [`Phi`]
//! at the start of a block. Control flow is explicit in each block's [`Terminator`].

use crate::{Result, U256};
use eyre::{bail, ensure};
use evmjit_context::InstructionResult;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::trace;

mod fmt;
pub use fmt::Dot;

mod ops;
pub use ops::{BinOp, TernOp, UnOp};

/// A program counter: a byte offset into the bytecode.
pub type Pc = usize;

/// An SSA value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value(u32);

impl Value {
    /// Creates a value from its index.
    #[inline]
    pub const fn from_usize(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the index of the value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

macro_rules! builtins {
    ($($(#[$attr:meta])* $ident:ident = $name:literal($params:literal) -> $ret:literal),* $(,)?) => {
        /// Out-of-line helpers that compiled code calls into.
        ///
        /// Parameters are passed in the order the EVM pops them, the top of the stack first.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($(#[$attr])* $ident,)*
        }

        impl Builtin {
            /// Number of builtins.
            pub const COUNT: usize = [$(Self::$ident),*].len();

            /// All builtins.
            pub const ALL: [Self; Self::COUNT] = [$(Self::$ident),*];

            /// Returns the name of the builtin.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$ident => $name,)*
                }
            }

            /// Returns the number of parameters.
            pub const fn num_params(self) -> usize {
                match self {
                    $(Self::$ident => $params,)*
                }
            }

            /// Returns `true` if the builtin produces a value.
            pub const fn has_result(self) -> bool {
                match self {
                    $(Self::$ident => $ret,)*
                }
            }
        }
    };
}

builtins! {
    MLoad = "mload"(1) -> true,
    MStore = "mstore"(2) -> false,
    MStore8 = "mstore8"(2) -> false,
    MSize = "msize"(0) -> true,
    /// Makes a memory range resident, charging for growth.
    MemoryRequire = "memory_require"(2) -> false,

    Keccak256 = "keccak256"(2) -> true,
    Exp = "exp"(2) -> true,

    Address = "address"(0) -> true,
    Origin = "origin"(0) -> true,
    Caller = "caller"(0) -> true,
    CallValue = "callvalue"(0) -> true,
    CallDataSize = "calldatasize"(0) -> true,
    CodeSize = "codesize"(0) -> true,
    GasPrice = "gasprice"(0) -> true,
    Coinbase = "coinbase"(0) -> true,
    Timestamp = "timestamp"(0) -> true,
    Number = "number"(0) -> true,
    Difficulty = "difficulty"(0) -> true,
    GasLimit = "gaslimit"(0) -> true,

    Balance = "balance"(1) -> true,
    CallDataLoad = "calldataload"(1) -> true,
    ExtCodeSize = "extcodesize"(1) -> true,
    BlockHash = "blockhash"(1) -> true,
    CallDataCopy = "calldatacopy"(3) -> false,
    CodeCopy = "codecopy"(3) -> false,
    ExtCodeCopy = "extcodecopy"(4) -> false,

    SLoad = "sload"(1) -> true,
    SStore = "sstore"(2) -> false,

    Log0 = "log0"(2) -> false,
    Log1 = "log1"(3) -> false,
    Log2 = "log2"(4) -> false,
    Log3 = "log3"(5) -> false,
    Log4 = "log4"(6) -> false,

    Create = "create"(3) -> true,
    Call = "call"(7) -> true,
    CallCode = "callcode"(7) -> true,
    DelegateCall = "delegatecall"(6) -> true,
    StaticCall = "staticcall"(6) -> true,
    SelfDestruct = "selfdestruct"(1) -> false,
}

impl Builtin {
    /// Returns the `LOG` builtin with `n` topics.
    pub const fn log(n: u8) -> Option<Self> {
        Some(match n {
            0 => Self::Log0,
            1 => Self::Log1,
            2 => Self::Log2,
            3 => Self::Log3,
            4 => Self::Log4,
            _ => return None,
        })
    }
}

/// An instruction kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    /// A constant.
    Const(U256),
    /// A unary operation.
    Unary(UnOp, Value),
    /// A binary operation. The first operand is the one popped first.
    Binary(BinOp, Value, Value),
    /// A ternary operation.
    Ternary(TernOp, Value, Value, Value),
    /// `cond != 0 ? then : else`.
    Select(Value, Value, Value),
    /// Subtracts a static cost from the gas counter, failing with `OutOfGas` if it does not
    /// suffice.
    GasCheck(u64),
    /// Same as [`GasCheck`](Self::GasCheck) with a runtime cost.
    GasCheckDyn(Value),
    /// The remaining gas.
    GasRemaining,
    /// Records a storage refund.
    Refund(Value),
    /// Runtime stack height bookkeeping at block entry.
    ///
    /// Fails with `StackOverflow` if the current height plus `max_growth` exceeds the stack
    /// limit, then adds `diff` to the height.
    StackCheck {
        /// The maximum height the block reaches above its entry height.
        max_growth: u32,
        /// The net height change of the block.
        diff: i32,
    },
    /// A call to an out-of-line builtin.
    Call(Builtin, Vec<Value>),
}

impl InstKind {
    /// Returns the values used by the instruction.
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::Const(_) | Self::GasCheck(_) | Self::GasRemaining | Self::StackCheck { .. } => {
                Vec::new()
            }
            Self::Unary(_, a) | Self::GasCheckDyn(a) | Self::Refund(a) => vec![*a],
            Self::Binary(_, a, b) => vec![*a, *b],
            Self::Ternary(_, a, b, c) | Self::Select(a, b, c) => vec![*a, *b, *c],
            Self::Call(_, args) => args.clone(),
        }
    }

    /// Returns `true` if the instruction defines a value.
    pub const fn has_result(&self) -> bool {
        match self {
            Self::Const(_)
            | Self::Unary(..)
            | Self::Binary(..)
            | Self::Ternary(..)
            | Self::Select(..)
            | Self::GasRemaining => true,
            Self::GasCheck(_)
            | Self::GasCheckDyn(_)
            | Self::Refund(_)
            | Self::StackCheck { .. } => false,
            Self::Call(builtin, _) => builtin.has_result(),
        }
    }
}

/// An instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    /// The defined value, if any.
    pub result: Option<Value>,
    /// The operation.
    pub kind: InstKind,
    /// The bytecode instruction this was emitted for.
    pub pc: Pc,
}

/// A branch destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dest {
    /// The block starting at the given program counter.
    Block(Pc),
    /// A target that is not an instruction boundary. Taking the branch fails with `InvalidJump`.
    InvalidJump,
}

impl Dest {
    /// Returns the target block, if any.
    #[inline]
    pub const fn block(self) -> Option<Pc> {
        match self {
            Self::Block(pc) => Some(pc),
            Self::InvalidJump => None,
        }
    }
}

/// The last instruction of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional branch.
    Jump(Dest),
    /// Branches to `then_dest` if `cond != 0`, to `else_dest` otherwise.
    Branch {
        /// The condition.
        cond: Value,
        /// Taken if the condition is non-zero.
        then_dest: Dest,
        /// Taken if the condition is zero.
        else_dest: Dest,
    },
    /// Halts successfully without output.
    Stop,
    /// Halts successfully, returning a memory range.
    Return {
        /// Memory offset.
        offset: Value,
        /// Size in bytes.
        size: Value,
    },
    /// Halts, reverting with a memory range.
    Revert {
        /// Memory offset.
        offset: Value,
        /// Size in bytes.
        size: Value,
    },
    /// Halts after `SELFDESTRUCT`.
    SelfDestruct,
    /// Halts with a fatal status.
    Fail(InstructionResult),
}

impl Terminator {
    /// Returns the successor blocks, without duplicates.
    pub fn successors(&self) -> impl Iterator<Item = Pc> {
        let (a, b) = match *self {
            Self::Jump(dest) => (dest.block(), None),
            Self::Branch { then_dest, else_dest, .. } => {
                let a = then_dest.block();
                let b = else_dest.block().filter(|b| Some(*b) != a);
                (a, b)
            }
            _ => (None, None),
        };
        a.into_iter().chain(b)
    }

    /// Returns the values used by the terminator.
    pub fn args(&self) -> Vec<Value> {
        match *self {
            Self::Branch { cond, .. } => vec![cond],
            Self::Return { offset, size } | Self::Revert { offset, size } => vec![offset, size],
            _ => Vec::new(),
        }
    }
}

/// A merge-value node.
///
/// Stands for the value at `depth` below the top of the stack on entry to the block. Linking
/// fills in one incoming value per predecessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Phi {
    /// The defined value.
    pub value: Value,
    /// Depth below the top of the entry stack, 0 being the top.
    pub depth: usize,
    /// `(predecessor, value)` pairs.
    pub incoming: Vec<(Pc, Value)>,
}

/// A basic block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    /// The first program counter of the block.
    pub start: Pc,
    /// One past the last program counter of the block.
    pub end: Pc,
    /// Merge-value nodes, ordered by depth.
    pub phis: Vec<Phi>,
    /// Instructions.
    pub insts: Vec<Inst>,
    /// The terminator. `None` only while the block is being built.
    pub terminator: Option<Terminator>,
    /// Whether the block is reachable from the entry block.
    pub reachable: bool,
}

impl BasicBlock {
    /// Creates a new empty block.
    pub const fn new(start: Pc, end: Pc) -> Self {
        Self {
            start,
            end,
            phis: Vec::new(),
            insts: Vec::new(),
            terminator: None,
            reachable: true,
        }
    }

    /// Returns the successors of the block.
    pub fn successors(&self) -> impl Iterator<Item = Pc> + '_ {
        self.terminator.iter().flat_map(Terminator::successors)
    }
}

/// A compiled unit: the blocks of one bytecode buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    /// Function name.
    pub name: String,
    /// Length of the bytecode. The empty exit block starts here.
    pub code_len: usize,
    /// Blocks keyed by their start.
    pub blocks: BTreeMap<Pc, BasicBlock>,
    num_values: u32,
}

impl Module {
    /// The entry program counter.
    pub const ENTRY: Pc = 0;

    /// Creates a new empty module.
    pub fn new(name: impl Into<String>, code_len: usize) -> Self {
        Self { name: name.into(), code_len, blocks: BTreeMap::new(), num_values: 0 }
    }

    /// Allocates a new value.
    #[inline]
    pub fn new_value(&mut self) -> Value {
        let value = Value(self.num_values);
        self.num_values += 1;
        value
    }

    /// Returns the number of allocated values.
    #[inline]
    pub const fn num_values(&self) -> usize {
        self.num_values as usize
    }

    /// Returns the entry block.
    #[inline]
    pub fn entry(&self) -> Option<&BasicBlock> {
        self.blocks.get(&Self::ENTRY)
    }

    /// Returns the start of the synthetic exit block.
    #[inline]
    pub const fn exit(&self) -> Pc {
        self.code_len
    }

    /// Computes the set of blocks reachable from the entry block.
    pub fn reachable(&self) -> BTreeSet<Pc> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([Self::ENTRY]);
        while let Some(pc) = queue.pop_front() {
            let Some(block) = self.blocks.get(&pc) else { continue };
            if seen.insert(pc) {
                queue.extend(block.successors());
            }
        }
        seen
    }

    /// Computes the predecessors of every block, considering only edges out of reachable
    /// blocks. Blocks without predecessors are omitted.
    pub fn predecessors(&self) -> BTreeMap<Pc, Vec<Pc>> {
        let mut preds = BTreeMap::<Pc, Vec<Pc>>::new();
        for block in self.blocks.values().filter(|b| b.reachable) {
            for succ in block.successors() {
                preds.entry(succ).or_default().push(block.start);
            }
        }
        preds
    }

    /// Returns the total number of instructions and phis.
    pub fn num_insts(&self) -> usize {
        self.blocks.values().map(|b| b.phis.len() + b.insts.len()).sum()
    }

    /// Checks the structural invariants of a fully linked module.
    pub fn verify(&self) -> Result<()> {
        let mut expected_start = 0;
        for (&pc, block) in &self.blocks {
            ensure!(pc == block.start, "block {} is keyed by {pc}", block.start);
            ensure!(
                block.start == expected_start,
                "gap or overlap before block {}: expected it to start at {expected_start}",
                block.start
            );
            ensure!(block.start <= block.end, "block {} ends before it starts", block.start);
            expected_start = block.end;
        }
        let Some((_, last)) = self.blocks.last_key_value() else {
            bail!("module has no blocks");
        };
        ensure!(
            last.start == self.code_len && last.end == self.code_len,
            "missing exit block at {}",
            self.code_len
        );

        let preds = self.predecessors();
        let mut defined = vec![false; self.num_values()];
        let mut define = |value: Value| -> Result<()> {
            let slot = defined
                .get_mut(value.index())
                .ok_or_else(|| eyre::eyre!("value v{} was never allocated", value.index()))?;
            ensure!(!*slot, "value v{} is defined more than once", value.index());
            *slot = true;
            Ok(())
        };
        for block in self.blocks.values() {
            let Some(terminator) = &block.terminator else {
                bail!("block {} has no terminator", block.start);
            };
            for succ in terminator.successors() {
                ensure!(
                    self.blocks.contains_key(&succ),
                    "block {} branches to {succ}, which is not a block",
                    block.start
                );
            }
            for phi in &block.phis {
                define(phi.value)?;
            }
            for inst in &block.insts {
                ensure!(
                    inst.result.is_some() == inst.kind.has_result(),
                    "result mismatch in block {} at pc {}: {:?}",
                    block.start,
                    inst.pc,
                    inst.kind
                );
                if let Some(result) = inst.result {
                    define(result)?;
                }
            }
            if !block.reachable {
                continue;
            }
            let block_preds = preds.get(&block.start).map(Vec::as_slice).unwrap_or_default();
            for phi in &block.phis {
                let mut incoming = phi.incoming.iter().map(|&(p, _)| p).collect::<Vec<_>>();
                incoming.sort_unstable();
                let mut expected = block_preds.to_vec();
                expected.sort_unstable();
                ensure!(
                    incoming == expected,
                    "phi v{} in block {} has incoming edges from {incoming:?}, \
                     but the predecessors are {expected:?}",
                    phi.value.index(),
                    block.start,
                );
            }
        }

        for block in self.blocks.values().filter(|b| b.reachable) {
            let uses = block
                .phis
                .iter()
                .flat_map(|phi| phi.incoming.iter().map(|&(_, v)| v))
                .chain(block.insts.iter().flat_map(|inst| inst.kind.args()))
                .chain(block.terminator.iter().flat_map(Terminator::args));
            for value in uses {
                ensure!(
                    defined.get(value.index()).copied().unwrap_or(false),
                    "block {} uses undefined value v{}",
                    block.start,
                    value.index()
                );
            }
        }

        trace!(name = %self.name, blocks = self.blocks.len(), insts = self.num_insts(), "verified");
        Ok(())
    }
}
