use super::{BasicBlock, Dest, Inst, InstKind, Module, Phi, Terminator, Value};
use std::fmt::{self, Write};

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(pc) => write!(f, "@{pc}"),
            Self::InvalidJump => f.write_str("<invalid jump>"),
        }
    }
}

impl fmt::Display for Phi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi [depth {}]", self.value, self.depth)?;
        for (i, (pred, value)) in self.incoming.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "[@{pred}: {value}]")?;
        }
        Ok(())
    }
}

impl fmt::Display for InstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "const {c:#x}"),
            Self::Unary(op, a) => write!(f, "{} {a}", op.name()),
            Self::Binary(op, a, b) => write!(f, "{} {a}, {b}", op.name()),
            Self::Ternary(op, a, b, c) => write!(f, "{} {a}, {b}, {c}", op.name()),
            Self::Select(c, a, b) => write!(f, "select {c}, {a}, {b}"),
            Self::GasCheck(cost) => write!(f, "gas_check {cost}"),
            Self::GasCheckDyn(cost) => write!(f, "gas_check {cost}"),
            Self::GasRemaining => f.write_str("gas_remaining"),
            Self::Refund(amount) => write!(f, "refund {amount}"),
            Self::StackCheck { max_growth, diff } => {
                write!(f, "stack_check +{max_growth} ({diff:+})")
            }
            Self::Call(builtin, args) => {
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

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{result} = ")?;
        }
        self.kind.fmt(f)
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jump(dest) => write!(f, "jump {dest}"),
            Self::Branch { cond, then_dest, else_dest } => {
                write!(f, "br {cond}, {then_dest}, {else_dest}")
            }
            Self::Stop => f.write_str("stop"),
            Self::Return { offset, size } => write!(f, "return {offset}, {size}"),
            Self::Revert { offset, size } => write!(f, "revert {offset}, {size}"),
            Self::SelfDestruct => f.write_str("selfdestruct"),
            Self::Fail(result) => write!(f, "fail {result:?}"),
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}..{}:", self.start, self.end)?;
        if !self.reachable {
            f.write_str(" ; unreachable")?;
        }
        f.write_char('\n')?;
        for phi in &self.phis {
            writeln!(f, "    {phi}")?;
        }
        for inst in &self.insts {
            writeln!(f, "    {:<40} ; pc {}", inst.to_string(), inst.pc)?;
        }
        match &self.terminator {
            Some(terminator) => writeln!(f, "    {terminator}"),
            None => writeln!(f, "    <unterminated>"),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {:?} ; {} bytes, {} values", self.name, self.code_len, self.num_values)?;
        for block in self.blocks.values() {
            writeln!(f)?;
            block.fmt(f)?;
        }
        Ok(())
    }
}

/// Graphviz rendering of a module's control-flow graph. See [`Module::dot`].
#[derive(Clone, Copy, Debug)]
pub struct Dot<'a>(&'a Module);

impl Module {
    /// Returns a Graphviz `dot` rendering of the control-flow graph.
    pub fn dot(&self) -> Dot<'_> {
        Dot(self)
    }
}

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        writeln!(f, "digraph {:?} {{", module.name)?;
        writeln!(f, "    node [shape=box, fontname=monospace];")?;
        for block in module.blocks.values() {
            let mut label = format!("@{}..{}\\l", block.start, block.end);
            for phi in &block.phis {
                let _ = write!(label, "{phi}\\l");
            }
            if let Some(terminator) = &block.terminator {
                let _ = write!(label, "{terminator}\\l");
            }
            let style = if block.reachable { "" } else { ", style=dashed" };
            writeln!(f, "    \"{}\" [label=\"{}\"{style}];", block.start, label.replace('"', "\\\""))?;
        }
        for block in module.blocks.values() {
            match &block.terminator {
                Some(Terminator::Jump(Dest::Block(to))) => {
                    writeln!(f, "    \"{}\" -> \"{to}\";", block.start)?;
                }
                Some(Terminator::Branch { then_dest, else_dest, .. }) => {
                    if let Dest::Block(to) = then_dest {
                        writeln!(f, "    \"{}\" -> \"{to}\" [label=\"true\"];", block.start)?;
                    }
                    if let Dest::Block(to) = else_dest {
                        writeln!(
                            f,
                            "    \"{}\" -> \"{to}\" [label=\"false\", style=dashed];",
                            block.start
                        )?;
                    }
                }
                _ => {}
            }
        }
        f.write_str("}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::BinOp, U256};

    fn module() -> Module {
        let mut module = Module::new("f", 3);
        let a = module.new_value();
        let b = module.new_value();
        let mut entry = BasicBlock::new(0, 3);
        entry.insts.push(Inst { result: Some(a), kind: InstKind::Const(U256::from(2)), pc: 0 });
        entry.insts.push(Inst { result: Some(b), kind: InstKind::Binary(BinOp::Add, a, a), pc: 2 });
        entry.terminator = Some(Terminator::Jump(Dest::Block(3)));
        let mut exit = BasicBlock::new(3, 3);
        exit.terminator = Some(Terminator::Stop);
        module.blocks.insert(0, entry);
        module.blocks.insert(3, exit);
        module
    }

    #[test]
    fn display() {
        let s = module().to_string();
        assert!(s.starts_with("module \"f\" ; 3 bytes, 2 values\n"), "{s}");
        assert!(s.contains("v1 = add v0, v0"), "{s}");
        assert!(s.contains("v0 = const 0x2"), "{s}");
        assert!(s.contains("    jump @3\n"), "{s}");
        assert!(s.contains("@3..3:\n    stop\n"), "{s}");
    }

    #[test]
    fn dot() {
        let s = module().dot().to_string();
        assert!(s.starts_with("digraph \"f\" {\n"), "{s}");
        assert!(s.contains("\"0\" -> \"3\";"), "{s}");
        assert!(s.ends_with("}\n"), "{s}");
    }
}
