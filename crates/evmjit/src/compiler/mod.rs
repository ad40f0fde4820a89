//! EVM bytecode compiler implementation.

use crate::{Backend, Bytecode, EvmCompilerFn, OpcodeInfo, Result, OP_INFO_MAP};
use evmjit_backend::{
    debug_time,
    eyre::{ensure, WrapErr},
    ir::Module,
    trace_time, OptimizationLevel,
};
use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

mod builder;
mod gas;
mod link;
mod stack;

mod translate;
pub use translate::CompilerConfig;
use translate::{FunctionCx, Translated};

/// The phase a compilation is in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompilerState {
    /// No compilation in progress.
    #[default]
    Idle,
    /// Decoding the bytecode and discovering basic blocks.
    Scanning,
    /// Emitting IR for every basic block.
    Translating,
    /// Resolving values that cross block boundaries.
    Linking,
    /// The module is ready for a backend.
    Done,
}

impl CompilerState {
    /// Returns `true` if `self -> next` is a valid transition.
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Done, Self::Scanning)
                | (Self::Scanning, Self::Translating)
                | (Self::Translating, Self::Linking)
                | (Self::Linking, Self::Done)
        )
    }
}

impl fmt::Display for CompilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Translating => "translating",
            Self::Linking => "linking",
            Self::Done => "done",
        })
    }
}

/// EVM bytecode compiler.
///
/// Turns bytecode into a fully linked [`Module`] with [`translate`](Self::translate), and hands it
/// to the backend with [`jit`](Self::jit). A single compiler can be reused for any number of
/// functions, one at a time.
#[allow(missing_debug_implementations)]
pub struct EvmCompiler<B: Backend> {
    backend: B,
    config: CompilerConfig,
    op_info: [OpcodeInfo; 256],
    out_dir: Option<PathBuf>,
    state: CompilerState,
    function_counter: u32,
}

impl<B: Backend> EvmCompiler<B> {
    /// Creates a new instance of the compiler with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: CompilerConfig::default(),
            op_info: OP_INFO_MAP,
            out_dir: None,
            state: CompilerState::Idle,
            function_counter: 0,
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Returns the translation options.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Returns the phase of the current compilation.
    pub fn state(&self) -> CompilerState {
        self.state
    }

    /// Returns the output directory.
    pub fn out_dir(&self) -> Option<&Path> {
        self.out_dir.as_deref()
    }

    /// Dumps intermediate outputs and other debug info to the given directory after compilation.
    ///
    /// Disables dumping if `output_dir` is `None`.
    pub fn set_dump_to(&mut self, output_dir: Option<PathBuf>) {
        self.out_dir = output_dir;
    }

    /// Returns the optimization level.
    pub fn opt_level(&self) -> OptimizationLevel {
        self.backend.opt_level()
    }

    /// Sets the optimization level.
    ///
    /// Defaults to the backend's initial optimization level.
    pub fn set_opt_level(&mut self, level: OptimizationLevel) {
        self.backend.set_opt_level(level);
    }

    /// Sets whether to track gas costs.
    ///
    /// Disabling this removes every static gas check and the `SSTORE` cost computation. Costs
    /// paid inside builtins, such as memory growth, are still charged.
    ///
    /// Use with care, as executing a function with gas disabled may result in an infinite loop.
    ///
    /// Defaults to `true`.
    pub fn gas_metering(&mut self, yes: bool) {
        self.config.gas_metering = yes;
    }

    /// Sets whether to check the runtime stack height against the 1024 item limit.
    ///
    /// Defaults to `true`.
    pub fn stack_checks(&mut self, yes: bool) {
        self.config.stack_checks = yes;
    }

    /// Returns the gas information of `opcode`, to override its static cost or whether it ends
    /// a cost block.
    pub fn opcode_info_mut(&mut self, opcode: u8) -> &mut OpcodeInfo {
        &mut self.op_info[opcode as usize]
    }

    /// Translates the given EVM bytecode into a fully linked IR module.
    ///
    /// Use `None` for a default unique name.
    pub fn translate(&mut self, name: Option<&str>, code: &[u8]) -> Result<Module> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_name(),
        };
        let res = debug_time!("translate", || self.translate_inner(&name, code));
        if res.is_err() {
            self.state = CompilerState::Idle;
        }
        res.wrap_err_with(|| format!("failed to compile {name:?}"))
    }

    /// Compiles the given EVM bytecode into a function.
    ///
    /// See [`translate`](Self::translate) for more information.
    pub fn jit(&mut self, name: Option<&str>, code: &[u8]) -> Result<EvmCompilerFn> {
        let module = self.translate(name, code)?;
        if let Some(dump_dir) = &self.dump_dir(&module.name) {
            trace_time!("dump backend IR", || {
                let path = dump_dir.join("module").with_extension(self.backend.ir_extension());
                self.backend.dump_ir(&module, &path)
            })?;
        }
        debug_time!("compile", || self.backend.compile(&module))
    }

    fn translate_inner(&mut self, name: &str, code: &[u8]) -> Result<Module> {
        let dump_dir = self.dump_dir(name);

        self.advance(CompilerState::Scanning)?;
        let mut bytecode = trace_time!("new bytecode", || Bytecode::new(code));
        trace_time!("analyze", || bytecode.analyze())?;
        if let Some(dump_dir) = &dump_dir {
            trace_time!("dump bytecode", || Self::dump_bytecode(dump_dir, &bytecode))?;
        }

        self.advance(CompilerState::Translating)?;
        let Translated { mut module, mut stacks } = trace_time!("translate inner", || {
            FunctionCx::translate(name, self.config, &self.op_info, &bytecode)
        })?;

        self.advance(CompilerState::Linking)?;
        trace_time!("link", || link::link(&mut module, &mut stacks))?;
        if let Some(dump_dir) = &dump_dir {
            // Dump before verifying for better debugging.
            trace_time!("dump module", || Self::dump_module(dump_dir, &module))?;
        }
        trace_time!("verify", || module.verify())?;

        self.advance(CompilerState::Done)?;
        debug!(
            name,
            blocks = module.blocks.len(),
            values = module.num_values(),
            insts = module.num_insts(),
            "translated"
        );
        Ok(module)
    }

    fn advance(&mut self, next: CompilerState) -> Result<()> {
        ensure!(
            self.state.can_advance_to(next),
            "invalid compiler state transition: {} -> {next}",
            self.state
        );
        trace!(from = %self.state, to = %next, "advance");
        self.state = next;
        Ok(())
    }

    fn dump_bytecode(dump_dir: &Path, bytecode: &Bytecode<'_>) -> Result<()> {
        {
            let file = fs::File::create(dump_dir.join("bytecode.txt"))?;
            let mut writer = io::BufWriter::new(file);
            write!(writer, "{bytecode}")?;
            writer.flush()?;
        }

        {
            let file = fs::File::create(dump_dir.join("bytecode.dbg.txt"))?;
            let mut writer = io::BufWriter::new(file);
            writeln!(writer, "{bytecode:#?}")?;
            writer.flush()?;
        }

        Ok(())
    }

    fn dump_module(dump_dir: &Path, module: &Module) -> Result<()> {
        fs::write(dump_dir.join("module.ir"), module.to_string())?;
        fs::write(dump_dir.join("cfg.dot"), module.dot().to_string())?;
        Ok(())
    }

    fn default_name(&mut self) -> String {
        let name = format!("evmjit_fn_{}", self.function_counter);
        self.function_counter += 1;
        name
    }

    fn dump_dir(&self, name: &str) -> Option<PathBuf> {
        let mut dump_dir = self.out_dir.clone()?;
        dump_dir.push(name.replace(char::is_whitespace, "_"));
        if !dump_dir.exists() {
            let _ = fs::create_dir_all(&dump_dir);
        }
        Some(dump_dir)
    }
}

#[cfg(all(test, feature = "threaded"))]
mod tests {
    use super::*;
    use crate::{op, ThreadedBackend};
    use evmjit_backend::ir::InstKind;

    #[test]
    fn state_machine() {
        let mut compiler = EvmCompiler::new(ThreadedBackend::default());
        assert_eq!(compiler.state(), CompilerState::Idle);
        assert!(compiler.advance(CompilerState::Linking).is_err());

        compiler.translate(None, &[op::STOP]).unwrap();
        assert_eq!(compiler.state(), CompilerState::Done);
        let err = compiler.advance(CompilerState::Translating).unwrap_err();
        assert_eq!(err.to_string(), "invalid compiler state transition: done -> translating");

        // A failed compilation does not poison the next one.
        assert!(compiler.translate(None, &[op::JUMP]).is_err());
        assert_eq!(compiler.state(), CompilerState::Idle);
        compiler.translate(None, &[op::STOP]).unwrap();
    }

    #[test]
    fn default_names() {
        let mut compiler = EvmCompiler::new(ThreadedBackend::default());
        assert_eq!(compiler.translate(None, &[]).unwrap().name, "evmjit_fn_0");
        assert_eq!(compiler.translate(Some("f"), &[]).unwrap().name, "f");
        assert_eq!(compiler.translate(None, &[]).unwrap().name, "evmjit_fn_1");
    }

    #[test]
    fn opcode_info_override() {
        let mut compiler = EvmCompiler::new(ThreadedBackend::default());
        compiler.opcode_info_mut(op::ADD).set_cost_block_end(true);
        let module = compiler.translate(None, &[op::PUSH0, op::PUSH0, op::ADD, op::POP]).unwrap();
        let checks = module.blocks[&0]
            .insts
            .iter()
            .filter_map(|inst| match inst.kind {
                InstKind::GasCheck(cost) => Some(cost),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(checks, [7, 2]);
    }
}
