//! A portable backend for the EVM bytecode compiler.
//!
//! Modules are lowered into a flat register program: one register per SSA value, phis replaced
//! with parallel copies on the incoming edges, and builtins dispatched through
//! [`evmjit_builtins::call_builtin`]. The program is then run by a small dispatch loop.

#![cfg_attr(not(test), warn(unused_extern_crates))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

use evmjit_backend::{
    debug_time,
    eyre::WrapErr,
    ir::Module,
    Backend, OptimizationLevel, Result,
};
use evmjit_context::EvmCompilerFn;
use std::path::Path;

mod exec;

mod lower;
pub use lower::Program;

/// The register-program EVM bytecode compiler backend.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct ThreadedBackend {
    opt_level: OptimizationLevel,
}

impl ThreadedBackend {
    /// Creates a new backend.
    pub const fn new(opt_level: OptimizationLevel) -> Self {
        Self { opt_level }
    }

    /// Lowers a fully linked module without wrapping it into a function.
    pub fn lower(&self, module: &Module) -> Result<Program> {
        lower::lower(module, self.opt_level)
    }
}

impl Backend for ThreadedBackend {
    fn name(&self) -> &'static str {
        "threaded"
    }

    fn ir_extension(&self) -> &'static str {
        "prog"
    }

    fn opt_level(&self) -> OptimizationLevel {
        self.opt_level
    }

    fn set_opt_level(&mut self, level: OptimizationLevel) {
        self.opt_level = level;
    }

    fn compile(&mut self, module: &Module) -> Result<EvmCompilerFn> {
        let program = debug_time!("lower", || self.lower(module))?;
        Ok(EvmCompilerFn::new(program))
    }

    fn dump_ir(&mut self, module: &Module, path: &Path) -> Result<()> {
        let program = self.lower(module)?;
        std::fs::write(path, program.to_string())
            .wrap_err_with(|| format!("failed to write {}", path.display()))
    }
}
