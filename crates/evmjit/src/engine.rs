//! Runs linked modules.

use crate::{Backend, EvmCompilerFn, ExecutionEnv, ExecutionOutcome, Result};
use evmjit_backend::{debug_time, ir::Module, trace_time};

/// Compiles linked modules with a backend and executes them.
///
/// Compilation errors are returned as `Err`. Every runtime outcome, including out of gas and
/// other failures, is an `Ok` [`ExecutionOutcome`].
#[allow(missing_debug_implementations)]
pub struct ExecutionEngine<B: Backend> {
    backend: B,
}

impl<B: Backend> ExecutionEngine<B> {
    /// Creates a new engine.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verifies and compiles a module.
    pub fn compile(&mut self, module: &Module) -> Result<EvmCompilerFn> {
        trace_time!("verify", || module.verify())?;
        debug_time!("compile", || self.backend.compile(module))
    }

    /// Compiles and runs a module once.
    #[instrument(level = "debug", skip_all, fields(name = %module.name, backend = self.backend.name()))]
    pub fn run(&mut self, module: &Module, env: ExecutionEnv<'_>) -> Result<ExecutionOutcome> {
        let f = self.compile(module)?;
        let outcome = debug_time!("execute", || f.execute(env));
        debug!(
            result = %outcome.result,
            gas_used = outcome.gas_used(),
            gas_refunded = outcome.gas_refunded,
            output_len = outcome.output.len(),
            "executed"
        );
        Ok(outcome)
    }
}
