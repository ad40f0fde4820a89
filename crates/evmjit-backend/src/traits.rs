use crate::{ir::Module, Result};
use evmjit_context::EvmCompilerFn;
use std::path::Path;

/// Optimization level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptimizationLevel {
    /// No optimizations.
    None,
    /// Less optimizations.
    Less,
    /// Default optimizations.
    #[default]
    Default,
    /// Aggressive optimizations.
    Aggressive,
}

impl std::str::FromStr for OptimizationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" | "none" => Self::None,
            "1" | "less" => Self::Less,
            "2" | "default" => Self::Default,
            "3" | "aggressive" => Self::Aggressive,
            _ => return Err(format!("unknown optimization level: {s}")),
        })
    }
}

/// Code generation backend.
///
/// A backend turns a fully linked [`Module`] into a callable [`EvmCompilerFn`]. Every value of
/// the module is defined exactly once, every block has a terminator, and every phi has exactly
/// one incoming value per predecessor. [`Module::verify`] checks these properties.
pub trait Backend {
    /// Name of the backend, used in logs.
    fn name(&self) -> &'static str;

    /// File extension of the output of [`dump_ir`](Self::dump_ir).
    fn ir_extension(&self) -> &'static str;

    /// Returns the optimization level.
    fn opt_level(&self) -> OptimizationLevel;

    /// Sets the optimization level.
    fn set_opt_level(&mut self, level: OptimizationLevel);

    /// Compiles a module.
    fn compile(&mut self, module: &Module) -> Result<EvmCompilerFn>;

    /// Writes the backend's lowered form of `module` to `path`.
    fn dump_ir(&mut self, module: &Module, path: &Path) -> Result<()>;
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn ir_extension(&self) -> &'static str {
        (**self).ir_extension()
    }

    fn opt_level(&self) -> OptimizationLevel {
        (**self).opt_level()
    }

    fn set_opt_level(&mut self, level: OptimizationLevel) {
        (**self).set_opt_level(level)
    }

    fn compile(&mut self, module: &Module) -> Result<EvmCompilerFn> {
        (**self).compile(module)
    }

    fn dump_ir(&mut self, module: &Module, path: &Path) -> Result<()> {
        (**self).dump_ir(module, path)
    }
}
