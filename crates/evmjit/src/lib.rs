#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), warn(unused_extern_crates))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod bytecode;
pub use bytecode::*;

mod compiler;
pub use compiler::{CompilerConfig, CompilerState, EvmCompiler};

mod engine;
pub use engine::ExecutionEngine;

#[cfg(all(test, feature = "threaded"))]
mod tests;

#[allow(ambiguous_glob_reexports)]
#[doc(inline)]
pub use evmjit_backend::*;
#[allow(ambiguous_glob_reexports)]
#[doc(inline)]
pub use evmjit_context::*;

#[cfg(feature = "threaded")]
#[doc(no_inline)]
pub use evmjit_threaded::{self as threaded, ThreadedBackend};
