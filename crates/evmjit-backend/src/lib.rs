//! IR and backend abstraction of the EVM bytecode compiler.

#![cfg_attr(not(test), warn(unused_extern_crates))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod macros;
pub use macros::PhaseTimer;

pub mod ir;

mod traits;
pub use traits::*;

#[doc(no_inline)]
pub use eyre;
#[doc(no_inline)]
pub use ruint::{self, aliases::U256, uint};

/// Compilation result.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compilation error.
pub type Error = eyre::Error;

#[doc(hidden)]
pub mod private {
    pub use tracing;
}
