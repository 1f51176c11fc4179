//! Execution engine for interactive evaluation
//!
//! Runs verified ASR in-process. The interactive evaluator compiles each
//! turn to LLVM IR for display, then executes the same ASR here, so the
//! engine is only built together with the LLVM backend.

pub mod eval;
pub mod value;

pub use eval::{Machine, Snapshot};
pub use value::Value;
