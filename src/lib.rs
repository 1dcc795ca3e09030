//! scc: a C0 compiler and the stack machine that runs its bytecode.

pub mod bytecode;
pub mod compiler;
pub mod frontend;
pub mod logging;
pub mod runtime;
