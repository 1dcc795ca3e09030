pub mod binary;
pub mod disasm;
pub mod format_error;
pub mod image;
pub mod op;
pub mod program;
pub mod text;

pub use format_error::FormatError;
pub use op::{Instr, Op, Opr};
pub use program::{Code, Object, Program};
