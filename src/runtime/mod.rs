pub mod decode;
pub mod runtime_error;
pub mod vm;

pub use runtime_error::RuntimeError;
pub use vm::{Vm, VmConfig};
