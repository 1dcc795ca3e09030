use thiserror::Error;

/// Fatal execution errors. Any of them aborts the run.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{ip:04}: invalid instruction: {what}")]
    Instruction { ip: usize, what: String },

    #[error("{ip:04}: division by zero")]
    DivisionByZero { ip: usize },

    #[error("{ip:04}: stack underflow")]
    StackUnderflow { ip: usize },

    #[error("{ip:04}: address {addr} is outside memory")]
    BadAddress { ip: usize, addr: i64 },

    #[error("{ip:04}: jump target {target} is outside the program")]
    BadTarget { ip: usize, target: i32 },

    #[error("{ip:04}: {message}")]
    Input { ip: usize, message: String },

    #[error("execution step limit exceeded ({0})")]
    StepLimit(u64),

    #[error("stack size limit exceeded ({0} cells)")]
    StackLimit(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn input(ip: usize, message: impl Into<String>) -> Self {
        RuntimeError::Input {
            ip,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_ip() {
        let err = RuntimeError::Instruction {
            ip: 12,
            what: "opcode 0o777".to_string(),
        };
        assert_eq!(err.to_string(), "0012: invalid instruction: opcode 0o777");
        assert_eq!(
            RuntimeError::DivisionByZero { ip: 3 }.to_string(),
            "0003: division by zero"
        );
        assert!(
            RuntimeError::input(1, "expected an integer")
                .to_string()
                .contains("expected an integer")
        );
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = RuntimeError::StepLimit(10);
        let _: &dyn std::error::Error = &err;
    }
}
