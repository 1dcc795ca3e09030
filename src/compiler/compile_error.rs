use thiserror::Error;

/// Errors that stop compilation outright. Source-level problems are
/// reported as [`Diagnostic`](super::diagnostic::Diagnostic)s instead.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("internal error: instruction {index} has unresolved operand {operand}")]
    Unresolved { index: usize, operand: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message() {
        let err = CompileError::Unresolved {
            index: 4,
            operand: "Pending".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "internal error: instruction 4 has unresolved operand Pending"
        );
    }
}
