use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Stable diagnostic codes, one letter each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Lexical,
    Redeclared,
    Undeclared,
    ArgumentCount,
    ArgumentType,
    ConditionType,
    VoidReturnsValue,
    MissingReturn,
    IndexType,
    NotAssignable,
    MissingSemicolon,
    MissingRParen,
    MissingRBrack,
    MissingWhile,
    ConstType,
    Syntax,
}

impl ErrorCode {
    pub fn letter(self) -> char {
        match self {
            ErrorCode::Lexical => 'a',
            ErrorCode::Redeclared => 'b',
            ErrorCode::Undeclared => 'c',
            ErrorCode::ArgumentCount => 'd',
            ErrorCode::ArgumentType => 'e',
            ErrorCode::ConditionType => 'f',
            ErrorCode::VoidReturnsValue => 'g',
            ErrorCode::MissingReturn => 'h',
            ErrorCode::IndexType => 'i',
            ErrorCode::NotAssignable => 'j',
            ErrorCode::MissingSemicolon => 'k',
            ErrorCode::MissingRParen => 'l',
            ErrorCode::MissingRBrack => 'm',
            ErrorCode::MissingWhile => 'n',
            ErrorCode::ConstType => 'o',
            ErrorCode::Syntax => 's',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub code: ErrorCode,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: usize, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            line,
            code,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(line: usize, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            line,
            code,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "{} {}: {}", self.line, self.code.letter(), self.message),
            Severity::Warning => write!(
                f,
                "{} {}: warning: {}",
                self.line,
                self.code.letter(),
                self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Diagnostic::error(7, ErrorCode::ArgumentCount, "too few arguments");
        assert_eq!(err.to_string(), "7 d: too few arguments");
        assert!(err.is_error());

        let warn = Diagnostic::warning(3, ErrorCode::MissingReturn, "missing return");
        assert_eq!(warn.to_string(), "3 h: warning: missing return");
        assert!(!warn.is_error());
    }
}
