use thiserror::Error;

/// Errors raised while loading a bytecode container.
///
/// All of them are fatal: the loader never hands a partially read program to
/// the machine.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a bytecode file (bad magic prefix)")]
    BadMagic,

    #[error("bytecode version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("missing {0} block")]
    MissingBlock(&'static str),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("line {line}: {message}")]
    Text { line: usize, message: String },

    #[error("invalid image: {0}")]
    Image(#[from] postcard::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub fn text(line: usize, message: impl Into<String>) -> Self {
        FormatError::Text {
            line,
            message: message.into(),
        }
    }

    /// Maps an unexpected end of input onto [`FormatError::Truncated`].
    pub(crate) fn from_read(err: std::io::Error, what: &'static str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FormatError::Truncated(what)
        } else {
            FormatError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert!(FormatError::BadMagic.to_string().contains("bad magic"));
        assert!(
            FormatError::UnsupportedVersion {
                found: 9,
                supported: 1
            }
            .to_string()
            .contains("newer")
        );
        assert_eq!(
            FormatError::MissingBlock("CODE").to_string(),
            "missing CODE block"
        );
        assert_eq!(
            FormatError::text(4, "unknown section").to_string(),
            "line 4: unknown section"
        );
    }

    #[test]
    fn test_unexpected_eof_is_truncation() {
        let err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            FormatError::from_read(err, "header"),
            FormatError::Truncated("header")
        ));

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            FormatError::from_read(err, "header"),
            FormatError::Io(_)
        ));
    }
}
