//! Token-kind name table.
//!
//! A lang file has one line per token kind, in [`TokenKind::ALL`] order:
//! the display name, a comma, then an optional pattern (ignored here):
//!
//! ```text
//! NONE,
//! INTCON,/[0-9]+
//! ```
//!
//! The table is installed at most once per process and read-only afterwards.

use std::path::Path;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use crate::frontend::token::TokenKind;

static NAMES: OnceLock<Vec<String>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LangError {
    #[error("cannot read lang file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lang line {line}: missing ',' after the token name")]
    MissingComma { line: usize },

    #[error("lang file lists {found} token kinds, expected {expected}")]
    Incomplete { expected: usize, found: usize },

    #[error("token names already loaded")]
    AlreadyLoaded,
}

/// Parses a lang table without installing it.
pub fn parse(source: &str) -> Result<Vec<String>, LangError> {
    let mut names = Vec::with_capacity(TokenKind::COUNT);

    for (index, line) in source.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if names.len() == TokenKind::COUNT {
            break;
        }
        let (name, _pattern) = line
            .split_once(',')
            .ok_or(LangError::MissingComma { line: index + 1 })?;
        names.push(name.trim().to_string());
    }

    if names.len() < TokenKind::COUNT {
        return Err(LangError::Incomplete {
            expected: TokenKind::COUNT,
            found: names.len(),
        });
    }
    Ok(names)
}

pub fn install(names: Vec<String>) -> Result<(), LangError> {
    NAMES.set(names).map_err(|_| LangError::AlreadyLoaded)
}

pub fn load(path: &Path) -> Result<(), LangError> {
    let source = std::fs::read_to_string(path).map_err(|source| LangError::Io {
        path: path.display().to_string(),
        source,
    })?;
    install(parse(&source)?)?;
    debug!(path = %path.display(), "loaded token names");
    Ok(())
}

pub fn name_of(kind: TokenKind) -> Option<&'static str> {
    NAMES
        .get()
        .and_then(|names| names.get(kind.index()))
        .map(String::as_str)
}
