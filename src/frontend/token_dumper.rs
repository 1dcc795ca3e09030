use std::io::{self, Write};

use crate::frontend::token::{Token, TokenKind};

/// Writes the lexical trace: one `NAME text` line per token.
#[derive(Default)]
pub struct TokenDumper {
    pub color: bool,
    pub show_lines: bool, // prefix each token with its source line
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";
    const RED: &'static str = "\x1b[31m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn colored(mut self) -> Self {
        self.color = true;
        self
    }

    pub fn with_lines(mut self) -> Self {
        self.show_lines = true;
        self
    }

    pub fn dump<W: Write>(&self, tokens: &[Token], out: &mut W) -> io::Result<()> {
        for token in tokens {
            self.write_one(token, out)?;
        }
        out.flush()
    }

    pub fn dump_to_string(&self, tokens: &[Token]) -> String {
        let mut out = Vec::new();
        let _ = self.dump(tokens, &mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    fn write_one<W: Write>(&self, token: &Token, out: &mut W) -> io::Result<()> {
        let (colr, reset) = if self.color {
            (Self::color(token.kind), Self::RESET)
        } else {
            ("", "")
        };

        if self.show_lines {
            write!(out, "[{:03}] ", token.line)?;
        }
        writeln!(out, "{}{} {}{}", colr, token.kind.name(), token.text, reset)
    }

    fn color(kind: TokenKind) -> &'static str {
        use TokenKind::*;
        match kind {
            Comment | Eof => Self::DIM,
            StrCon => Self::GRN,
            IntCon | CharCon => Self::CYN,
            Ident => Self::YEL,
            Plus | Minus | Mult | Div | Lss | Leq | Gre | Geq | Eql | Neq | Assign => Self::MAG,
            None | IntErr | CharErr => Self::RED,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_plain_trace() {
        let tokens = Lexer::new("int x;\nx = 'c';").tokenize();
        let trace = TokenDumper::new().dump_to_string(&tokens);
        let lines: Vec<_> = trace.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], format!("{} int", TokenKind::Int.name()));
        assert_eq!(lines[5], format!("{} c", TokenKind::CharCon.name()));
    }

    #[test]
    fn test_line_prefix_and_color() {
        let tokens = Lexer::new("\n\"s\"").tokenize();
        let trace = TokenDumper::new().with_lines().colored().dump_to_string(&tokens);
        assert!(trace.starts_with("[002] \x1b[32m"));
        assert!(trace.trim_end().ends_with("s\x1b[0m"));
    }
}
