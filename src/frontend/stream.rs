use std::collections::VecDeque;

use crate::frontend::token::{Token, TokenKind};

/// Anything that lazily yields tokens. Must keep yielding `Eof` once the
/// input is exhausted.
pub trait TokenSource {
    fn next_token(&mut self) -> Token;
}

/// Tokens kept for lookahead and rollback.
pub const CACHE_MAX: usize = 8;

/// Bounded lookahead buffer over a [`TokenSource`].
///
/// The parser reads the current token, accepts it to move on, and may roll
/// back a few tokens to re-parse them under another production. Malformed
/// tokens are queued as lexical errors the first time they are fetched;
/// `None` tokens are then dropped, malformed literals stay in the stream.
/// Every kept token is also appended to the trace when tracing is on.
pub struct TokenStream<S> {
    source: S,
    buffer: VecDeque<Token>,
    pos: usize,
    lexical_errors: Vec<Token>,
    trace: Option<Vec<Token>>,
}

impl<S: TokenSource> TokenStream<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: VecDeque::with_capacity(CACHE_MAX + 1),
            pos: 0,
            lexical_errors: Vec::new(),
            trace: None,
        }
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    fn fill(&mut self) {
        while self.pos >= self.buffer.len() {
            let token = self.source.next_token();
            if token.kind.is_lexical_error() {
                self.lexical_errors.push(token.clone());
                if token.is(TokenKind::None) {
                    continue;
                }
            }
            if let Some(trace) = &mut self.trace {
                if !token.is(TokenKind::Eof) {
                    trace.push(token.clone());
                }
            }
            self.buffer.push_back(token);
            if self.buffer.len() > CACHE_MAX {
                self.buffer.pop_front();
                self.pos -= 1;
            }
        }
    }

    /// The token under the cursor.
    pub fn current(&mut self) -> &Token {
        self.fill();
        &self.buffer[self.pos]
    }

    pub fn kind(&mut self) -> TokenKind {
        self.current().kind
    }

    /// Returns the current token and moves past it. `Eof` is never consumed.
    pub fn accept(&mut self) -> Token {
        let token = self.current().clone();
        if !token.is(TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    /// Moves the cursor back over `n` accepted tokens.
    pub fn rollback(&mut self, n: usize) {
        debug_assert!(n <= self.pos, "rollback past the lookahead buffer");
        self.pos = self.pos.saturating_sub(n);
    }

    /// The `n`th most recently accepted token (1 = the last one).
    pub fn previous(&self, n: usize) -> Option<&Token> {
        self.pos.checked_sub(n).and_then(|i| self.buffer.get(i))
    }

    /// Line of the last accepted token, for errors reported after it.
    pub fn last_line(&self) -> usize {
        self.previous(1).map(|t| t.line).unwrap_or(1)
    }

    /// Malformed tokens fetched since the last call.
    pub fn take_lexical_errors(&mut self) -> Vec<Token> {
        std::mem::take(&mut self.lexical_errors)
    }

    pub fn take_trace(&mut self) -> Vec<Token> {
        self.trace.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn stream(source: &str) -> TokenStream<Lexer> {
        TokenStream::new(Lexer::new(source))
    }

    #[test]
    fn test_accept_and_previous() {
        let mut tokens = stream("int x ;");
        assert_eq!(tokens.kind(), TokenKind::Int);
        tokens.accept();
        let x = tokens.accept();
        assert_eq!(x.text, "x");
        assert_eq!(tokens.previous(1).map(|t| t.kind), Some(TokenKind::Ident));
        assert_eq!(tokens.previous(2).map(|t| t.kind), Some(TokenKind::Int));
        assert_eq!(tokens.previous(3), None);
    }

    #[test]
    fn test_rollback() {
        let mut tokens = stream("a = b ;");
        tokens.accept();
        tokens.accept();
        tokens.rollback(2);
        assert_eq!(tokens.current().text, "a");
        tokens.accept();
        assert_eq!(tokens.kind(), TokenKind::Assign);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut tokens = stream("a b c d e f g h i j k");
        for _ in 0..10 {
            tokens.accept();
        }
        assert_eq!(tokens.current().text, "k");
        assert!(tokens.previous(CACHE_MAX - 1).is_some());
        assert!(tokens.previous(CACHE_MAX).is_none());
        tokens.rollback(CACHE_MAX - 1);
        assert_eq!(tokens.current().text, "d");
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut tokens = stream("x");
        tokens.accept();
        assert_eq!(tokens.accept().kind, TokenKind::Eof);
        assert_eq!(tokens.kind(), TokenKind::Eof);
    }

    #[test]
    fn test_lexical_errors_are_queued() {
        let mut tokens = stream("a # 09 b");
        tokens.accept();
        assert_eq!(tokens.kind(), TokenKind::IntErr);
        tokens.accept();
        assert_eq!(tokens.current().text, "b");
        let errors: Vec<_> = tokens.take_lexical_errors().into_iter().map(|t| t.text).collect();
        assert_eq!(errors, vec!["#", "09"]);
        assert!(tokens.take_lexical_errors().is_empty());
    }

    #[test]
    fn test_trace_records_each_token_once() {
        let mut tokens = TokenStream::new(Lexer::new("a = 1 ;")).with_trace();
        tokens.accept();
        tokens.accept();
        tokens.rollback(2);
        while tokens.kind() != TokenKind::Eof {
            tokens.accept();
        }
        let names: Vec<_> = tokens.take_trace().into_iter().map(|t| t.text).collect();
        assert_eq!(names, vec!["a", "=", "1", ";"]);
    }
}
