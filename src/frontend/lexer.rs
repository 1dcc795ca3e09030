use crate::frontend::stream::TokenSource;
use crate::frontend::token::{Token, TokenKind};

/// Hand-written DFA over C0 source text.
///
/// Malformed input never stops the lexer: it yields `None`, `IntErr` or
/// `CharErr` tokens and keeps going. At end of input it yields `Eof`
/// forever.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
        }
        self.pos += 1;
        ch
    }

    fn is_alpha(ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_'
    }

    fn is_word(ch: char) -> bool {
        Self::is_alpha(ch) || ch.is_ascii_digit()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch <= ' ' || ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Consumes characters while `pred` holds and returns them.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if !pred(ch) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    fn read_char(&mut self, line: usize) -> Token {
        self.advance(); // opening quote
        let Some(ch) = self.advance() else {
            return Token::new(TokenKind::None, "'", line);
        };
        let kind = if matches!(ch, '+' | '-' | '*' | '/') || Self::is_word(ch) {
            TokenKind::CharCon
        } else {
            TokenKind::CharErr
        };
        if self.current() != Some('\'') {
            return Token::new(TokenKind::None, format!("'{}", ch), line);
        }
        self.advance();
        Token::new(kind, ch.to_string(), line)
    }

    fn read_string(&mut self, line: usize) -> Token {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Token::new(TokenKind::StrCon, text, line);
                }
                Some(ch) if (' '..='~').contains(&ch) => {
                    text.push(ch);
                    self.advance();
                }
                _ => return Token::new(TokenKind::None, format!("\"{}", text), line),
            }
        }
    }

    fn read_number(&mut self, line: usize) -> Token {
        let digits = self.take_while(|c| c.is_ascii_digit());
        let leading_zero = digits.len() > 1 && digits.starts_with('0');

        if leading_zero || self.current().is_some_and(Self::is_alpha) {
            let rest = self.take_while(Self::is_word);
            return Token::new(TokenKind::IntErr, digits + &rest, line);
        }
        Token::new(TokenKind::IntCon, digits, line)
    }

    fn read_word(&mut self, line: usize) -> Token {
        let word = self.take_while(Self::is_word);
        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Ident);
        Token::new(kind, word, line)
    }

    /// `first` optionally followed by `=`.
    fn read_operator(&mut self, line: usize, single: TokenKind, with_eq: TokenKind) -> Token {
        let mut text = String::new();
        if let Some(ch) = self.advance() {
            text.push(ch);
        }
        if self.current() == Some('=') {
            self.advance();
            text.push('=');
            return Token::new(with_eq, text, line);
        }
        Token::new(single, text, line)
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            let line = self.line;

            let Some(ch) = self.current() else {
                return Token::eof(line);
            };

            let single = match ch {
                '+' => Some(TokenKind::Plus),
                '-' => Some(TokenKind::Minus),
                '*' => Some(TokenKind::Mult),
                ';' => Some(TokenKind::Semicn),
                ',' => Some(TokenKind::Comma),
                '(' => Some(TokenKind::LParent),
                ')' => Some(TokenKind::RParent),
                '[' => Some(TokenKind::LBrack),
                ']' => Some(TokenKind::RBrack),
                '{' => Some(TokenKind::LBrace),
                '}' => Some(TokenKind::RBrace),
                _ => None,
            };
            if let Some(kind) = single {
                self.advance();
                return Token::new(kind, ch.to_string(), line);
            }

            return match ch {
                '\'' => self.read_char(line),
                '"' => self.read_string(line),
                '/' => {
                    self.advance();
                    if self.current() == Some('/') {
                        self.skip_line();
                        continue;
                    }
                    Token::new(TokenKind::Div, "/", line)
                }
                '<' => self.read_operator(line, TokenKind::Lss, TokenKind::Leq),
                '>' => self.read_operator(line, TokenKind::Gre, TokenKind::Geq),
                '=' => self.read_operator(line, TokenKind::Assign, TokenKind::Eql),
                '!' => self.read_operator(line, TokenKind::None, TokenKind::Neq),
                c if c.is_ascii_digit() => self.read_number(line),
                c if Self::is_alpha(c) => self.read_word(line),
                other => {
                    self.advance();
                    Token::new(TokenKind::None, other.to_string(), line)
                }
            };
        }
    }

    /// Lexes everything up to (not including) end of input.
    pub fn tokenize(&mut self) -> Vec<Token> {
        std::iter::from_fn(|| {
            let token = self.next_token();
            (!token.is(TokenKind::Eof)).then_some(token)
        })
        .collect()
    }
}

impl TokenSource for Lexer {
    fn next_token(&mut self) -> Token {
        Lexer::next_token(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn texts(source: &str) -> Vec<String> {
        Lexer::new(source)
            .tokenize()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("const int x_1 void main mainly"),
            vec![
                TokenKind::Const,
                TokenKind::Int,
                TokenKind::Ident,
                TokenKind::Void,
                TokenKind::Main,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ - * / < <= > >= == != = ; , ( ) [ ] { }"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Mult,
                TokenKind::Div,
                TokenKind::Lss,
                TokenKind::Leq,
                TokenKind::Gre,
                TokenKind::Geq,
                TokenKind::Eql,
                TokenKind::Neq,
                TokenKind::Assign,
                TokenKind::Semicn,
                TokenKind::Comma,
                TokenKind::LParent,
                TokenKind::RParent,
                TokenKind::LBrack,
                TokenKind::RBrack,
                TokenKind::LBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_literals_drop_quotes() {
        assert_eq!(texts("'a' \"x = %d\" 120"), vec!["a", "x = %d", "120"]);
        assert_eq!(
            kinds("'+' \"\" 0"),
            vec![TokenKind::CharCon, TokenKind::StrCon, TokenKind::IntCon]
        );
    }

    #[test]
    fn test_malformed_literals() {
        assert_eq!(
            kinds("012 12ab '!' !x"),
            vec![
                TokenKind::IntErr,
                TokenKind::IntErr,
                TokenKind::CharErr,
                TokenKind::None,
                TokenKind::Ident,
            ]
        );
        assert_eq!(texts("12ab")[0], "12ab");
    }

    #[test]
    fn test_unterminated_literals() {
        assert_eq!(kinds("'ab'"), vec![TokenKind::None, TokenKind::Ident, TokenKind::None]);
        assert_eq!(kinds("\"abc\nx"), vec![TokenKind::None, TokenKind::Ident]);
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = Lexer::new("a // skip ; this\n/ b\n\n c").tokenize();
        let summary: Vec<_> = tokens.iter().map(|t| (t.kind, t.line)).collect();
        assert_eq!(
            summary,
            vec![
                (TokenKind::Ident, 1),
                (TokenKind::Div, 2),
                (TokenKind::Ident, 2),
                (TokenKind::Ident, 4),
            ]
        );
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new("x");
        assert!(lexer.next_token().is(TokenKind::Ident));
        assert!(lexer.next_token().is(TokenKind::Eof));
        assert!(lexer.next_token().is(TokenKind::Eof));
    }

    #[test]
    fn test_unknown_character() {
        assert_eq!(kinds("a # b"), vec![TokenKind::Ident, TokenKind::None, TokenKind::Ident]);
    }
}
