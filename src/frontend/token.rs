use crate::frontend::lang;

/// Token kinds, in lang-file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Errors and literals
    None,
    IntCon,
    CharCon,
    StrCon,

    // Keywords
    Const,
    Int,
    Char,
    Void,
    Main,
    If,
    Else,
    Do,
    While,
    For,
    Scanf,
    Printf,
    Return,

    // Operators
    Plus,
    Minus,
    Mult,
    Div,
    Lss,
    Leq,
    Gre,
    Geq,
    Eql,
    Neq,
    Assign,

    // Delimiters
    Semicn,
    Comma,
    LParent,
    RParent,
    LBrack,
    RBrack,
    LBrace,
    RBrace,

    Ident,
    Comment,

    // Recoverable malformed literals
    IntErr,
    CharErr,

    Eof,
}

impl TokenKind {
    pub const COUNT: usize = 41;

    pub const ALL: [TokenKind; TokenKind::COUNT] = [
        TokenKind::None,
        TokenKind::IntCon,
        TokenKind::CharCon,
        TokenKind::StrCon,
        TokenKind::Const,
        TokenKind::Int,
        TokenKind::Char,
        TokenKind::Void,
        TokenKind::Main,
        TokenKind::If,
        TokenKind::Else,
        TokenKind::Do,
        TokenKind::While,
        TokenKind::For,
        TokenKind::Scanf,
        TokenKind::Printf,
        TokenKind::Return,
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
        TokenKind::Ident,
        TokenKind::Comment,
        TokenKind::IntErr,
        TokenKind::CharErr,
        TokenKind::Eof,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Built-in name, used when no lang file was loaded.
    pub fn canonical_name(self) -> &'static str {
        use TokenKind::*;
        match self {
            None => "NONE",
            IntCon => "INTCON",
            CharCon => "CHARCON",
            StrCon => "STRCON",
            Const => "CONSTTK",
            Int => "INTTK",
            Char => "CHARTK",
            Void => "VOIDTK",
            Main => "MAINTK",
            If => "IFTK",
            Else => "ELSETK",
            Do => "DOTK",
            While => "WHILETK",
            For => "FORTK",
            Scanf => "SCANFTK",
            Printf => "PRINTFTK",
            Return => "RETURNTK",
            Plus => "PLUS",
            Minus => "MINU",
            Mult => "MULT",
            Div => "DIV",
            Lss => "LSS",
            Leq => "LEQ",
            Gre => "GRE",
            Geq => "GEQ",
            Eql => "EQL",
            Neq => "NEQ",
            Assign => "ASSIGN",
            Semicn => "SEMICN",
            Comma => "COMMA",
            LParent => "LPARENT",
            RParent => "RPARENT",
            LBrack => "LBRACK",
            RBrack => "RBRACK",
            LBrace => "LBRACE",
            RBrace => "RBRACE",
            Ident => "IDENFR",
            Comment => "COMMENT",
            IntErr => "INTERR",
            CharErr => "CHARERR",
            Eof => "FEOF",
        }
    }

    /// Display name: the loaded lang table if any, else the built-in one.
    pub fn name(self) -> &'static str {
        lang::name_of(self).unwrap_or_else(|| self.canonical_name())
    }

    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "const" => TokenKind::Const,
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "void" => TokenKind::Void,
            "main" => TokenKind::Main,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "do" => TokenKind::Do,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "scanf" => TokenKind::Scanf,
            "printf" => TokenKind::Printf,
            "return" => TokenKind::Return,
            _ => return Option::None,
        };
        Some(kind)
    }

    /// Kinds the parser reports as lexical errors.
    pub fn is_lexical_error(self) -> bool {
        matches!(self, TokenKind::None | TokenKind::IntErr | TokenKind::CharErr)
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text; literals are stored without their quotes.
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    pub fn eof(line: usize) -> Self {
        Self::new(TokenKind::Eof, "", line)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_declaration_order() {
        for (i, kind) in TokenKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(TokenKind::Ident.canonical_name(), "IDENFR");
        assert_eq!(TokenKind::Minus.canonical_name(), "MINU");
        assert_eq!(TokenKind::Eof.canonical_name(), "FEOF");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(TokenKind::keyword("while"), Some(TokenKind::While));
        assert_eq!(TokenKind::keyword("main"), Some(TokenKind::Main));
        assert_eq!(TokenKind::keyword("While"), None);
        assert_eq!(TokenKind::keyword("x"), None);
    }

    #[test]
    fn test_token_display() {
        let token = Token::new(TokenKind::IntCon, "42", 3);
        assert_eq!(token.to_string(), format!("{} 42", TokenKind::IntCon.name()));
    }
}
