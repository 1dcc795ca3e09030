use crate::compiler::diagnostic::ErrorCode;
use crate::compiler::excode::Operand;
use crate::compiler::parser::{Parser, ReturnStatus};
use crate::compiler::symbols::{Extent, Scope, Type, Var, VarId};
use crate::frontend::stream::TokenSource;
use crate::frontend::token::TokenKind;

impl<S: TokenSource> Parser<S> {
    /// Declares in the scope being parsed, reporting redeclarations.
    fn declare(&mut self, var: Var, line: usize) -> Option<VarId> {
        let result = if self.function.is_some() {
            let depth = self.emitter.depth;
            self.symbols.declare_local(var, Scope::Local, depth)
        } else {
            self.symbols.declare_global(var)
        };
        match result {
            Ok(id) => Some(id),
            Err(err) => {
                self.error(line, ErrorCode::Redeclared, err.to_string());
                None
            }
        }
    }

    fn type_of(kind: TokenKind) -> Option<Type> {
        match kind {
            TokenKind::Int => Some(Type::Int),
            TokenKind::Char => Some(Type::Char),
            TokenKind::Void => Some(Type::Void),
            _ => None,
        }
    }

    // =========================================================================
    // Literals
    // =========================================================================

    /// `uinteger`; malformed or out-of-range literals read as 0.
    pub(super) fn uinteger(&mut self) -> Option<i32> {
        match self.kind() {
            TokenKind::IntCon => {
                let token = self.accept();
                match token.text.parse::<i32>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        self.error(
                            token.line,
                            ErrorCode::Lexical,
                            format!("integer literal {} out of range", token.text),
                        );
                        Some(0)
                    }
                }
            }
            TokenKind::IntErr => {
                self.accept();
                Some(0)
            }
            _ => {
                let line = self.line();
                self.error(line, ErrorCode::Syntax, "expected an unsigned integer");
                None
            }
        }
    }

    /// `['+'|'-'] uinteger`
    pub(super) fn integer(&mut self) -> Option<i32> {
        let negative = match self.kind() {
            TokenKind::Plus => {
                self.accept();
                false
            }
            TokenKind::Minus => {
                self.accept();
                true
            }
            _ => false,
        };
        let value = self.uinteger()?;
        Some(if negative { value.wrapping_neg() } else { value })
    }

    // =========================================================================
    // Constants
    // =========================================================================

    /// `{'const' constDef ';'}`
    pub(super) fn const_block(&mut self) {
        while self.eat(TokenKind::Const) {
            self.const_def();
            if !self.expect(TokenKind::Semicn, ErrorCode::MissingSemicolon) {
                self.skip_to(&[
                    TokenKind::Semicn,
                    TokenKind::Const,
                    TokenKind::Int,
                    TokenKind::Char,
                    TokenKind::Void,
                ]);
                self.eat(TokenKind::Semicn);
            }
        }
    }

    fn const_def(&mut self) {
        let ty = match self.kind() {
            TokenKind::Int => Type::Int,
            TokenKind::Char => Type::Char,
            _ => {
                let line = self.line();
                self.error(line, ErrorCode::Syntax, "expected 'int' or 'char' after 'const'");
                return;
            }
        };
        self.accept();

        loop {
            let Some(name) = self.expect_ident() else {
                return;
            };
            self.expect(TokenKind::Assign, ErrorCode::Syntax);

            let line = self.line();
            let value = match (ty, self.kind()) {
                (Type::Char, TokenKind::CharCon | TokenKind::CharErr) => {
                    self.accept().text.chars().next().map(|c| c as i32)
                }
                (Type::Int, TokenKind::Plus | TokenKind::Minus | TokenKind::IntCon | TokenKind::IntErr) => {
                    self.integer()
                }
                (_, TokenKind::CharCon | TokenKind::CharErr | TokenKind::IntCon | TokenKind::IntErr) => {
                    self.accept();
                    self.error(
                        line,
                        ErrorCode::ConstType,
                        format!("initializer of '{}' is not of type {}", name.text, ty.name()),
                    );
                    None
                }
                _ => {
                    self.error(line, ErrorCode::Syntax, "expected a constant value");
                    None
                }
            };

            if let Some(value) = value {
                self.declare(Var::constant(&name.text, ty, value), name.line);
            }
            if !self.eat(TokenKind::Comma) {
                return;
            }
        }
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// `{varDef ';'}`. At global scope, stops before a function definition.
    pub(super) fn var_block(&mut self) {
        loop {
            let Some(ty) = Self::type_of(self.kind()).filter(|&t| t != Type::Void) else {
                return;
            };
            if self.function.is_none() {
                self.accept();
                let named = self.eat(TokenKind::Ident);
                let is_fun = named && self.at(TokenKind::LParent);
                self.tokens.rollback(if named { 2 } else { 1 });
                if is_fun {
                    return;
                }
            }
            self.accept();
            self.var_def(ty);
            if !self.expect(TokenKind::Semicn, ErrorCode::MissingSemicolon) {
                self.skip_to(&[
                    TokenKind::Semicn,
                    TokenKind::Int,
                    TokenKind::Char,
                    TokenKind::Void,
                ]);
                self.eat(TokenKind::Semicn);
            }
        }
    }

    /// `(id | id '[' uinteger ']') {',' ...}` after the type keyword.
    fn var_def(&mut self, ty: Type) {
        loop {
            let Some(name) = self.expect_ident() else {
                return;
            };
            let mut extent = Extent::Single;
            if self.eat(TokenKind::LBrack) {
                let size = self.uinteger().unwrap_or(0);
                extent = Extent::Array(size.max(0) as u32);
                self.expect(TokenKind::RBrack, ErrorCode::MissingRBrack);
            }
            self.declare(Var::variable(&name.text, ty, extent), name.line);
            if !self.eat(TokenKind::Comma) {
                return;
            }
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// `('int'|'char') id '(' params ')' '{' compound '}'`
    pub(super) fn fun_def(&mut self) {
        let ty = Self::type_of(self.accept().kind).unwrap_or(Type::Int);
        self.fun_body(ty);
    }

    /// Everything after the return type of a non-main function.
    pub(super) fn fun_body(&mut self, ret: Type) {
        let line = self.line();
        let Some(name) = self.expect_ident() else {
            self.skip_to(&[TokenKind::Int, TokenKind::Char, TokenKind::Void]);
            return;
        };
        self.begin_function(&name.text, ret, line);

        if self.expect(TokenKind::LParent, ErrorCode::Syntax) {
            self.params();
            self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        }
        self.symbols.seal_params();
        self.body();
    }

    /// `'main' '(' ')' '{' compound '}'` after `void`.
    pub(super) fn main_fun(&mut self) {
        let line = self.line();
        self.accept();
        self.begin_function("main", Type::Void, line);
        self.has_main = true;
        if let Some(ctx) = &self.function {
            let entry = ctx.entry;
            self.emitter.get_mut(self.entry_call).operand = Operand::Label(entry);
        }

        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        self.body();
    }

    fn params(&mut self) {
        if self.at(TokenKind::RParent) {
            return;
        }
        loop {
            let line = self.line();
            let Some(ty) = Self::type_of(self.kind()).filter(|&t| t != Type::Void) else {
                self.error(line, ErrorCode::Syntax, "expected a parameter type");
                return;
            };
            self.accept();
            let Some(name) = self.expect_ident() else {
                return;
            };

            let depth = self.emitter.depth;
            let var = Var::variable(&name.text, ty, Extent::Single);
            match self.symbols.declare_local(var, Scope::Param, depth) {
                Ok(_) => {
                    if let Some(id) = self.function.as_ref().and_then(|ctx| ctx.id) {
                        self.symbols.fun_mut(id).params.push(ty);
                    }
                }
                Err(err) => self.error(name.line, ErrorCode::Redeclared, err.to_string()),
            }

            if !self.eat(TokenKind::Comma) {
                return;
            }
        }
    }

    /// `'{' compound '}'` and the end of the function.
    fn body(&mut self) {
        self.expect(TokenKind::LBrace, ErrorCode::Syntax);
        let status = self.compound();
        let line = self.line();
        self.expect(TokenKind::RBrace, ErrorCode::Syntax);
        self.end_function(status, line);
    }

    /// `[constBlock] [varBlock] {statement}`
    fn compound(&mut self) -> ReturnStatus {
        self.const_block();
        self.var_block();

        let mut status = ReturnStatus::None;
        while !matches!(self.kind(), TokenKind::RBrace | TokenKind::Eof) {
            status = status.then(self.statement());
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::parser::tests::{codes, letters, parse};
    use crate::compiler::symbols::{Extent, Scope, Type};

    #[test]
    fn test_globals_and_constants() {
        let result = parse(
            "const int N = -3, M = +4; const char C = 'z';
             int a, b[10]; char c;
             void main() { }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let symbols = &result.symbols;
        assert_eq!(symbols.var(symbols.lookup("N").unwrap()).addr, -3);
        assert_eq!(symbols.var(symbols.lookup("M").unwrap()).addr, 4);
        assert_eq!(symbols.var(symbols.lookup("C").unwrap()).addr, 'z' as i32);
        let b = symbols.var(symbols.lookup("b").unwrap());
        assert_eq!((b.addr, b.extent), (1, Extent::Array(10)));
        assert_eq!(symbols.var(symbols.lookup("c").unwrap()).ty, Type::Char);
        assert_eq!(symbols.global_size(), 12);
    }

    #[test]
    fn test_function_signatures() {
        let result = parse(
            "int a;
             int add(int x, char y) { return (x + y); }
             void nop() { }
             void main() { }",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let add = result.symbols.fun(result.symbols.lookup_fun("add").unwrap());
        assert_eq!(add.ret, Type::Int);
        assert_eq!(add.params, vec![Type::Int, Type::Char]);
        let nop = result.symbols.fun(result.symbols.lookup_fun("nop").unwrap());
        assert_eq!(nop.ret, Type::Void);
        assert!(nop.params.is_empty());
    }

    #[test]
    fn test_main_locals_are_kept() {
        let result = parse("void main() { const int K = 1; int x; char s[4]; }");
        assert!(result.diagnostics.is_empty());
        let locals = result.symbols.locals();
        assert_eq!(locals.len(), 3);
        assert!(locals.iter().all(|v| v.scope == Scope::Local));
    }

    #[test]
    fn test_redeclaration() {
        let result = parse("int x; char x; void x() { } void main() { int y; int y; }");
        assert_eq!(letters(&result), "bbb");
    }

    #[test]
    fn test_integer_literal_out_of_range() {
        let result = parse("const int BIG = 2147483648;\nvoid main() { printf(99999999999); printf(2147483647); }");
        assert_eq!(letters(&result), "aa");
        assert_eq!(result.diagnostics[0].line, 1);
        assert_eq!(result.diagnostics[1].line, 2);
        assert!(result.diagnostics[1].message.contains("out of range"));
        let big = result.symbols.lookup("BIG").unwrap();
        assert_eq!(result.symbols.var(big).addr, 0);
        assert!(codes(&result).iter().any(|c| c.contains("2147483647")));
    }

    #[test]
    fn test_const_type_mismatch() {
        let result = parse("const int a = 'c'; const char b = 1; void main() { }");
        assert_eq!(letters(&result), "oo");
    }

    #[test]
    fn test_missing_semicolon_and_bracket() {
        let result = parse("int a[3;\nint b\nvoid main() { }");
        assert_eq!(letters(&result), "mk");
        assert_eq!(result.diagnostics[0].line, 1);
        assert_eq!(result.diagnostics[1].line, 2);
    }
}
