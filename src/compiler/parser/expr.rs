use crate::bytecode::op::{Op, Opr};
use crate::compiler::diagnostic::ErrorCode;
use crate::compiler::excode::Operand;
use crate::compiler::parser::Parser;
use crate::compiler::symbols::{Type, VarId};
use crate::frontend::stream::TokenSource;
use crate::frontend::token::{Token, TokenKind};

/// A value on the stack: its type and the record that pushed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Expr {
    pub ty: Type,
    pub value: usize,
}

impl<S: TokenSource> Parser<S> {
    /// `['+'|'-'] term {('+'|'-') term}`
    pub(super) fn expression(&mut self) -> Expr {
        let sign = match self.kind() {
            TokenKind::Plus | TokenKind::Minus => Some(self.accept().kind),
            _ => None,
        };
        let mut expr = self.term();
        if let Some(sign) = sign {
            expr.ty = Type::Int;
            if sign == TokenKind::Minus {
                expr.value = self.emitter.emit_opr(Opr::Neg, &[expr.value]);
            }
        }

        loop {
            let opr = match self.kind() {
                TokenKind::Plus => Opr::Add,
                TokenKind::Minus => Opr::Sub,
                _ => return expr,
            };
            self.accept();
            let rhs = self.term();
            expr = Expr {
                ty: Type::Int,
                value: self.emitter.emit_opr(opr, &[expr.value, rhs.value]),
            };
        }
    }

    /// `factor {('*'|'/') factor}`
    fn term(&mut self) -> Expr {
        let mut expr = self.factor();
        loop {
            let opr = match self.kind() {
                TokenKind::Mult => Opr::Mul,
                TokenKind::Div => Opr::Div,
                _ => return expr,
            };
            self.accept();
            let rhs = self.factor();
            expr = Expr {
                ty: Type::Int,
                value: self.emitter.emit_opr(opr, &[expr.value, rhs.value]),
            };
        }
    }

    fn factor(&mut self) -> Expr {
        let line = self.line();
        match self.kind() {
            TokenKind::Ident => {
                let name = self.accept();
                match self.kind() {
                    TokenKind::LParent => {
                        self.tokens.rollback(1);
                        self.call_value(line)
                    }
                    TokenKind::LBrack => {
                        self.accept();
                        self.element(&name)
                    }
                    _ => self.variable(&name),
                }
            }
            TokenKind::LParent => {
                self.accept();
                let inner = self.expression();
                self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
                Expr {
                    ty: Type::Int,
                    value: inner.value,
                }
            }
            TokenKind::Plus | TokenKind::Minus | TokenKind::IntCon | TokenKind::IntErr => {
                let value = self.integer().unwrap_or(0);
                self.literal(Type::Int, value)
            }
            TokenKind::CharCon | TokenKind::CharErr => {
                let value = self.accept().text.chars().next().map_or(0, |c| c as i32);
                self.literal(Type::Char, value)
            }
            _ => {
                let found = self.tokens.current().text.clone();
                self.error(
                    line,
                    ErrorCode::Syntax,
                    format!("expected an expression, found '{}'", found),
                );
                self.literal(Type::Int, 0)
            }
        }
    }

    fn literal(&mut self, ty: Type, value: i32) -> Expr {
        Expr {
            ty,
            value: self.emitter.emit(Op::Lit, 0, Operand::Imm(value), &[]),
        }
    }

    fn variable(&mut self, name: &Token) -> Expr {
        match self.find_scalar(name) {
            Some(id) => Expr {
                ty: self.symbols.var(id).ty,
                value: self.load_var(id),
            },
            None => self.literal(Type::Int, 0),
        }
    }

    /// `id '[' expr ']'` after the bracket.
    fn element(&mut self, name: &Token) -> Expr {
        let mut id = self.find_var(name);
        if id.is_some_and(|id| !self.symbols.var(id).is_array()) {
            self.error(
                name.line,
                ErrorCode::ArgumentType,
                format!("'{}' is not an array", name.text),
            );
            id = None;
        }
        let index = self.index_expression();
        match id {
            Some(id) => Expr {
                ty: self.symbols.var(id).ty,
                value: self.load_element(id, index),
            },
            None => self.literal(Type::Int, 0),
        }
    }

    /// The index and closing bracket of an element access.
    pub(super) fn index_expression(&mut self) -> usize {
        let line = self.line();
        let index = self.expression();
        if index.ty != Type::Int {
            self.error(line, ErrorCode::IndexType, "array index must be an int");
        }
        self.expect(TokenKind::RBrack, ErrorCode::MissingRBrack);
        index.value
    }

    /// Looks up a variable used as a scalar value.
    pub(super) fn find_scalar(&mut self, name: &Token) -> Option<VarId> {
        let id = self.find_var(name)?;
        if self.symbols.var(id).is_array() {
            self.error(
                name.line,
                ErrorCode::ArgumentType,
                format!("array '{}' used as a value", name.text),
            );
            return None;
        }
        Some(id)
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn call_value(&mut self, line: usize) -> Expr {
        match self.call() {
            Some((call, ret)) if ret != Type::Void => Expr {
                ty: ret,
                value: call,
            },
            Some((_, _)) => {
                self.error(line, ErrorCode::ArgumentType, "void function used as a value");
                self.literal(Type::Int, 0)
            }
            None => self.literal(Type::Int, 0),
        }
    }

    /// `id '(' [expr {',' expr}] ')'`. Returns the call record and the
    /// callee's return type, or `None` for an undeclared callee.
    pub(super) fn call(&mut self) -> Option<(usize, Type)> {
        let name = self.accept();
        let callee = match self.symbols.lookup_fun(&name.text) {
            Ok(id) => Some(id),
            Err(err) => {
                self.error(name.line, ErrorCode::Undeclared, err.to_string());
                None
            }
        };
        let (ret, params) = match callee {
            Some(id) => {
                let fun = self.symbols.fun(id);
                (fun.ret, fun.params.clone())
            }
            None => (Type::Void, Vec::new()),
        };

        if callee.is_some() && ret != Type::Void {
            self.emitter.emit(Op::Int, 0, Operand::Imm(1), &[]);
        }

        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        let mut args = Vec::new();
        if !self.at(TokenKind::RParent) {
            loop {
                let line = self.line();
                args.push((line, self.expression()));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        let id = callee?;

        if args.len() != params.len() {
            let problem = if args.len() < params.len() {
                "too few arguments"
            } else {
                "too many arguments"
            };
            self.error(
                name.line,
                ErrorCode::ArgumentCount,
                format!(
                    "{} to '{}': expected {}, found {}",
                    problem,
                    name.text,
                    params.len(),
                    args.len()
                ),
            );
        }
        for (position, ((line, arg), &expected)) in args.iter().zip(&params).enumerate() {
            if arg.ty != expected {
                self.error(
                    *line,
                    ErrorCode::ArgumentType,
                    format!(
                        "argument {} of '{}' is {}, expected {}",
                        position + 1,
                        name.text,
                        arg.ty.name(),
                        expected.name()
                    ),
                );
            }
        }

        let values: Vec<usize> = args.iter().map(|(_, arg)| arg.value).collect();
        let call = self
            .emitter
            .emit(Op::Cal, values.len() as u32, Operand::Fun(id), &values);
        Some((call, ret))
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// `expr [relop expr]`, leaving a value that is nonzero when the
    /// condition holds, or when it fails if `invert` is set.
    pub(super) fn condition(&mut self, invert: bool) -> usize {
        let line = self.line();
        let lhs = self.expression();

        let relation = match self.kind() {
            TokenKind::Lss => Some(Opr::Lt),
            TokenKind::Leq => Some(Opr::Le),
            TokenKind::Gre => Some(Opr::Gt),
            TokenKind::Geq => Some(Opr::Ge),
            TokenKind::Eql => Some(Opr::Eq),
            TokenKind::Neq => Some(Opr::Ne),
            _ => None,
        };

        let Some(relation) = relation else {
            if lhs.ty != Type::Int {
                self.error(line, ErrorCode::ConditionType, "condition must be an int");
            }
            return if invert {
                self.emitter.emit_opr(Opr::Not, &[lhs.value])
            } else {
                lhs.value
            };
        };

        self.accept();
        let rhs = self.expression();
        if lhs.ty != Type::Int || rhs.ty != Type::Int {
            self.error(line, ErrorCode::ConditionType, "operands of a comparison must be ints");
        }
        let opr = if invert {
            relation.negated().unwrap_or(relation)
        } else {
            relation
        };
        self.emitter.emit_opr(opr, &[lhs.value, rhs.value])
    }
}
