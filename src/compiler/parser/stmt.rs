use crate::bytecode::op::{Op, Opr, mode};
use crate::compiler::diagnostic::ErrorCode;
use crate::compiler::excode::Operand;
use crate::compiler::parser::Parser;
use crate::compiler::symbols::{Type, VarId};
use crate::frontend::stream::TokenSource;
use crate::frontend::token::{Token, TokenKind};

/// Whether a statement returns on no path, some paths, or every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReturnStatus {
    None,
    Partial,
    All,
}

impl ReturnStatus {
    /// Status of `self` followed by `next`.
    pub fn then(self, next: ReturnStatus) -> ReturnStatus {
        self.max(next)
    }

    /// Status of a two-way branch.
    pub fn branch(self, other: ReturnStatus) -> ReturnStatus {
        match (self, other) {
            (ReturnStatus::All, ReturnStatus::All) => ReturnStatus::All,
            (ReturnStatus::None, ReturnStatus::None) => ReturnStatus::None,
            _ => ReturnStatus::Partial,
        }
    }

    /// Status of a body that may not run.
    pub fn maybe(self) -> ReturnStatus {
        self.min(ReturnStatus::Partial)
    }
}

impl<S: TokenSource> Parser<S> {
    pub(super) fn statement(&mut self) -> ReturnStatus {
        match self.kind() {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Do => self.do_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::LBrace => {
                self.accept();
                let mut status = ReturnStatus::None;
                while !matches!(self.kind(), TokenKind::RBrace | TokenKind::Eof) {
                    status = status.then(self.statement());
                }
                self.expect(TokenKind::RBrace, ErrorCode::Syntax);
                status
            }
            TokenKind::Ident => {
                let name = self.accept();
                if self.at(TokenKind::LParent) {
                    self.tokens.rollback(1);
                    self.call_statement();
                } else {
                    self.assignment(name);
                }
                self.end_statement();
                ReturnStatus::None
            }
            TokenKind::Scanf => {
                self.scanf();
                self.end_statement();
                ReturnStatus::None
            }
            TokenKind::Printf => {
                self.printf();
                self.end_statement();
                ReturnStatus::None
            }
            TokenKind::Return => {
                self.return_statement();
                self.end_statement();
                ReturnStatus::All
            }
            TokenKind::Semicn => {
                self.accept();
                ReturnStatus::None
            }
            _ => {
                let line = self.line();
                let text = self.tokens.current().text.clone();
                self.error(line, ErrorCode::Syntax, format!("unexpected '{}'", text));
                self.skip_to(&[TokenKind::Semicn, TokenKind::RBrace]);
                self.eat(TokenKind::Semicn);
                ReturnStatus::None
            }
        }
    }

    fn end_statement(&mut self) {
        self.expect(TokenKind::Semicn, ErrorCode::MissingSemicolon);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// Statement emitted one nesting level down.
    fn branch_statement(&mut self) -> ReturnStatus {
        self.begin_loop();
        let status = self.statement();
        self.end_loop(0, false);
        status
    }

    fn if_statement(&mut self) -> ReturnStatus {
        self.accept();
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        let cond = self.condition(false);
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        let skip = self.emitter.emit(Op::Jpc, 0, Operand::Pending, &[cond]);

        let then = self.branch_statement();
        if !self.eat(TokenKind::Else) {
            let end = self.emitter.mark_label();
            self.emitter.patch(skip, end);
            return then.maybe();
        }

        let exit = self.emitter.emit(Op::Jmp, 0, Operand::Pending, &[]);
        let other = self.emitter.mark_label();
        self.emitter.patch(skip, other);
        let otherwise = self.branch_statement();
        let end = self.emitter.mark_label();
        self.emitter.patch(exit, end);
        then.branch(otherwise)
    }

    fn while_statement(&mut self) -> ReturnStatus {
        self.accept();
        let start = self.emitter.mark_label();
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        let cond = self.condition(false);
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        let exit = self.emitter.emit(Op::Jpc, 0, Operand::Pending, &[cond]);

        self.begin_loop();
        let body = self.statement();
        self.emitter.emit(Op::Jmp, 0, Operand::Label(start), &[]);
        self.end_loop(start, true);

        let end = self.emitter.mark_label();
        self.emitter.patch(exit, end);
        body.maybe()
    }

    fn do_statement(&mut self) -> ReturnStatus {
        self.accept();
        let start = self.emitter.mark_label();
        self.begin_loop();
        let body = self.statement();

        if !self.eat(TokenKind::While) {
            let line = self.tokens.last_line();
            self.error(line, ErrorCode::MissingWhile, "missing 'while' in do statement");
            self.end_loop(start, true);
            return body;
        }
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        let cond = self.condition(true);
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        self.emitter
            .emit(Op::Jpc, 0, Operand::Label(start), &[cond]);
        self.end_loop(start, true);
        body
    }

    /// `for (i = e; cond; i = j +- step) body`. The step is emitted after the
    /// body.
    fn for_statement(&mut self) -> ReturnStatus {
        self.accept();
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        if let Some(name) = self.expect_ident() {
            self.assignment(name);
        }
        self.expect(TokenKind::Semicn, ErrorCode::MissingSemicolon);

        let start = self.emitter.mark_label();
        let cond = self.condition(false);
        self.expect(TokenKind::Semicn, ErrorCode::MissingSemicolon);
        let exit = self.emitter.emit(Op::Jpc, 0, Operand::Pending, &[cond]);

        let step = self.for_step();
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);

        self.begin_loop();
        let body = self.statement();
        if let Some((target, source, opr, amount)) = step {
            let value = self.load_var(source);
            let amount = self.emitter.emit(Op::Lit, 0, Operand::Imm(amount), &[]);
            let sum = self.emitter.emit_opr(opr, &[value, amount]);
            self.store_var(target, sum);
        }
        self.emitter.emit(Op::Jmp, 0, Operand::Label(start), &[]);
        self.end_loop(start, true);

        let end = self.emitter.mark_label();
        self.emitter.patch(exit, end);
        body.maybe()
    }

    /// Parses `id = id (+|-) uinteger` without emitting anything.
    fn for_step(&mut self) -> Option<(VarId, VarId, Opr, i32)> {
        let name = self.expect_ident()?;
        let target = self.find_target(&name, false);
        self.expect(TokenKind::Assign, ErrorCode::Syntax);
        let source_name = self.expect_ident()?;
        let source = self.find_scalar(&source_name);

        let opr = match self.kind() {
            TokenKind::Plus => Opr::Add,
            TokenKind::Minus => Opr::Sub,
            _ => {
                let line = self.line();
                self.error(line, ErrorCode::Syntax, "expected '+' or '-' in for step");
                return None;
            }
        };
        self.accept();
        let amount = self.uinteger()?;
        Some((target?, source?, opr, amount))
    }

    // =========================================================================
    // Simple statements
    // =========================================================================

    /// `id = expr` or `id[expr] = expr`, after the identifier.
    fn assignment(&mut self, name: Token) {
        if self.eat(TokenKind::LBrack) {
            let target = self.find_target(&name, true);
            let index = self.index_expression();
            self.expect(TokenKind::Assign, ErrorCode::Syntax);
            let value = self.expression();
            if let Some(id) = target {
                self.store_element(id, index, value.value);
            }
        } else {
            let target = self.find_target(&name, false);
            self.expect(TokenKind::Assign, ErrorCode::Syntax);
            let value = self.expression();
            if let Some(id) = target {
                self.store_var(id, value.value);
            }
        }
    }

    fn call_statement(&mut self) {
        if let Some((call, ret)) = self.call() {
            if ret != Type::Void {
                self.emitter.emit(Op::Pop, 0, Operand::Imm(1), &[call]);
            }
        }
    }

    fn scanf(&mut self) {
        self.accept();
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        loop {
            let Some(name) = self.expect_ident() else {
                break;
            };
            if let Some(id) = self.find_target(&name, false) {
                let opr = match self.symbols.var(id).ty {
                    Type::Char => Opr::ReadChar,
                    _ => Opr::ReadInt,
                };
                let value = self.emitter.emit_opr(opr, &[]);
                self.store_var(id, value);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
    }

    fn printf(&mut self) {
        self.accept();
        self.expect(TokenKind::LParent, ErrorCode::Syntax);
        let print_value = if self.at(TokenKind::StrCon) {
            let text = self.accept().text;
            let offset = self.symbols.strings.intern(&text);
            let lit = self.emitter.emit(Op::Lit, 0, Operand::Str(offset), &[]);
            self.emitter.emit_opr(Opr::PrintStr, &[lit]);
            self.eat(TokenKind::Comma)
        } else {
            true
        };
        if print_value {
            let value = self.expression();
            let opr = match value.ty {
                Type::Char => Opr::PrintChar,
                _ => Opr::PrintInt,
            };
            self.emitter.emit_opr(opr, &[value.value]);
        }
        self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
        self.emitter.emit_opr(Opr::PrintLn, &[]);
    }

    fn return_statement(&mut self) {
        let line = self.line();
        self.accept();
        let (name, ret) = match &self.function {
            Some(ctx) => (ctx.name.clone(), ctx.ret),
            None => (String::new(), Type::Void),
        };

        if self.eat(TokenKind::LParent) {
            let value = self.expression();
            self.expect(TokenKind::RParent, ErrorCode::MissingRParen);
            if ret == Type::Void {
                self.error(
                    line,
                    ErrorCode::VoidReturnsValue,
                    format!("void function '{}' returns a value", name),
                );
            } else {
                if value.ty != ret {
                    self.error(
                        line,
                        ErrorCode::MissingReturn,
                        format!(
                            "function '{}' returns {}, not {}",
                            name,
                            ret.name(),
                            value.ty.name()
                        ),
                    );
                }
                self.emitter
                    .emit(Op::Sto, mode::REL, Operand::RetSlot, &[value.value]);
            }
        } else if ret != Type::Void {
            self.error(
                line,
                ErrorCode::MissingReturn,
                format!("function '{}' must return a value", name),
            );
        }

        let params = self.symbols.param_count() as u32;
        self.emit_return(params);
    }
}
