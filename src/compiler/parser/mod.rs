//! Recursive-descent parser that generates code as it goes.
//!
//! Every production checks its leading token, reports problems as
//! [`Diagnostic`]s and keeps going, and appends instruction records to the
//! [`Emitter`] with symbolic operands that the allocator resolves later.

mod decl;
mod expr;
mod stmt;

use tracing::warn;

use crate::bytecode::op::{Op, Opr, mode};
use crate::compiler::alloc;
use crate::compiler::diagnostic::{Diagnostic, ErrorCode};
use crate::compiler::excode::{Emitter, Liveness, Operand};
use crate::compiler::symbols::{Fun, FunId, SymbolTables, Type, VarId};
use crate::frontend::stream::{TokenSource, TokenStream};
use crate::frontend::token::{Token, TokenKind};

pub use stmt::ReturnStatus;

/// The function whose body is being parsed.
#[derive(Debug, Clone)]
struct FunctionCtx {
    id: Option<FunId>,
    name: String,
    ret: Type,
    entry: usize,
}

/// Everything the parser produced.
pub struct ParseResult {
    pub emitter: Emitter,
    pub symbols: SymbolTables,
    pub diagnostics: Vec<Diagnostic>,
    pub tokens: Vec<Token>,
}

pub struct Parser<S> {
    tokens: TokenStream<S>,
    symbols: SymbolTables,
    emitter: Emitter,
    diagnostics: Vec<Diagnostic>,
    optimize: bool,
    function: Option<FunctionCtx>,
    entry_call: usize,
    has_main: bool,
}

impl<S: TokenSource> Parser<S> {
    pub fn new(tokens: TokenStream<S>, optimize: bool) -> Self {
        Self {
            tokens,
            symbols: SymbolTables::new(),
            emitter: Emitter::new(),
            diagnostics: Vec::new(),
            optimize,
            function: None,
            entry_call: 0,
            has_main: false,
        }
    }

    /// Parses a whole program and finishes every function in it.
    pub fn parse(mut self) -> ParseResult {
        self.program();
        ParseResult {
            emitter: self.emitter,
            symbols: self.symbols,
            diagnostics: self.diagnostics,
            tokens: self.tokens.take_trace(),
        }
    }

    // =========================================================================
    // Token helpers
    // =========================================================================

    fn flush_lexical_errors(&mut self) {
        for token in self.tokens.take_lexical_errors() {
            self.error(
                token.line,
                ErrorCode::Lexical,
                format!("invalid token '{}'", token.text),
            );
        }
    }

    fn kind(&mut self) -> TokenKind {
        let kind = self.tokens.kind();
        self.flush_lexical_errors();
        kind
    }

    fn at(&mut self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn line(&mut self) -> usize {
        self.tokens.current().line
    }

    fn accept(&mut self) -> Token {
        let token = self.tokens.accept();
        self.flush_lexical_errors();
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.accept();
            true
        } else {
            false
        }
    }

    /// Accepts `kind` or reports `code` on the line of the last token.
    fn expect(&mut self, kind: TokenKind, code: ErrorCode) -> bool {
        if self.eat(kind) {
            return true;
        }
        let line = self.tokens.last_line();
        let found = self.tokens.current().text.clone();
        let message = match code {
            ErrorCode::MissingSemicolon => "missing ';'".to_string(),
            ErrorCode::MissingRParen => "missing ')'".to_string(),
            ErrorCode::MissingRBrack => "missing ']'".to_string(),
            _ => format!("expected {}, found '{}'", kind.name(), found),
        };
        self.error(line, code, message);
        false
    }

    fn expect_ident(&mut self) -> Option<Token> {
        if self.at(TokenKind::Ident) {
            return Some(self.accept());
        }
        let line = self.line();
        let found = self.tokens.current().text.clone();
        self.error(
            line,
            ErrorCode::Syntax,
            format!("expected an identifier, found '{}'", found),
        );
        None
    }

    /// Skips to one of `stops` (or end of input) without consuming it.
    fn skip_to(&mut self, stops: &[TokenKind]) {
        loop {
            let kind = self.kind();
            if kind == TokenKind::Eof || stops.contains(&kind) {
                return;
            }
            self.accept();
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    fn error(&mut self, line: usize, code: ErrorCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(line, code, message));
    }

    fn warning(&mut self, line: usize, code: ErrorCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(line, code, message));
    }

    // =========================================================================
    // Program structure
    // =========================================================================

    fn program(&mut self) {
        self.entry_call = self.emitter.emit(Op::Cal, 0, Operand::Pending, &[]);
        self.emitter.get_mut(self.entry_call).live = Liveness::Live;

        self.const_block();
        self.var_block();

        loop {
            match self.kind() {
                TokenKind::Int | TokenKind::Char => self.fun_def(),
                TokenKind::Void => {
                    self.accept();
                    if self.at(TokenKind::Main) {
                        self.main_fun();
                        break;
                    }
                    self.fun_body(Type::Void);
                }
                TokenKind::Eof => break,
                _ => {
                    let line = self.line();
                    let text = self.accept().text;
                    self.error(
                        line,
                        ErrorCode::Syntax,
                        format!("unexpected '{}' at top level", text),
                    );
                }
            }
        }

        if !self.has_main {
            let line = self.tokens.last_line();
            self.error(line, ErrorCode::Syntax, "missing main function");
            self.emitter.get_mut(self.entry_call).live = Liveness::Dead;
        } else if !self.at(TokenKind::Eof) {
            let line = self.line();
            self.error(line, ErrorCode::Syntax, "unexpected text after main");
        }
    }

    /// Declares the function and emits its frame reservation.
    fn begin_function(&mut self, name: &str, ret: Type, line: usize) {
        self.symbols.begin_function();
        self.emitter.depth = 0;

        let entry = self.emitter.len();
        let fun = Fun {
            name: name.to_string(),
            ret,
            entry,
            params: Vec::new(),
        };
        let id = match self.symbols.declare_fun(fun) {
            Ok(id) => Some(id),
            Err(err) => {
                self.error(line, ErrorCode::Redeclared, err.to_string());
                None
            }
        };
        self.function = Some(FunctionCtx {
            id,
            name: name.to_string(),
            ret,
            entry,
        });
        self.emitter.emit(Op::Int, 0, Operand::Frame, &[]);
    }

    fn end_function(&mut self, status: ReturnStatus, line: usize) {
        let Some(ctx) = self.function.take() else {
            return;
        };
        let params = self.symbols.param_count() as u32;

        if status != ReturnStatus::All {
            if ctx.ret != Type::Void {
                warn!(function = %ctx.name, "non-void function can end without a return");
                self.warning(
                    line,
                    ErrorCode::MissingReturn,
                    format!("function '{}' can end without returning a value", ctx.name),
                );
                let zero = self.emitter.emit(Op::Lit, 0, Operand::Imm(0), &[]);
                self.emitter
                    .emit(Op::Sto, mode::REL, Operand::RetSlot, &[zero]);
            }
            self.emit_return(params);
        } else if self.emitter.has_pending_label() {
            self.emit_return(params);
        }

        alloc::finish_function(
            &mut self.emitter,
            &self.symbols,
            ctx.entry,
            &ctx.name,
            self.optimize,
        );
    }

    fn emit_return(&mut self, params: u32) -> usize {
        self.emitter
            .emit(Op::Opr, params, Operand::Imm(Opr::Ret as i32), &[])
    }

    // =========================================================================
    // Variable access
    // =========================================================================

    fn store_var(&mut self, id: VarId, value: usize) -> usize {
        match id {
            VarId::Global(_) => {
                let addr = self.symbols.var(id).addr;
                self.emitter
                    .emit(Op::Sto, mode::ABS, Operand::Imm(addr), &[value])
            }
            VarId::Local(local) => {
                let index = self
                    .emitter
                    .emit(Op::Sto, mode::REL, Operand::Local(local), &[value]);
                self.symbols.var_mut(id).writes.write_scalar(index);
                index
            }
        }
    }

    fn store_element(&mut self, id: VarId, index: usize, value: usize) -> usize {
        match id {
            VarId::Global(_) => {
                let addr = self.symbols.var(id).addr;
                self.emitter
                    .emit(Op::Sta, mode::ABS, Operand::Imm(addr), &[index, value])
            }
            VarId::Local(local) => {
                let at = self.emitter.emit(
                    Op::Sta,
                    mode::REL,
                    Operand::Local(local),
                    &[index, value],
                );
                self.symbols.var_mut(id).writes.write_element(at);
                at
            }
        }
    }

    /// Pushes a scalar. A load right after a store to the same variable is
    /// folded into that store when optimizing.
    fn load_var(&mut self, id: VarId) -> usize {
        let var = self.symbols.var(id);
        if var.is_const() {
            let value = var.addr;
            return self.emitter.emit(Op::Lit, 0, Operand::Imm(value), &[]);
        }

        let (operand, rel, reads) = match id {
            VarId::Global(_) => (Operand::Imm(var.addr), false, Vec::new()),
            VarId::Local(local) => (Operand::Local(local), true, var.writes.reaching()),
        };
        let fused = if self.optimize {
            self.emitter.last_store_to(operand, rel)
        } else {
            None
        };

        let index = if rel {
            self.emitter.emit_load(Op::Lod, operand, &[], reads)
        } else {
            self.emitter.emit(Op::Lod, mode::ABS, operand, &[])
        };
        if let Some(store) = fused {
            let code = self.emitter.get_mut(index);
            code.reads = vec![store];
            code.fused_into = Some(store);
        }
        index
    }

    fn load_element(&mut self, id: VarId, index: usize) -> usize {
        let var = self.symbols.var(id);
        match id {
            VarId::Global(_) => {
                let addr = var.addr;
                self.emitter
                    .emit(Op::Lda, mode::ABS, Operand::Imm(addr), &[index])
            }
            VarId::Local(local) => {
                let reads = var.writes.reaching();
                self.emitter
                    .emit_load(Op::Lda, Operand::Local(local), &[index], reads)
            }
        }
    }

    /// Looks up a variable, reporting undeclared names.
    fn find_var(&mut self, token: &Token) -> Option<VarId> {
        match self.symbols.lookup(&token.text) {
            Ok(id) => Some(id),
            Err(err) => {
                self.error(token.line, ErrorCode::Undeclared, err.to_string());
                None
            }
        }
    }

    /// Looks up an assignment target: a writable scalar, or an array when
    /// `element` is set.
    fn find_target(&mut self, token: &Token, element: bool) -> Option<VarId> {
        let id = self.find_var(token)?;
        let var = self.symbols.var(id);
        let message = if var.is_const() {
            Some(format!("cannot assign to constant '{}'", token.text))
        } else if var.is_array() != element {
            Some(if element {
                format!("'{}' is not an array", token.text)
            } else {
                format!("cannot assign to array '{}'", token.text)
            })
        } else {
            None
        };
        match message {
            Some(message) => {
                self.error(token.line, ErrorCode::NotAssignable, message);
                None
            }
            None => Some(id),
        }
    }

    // =========================================================================
    // Nesting
    // =========================================================================

    /// Enters a loop body or a conditional branch.
    fn begin_loop(&mut self) {
        self.symbols.begin_loop();
        self.emitter.depth += 1;
    }

    /// Leaves a nesting level. For real loops, every load of a local emitted
    /// since `start` also depends on every store to it since `start`: a later
    /// iteration sees writes emitted after the load.
    fn end_loop(&mut self, start: usize, is_loop: bool) {
        if is_loop {
            let end = self.emitter.len();
            for local in 0..self.symbols.locals().len() as u32 {
                let stores: Vec<usize> = (start..end)
                    .filter(|&i| {
                        let code = self.emitter.get(i);
                        code.is_store() && code.local() == Some(local)
                    })
                    .collect();
                if !stores.is_empty() {
                    self.emitter.revalidate(start..end, local, &stores);
                }
            }
        }
        self.symbols.end_loop();
        self.emitter.depth = self.emitter.depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::excode::ExCode;
    use crate::frontend::lexer::Lexer;

    pub(super) fn parse(source: &str) -> ParseResult {
        Parser::new(TokenStream::new(Lexer::new(source)), true).parse()
    }

    pub(super) fn codes(result: &ParseResult) -> Vec<String> {
        result.emitter.codes().iter().map(ExCode::to_string).collect()
    }

    pub(super) fn letters(result: &ParseResult) -> String {
        result
            .diagnostics
            .iter()
            .map(|d| d.code.letter())
            .collect()
    }

    #[test]
    fn test_entry_call_targets_main() {
        let result = parse("void main() { }");
        assert!(result.diagnostics.is_empty());
        let main = result.symbols.lookup_fun("main").unwrap();
        assert_eq!(
            result.emitter.get(0).operand,
            Operand::Label(result.symbols.fun(main).entry)
        );
    }

    #[test]
    fn test_missing_main() {
        let result = parse("int x;");
        assert_eq!(letters(&result), "s");
        assert!(!result.emitter.get(0).is_live());
    }

    #[test]
    fn test_text_after_main() {
        let result = parse("void main() { } int");
        assert_eq!(letters(&result), "s");
    }

    #[test]
    fn test_lexical_errors_are_reported() {
        let result = parse("void main() { int x; x = 1 # 2; }");
        assert!(letters(&result).starts_with('a'));
    }

    #[test]
    fn test_frame_reservation_at_entry() {
        let result = parse("void main() { int x; x = 1; printf(x); }");
        let main = result.symbols.lookup_fun("main").unwrap();
        let entry = result.symbols.fun(main).entry;
        assert_eq!(result.emitter.get(entry).op, Op::Int);
        assert_eq!(codes(&result)[entry], "INT 0 1");
    }
}
