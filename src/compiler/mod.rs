//! C0 compilation: parsing with inline code generation, per-function
//! allocation, and final assembly into an [`Object`].

pub mod alloc;
pub mod compile_error;
pub mod diagnostic;
pub mod excode;
pub mod parser;
pub mod symbols;

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::bytecode::Object;
use crate::frontend::{Lexer, Token, TokenSource, TokenStream};

pub use compile_error::CompileError;
pub use diagnostic::{Diagnostic, ErrorCode, Severity};
pub use parser::Parser;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Dead-code removal and store/reload folding.
    pub optimize: bool,
    /// Keep every token read, for the lexical trace.
    pub trace_tokens: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            trace_tokens: false,
        }
    }
}

#[derive(Debug)]
pub struct CompileOutput {
    pub object: Object,
    pub diagnostics: Vec<Diagnostic>,
    /// Tokens in source order; empty unless tracing was requested.
    pub tokens: Vec<Token>,
    /// Instruction records generated before dead-code removal.
    pub records: usize,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub fn compile(source: &str, options: &CompileOptions) -> Result<CompileOutput, CompileError> {
    compile_tokens(Lexer::new(source), options)
}

/// Compiles from any token source. Source problems end up in
/// [`CompileOutput::diagnostics`]; the object is produced regardless.
pub fn compile_tokens<S: TokenSource>(
    source: S,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let mut tokens = TokenStream::new(source);
    if options.trace_tokens {
        tokens = tokens.with_trace();
    }

    let mut result = Parser::new(tokens, options.optimize).parse();
    let strings = std::mem::take(&mut result.symbols.strings).into_strings();
    let object = alloc::assemble(&result.emitter, &result.symbols, strings)?;

    debug!(
        records = result.emitter.len(),
        instructions = object.code.len(),
        diagnostics = result.diagnostics.len(),
        "compiled"
    );

    Ok(CompileOutput {
        object,
        diagnostics: result.diagnostics,
        tokens: result.tokens,
        records: result.emitter.len(),
    })
}

/// Reads a source file; `-` reads standard input.
pub fn read_source(path: &Path) -> Result<String, CompileError> {
    if path.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(source);
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{Instr, Op, Opr, mode};

    fn build(source: &str) -> CompileOutput {
        compile(source, &CompileOptions::default()).unwrap()
    }

    fn unoptimized(source: &str) -> CompileOutput {
        let options = CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        };
        compile(source, &options).unwrap()
    }

    #[test]
    fn test_entry_call_is_first() {
        let output = build("void main() { printf(1); }");
        assert!(!output.has_errors());
        assert_eq!(output.object.code[0].op, Op::Cal);
        assert_eq!(output.object.code[0].operand, 1);
    }

    #[test]
    fn test_strings_follow_globals() {
        let output = build("int g[2]; void main() { printf(\"hi\"); printf(\"hi\", 3); }");
        assert_eq!(output.object.global_size, 2);
        assert_eq!(output.object.strings, vec!["hi".to_string()]);
        let lits: Vec<i32> = output
            .object
            .code
            .iter()
            .filter(|i| i.op == Op::Lit)
            .map(|i| i.operand)
            .collect();
        assert_eq!(lits, vec![2, 2, 3]);
    }

    #[test]
    fn test_dead_store_removed_only_when_optimizing() {
        let source = "void main() { int x; x = 5; printf(1); }";
        let optimized = build(source);
        let plain = unoptimized(source);
        assert!(optimized.object.code.len() < plain.object.code.len());
        assert!(!optimized.object.code.iter().any(|i| i.op == Op::Sto));
        assert!(!optimized.object.code.iter().any(|i| i.op == Op::Int));
    }

    #[test]
    fn test_fused_store_keeps_value() {
        let output = build("void main() { int x; scanf(x); printf(x); }");
        let code = &output.object.code;
        let sto = code.iter().find(|i| i.op == Op::Sto).unwrap();
        assert_eq!(sto.mode, mode::REL | mode::KEEP);
        assert!(!code.iter().any(|i| i.op == Op::Lod));
        assert!(code.contains(&Instr::opr(Opr::PrintInt)));
    }

    #[test]
    fn test_diagnostics_do_not_stop_output() {
        let output = build("void f(int a) { } void main() { f(); printf(2); }");
        assert!(output.has_errors());
        assert!(!output.object.code.is_empty());
    }

    #[test]
    fn test_token_trace() {
        let options = CompileOptions {
            trace_tokens: true,
            ..CompileOptions::default()
        };
        let output = compile("void main() { }", &options).unwrap();
        assert_eq!(output.tokens.len(), 6);
        assert!(build("void main() { }").tokens.is_empty());
    }
}
