use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{error, info};

use scc::bytecode::{binary, disasm, text};
use scc::compiler::{self, CompileOptions, CompileOutput};
use scc::frontend::lang;
use scc::frontend::token_dumper::TokenDumper;
use scc::logging;

#[derive(Parser, Debug)]
#[command(name = "scc", version, about = "Compile C0 source to stack-machine bytecode")]
struct Cli {
    /// Source file, `-` for standard input
    input: PathBuf,

    /// Grammar definition file supplying token-kind names
    #[arg(short = 'G', long = "lang", value_name = "FILE")]
    lang: Option<PathBuf>,

    /// Output file, `-` for standard output
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the text form instead of binary
    #[arg(short, long)]
    text: bool,

    /// Optimization level: 0 keeps every generated instruction
    #[arg(
        short = 'O',
        value_name = "LEVEL",
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(0..=1)
    )]
    opt_level: u8,

    /// Write the lexical trace ("NAME text" per token), `-` for stdout
    #[arg(long, value_name = "FILE")]
    lex_out: Option<PathBuf>,

    /// Prefix each traced token with its source line
    #[arg(long, requires = "lex_out")]
    lex_lines: bool,

    /// Write diagnostics here instead of standard error
    #[arg(long, value_name = "FILE")]
    errors: Option<PathBuf>,

    /// Print a disassembly of the compiled program
    #[arg(long)]
    disasm: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();

    if let Some(path) = &cli.lang {
        if let Err(e) = lang::load(path) {
            error!("{}", e);
            process::exit(1);
        }
    }

    let options = CompileOptions {
        optimize: cli.opt_level > 0,
        trace_tokens: cli.lex_out.is_some(),
    };
    let output = match compiler::read_source(&cli.input)
        .and_then(|source| compiler::compile(&source, &options))
    {
        Ok(output) => output,
        Err(e) => {
            error!("{}: {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = emit(&cli, &output) {
        error!("{}", e);
        process::exit(1);
    }

    if output.has_errors() {
        process::exit(1);
    }
}

fn emit(cli: &Cli, output: &CompileOutput) -> io::Result<()> {
    if let Some(path) = &cli.lex_out {
        let mut dumper = TokenDumper::new();
        if cli.lex_lines {
            dumper = dumper.with_lines();
        }
        if path.as_os_str() == "-" && io::stdout().is_terminal() {
            dumper = dumper.colored();
        }
        let mut out = open_output(path)?;
        dumper.dump(&output.tokens, &mut out)?;
        out.flush()?;
    }

    match &cli.errors {
        Some(path) => {
            let mut out = open_output(path)?;
            write_diagnostics(output, &mut out)?;
            out.flush()?;
        }
        None => write_diagnostics(output, &mut io::stderr().lock())?,
    }

    if cli.disasm {
        disasm::print_object(&output.object);
    }

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, cli.text));
    let mut out = open_output(&path)?;
    if cli.text {
        text::write(&output.object, &mut out)?;
    } else {
        binary::write(&output.object, &mut out)?;
    }
    out.flush()?;

    info!(
        output = %path.display(),
        records = output.records,
        instructions = output.object.code.len(),
        "wrote program"
    );
    Ok(())
}

fn write_diagnostics<W: Write>(output: &CompileOutput, out: &mut W) -> io::Result<()> {
    for diagnostic in &output.diagnostics {
        writeln!(out, "{}", diagnostic)?;
    }
    Ok(())
}

/// `prog.c` becomes `prog.bc`, or `prog.pcode` for the text form.
fn default_output(input: &Path, text: bool) -> PathBuf {
    let extension = if text { "pcode" } else { "bc" };
    if input.as_os_str() == "-" {
        return PathBuf::from("out").with_extension(extension);
    }
    input.with_extension(extension)
}

fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}
