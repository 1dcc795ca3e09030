use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{error, info};

use scc::bytecode::program::unpack_strings;
use scc::bytecode::{FormatError, Program, binary, disasm, image, text};
use scc::logging;
use scc::runtime::decode::decode_all;
use scc::runtime::{Vm, VmConfig};

#[derive(Parser, Debug)]
#[command(name = "sci", version, about = "Run stack-machine bytecode")]
struct Cli {
    /// Bytecode file (binary, text or image), `-` for standard input
    file: PathBuf,

    /// Read the text form regardless of the file's first byte
    #[arg(short, long, conflicts_with = "image")]
    text: bool,

    /// Read a program image
    #[arg(long)]
    image: bool,

    /// Stop with an error after this many instructions
    #[arg(long, value_name = "N")]
    max_steps: Option<u64>,

    /// Print a disassembly before running
    #[arg(long)]
    disasm: bool,

    /// Save the loaded program as an image and exit
    #[arg(long, value_name = "FILE")]
    save_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Binary,
    Text,
    Image,
}

fn main() {
    logging::init();
    let cli = Cli::parse();

    let program = match load(&cli) {
        Ok(program) => program,
        Err(e) => {
            error!("{}: {}", cli.file.display(), e);
            process::exit(1);
        }
    };

    if cli.disasm {
        println!("globals: {} cells", program.global_size);
        for text in unpack_strings(&program.strings) {
            println!("  str {:?}", text);
        }
        match decode_all(&program.code) {
            Ok(code) => print!("{}", disasm::disassemble_code(&code)),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
    }

    if let Some(path) = &cli.save_image {
        if let Err(e) = save_image(&program, path) {
            error!("{}: {}", path.display(), e);
            process::exit(1);
        }
        info!(image = %path.display(), "saved program image");
        return;
    }

    let config = VmConfig {
        max_steps: cli.max_steps,
        ..VmConfig::default()
    };
    let mut vm = Vm::with_config(io::stdin().lock(), io::stdout(), config);
    if let Err(e) = vm.run(&program) {
        error!("{}", e);
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<Program, FormatError> {
    let bytes = read_input(&cli.file)?;
    let format = if cli.image {
        Format::Image
    } else if cli.text {
        Format::Text
    } else {
        detect(&bytes)
    };
    info!(?format, bytes = bytes.len(), "loading program");

    match format {
        Format::Binary => binary::from_bytes(&bytes),
        Format::Image => image::decode(&bytes),
        Format::Text => text::read(bytes.as_slice()),
    }
}

/// Binary objects and images both start with a 0x80 byte; text never does.
fn detect(bytes: &[u8]) -> Format {
    if image::is_image(bytes) {
        Format::Image
    } else if bytes.first() == Some(&binary::MAGIC[0]) {
        Format::Binary
    } else {
        Format::Text
    }
}

fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes)?;
        return Ok(bytes);
    }
    fs::read(path)
}

fn save_image(program: &Program, path: &Path) -> Result<(), FormatError> {
    fs::write(path, image::encode(program)?)?;
    Ok(())
}
