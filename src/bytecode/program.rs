use crate::bytecode::op::Instr;
use serde::{Deserialize, Serialize};

/// Bytes packed into one memory cell.
pub const CELL_BYTES: usize = 4;

/// A compiled program, as produced by the compiler and consumed by writers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    /// Number of cells in the global variable region.
    pub global_size: i32,

    /// Literal strings, in pool order. Offsets are implied by
    /// [`string_offsets`].
    pub strings: Vec<String>,

    /// Final instruction array. `code[0]` enters `main`.
    pub code: Vec<Instr>,
}

impl Object {
    pub fn string_cells(&self) -> Vec<i32> {
        pack_strings(&self.strings)
    }

    /// Memory image the machine starts from: zeroed globals then the pool.
    pub fn initial_memory(&self) -> Vec<i32> {
        let mut memory = vec![0; self.global_size.max(0) as usize];
        memory.extend(self.string_cells());
        memory
    }
}

/// Raw binary instruction: `(opcode, operand)` as stored in a CODE block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstr {
    pub opcode: u32,
    pub operand: i32,
}

impl From<Instr> for RawInstr {
    fn from(instr: Instr) -> Self {
        Self {
            opcode: instr.opcode(),
            operand: instr.operand,
        }
    }
}

/// Text instruction: packed mnemonic, mode digit, operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInstr {
    pub name: u32,
    pub mode: u32,
    pub operand: i32,
}

impl From<Instr> for TextInstr {
    fn from(instr: Instr) -> Self {
        Self {
            name: instr.op.packed(),
            mode: instr.mode,
            operand: instr.operand,
        }
    }
}

/// Instruction array in the encoding it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    Binary(Vec<RawInstr>),
    Text(Vec<TextInstr>),
}

impl Code {
    pub fn len(&self) -> usize {
        match self {
            Code::Binary(code) => code.len(),
            Code::Text(code) => code.len(),
        }
    }
}

/// A loaded program, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub global_size: i32,
    /// Packed literal pool, placed right above the globals.
    pub strings: Vec<i32>,
    pub code: Code,
}

impl Program {
    /// Wraps compiler output without going through a file.
    pub fn from_object(object: &Object) -> Self {
        Self {
            global_size: object.global_size,
            strings: object.string_cells(),
            code: Code::Binary(object.code.iter().copied().map(RawInstr::from).collect()),
        }
    }

    pub fn initial_memory(&self) -> Vec<i32> {
        let mut memory = vec![0; self.global_size.max(0) as usize];
        memory.extend_from_slice(&self.strings);
        memory
    }
}

/// Cell offset of every string in the pool.
pub fn string_offsets(strings: &[String]) -> Vec<i32> {
    let mut offset = 0;
    strings
        .iter()
        .map(|s| {
            let at = offset;
            offset += cells_for(s) as i32;
            at
        })
        .collect()
}

/// Cells needed by a literal, including at least one NUL byte.
pub fn cells_for(text: &str) -> usize {
    text.len() / CELL_BYTES + 1
}

/// Packs literals into cells, each NUL padded to a whole number of cells.
pub fn pack_strings(strings: &[String]) -> Vec<i32> {
    let mut cells = Vec::new();
    for s in strings {
        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(cells_for(s) * CELL_BYTES, 0);
        cells.extend(
            bytes
                .chunks_exact(CELL_BYTES)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
    }
    cells
}

/// Splits a packed pool back into its literals.
pub fn unpack_strings(cells: &[i32]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = Vec::new();
    for cell in cells {
        let bytes = cell.to_le_bytes();
        match bytes.iter().position(|&b| b == 0) {
            Some(end) => {
                current.extend_from_slice(&bytes[..end]);
                strings.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
            }
            None => current.extend_from_slice(&bytes),
        }
    }
    strings
}

/// Reads the NUL-terminated literal starting at `offset`.
pub fn read_cstr(memory: &[i32], offset: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for cell in memory.get(offset..)? {
        for b in cell.to_le_bytes() {
            if b == 0 {
                return Some(out);
            }
            out.push(b);
        }
    }
    None
}
