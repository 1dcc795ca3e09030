//! Binary container.
//!
//! ```text
//! magic     8 bytes   "\x80BPCODE\0"
//! min-ver   u32
//! version   u32
//! blocks    (kind: u8, length: i32, payload)*
//! ```
//!
//! All integers are little endian. GENERAL and STR payloads are `length`
//! cells of 4 bytes; CODE payloads are `length` `(opcode: u32, operand: i32)`
//! pairs. Blocks may come in any order; the reader looks each one up by kind.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::bytecode::format_error::FormatError;
use crate::bytecode::program::{Code, Object, Program, RawInstr};

pub const MAGIC: &[u8; 8] = b"\x80BPCODE\0";

/// Oldest reader able to load files written by this writer.
pub const MIN_VERSION: u32 = 1;

/// Version written, and newest version this reader accepts.
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    General = 0,
    Str = 1,
    Code = 2,
}

impl BlockKind {
    fn name(self) -> &'static str {
        match self {
            BlockKind::General => "GENERAL",
            BlockKind::Str => "STR",
            BlockKind::Code => "CODE",
        }
    }

    /// Payload bytes per unit of declared length.
    fn unit(kind: u8) -> i64 {
        if kind == BlockKind::Code as u8 { 8 } else { 4 }
    }
}

pub fn write<W: Write>(object: &Object, out: &mut W) -> std::io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&MIN_VERSION.to_le_bytes())?;
    out.write_all(&VERSION.to_le_bytes())?;

    write_header(out, BlockKind::General, 1)?;
    out.write_all(&object.global_size.to_le_bytes())?;

    let cells = object.string_cells();
    write_header(out, BlockKind::Str, cells.len())?;
    for cell in cells {
        out.write_all(&cell.to_le_bytes())?;
    }

    write_header(out, BlockKind::Code, object.code.len())?;
    for instr in &object.code {
        out.write_all(&instr.opcode().to_le_bytes())?;
        out.write_all(&instr.operand.to_le_bytes())?;
    }
    out.flush()
}

pub fn to_bytes(object: &Object) -> Vec<u8> {
    let mut bytes = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write(object, &mut bytes);
    bytes
}

fn write_header<W: Write>(out: &mut W, kind: BlockKind, len: usize) -> std::io::Result<()> {
    let len = i32::try_from(len).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "block too large")
    })?;
    out.write_all(&[kind as u8])?;
    out.write_all(&len.to_le_bytes())
}

pub fn read<R: Read + Seek>(input: &mut R) -> Result<Program, FormatError> {
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => FormatError::BadMagic,
        _ => FormatError::Io(e),
    })?;
    if &magic != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let min_version = read_u32(input, "header")?;
    let _version = read_u32(input, "header")?;
    if min_version > VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: min_version,
            supported: VERSION,
        });
    }

    let blocks = input.stream_position()?;

    let len = find_block(input, blocks, BlockKind::General)?;
    if len < 1 {
        return Err(FormatError::Truncated("GENERAL block"));
    }
    let global_size = read_i32(input, "GENERAL block")?;

    let len = find_block(input, blocks, BlockKind::Str)?;
    let strings = (0..len)
        .map(|_| read_i32(input, "STR block"))
        .collect::<Result<Vec<_>, _>>()?;

    let len = find_block(input, blocks, BlockKind::Code)?;
    let code = (0..len)
        .map(|_| {
            Ok(RawInstr {
                opcode: read_u32(input, "CODE block")?,
                operand: read_i32(input, "CODE block")?,
            })
        })
        .collect::<Result<Vec<_>, FormatError>>()?;

    Ok(Program {
        global_size,
        strings,
        code: Code::Binary(code),
    })
}

pub fn from_bytes(bytes: &[u8]) -> Result<Program, FormatError> {
    read(&mut Cursor::new(bytes))
}

/// Positions `input` at the payload of the first block of `kind` and
/// returns its declared length.
fn find_block<R: Read + Seek>(
    input: &mut R,
    start: u64,
    kind: BlockKind,
) -> Result<i32, FormatError> {
    input.seek(SeekFrom::Start(start))?;
    loop {
        let mut tag = [0u8; 1];
        match input.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FormatError::MissingBlock(kind.name()));
            }
            Err(e) => return Err(FormatError::Io(e)),
        }
        let len = read_i32(input, "block header")?;
        if len < 0 {
            return Err(FormatError::MissingBlock(kind.name()));
        }
        if tag[0] == kind as u8 {
            return Ok(len);
        }
        input.seek(SeekFrom::Current(len as i64 * BlockKind::unit(tag[0])))?;
    }
}

fn read_u32<R: Read>(input: &mut R, what: &'static str) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    input
        .read_exact(&mut buf)
        .map_err(|e| FormatError::from_read(e, what))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(input: &mut R, what: &'static str) -> Result<i32, FormatError> {
    read_u32(input, what).map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{Instr, Op, Opr, mode};

    fn sample() -> Object {
        Object {
            global_size: 2,
            strings: vec!["sum=".to_string(), "".to_string()],
            code: vec![
                Instr::new(Op::Cal, 0, 1),
                Instr::new(Op::Lit, 0, 7),
                Instr::new(Op::Sto, mode::ABS, 0),
                Instr::new(Op::Lod, mode::REL, -1),
                Instr::new(Op::Opr, 0, Opr::Ret as i32),
            ],
        }
    }

    fn block(kind: u8, len: i32, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![kind];
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn header() -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&MIN_VERSION.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out
    }

    #[test]
    fn test_write_then_read() {
        let object = sample();
        let program = from_bytes(&to_bytes(&object)).unwrap();

        assert_eq!(program.global_size, 2);
        assert_eq!(program.strings, object.string_cells());
        match &program.code {
            Code::Binary(code) => {
                let expected: Vec<RawInstr> =
                    object.code.iter().copied().map(RawInstr::from).collect();
                assert_eq!(code, &expected);
            }
            other => panic!("expected binary code, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = to_bytes(&sample());
        bytes[1] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(FormatError::BadMagic)));
    }

    #[test]
    fn test_short_file_is_bad_magic() {
        assert!(matches!(from_bytes(b"\x80BP"), Err(FormatError::BadMagic)));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(VERSION + 1).to_le_bytes());
        bytes.extend_from_slice(&(VERSION + 1).to_le_bytes());
        assert!(matches!(
            from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_blocks_in_any_order_with_unknown_block() {
        let mut bytes = header();
        bytes.extend(block(2, 1, &[&1u32.to_le_bytes()[..], &5i32.to_le_bytes()[..]].concat()));
        bytes.extend(block(9, 2, &[0u8; 8]));
        bytes.extend(block(1, 0, &[]));
        bytes.extend(block(0, 1, &4i32.to_le_bytes()));

        let program = from_bytes(&bytes).unwrap();
        assert_eq!(program.global_size, 4);
        assert!(program.strings.is_empty());
        assert_eq!(
            program.code,
            Code::Binary(vec![RawInstr {
                opcode: 1,
                operand: 5
            }])
        );
    }

    #[test]
    fn test_missing_block() {
        let mut bytes = header();
        bytes.extend(block(0, 1, &4i32.to_le_bytes()));
        bytes.extend(block(1, 0, &[]));
        assert!(matches!(
            from_bytes(&bytes),
            Err(FormatError::MissingBlock("CODE"))
        ));
    }

    #[test]
    fn test_negative_length_ends_scan() {
        let mut bytes = header();
        bytes.extend(block(1, -1, &[]));
        bytes.extend(block(0, 1, &4i32.to_le_bytes()));
        assert!(matches!(
            from_bytes(&bytes),
            Err(FormatError::MissingBlock("GENERAL"))
        ));
    }

    #[test]
    fn test_truncated_code_block() {
        let mut bytes = to_bytes(&sample());
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            from_bytes(&bytes),
            Err(FormatError::Truncated("CODE block"))
        ));
    }
}
