//! Loaded-program snapshots.
//!
//! An image is a [`Program`] exactly as the machine sees it (decoded code
//! container, global size, packed pool), serialized with postcard behind a
//! short magic prefix. Reloading an image skips block scanning and text
//! parsing.

use crate::bytecode::format_error::FormatError;
use crate::bytecode::program::Program;

pub const IMAGE_MAGIC: &[u8; 8] = b"\x80BPIMG\0\0";

pub fn encode(program: &Program) -> Result<Vec<u8>, FormatError> {
    let mut bytes = IMAGE_MAGIC.to_vec();
    bytes.extend(postcard::to_allocvec(program)?);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Program, FormatError> {
    let payload = bytes
        .strip_prefix(IMAGE_MAGIC.as_slice())
        .ok_or(FormatError::BadMagic)?;
    Ok(postcard::from_bytes(payload)?)
}

/// True when `bytes` starts like an image rather than a binary object.
pub fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(IMAGE_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{Instr, Op};
    use crate::bytecode::program::Object;
    use crate::bytecode::text;

    fn program() -> Program {
        Program::from_object(&Object {
            global_size: 1,
            strings: vec!["hey".to_string()],
            code: vec![Instr::new(Op::Lit, 0, 42), Instr::new(Op::Pop, 0, 1)],
        })
    }

    #[test]
    fn test_encode_then_decode() {
        let program = program();
        let bytes = encode(&program).unwrap();
        assert!(is_image(&bytes));
        assert_eq!(decode(&bytes).unwrap(), program);
    }

    #[test]
    fn test_text_program_survives() {
        let program = text::from_str(".data\nINT 0 2\nSTR 0 0 ab\n.code\nLIT 0 3\n").unwrap();
        assert_eq!(decode(&encode(&program).unwrap()).unwrap(), program);
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(decode(b"nope"), Err(FormatError::BadMagic)));
    }

    #[test]
    fn test_corrupt_payload() {
        let mut bytes = IMAGE_MAGIC.to_vec();
        bytes.push(0xff);
        assert!(matches!(decode(&bytes), Err(FormatError::Image(_))));
    }
}
