use crate::bytecode::op::{Instr, Op, unpack_mnemonic};
use crate::bytecode::program::{Code, RawInstr, TextInstr};
use crate::runtime::runtime_error::RuntimeError;

/// How a stored instruction turns into an [`Instr`] at fetch time.
///
/// The machine has a single execution core; the encodings differ only here.
pub trait Decode {
    /// Returns a description of the bad opcode on failure.
    fn decode(&self) -> Result<Instr, String>;
}

impl Decode for Instr {
    fn decode(&self) -> Result<Instr, String> {
        Ok(*self)
    }
}

impl Decode for RawInstr {
    fn decode(&self) -> Result<Instr, String> {
        let family = (self.opcode & 0xff) as u8;
        let op = Op::from_u8(family).ok_or_else(|| format!("opcode {:#o}", self.opcode))?;
        Ok(Instr::new(op, self.opcode >> 8, self.operand))
    }
}

impl Decode for TextInstr {
    fn decode(&self) -> Result<Instr, String> {
        let op = Op::from_packed(self.name)
            .ok_or_else(|| format!("mnemonic '{}'", unpack_mnemonic(self.name)))?;
        Ok(Instr::new(op, self.mode, self.operand))
    }
}

fn decode_slice<D: Decode>(code: &[D]) -> Result<Vec<Instr>, RuntimeError> {
    code.iter()
        .enumerate()
        .map(|(ip, raw)| {
            raw.decode()
                .map_err(|what| RuntimeError::Instruction { ip, what })
        })
        .collect()
}

/// Decodes a whole loaded container, e.g. for disassembly.
pub fn decode_all(code: &Code) -> Result<Vec<Instr>, RuntimeError> {
    match code {
        Code::Binary(code) => decode_slice(code),
        Code::Text(code) => decode_slice(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{mode, pack_mnemonic};

    #[test]
    fn test_decode_raw() {
        let instr = Instr::new(Op::Sta, mode::REL | mode::KEEP, 4);
        assert_eq!(RawInstr::from(instr).decode(), Ok(instr));
    }

    #[test]
    fn test_decode_text() {
        let instr = Instr::new(Op::Cal, 3, 17);
        assert_eq!(TextInstr::from(instr).decode(), Ok(instr));
    }

    #[test]
    fn test_unknown_binary_opcode() {
        let raw = RawInstr {
            opcode: 0x40,
            operand: 0,
        };
        assert_eq!(raw.decode(), Err("opcode 0o100".to_string()));
    }

    #[test]
    fn test_unknown_mnemonic() {
        let raw = TextInstr {
            name: pack_mnemonic("NOP").unwrap(),
            mode: 0,
            operand: 0,
        };
        assert_eq!(raw.decode(), Err("mnemonic 'NOP'".to_string()));
    }

    #[test]
    fn test_decode_all_reports_index() {
        let code = Code::Binary(vec![
            RawInstr::from(Instr::new(Op::Lit, 0, 1)),
            RawInstr {
                opcode: 200,
                operand: 0,
            },
        ]);
        match decode_all(&code) {
            Err(RuntimeError::Instruction { ip, .. }) => assert_eq!(ip, 1),
            other => panic!("expected instruction error, got {:?}", other),
        }
    }
}
