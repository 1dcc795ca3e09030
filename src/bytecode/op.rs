use serde::{Deserialize, Serialize};

// =============================================================================
// OP - instruction families
// =============================================================================

/// Instruction family. The discriminant is the low byte of a binary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Op {
    /// Drop `operand` cells.
    Pop = 0,
    /// Push `operand`.
    Lit = 1,
    /// Push the cell at an address.
    Lod = 2,
    /// Pop into the cell at an address (`KEEP`: leave the value on the stack).
    Sto = 3,
    /// Call. `mode` is the number of argument cells the caller pushed.
    Cal = 4,
    /// Grow the stack by `operand` zeroed cells.
    Int = 5,
    /// Unconditional jump.
    Jmp = 6,
    /// Pop, jump when zero.
    Jpc = 7,
    /// Multiplexed operation, selected by [`Opr`].
    Opr = 8,
    /// Indexed load: pop index, push `mem[base + index]` (`KEEP`: index stays).
    Lda = 9,
    /// Indexed store: pop value, pop index (`KEEP`: push the value back).
    Sta = 10,
}

impl Op {
    pub const ALL: [Op; 11] = [
        Op::Pop,
        Op::Lit,
        Op::Lod,
        Op::Sto,
        Op::Cal,
        Op::Int,
        Op::Jmp,
        Op::Jpc,
        Op::Opr,
        Op::Lda,
        Op::Sta,
    ];

    pub fn from_u8(byte: u8) -> Option<Op> {
        Op::ALL.get(byte as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Pop => "POP",
            Op::Lit => "LIT",
            Op::Lod => "LOD",
            Op::Sto => "STO",
            Op::Cal => "CAL",
            Op::Int => "INT",
            Op::Jmp => "JMP",
            Op::Jpc => "JPC",
            Op::Opr => "OPR",
            Op::Lda => "LDA",
            Op::Sta => "STA",
        }
    }

    /// Packed form of the mnemonic, as stored by the text reader.
    pub fn packed(self) -> u32 {
        pack_mnemonic(self.mnemonic()).unwrap_or_default()
    }

    pub fn from_packed(packed: u32) -> Option<Op> {
        Op::ALL.into_iter().find(|op| op.packed() == packed)
    }

    /// True for families whose operand is an instruction index.
    pub fn is_jump(self) -> bool {
        matches!(self, Op::Jmp | Op::Jpc | Op::Cal)
    }
}

/// Addressing-mode bits for memory families.
pub mod mode {
    /// Absolute (global) address.
    pub const ABS: u32 = 0;
    /// Address relative to the frame pointer.
    pub const REL: u32 = 1;
    /// Store keeps the value on the stack; indexed load keeps the index.
    pub const KEEP: u32 = 2;
}

/// Packs a three-letter mnemonic into an integer: `b0 | b1 << 8 | b2 << 16`.
pub fn pack_mnemonic(name: &str) -> Option<u32> {
    let bytes = name.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
        return None;
    }
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

/// Inverse of [`pack_mnemonic`], for diagnostics.
pub fn unpack_mnemonic(packed: u32) -> String {
    packed.to_le_bytes()[..3]
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

// =============================================================================
// OPR - operation selector
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Opr {
    Ret = 0,
    Neg = 1,
    Add = 2,
    Sub = 3,
    Mul = 4,
    Div = 5,
    Bool = 6,
    Not = 7,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Ge = 11,
    Gt = 12,
    Le = 13,
    PrintInt = 14,
    PrintLn = 15,
    ReadInt = 16,
    ReadChar = 17,
    PrintStr = 18,
    PrintChar = 19,
}

impl Opr {
    pub const ALL: [Opr; 20] = [
        Opr::Ret,
        Opr::Neg,
        Opr::Add,
        Opr::Sub,
        Opr::Mul,
        Opr::Div,
        Opr::Bool,
        Opr::Not,
        Opr::Eq,
        Opr::Ne,
        Opr::Lt,
        Opr::Ge,
        Opr::Gt,
        Opr::Le,
        Opr::PrintInt,
        Opr::PrintLn,
        Opr::ReadInt,
        Opr::ReadChar,
        Opr::PrintStr,
        Opr::PrintChar,
    ];

    pub fn from_i32(selector: i32) -> Option<Opr> {
        usize::try_from(selector)
            .ok()
            .and_then(|i| Opr::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            Opr::Ret => "ret",
            Opr::Neg => "neg",
            Opr::Add => "add",
            Opr::Sub => "sub",
            Opr::Mul => "mul",
            Opr::Div => "div",
            Opr::Bool => "bool",
            Opr::Not => "not",
            Opr::Eq => "eq",
            Opr::Ne => "ne",
            Opr::Lt => "lt",
            Opr::Ge => "ge",
            Opr::Gt => "gt",
            Opr::Le => "le",
            Opr::PrintInt => "print.int",
            Opr::PrintLn => "print.ln",
            Opr::ReadInt => "read.int",
            Opr::ReadChar => "read.char",
            Opr::PrintStr => "print.str",
            Opr::PrintChar => "print.char",
        }
    }

    /// Relational operator with the opposite truth value.
    pub fn negated(self) -> Option<Opr> {
        Some(match self {
            Opr::Eq => Opr::Ne,
            Opr::Ne => Opr::Eq,
            Opr::Lt => Opr::Ge,
            Opr::Ge => Opr::Lt,
            Opr::Gt => Opr::Le,
            Opr::Le => Opr::Gt,
            _ => return None,
        })
    }

    /// Operations with an effect outside the value stack.
    pub fn has_side_effect(self) -> bool {
        matches!(
            self,
            Opr::Ret
                | Opr::PrintInt
                | Opr::PrintLn
                | Opr::ReadInt
                | Opr::ReadChar
                | Opr::PrintStr
                | Opr::PrintChar
        )
    }
}

// =============================================================================
// INSTR - one decoded instruction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Op,
    pub mode: u32,
    pub operand: i32,
}

impl Instr {
    pub fn new(op: Op, mode: u32, operand: i32) -> Self {
        Self { op, mode, operand }
    }

    pub fn opr(selector: Opr) -> Self {
        Self::new(Op::Opr, 0, selector as i32)
    }

    /// Binary opcode: family in the low byte, mode above it.
    pub fn opcode(&self) -> u32 {
        self.op as u32 | (self.mode << 8)
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.op.mnemonic(), self.mode, self.operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_from_u8() {
        assert_eq!(Op::from_u8(0), Some(Op::Pop));
        assert_eq!(Op::from_u8(10), Some(Op::Sta));
        assert_eq!(Op::from_u8(11), None);
    }

    #[test]
    fn test_pack_mnemonic() {
        let packed = pack_mnemonic("LOD").unwrap();
        assert_eq!(packed, u32::from_le_bytes(*b"LOD\0"));
        assert_eq!(Op::from_packed(packed), Some(Op::Lod));
        assert_eq!(unpack_mnemonic(packed), "LOD");
    }

    #[test]
    fn test_pack_mnemonic_rejects_bad_names() {
        assert_eq!(pack_mnemonic("LO"), None);
        assert_eq!(pack_mnemonic("LODX"), None);
        assert_eq!(pack_mnemonic("L0D"), None);
    }

    #[test]
    fn test_unknown_packed_mnemonic() {
        let packed = pack_mnemonic("XYZ").unwrap();
        assert_eq!(Op::from_packed(packed), None);
    }

    #[test]
    fn test_opr_from_i32() {
        assert_eq!(Opr::from_i32(0), Some(Opr::Ret));
        assert_eq!(Opr::from_i32(19), Some(Opr::PrintChar));
        assert_eq!(Opr::from_i32(20), None);
        assert_eq!(Opr::from_i32(-1), None);
    }

    #[test]
    fn test_opr_negated_is_involution() {
        for opr in [Opr::Eq, Opr::Ne, Opr::Lt, Opr::Ge, Opr::Gt, Opr::Le] {
            assert_eq!(opr.negated().and_then(Opr::negated), Some(opr));
        }
        assert_eq!(Opr::Add.negated(), None);
    }

    #[test]
    fn test_opcode_layout() {
        let instr = Instr::new(Op::Sto, mode::REL | mode::KEEP, -3);
        assert_eq!(instr.opcode(), 3 | (3 << 8));
        assert_eq!(instr.to_string(), "STO 3 -3");
    }
}
