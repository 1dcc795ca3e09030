use std::fmt;

use crate::bytecode::op::{Op, Opr, mode};
use crate::compiler::symbols::FunId;

/// Instruction operand, possibly still symbolic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Imm(i32),
    /// Jump target not known yet.
    Pending,
    /// Record index of a jump target.
    Label(usize),
    /// Local variable by table index; becomes a frame offset.
    Local(u32),
    Fun(FunId),
    /// Cell offset into the literal pool.
    Str(i32),
    /// Size of the current frame.
    Frame,
    /// The caller-reserved result cell.
    RetSlot,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "{}", v),
            Operand::Pending => write!(f, "Pending"),
            Operand::Label(i) => write!(f, "Label({})", i),
            Operand::Local(i) => write!(f, "Local({})", i),
            Operand::Fun(id) => write!(f, "Fun({})", id.0),
            Operand::Str(off) => write!(f, "Str({})", off),
            Operand::Frame => write!(f, "Frame"),
            Operand::RetSlot => write!(f, "RetSlot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Unknown,
    Dead,
    Live,
}

/// One emitted instruction with everything the optimizer needs.
#[derive(Debug, Clone)]
pub struct ExCode {
    pub op: Op,
    pub mode: u32,
    pub operand: Operand,
    pub live: Liveness,
    /// A label points here.
    pub fork: bool,
    /// Loop nesting depth when emitted.
    pub depth: usize,
    /// Records whose stack values this one pops.
    pub operands: Vec<usize>,
    /// Stores whose memory this one may read.
    pub reads: Vec<usize>,
    /// Local read by this load, for loop re-validation.
    pub var: Option<u32>,
    /// Store this load is folded into.
    pub fused_into: Option<usize>,
}

impl ExCode {
    pub fn is_live(&self) -> bool {
        self.live == Liveness::Live
    }

    /// Records that produce bytecode.
    pub fn is_emitted(&self) -> bool {
        self.is_live() && self.fused_into.is_none()
    }

    pub fn is_store(&self) -> bool {
        matches!(self.op, Op::Sto | Op::Sta)
    }

    pub fn local(&self) -> Option<u32> {
        match self.operand {
            Operand::Local(id) => Some(id),
            _ => None,
        }
    }

    /// Instructions that must survive regardless of their consumers.
    pub fn has_effect(&self) -> bool {
        match self.op {
            Op::Cal | Op::Jmp | Op::Jpc | Op::Pop | Op::Int => true,
            Op::Opr => Opr::from_i32(self.imm()).is_none_or(Opr::has_side_effect),
            Op::Sto | Op::Sta => {
                self.mode & mode::REL == 0 || self.operand == Operand::RetSlot
            }
            Op::Lit | Op::Lod | Op::Lda => false,
        }
    }

    fn imm(&self) -> i32 {
        match self.operand {
            Operand::Imm(v) => v,
            _ => -1,
        }
    }
}

impl fmt::Display for ExCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.op.mnemonic(), self.mode, self.operand)
    }
}

// =============================================================================
// Emitter
// =============================================================================

/// Append-only instruction list with label tracking.
#[derive(Debug, Default)]
pub struct Emitter {
    codes: Vec<ExCode>,
    label_pending: bool,
    pub depth: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn emit(&mut self, op: Op, mode: u32, operand: Operand, operands: &[usize]) -> usize {
        let index = self.codes.len();
        self.codes.push(ExCode {
            op,
            mode,
            operand,
            live: Liveness::Unknown,
            fork: std::mem::take(&mut self.label_pending),
            depth: self.depth,
            operands: operands.to_vec(),
            reads: Vec::new(),
            var: None,
            fused_into: None,
        });
        index
    }

    pub fn emit_opr(&mut self, opr: Opr, operands: &[usize]) -> usize {
        self.emit(Op::Opr, 0, Operand::Imm(opr as i32), operands)
    }

    /// Emits a load of a local with its memory dependencies.
    pub fn emit_load(
        &mut self,
        op: Op,
        operand: Operand,
        operands: &[usize],
        reads: Vec<usize>,
    ) -> usize {
        let index = self.emit(op, mode::REL, operand, operands);
        let code = &mut self.codes[index];
        code.reads = reads;
        code.var = code.local();
        index
    }

    /// The position the next instruction will take, marked as a jump target.
    pub fn mark_label(&mut self) -> usize {
        self.label_pending = true;
        self.codes.len()
    }

    pub fn has_pending_label(&self) -> bool {
        self.label_pending
    }

    /// Fills in a forward jump. Each placeholder is patched once.
    pub fn patch(&mut self, index: usize, target: usize) {
        let code = &mut self.codes[index];
        debug_assert_eq!(code.operand, Operand::Pending, "jump patched twice");
        code.operand = Operand::Label(target);
    }

    /// The store right before the next instruction, if no label separates
    /// them.
    pub fn last_store_to(&self, operand: Operand, rel: bool) -> Option<usize> {
        if self.label_pending {
            return None;
        }
        let index = self.codes.len().checked_sub(1)?;
        let code = &self.codes[index];
        let same_mode = (code.mode & mode::REL != 0) == rel;
        (code.op == Op::Sto && code.operand == operand && same_mode).then_some(index)
    }

    /// Adds `writes` to the reads of every load of `var` in `range`.
    pub fn revalidate(&mut self, range: std::ops::Range<usize>, var: u32, writes: &[usize]) {
        for code in &mut self.codes[range] {
            if code.var == Some(var) && code.fused_into.is_none() {
                for &w in writes {
                    if !code.reads.contains(&w) {
                        code.reads.push(w);
                    }
                }
            }
        }
    }

    pub fn codes(&self) -> &[ExCode] {
        &self.codes
    }

    pub fn codes_mut(&mut self) -> &mut [ExCode] {
        &mut self.codes
    }

    pub fn get(&self, index: usize) -> &ExCode {
        &self.codes[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut ExCode {
        &mut self.codes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_returns_indices() {
        let mut emitter = Emitter::new();
        let a = emitter.emit(Op::Lit, 0, Operand::Imm(1), &[]);
        let b = emitter.emit(Op::Lit, 0, Operand::Imm(2), &[]);
        let add = emitter.emit_opr(Opr::Add, &[a, b]);
        assert_eq!((a, b, add), (0, 1, 2));
        assert_eq!(emitter.get(add).operands, vec![0, 1]);
        assert_eq!(emitter.get(add).to_string(), "OPR 0 2");
    }

    #[test]
    fn test_label_marks_next_instruction() {
        let mut emitter = Emitter::new();
        emitter.emit(Op::Lit, 0, Operand::Imm(1), &[]);
        let label = emitter.mark_label();
        assert!(emitter.has_pending_label());
        let next = emitter.emit(Op::Lit, 0, Operand::Imm(2), &[]);
        assert_eq!(label, next);
        assert!(emitter.get(next).fork);
        assert!(!emitter.has_pending_label());
    }

    #[test]
    fn test_patch() {
        let mut emitter = Emitter::new();
        let jump = emitter.emit(Op::Jmp, 0, Operand::Pending, &[]);
        emitter.patch(jump, 5);
        assert_eq!(emitter.get(jump).operand, Operand::Label(5));
    }

    #[test]
    fn test_last_store_respects_labels() {
        let mut emitter = Emitter::new();
        let lit = emitter.emit(Op::Lit, 0, Operand::Imm(1), &[]);
        let sto = emitter.emit(Op::Sto, mode::REL, Operand::Local(0), &[lit]);
        assert_eq!(emitter.last_store_to(Operand::Local(0), true), Some(sto));
        assert_eq!(emitter.last_store_to(Operand::Local(1), true), None);
        assert_eq!(emitter.last_store_to(Operand::Local(0), false), None);
        emitter.mark_label();
        assert_eq!(emitter.last_store_to(Operand::Local(0), true), None);
    }

    #[test]
    fn test_effects() {
        let mut emitter = Emitter::new();
        let global = emitter.emit(Op::Sto, mode::ABS, Operand::Imm(0), &[]);
        let local = emitter.emit(Op::Sto, mode::REL, Operand::Local(0), &[]);
        let ret = emitter.emit(Op::Sto, mode::REL, Operand::RetSlot, &[]);
        let add = emitter.emit_opr(Opr::Add, &[]);
        let print = emitter.emit_opr(Opr::PrintInt, &[]);
        assert!(emitter.get(global).has_effect());
        assert!(!emitter.get(local).has_effect());
        assert!(emitter.get(ret).has_effect());
        assert!(!emitter.get(add).has_effect());
        assert!(emitter.get(print).has_effect());
    }

    #[test]
    fn test_revalidate_adds_loop_writes() {
        let mut emitter = Emitter::new();
        let load = emitter.emit_load(Op::Lod, Operand::Local(2), &[], vec![]);
        let store = emitter.emit(Op::Sto, mode::REL, Operand::Local(2), &[load]);
        emitter.revalidate(0..emitter.len(), 2, &[store]);
        assert_eq!(emitter.get(load).reads, vec![store]);
        assert_eq!(emitter.get(load).var, Some(2));
    }
}
