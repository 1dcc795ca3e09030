//! Liveness, frame layout and final numbering.
//!
//! Runs once per function, over the records emitted since its entry, and
//! once for the whole program when the object is assembled.

use std::ops::Range;

use tracing::{debug, trace};

use crate::bytecode::op::{Instr, mode};
use crate::bytecode::program::Object;
use crate::compiler::compile_error::CompileError;
use crate::compiler::excode::{Emitter, ExCode, Liveness, Operand};
use crate::compiler::symbols::{Scope, SymbolTables};

/// What the per-function pass decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Cells reserved for locals above the saved registers.
    pub frame_size: i32,
    /// Frame offset per local, `None` when the local was dropped.
    pub slots: Vec<Option<i32>>,
    pub removed: usize,
}

/// Slots 0 and 1 of a frame hold the saved frame pointer and return address.
pub const FIRST_LOCAL_SLOT: i32 = 2;

// =============================================================================
// Liveness
// =============================================================================

/// Marks every record in `range` live or dead.
///
/// Effects are live. Anything a live record pops or reads is live. Anything
/// that pops a live value is live too, or the stack would lose balance when
/// the dead consumer is dropped. Repeats until nothing changes.
pub fn compute_liveness(codes: &mut [ExCode], range: Range<usize>, optimize: bool) {
    if !optimize {
        for code in &mut codes[range] {
            code.live = Liveness::Live;
        }
        return;
    }

    let mut work = Vec::new();
    for i in range.clone() {
        if codes[i].has_effect() {
            codes[i].live = Liveness::Live;
            work.push(i);
        } else {
            codes[i].live = Liveness::Unknown;
        }
    }

    loop {
        while let Some(i) = work.pop() {
            let deps: Vec<usize> = codes[i]
                .operands
                .iter()
                .chain(codes[i].reads.iter())
                .copied()
                .collect();
            for dep in deps {
                if !codes[dep].is_live() {
                    codes[dep].live = Liveness::Live;
                    work.push(dep);
                }
            }
        }

        for i in range.clone() {
            if !codes[i].is_live() && codes[i].operands.iter().any(|&o| codes[o].is_live()) {
                trace!(index = i, code = %codes[i], "consumer of a live value kept");
                codes[i].live = Liveness::Live;
                work.push(i);
            }
        }
        if work.is_empty() {
            break;
        }
    }

    for code in &mut codes[range] {
        if !code.is_live() {
            code.live = Liveness::Dead;
        }
    }
}

// =============================================================================
// Function pass
// =============================================================================

/// Finishes the function whose records start at `entry`: liveness, frame
/// layout, and resolution of local, frame and result-slot operands.
pub fn finish_function(
    emitter: &mut Emitter,
    symbols: &SymbolTables,
    entry: usize,
    name: &str,
    optimize: bool,
) -> FrameLayout {
    let range = entry..emitter.len();
    compute_liveness(emitter.codes_mut(), range.clone(), optimize);

    let locals = symbols.locals();
    let mut used = vec![!optimize; locals.len()];
    for code in &emitter.codes()[range.clone()] {
        if let (true, Some(id)) = (code.is_live(), code.local()) {
            used[id as usize] = true;
        }
    }

    let mut slots = vec![None; locals.len()];
    let mut next = FIRST_LOCAL_SLOT;
    for (id, var) in locals.iter().enumerate() {
        match var.scope {
            Scope::Param => slots[id] = Some(var.addr),
            Scope::Local if var.writable && used[id] => {
                slots[id] = Some(next);
                next += var.extent.cells();
            }
            _ => {}
        }
    }
    let frame_size = next - FIRST_LOCAL_SLOT;
    let result_slot = -(symbols.param_count() as i32 + 1);

    for code in &mut emitter.codes_mut()[range.clone()] {
        match code.operand {
            Operand::Local(id) => {
                if let Some(slot) = slots[id as usize] {
                    code.operand = Operand::Imm(slot);
                }
            }
            Operand::Frame => {
                code.operand = Operand::Imm(frame_size);
                if frame_size == 0 {
                    code.live = Liveness::Dead;
                }
            }
            Operand::RetSlot => code.operand = Operand::Imm(result_slot),
            _ => {}
        }
    }

    let removed = emitter.codes()[range.clone()]
        .iter()
        .filter(|c| !c.is_emitted())
        .count();
    debug!(
        function = name,
        records = range.len(),
        removed,
        frame_size,
        "allocated function"
    );

    FrameLayout {
        frame_size,
        slots,
        removed,
    }
}

// =============================================================================
// Program pass
// =============================================================================

/// Numbers the surviving records and produces the final object.
pub fn assemble(
    emitter: &Emitter,
    symbols: &SymbolTables,
    strings: Vec<String>,
) -> Result<Object, CompileError> {
    let codes = emitter.codes();

    // positions[i]: final index of the first emitted record at or after i.
    let mut positions = Vec::with_capacity(codes.len() + 1);
    let mut next = 0usize;
    for code in codes {
        positions.push(next as i32);
        if code.is_emitted() {
            next += 1;
        }
    }
    positions.push(next as i32);

    let mut keep = vec![false; codes.len()];
    for code in codes {
        if let (true, Some(store)) = (code.is_live(), code.fused_into) {
            keep[store] = true;
        }
    }

    let global_size = symbols.global_size();
    let mut out = Vec::with_capacity(next);
    for (index, code) in codes.iter().enumerate() {
        if !code.is_emitted() {
            continue;
        }
        let operand = match code.operand {
            Operand::Imm(v) => v,
            Operand::Label(target) => positions[target],
            Operand::Fun(id) => positions[symbols.fun(id).entry],
            Operand::Str(offset) => global_size + offset,
            other => {
                return Err(CompileError::Unresolved {
                    index,
                    operand: other.to_string(),
                });
            }
        };
        let mut instr = Instr::new(code.op, code.mode, operand);
        if keep[index] {
            instr.mode |= mode::KEEP;
        }
        out.push(instr);
    }

    debug!(
        records = codes.len(),
        instructions = out.len(),
        fused = keep.iter().filter(|&&k| k).count(),
        "assembled program"
    );

    Ok(Object {
        global_size,
        strings,
        code: out,
    })
}
