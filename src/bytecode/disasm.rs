use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use crate::bytecode::op::{Instr, Op, Opr, mode};
use crate::bytecode::program::{Object, string_offsets};

/// Writes [`disassemble`] output to standard output.
pub fn print_object(object: &Object) {
    print!("{}", disassemble(object));
}

/// Render a compiled program: header, literal pool, then code.
pub fn disassemble(object: &Object) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " globals: {} cells", object.global_size);
    let _ = writeln!(out, " {} instructions", object.code.len());
    let mut counts: Vec<_> = count_ops(&object.code).into_iter().collect();
    counts.sort();
    let summary: Vec<String> = counts
        .iter()
        .map(|(name, n)| format!("{} {}", name, n))
        .collect();
    if !summary.is_empty() {
        let _ = writeln!(out, " {}", summary.join(", "));
    }
    let _ = writeln!(out, "════════════════════════════════════════");

    for (text, offset) in object.strings.iter().zip(string_offsets(&object.strings)) {
        let _ = writeln!(
            out,
            "  str @{:<4} {:?}",
            object.global_size + offset,
            text
        );
    }
    if !object.strings.is_empty() {
        let _ = writeln!(out);
    }

    out.push_str(&disassemble_code(&object.code));
    out
}

/// Disassemble an instruction array, marking jump and call targets
pub fn disassemble_code(code: &[Instr]) -> String {
    let targets = collect_jump_targets(code);
    let mut out = String::new();

    for (ip, instr) in code.iter().enumerate() {
        if targets.contains(&ip) {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }

        let marker = if targets.contains(&ip) { "► " } else { "  " };
        let _ = writeln!(out, "{:04} {}{}", ip, marker, format_instr(instr, ip));
    }
    out
}

fn collect_jump_targets(code: &[Instr]) -> BTreeSet<usize> {
    code.iter()
        .filter(|instr| instr.op.is_jump())
        .filter_map(|instr| usize::try_from(instr.operand).ok())
        .collect()
}

fn format_addr(instr: &Instr) -> String {
    if instr.mode & mode::REL != 0 {
        format!("fp{:+}", instr.operand)
    } else {
        format!("@{}", instr.operand)
    }
}

fn format_instr(instr: &Instr, ip: usize) -> String {
    let keep = if instr.mode & mode::KEEP != 0 { ".keep" } else { "" };

    match instr.op {
        Op::Pop => format!("POP         {}", instr.operand),
        Op::Lit => format!("LIT         {}", instr.operand),
        Op::Lod => format!("LOD         {}", format_addr(instr)),
        Op::Sto => format!("STO{:<9}{}", keep, format_addr(instr)),
        Op::Lda => format!("LDA{:<9}{}[]", keep, format_addr(instr)),
        Op::Sta => format!("STA{:<9}{}[]", keep, format_addr(instr)),
        Op::Int => format!("INT         {}", instr.operand),
        Op::Cal => format!(
            "CAL         {:04}  ; {} arg(s)",
            instr.operand, instr.mode
        ),
        Op::Jmp | Op::Jpc => {
            let direction = if (instr.operand as i64) <= ip as i64 {
                "↑"
            } else {
                "↓"
            };
            format!(
                "{}         {} (→ {:04})",
                instr.op.mnemonic(),
                direction,
                instr.operand
            )
        }
        Op::Opr => match Opr::from_i32(instr.operand) {
            Some(Opr::Ret) => format!("RET         ; drop {} arg(s)", instr.mode),
            Some(opr) => format!("OPR         {}", opr.name()),
            None => format!("OPR         ??? ({})", instr.operand),
        },
    }
}

/// Instructions per family, keyed by mnemonic.
pub fn count_ops(code: &[Instr]) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for instr in code {
        *counts.entry(instr.op.mnemonic()).or_insert(0) += 1;
    }
    counts
}
