//! Human-readable container.
//!
//! ```text
//! .data
//! INT 0 <global size>
//! STR 0 <cell offset> <literal text>
//! .code
//! <MNEMONIC> <mode> <operand>
//! ```
//!
//! The literal text runs to the end of the line, spaces included. Blank
//! lines and lines starting with `;` are ignored. Code mnemonics are packed
//! into integers on load and only validated when executed.

use std::io::{BufRead, Write};

use crate::bytecode::format_error::FormatError;
use crate::bytecode::op::pack_mnemonic;
use crate::bytecode::program::{
    Code, Object, Program, TextInstr, cells_for, pack_strings, string_offsets,
};

pub fn write<W: Write>(object: &Object, out: &mut W) -> std::io::Result<()> {
    writeln!(out, ".data")?;
    writeln!(out, "INT 0 {}", object.global_size)?;
    for (text, offset) in object.strings.iter().zip(string_offsets(&object.strings)) {
        writeln!(out, "STR 0 {} {}", offset, text)?;
    }
    writeln!(out, ".code")?;
    for instr in &object.code {
        writeln!(out, "{}", instr)?;
    }
    out.flush()
}

pub fn to_string(object: &Object) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write(object, &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Data,
    Code,
}

pub fn read<R: BufRead>(input: R) -> Result<Program, FormatError> {
    let mut section = Section::None;
    let mut seen_code = false;
    let mut global_size = None;
    let mut strings: Vec<String> = Vec::new();
    let mut next_offset = 0i32;
    let mut code = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.trim_start().starts_with(';') {
            continue;
        }

        match line.trim() {
            ".data" => {
                section = Section::Data;
                continue;
            }
            ".code" => {
                section = Section::Code;
                seen_code = true;
                continue;
            }
            _ => {}
        }

        let [name, mode, operand, rest] = split_fields(line);
        let name = name.unwrap_or_default();
        let mode = parse_field::<u32>(mode, line_no, "mode")?;
        let operand = parse_field::<i32>(operand, line_no, "operand")?;

        match section {
            Section::None => {
                return Err(FormatError::text(line_no, "instruction outside a section"));
            }
            Section::Data => match name {
                "INT" => global_size = Some(operand),
                "STR" => {
                    if operand != next_offset {
                        return Err(FormatError::text(
                            line_no,
                            format!("literal at offset {}, expected {}", operand, next_offset),
                        ));
                    }
                    let text = rest.unwrap_or_default().to_string();
                    next_offset += cells_for(&text) as i32;
                    strings.push(text);
                }
                other => {
                    return Err(FormatError::text(
                        line_no,
                        format!("unknown data directive '{}'", other),
                    ));
                }
            },
            Section::Code => {
                if rest.is_some_and(|r| !r.trim().is_empty()) {
                    return Err(FormatError::text(line_no, "trailing text after operand"));
                }
                let packed = pack_mnemonic(name).ok_or_else(|| {
                    FormatError::text(line_no, format!("bad mnemonic '{}'", name))
                })?;
                code.push(TextInstr {
                    name: packed,
                    mode,
                    operand,
                });
            }
        }
    }

    let global_size = global_size.ok_or(FormatError::MissingBlock(".data INT"))?;
    if !seen_code {
        return Err(FormatError::MissingBlock(".code"));
    }

    Ok(Program {
        global_size,
        strings: pack_strings(&strings),
        code: Code::Text(code),
    })
}

pub fn from_str(source: &str) -> Result<Program, FormatError> {
    read(source.as_bytes())
}

/// `NAME mode operand`, split on any whitespace. A `STR` line keeps
/// everything after the single space following its offset as the literal.
fn split_fields(line: &str) -> [Option<&str>; 4] {
    let line = line.trim_start();
    if line.starts_with("STR ") {
        let mut fields = line.splitn(4, ' ');
        return [fields.next(), fields.next(), fields.next(), fields.next()];
    }
    let mut fields = line.split_whitespace();
    [fields.next(), fields.next(), fields.next(), None]
}

fn parse_field<T: std::str::FromStr>(
    field: Option<&str>,
    line: usize,
    what: &str,
) -> Result<T, FormatError> {
    let field = field.ok_or_else(|| FormatError::text(line, format!("missing {}", what)))?;
    field
        .trim()
        .parse()
        .map_err(|_| FormatError::text(line, format!("invalid {} '{}'", what, field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{Instr, Op, Opr, mode};

    fn sample() -> Object {
        Object {
            global_size: 3,
            strings: vec!["  padded text ".to_string(), "".to_string(), "x".to_string()],
            code: vec![
                Instr::new(Op::Cal, 0, 1),
                Instr::new(Op::Int, 0, 2),
                Instr::new(Op::Sto, mode::REL | mode::KEEP, 2),
                Instr::new(Op::Opr, 0, Opr::PrintInt as i32),
                Instr::new(Op::Opr, 0, Opr::Ret as i32),
            ],
        }
    }

    #[test]
    fn test_write_layout() {
        let text = to_string(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ".data");
        assert_eq!(lines[1], "INT 0 3");
        assert_eq!(lines[2], "STR 0 0   padded text ");
        assert_eq!(lines[3], "STR 0 4 ");
        assert_eq!(lines[4], "STR 0 5 x");
        assert_eq!(lines[5], ".code");
        assert_eq!(lines[6], "CAL 0 1");
        assert_eq!(lines[8], "STO 3 2");
    }

    #[test]
    fn test_write_then_read() {
        let object = sample();
        let program = from_str(&to_string(&object)).unwrap();
        assert_eq!(program.global_size, 3);
        assert_eq!(program.strings, object.string_cells());
        let expected: Vec<TextInstr> = object.code.iter().copied().map(TextInstr::from).collect();
        assert_eq!(program.code, Code::Text(expected));
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let program = from_str("; header\n\n.data\nINT 0 0\n.code\n; entry\nJMP 0 0\n").unwrap();
        assert_eq!(program.code.len(), 1);
    }

    #[test]
    fn test_code_lines_accept_any_whitespace() {
        let spaced = from_str(".data\nINT\t0   0\n.code\n  LIT  0 1\nOPR\t0\t14\n").unwrap();
        let plain = from_str(".data\nINT 0 0\n.code\nLIT 0 1\nOPR 0 14\n").unwrap();
        assert_eq!(spaced, plain);
    }

    #[test]
    fn test_literal_keeps_inner_spaces() {
        let program = from_str(".data\nINT 0 1\nSTR 0 0 a  b \n.code\nLIT 0 1\n").unwrap();
        assert_eq!(program.strings, pack_strings(&["a  b ".to_string()]));
    }

    #[test]
    fn test_unknown_mnemonic_is_loaded() {
        let program = from_str(".data\nINT 0 0\n.code\nXYZ 0 0\n").unwrap();
        assert_eq!(program.code.len(), 1);
    }

    #[test]
    fn test_missing_code_section() {
        assert!(matches!(
            from_str(".data\nINT 0 0\n"),
            Err(FormatError::MissingBlock(".code"))
        ));
    }

    #[test]
    fn test_missing_global_size() {
        assert!(matches!(
            from_str(".data\n.code\nLIT 0 1\n"),
            Err(FormatError::MissingBlock(_))
        ));
    }

    #[test]
    fn test_bad_operand_reports_line() {
        let err = from_str(".data\nINT 0 0\n.code\nLIT 0 abc\n").unwrap_err();
        assert!(err.to_string().starts_with("line 4:"));
    }

    #[test]
    fn test_misplaced_literal_offset() {
        let err = from_str(".data\nINT 0 0\nSTR 0 2 hi\n.code\n").unwrap_err();
        assert!(err.to_string().contains("expected 0"));
    }
}
