use std::io::{BufRead, Write};

use tracing::{debug, trace};

use crate::bytecode::op::{Instr, Op, Opr, mode};
use crate::bytecode::program::{Code, Program, read_cstr};
use crate::runtime::decode::Decode;
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<u64>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_stack_size: 1 << 22,
        }
    }
}

/// Frame pointer value meaning "no caller": returning to it ends the run.
pub const NO_FRAME: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

/// Stack machine over a single growable array of cells.
///
/// The array holds, bottom to top: the global region, the literal pool and
/// the evaluation/call stack. Its length is the top-of-stack pointer. A call
/// frame is `[args..] [saved fp] [return ip] [locals..]`, with `fp` pointing
/// at the saved frame pointer.
pub struct Vm<R, W> {
    memory: Vec<i32>,
    /// First cell above the global region and literal pool.
    base: usize,
    ip: usize,
    fp: i64,
    steps: u64,
    config: VmConfig,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Vm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self::with_config(input, output, VmConfig::default())
    }

    pub fn with_config(input: R, output: W, config: VmConfig) -> Self {
        Self {
            memory: Vec::new(),
            base: 0,
            ip: 0,
            fp: NO_FRAME,
            steps: 0,
            config,
            input,
            output,
        }
    }

    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn reset_execution_state(&mut self) {
        self.ip = 0;
        self.fp = NO_FRAME;
        self.steps = 0;
    }

    /// Loads globals and literals, then runs from instruction 0.
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.reset_execution_state();
        self.memory = program.initial_memory();
        self.base = self.memory.len();
        debug!(
            globals = program.global_size,
            pool = program.strings.len(),
            code = program.code.len(),
            "starting program"
        );

        let result = match &program.code {
            Code::Binary(code) => self.execute(code),
            Code::Text(code) => self.execute(code),
        };
        self.output.flush()?;
        debug!(steps = self.steps, "program finished");
        result
    }

    /// Runs already decoded instructions against the current memory.
    #[cfg(test)]
    fn run_instrs(&mut self, code: &[Instr]) -> Result<(), RuntimeError> {
        self.reset_execution_state();
        self.base = self.memory.len();
        let result = self.execute(code);
        self.output.flush()?;
        result
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimit(max));
            }
        }

        if self.memory.len() > self.config.max_stack_size {
            return Err(RuntimeError::StackLimit(self.config.max_stack_size));
        }

        Ok(())
    }

    fn execute<D: Decode>(&mut self, code: &[D]) -> Result<(), RuntimeError> {
        while self.ip < code.len() {
            self.check_limits()?;

            let at = self.ip;
            let instr = code[at]
                .decode()
                .map_err(|what| RuntimeError::Instruction { ip: at, what })?;
            trace!(ip = at, %instr, fp = self.fp, top = self.memory.len(), "step");

            self.ip += 1;
            if self.step(instr, at, code.len())? == Flow::Halt {
                break;
            }
        }
        Ok(())
    }

    fn step(&mut self, instr: Instr, at: usize, len: usize) -> Result<Flow, RuntimeError> {
        let keep = instr.mode & mode::KEEP != 0;

        match instr.op {
            Op::Pop => {
                let n = usize::try_from(instr.operand)
                    .ok()
                    .filter(|&n| n <= self.memory.len())
                    .ok_or(RuntimeError::StackUnderflow { ip: at })?;
                self.memory.truncate(self.memory.len() - n);
            }
            Op::Lit => self.push(instr.operand),
            Op::Lod => {
                let addr = self.address(instr.mode, instr.operand as i64, at)?;
                self.push(self.memory[addr]);
            }
            Op::Sto => {
                let value = self.pop(at)?;
                let addr = self.address(instr.mode, instr.operand as i64, at)?;
                self.memory[addr] = value;
                if keep {
                    self.push(value);
                }
            }
            Op::Lda => {
                let index = if keep { self.peek(at)? } else { self.pop(at)? };
                let addr = self.address(instr.mode, instr.operand as i64 + index as i64, at)?;
                self.push(self.memory[addr]);
            }
            Op::Sta => {
                let value = self.pop(at)?;
                let index = self.pop(at)?;
                let addr = self.address(instr.mode, instr.operand as i64 + index as i64, at)?;
                self.memory[addr] = value;
                if keep {
                    self.push(value);
                }
            }
            Op::Cal => {
                let target = self.target(instr.operand, at, len)?;
                // General path: the arguments must sit above the caller's frame.
                if instr.mode > 0 && (self.cells_above_frame() as u64) < instr.mode as u64 {
                    return Err(RuntimeError::StackUnderflow { ip: at });
                }
                self.push(self.fp as i32);
                self.push(self.ip as i32);
                self.fp = self.memory.len() as i64 - 2;
                self.ip = target;
            }
            Op::Int => {
                let n = usize::try_from(instr.operand).map_err(|_| RuntimeError::Instruction {
                    ip: at,
                    what: format!("negative reservation {}", instr.operand),
                })?;
                if self.memory.len() + n > self.config.max_stack_size {
                    return Err(RuntimeError::StackLimit(self.config.max_stack_size));
                }
                self.memory.resize(self.memory.len() + n, 0);
            }
            Op::Jmp => self.ip = self.target(instr.operand, at, len)?,
            Op::Jpc => {
                let cond = self.pop(at)?;
                if cond == 0 {
                    self.ip = self.target(instr.operand, at, len)?;
                }
            }
            Op::Opr => {
                let opr = Opr::from_i32(instr.operand).ok_or_else(|| RuntimeError::Instruction {
                    ip: at,
                    what: format!("operation selector {}", instr.operand),
                })?;
                return self.operate(opr, instr.mode, at);
            }
        }

        Ok(Flow::Continue)
    }

    fn operate(&mut self, opr: Opr, arg_cells: u32, at: usize) -> Result<Flow, RuntimeError> {
        match opr {
            Opr::Ret => return self.ret(arg_cells, at),
            Opr::Neg => {
                let a = self.pop(at)?;
                self.push(a.wrapping_neg());
            }
            Opr::Add | Opr::Sub | Opr::Mul | Opr::Div => {
                let b = self.pop(at)?;
                let a = self.pop(at)?;
                let result = match opr {
                    Opr::Add => a.wrapping_add(b),
                    Opr::Sub => a.wrapping_sub(b),
                    Opr::Mul => a.wrapping_mul(b),
                    _ => {
                        if b == 0 {
                            return Err(RuntimeError::DivisionByZero { ip: at });
                        }
                        a.wrapping_div(b)
                    }
                };
                self.push(result);
            }
            Opr::Bool => {
                let a = self.pop(at)?;
                self.push((a != 0) as i32);
            }
            Opr::Not => {
                let a = self.pop(at)?;
                self.push((a == 0) as i32);
            }
            Opr::Eq | Opr::Ne | Opr::Lt | Opr::Ge | Opr::Gt | Opr::Le => {
                let b = self.pop(at)?;
                let a = self.pop(at)?;
                let result = match opr {
                    Opr::Eq => a == b,
                    Opr::Ne => a != b,
                    Opr::Lt => a < b,
                    Opr::Ge => a >= b,
                    Opr::Gt => a > b,
                    _ => a <= b,
                };
                self.push(result as i32);
            }
            Opr::PrintInt => {
                let a = self.pop(at)?;
                write!(self.output, "{}", a)?;
            }
            Opr::PrintLn => writeln!(self.output)?,
            Opr::PrintChar => {
                let a = self.pop(at)?;
                self.output.write_all(&[a as u8])?;
            }
            Opr::PrintStr => {
                let offset = self.pop(at)?;
                let bytes = usize::try_from(offset)
                    .ok()
                    .and_then(|o| read_cstr(&self.memory, o))
                    .ok_or(RuntimeError::BadAddress {
                        ip: at,
                        addr: offset as i64,
                    })?;
                self.output.write_all(&bytes)?;
            }
            Opr::ReadInt => {
                let value = self.read_int(at)?;
                self.push(value);
            }
            Opr::ReadChar => {
                let value = self.read_char(at)?;
                self.push(value);
            }
        }
        Ok(Flow::Continue)
    }

    /// Pops the current frame and its `arg_cells` arguments.
    fn ret(&mut self, arg_cells: u32, at: usize) -> Result<Flow, RuntimeError> {
        if self.fp == NO_FRAME {
            return Ok(Flow::Halt);
        }
        let frame = self.address(mode::ABS, self.fp, at)?;
        let saved_ip = self.address(mode::ABS, self.fp + 1, at)?;
        let caller_fp = self.memory[frame] as i64;
        let return_ip = self.memory[saved_ip];

        let base = frame
            .checked_sub(arg_cells as usize)
            .ok_or(RuntimeError::StackUnderflow { ip: at })?;
        self.memory.truncate(base);
        self.fp = caller_fp;

        if self.fp == NO_FRAME {
            return Ok(Flow::Halt);
        }
        self.ip = usize::try_from(return_ip).map_err(|_| RuntimeError::BadTarget {
            ip: at,
            target: return_ip,
        })?;
        Ok(Flow::Continue)
    }

    // Stack helpers

    fn push(&mut self, value: i32) {
        self.memory.push(value);
    }

    /// Cells pushed since the current frame's return address, or since the
    /// start of the stack region at top level.
    fn cells_above_frame(&self) -> usize {
        let floor = if self.fp == NO_FRAME {
            self.base
        } else {
            self.fp as usize + 2
        };
        self.memory.len().saturating_sub(floor)
    }

    fn pop(&mut self, at: usize) -> Result<i32, RuntimeError> {
        self.memory
            .pop()
            .ok_or(RuntimeError::StackUnderflow { ip: at })
    }

    fn peek(&self, at: usize) -> Result<i32, RuntimeError> {
        self.memory
            .last()
            .copied()
            .ok_or(RuntimeError::StackUnderflow { ip: at })
    }

    fn address(&self, addr_mode: u32, offset: i64, at: usize) -> Result<usize, RuntimeError> {
        let base = if addr_mode & mode::REL != 0 { self.fp } else { 0 };
        let addr = base + offset;
        usize::try_from(addr)
            .ok()
            .filter(|&a| a < self.memory.len())
            .ok_or(RuntimeError::BadAddress { ip: at, addr })
    }

    fn target(&self, operand: i32, at: usize, len: usize) -> Result<usize, RuntimeError> {
        usize::try_from(operand)
            .ok()
            .filter(|&t| t <= len)
            .ok_or(RuntimeError::BadTarget {
                ip: at,
                target: operand,
            })
    }

    // Input

    fn skip_whitespace(&mut self) -> Result<(), RuntimeError> {
        loop {
            let buf = self.input.fill_buf()?;
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let exhausted = skip == buf.len() && !buf.is_empty();
            let empty = buf.is_empty();
            self.input.consume(skip);
            if empty || !exhausted {
                return Ok(());
            }
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, RuntimeError> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    fn read_int(&mut self, at: usize) -> Result<i32, RuntimeError> {
        self.skip_whitespace()?;
        let mut text = String::new();
        if let Some(sign @ (b'-' | b'+')) = self.peek_byte()? {
            text.push(sign as char);
            self.input.consume(1);
        }
        while let Some(b) = self.peek_byte()? {
            if !b.is_ascii_digit() {
                break;
            }
            text.push(b as char);
            self.input.consume(1);
        }
        text.parse::<i32>().map_err(|_| {
            if text.is_empty() {
                RuntimeError::input(at, "expected an integer, found end of input")
            } else {
                RuntimeError::input(at, format!("invalid integer input '{}'", text))
            }
        })
    }

    /// Reads one non-whitespace character.
    fn read_char(&mut self, at: usize) -> Result<i32, RuntimeError> {
        self.skip_whitespace()?;
        let b = self
            .peek_byte()?
            .ok_or_else(|| RuntimeError::input(at, "expected a character, found end of input"))?;
        self.input.consume(1);
        Ok(b as i32)
    }
}
