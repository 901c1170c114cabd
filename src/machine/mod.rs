/*!

  The virtual machine: a fetch/decode/execute loop over the instruction
  stream of a loaded image, with cycle-exact accounting.

  Execution is strictly single threaded and synchronous. One `step` fetches
  the 4 byte header at the instruction pointer, decodes the operand kinds,
  fetches the immediates they demand, resolves every operand to a 64 bit
  word, executes the opcode's effect, and adds the opcode's fixed cycle cost.
  A fault abandons the instruction with no partial effects: the register
  file, memory, call stack, instruction pointer, and cycle counter all keep
  their pre-instruction values.

  `call` and `ret` never touch user-visible memory. The engine keeps an
  internal stack of frames, each a full register snapshot plus the return
  address, so the user-managed stack pointer `z` stays semantically separate
  from control-flow bookkeeping.

  The I/O cell at the top of the address space is a gateway, not storage:
  `sw` there emits the low byte of the source to the external output stream,
  `lw` consumes one byte from the external input stream (all ones at end of
  stream), and every other width faults.

*/

use std::fmt::{Display, Formatter};
use std::io::{self, Read, Write as IoWrite};

use prettytable::{format as TableFormat, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::bytecode::{decode_at, Image, Instruction, Opcode, Operand};
use crate::register::{Register, RegisterSet, Word, ALL_REGISTERS, REGISTER_COUNT};

mod alu;
mod memory;

pub use memory::{MemoryLimits, DATA_BASE, HEAP_BASE, IO_CELL, STACK_BASE};
use memory::Memory;

// region Faults and run state

/// The three unrecoverable machine faults.
#[derive(Error, Clone, Copy, Eq, PartialEq, Debug)]
pub enum FaultKind {
  #[error("division by zero")]
  DivisionByZero,
  #[error("invalid memory access")]
  InvalidMemoryAccess,
  #[error("out of bounds execution")]
  OutOfBoundsExecution,
}

/// A fault plus where and when it happened: the byte address of the faulting
/// instruction and the cycle count at fault time (the faulting instruction
/// contributes no cycles).
#[derive(Error, Clone, Copy, Eq, PartialEq, Debug)]
#[error("{kind} at instruction address {address:#x} after {cycles} cycles")]
pub struct Fault {
  pub kind: FaultKind,
  pub address: Word,
  pub cycles: u64,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RunState {
  Running,
  /// An explicit `halt a`; `0` conventionally denotes success.
  Halted(Word),
  Faulted(FaultKind),
}

impl Display for RunState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      RunState::Running       => write!(f, "running"),
      RunState::Halted(code)  => write!(f, "halted with code {}", code),
      RunState::Faulted(kind) => write!(f, "faulted: {}", kind),
    }
  }
}

// endregion

// region Tracing

/// One committed instruction, as seen by an execution trace sink.
pub struct TraceEvent<'a> {
  /// Byte address of the instruction.
  pub address: Word,
  pub opcode: Opcode,
  /// The resolved 64 bit operand values, in operand order.
  pub operands: &'a [Word],
  /// Cycle counter including this instruction's cost.
  pub cycles: u64,
}

/// An observer invoked after each instruction commits. Purely observational;
/// it can never influence execution.
pub trait TraceSink {
  fn record(&mut self, event: &TraceEvent);
}

// endregion

/// One internal call-stack entry: where to resume, and the caller's register
/// file to restore from.
struct Frame {
  return_address: Word,
  saved: [Word; REGISTER_COUNT],
}

pub struct Machine {
  registers: [Word; REGISTER_COUNT],
  ip: Word,
  code: Vec<u8>,
  memory: Memory,
  call_stack: Vec<Frame>,
  cycles: u64,
  state: RunState,
  last_fault: Option<Fault>,
  rng: StdRng,
  input: Box<dyn Read>,
  output: Box<dyn IoWrite>,
  trace: Option<Box<dyn TraceSink>>,
}

impl Machine {

  // region Construction

  pub fn new(image: Image) -> Machine {
    Machine::with_limits(image, MemoryLimits::default())
  }

  pub fn with_limits(image: Image, limits: MemoryLimits) -> Machine {
    let mut registers = [0; REGISTER_COUNT];
    registers[Register::Z.index()] = STACK_BASE;
    Machine {
      registers,
      ip: 0,
      code: image.code,
      memory: Memory::new(image.data, limits),
      call_stack: vec![],
      cycles: 0,
      state: RunState::Running,
      last_fault: None,
      rng: StdRng::from_entropy(),
      input: Box::new(io::empty()),
      output: Box::new(io::sink()),
      trace: None,
    }
  }

  /// Wires the external input stream feeding the I/O cell.
  pub fn with_input(mut self, input: impl Read + 'static) -> Machine {
    self.input = Box::new(input);
    self
  }

  /// Wires the external output stream fed by the I/O cell.
  pub fn with_output(mut self, output: impl IoWrite + 'static) -> Machine {
    self.output = Box::new(output);
    self
  }

  /// Makes `rand` reproducible. Without a seed it draws from OS entropy.
  pub fn with_seed(mut self, seed: u64) -> Machine {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  pub fn with_trace(mut self, sink: impl TraceSink + 'static) -> Machine {
    self.trace = Some(Box::new(sink));
    self
  }

  // endregion

  // region Accessors

  pub fn register(&self, register: Register) -> Word {
    self.registers[register.index()]
  }

  pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
    &self.registers
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  pub fn state(&self) -> RunState {
    self.state
  }

  pub fn instruction_pointer(&self) -> Word {
    self.ip
  }

  // endregion

  // region Execution loop

  /// Executes one instruction, if the machine is still running.
  pub fn step(&mut self) -> RunState {
    if let RunState::Running = self.state {
      if let Err(fault) = self.step_inner() {
        log::debug!("machine fault: {}", fault);
        self.last_fault = Some(fault);
        self.state = RunState::Faulted(fault.kind);
      }
    }
    self.state
  }

  /// Runs to completion: the exit code of an explicit `halt`, or the fault.
  pub fn run(&mut self) -> Result<Word, Fault> {
    loop {
      match self.state {
        RunState::Running       => { self.step(); }
        RunState::Halted(code)  => return Ok(code),
        RunState::Faulted(kind) => {
          return Err(self.last_fault.unwrap_or(Fault {
            kind,
            address: self.ip,
            cycles: self.cycles,
          }));
        }
      }
    }
  }

  fn fault_at(&self, kind: FaultKind, address: Word) -> Fault {
    Fault { kind, address, cycles: self.cycles }
  }

  fn step_inner(&mut self) -> Result<(), Fault> {
    let pc = self.ip;
    let (instruction, length) = decode_at(&self.code, pc as usize)
      .map_err(|_| self.fault_at(FaultKind::OutOfBoundsExecution, pc))?;

    match instruction {

      Instruction::Ret { kept } => {
        self.execute_ret(pc, kept)?;
        self.cycles += Opcode::Ret.cycles();
        self.trace_event(pc, Opcode::Ret, &[]);
      }

      Instruction::Plain { opcode, operands } => {
        let values: Vec<Word> = operands
          .iter()
          .map(|operand| match operand {
            Operand::Reg(register) => self.registers[register.index()],
            Operand::Imm(value)    => *value,
          })
          .collect();

        let next = pc + length as Word;
        self.execute_plain(pc, opcode, &operands, &values, next)?;
        self.cycles += opcode.cycles();
        self.trace_event(pc, opcode, &values);
      }

    }
    Ok(())
  }

  fn trace_event(&mut self, address: Word, opcode: Opcode, operands: &[Word]) {
    if let Some(sink) = &mut self.trace {
      sink.record(&TraceEvent { address, opcode, operands, cycles: self.cycles });
    }
  }

  // endregion

  // region Instruction effects

  /// Restores the popped frame, keeping the callee's values for every
  /// register in the mask. `z` is never restored.
  fn execute_ret(&mut self, pc: Word, kept: RegisterSet) -> Result<(), Fault> {
    let frame = match self.call_stack.pop() {
      Some(frame) => frame,
      None        => return Err(self.fault_at(FaultKind::InvalidMemoryAccess, pc)),
    };

    let callee = self.registers;
    self.registers = frame.saved;
    for register in kept.iter() {
      self.registers[register.index()] = callee[register.index()];
    }
    self.registers[Register::Z.index()] = callee[Register::Z.index()];
    self.ip = frame.return_address;
    Ok(())
  }

  fn execute_plain(
    &mut self,
    pc: Word,
    opcode: Opcode,
    operands: &[Operand],
    values: &[Word],
    next: Word,
  ) -> Result<(), Fault> {
    use Opcode::*;

    match opcode {

      Add  => self.set(operands, 0, values[1].wrapping_add(values[2])),
      Sub  => self.set(operands, 0, values[1].wrapping_sub(values[2])),
      And  => self.set(operands, 0, values[1] & values[2]),
      Or   => self.set(operands, 0, values[1] | values[2]),
      Xor  => self.set(operands, 0, values[1] ^ values[2]),
      Not  => self.set(operands, 0, (values[1] == 0) as Word),
      Shl  => self.set(operands, 0, alu::shl(values[1], values[2])),
      Shr  => self.set(operands, 0, alu::shr(values[1], values[2])),
      Sar  => self.set(operands, 0, alu::sar(values[1], values[2])),

      Cmp  => self.set(operands, 0, (values[1] == values[2]) as Word),
      Neq  => self.set(operands, 0, (values[1] != values[2]) as Word),
      Le   => self.set(operands, 0, ((values[1] as i64) < (values[2] as i64)) as Word),
      Leq  => self.set(operands, 0, ((values[1] as i64) <= (values[2] as i64)) as Word),
      Leu  => self.set(operands, 0, (values[1] < values[2]) as Word),
      Lequ => self.set(operands, 0, (values[1] <= values[2]) as Word),

      Mul | Mulu => {
        let (low, high) = match opcode {
          Mul => alu::mul(values[2], values[3]),
          _   => alu::mulu(values[2], values[3]),
        };
        self.set(operands, 0, low);
        self.set(operands, 1, high);
      }

      Div | Divu => {
        if values[3] == 0 {
          return Err(self.fault_at(FaultKind::DivisionByZero, pc));
        }
        let (quotient, remainder) = match opcode {
          Div => alu::div(values[2], values[3]),
          _   => alu::divu(values[2], values[3]),
        };
        self.set(operands, 0, quotient);
        self.set(operands, 1, remainder);
      }

      Lb | Lbu | Ls | Lsu | Li | Liu | Lw => {
        let value = self.load_value(pc, opcode, values[1])?;
        self.set(operands, 0, value);
      }

      Sb | Ss | Si | Sw => {
        self.store_value(pc, opcode, values[0], values[1])?;
      }

      Jz => {
        if values[1] == 0 {
          self.ip = values[0];
          return Ok(());
        }
      }

      Jnz => {
        if values[1] != 0 {
          self.ip = values[0];
          return Ok(());
        }
      }

      Call => {
        self.call_stack.push(Frame { return_address: next, saved: self.registers });
        self.ip = values[0];
        return Ok(());
      }

      Halt => {
        self.state = RunState::Halted(values[0]);
        return Ok(());
      }

      Rand => {
        let value = self.rng.gen::<u64>();
        self.set(operands, 0, value);
      }

      // Decoded through `Instruction::Ret`, never through here.
      Ret => unreachable!("ret decoded as a plain instruction"),

    }

    self.ip = next;
    Ok(())
  }

  /// Writes a destination register. The decoder has already guaranteed the
  /// slot holds a register.
  fn set(&mut self, operands: &[Operand], slot: usize, value: Word) {
    match operands[slot] {
      Operand::Reg(register) => self.registers[register.index()] = value,
      Operand::Imm(_)        => unreachable!("destination slot decoded as an immediate"),
    }
  }

  fn load_value(&mut self, pc: Word, opcode: Opcode, address: Word) -> Result<Word, Fault> {
    use Opcode::*;
    let (width, signed) = match opcode {
      Lb  => (1, true),
      Lbu => (1, false),
      Ls  => (2, true),
      Lsu => (2, false),
      Li  => (4, true),
      Liu => (4, false),
      Lw  => (8, false),
      _   => unreachable!("not a load opcode"),
    };

    if address == IO_CELL {
      if width != 8 {
        return Err(self.fault_at(FaultKind::InvalidMemoryAccess, pc));
      }
      let mut byte = [0u8; 1];
      return match self.input.read_exact(&mut byte) {
        Ok(())                                                  => Ok(byte[0] as Word),
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof  => Ok(Word::max_value()),
        Err(_) => Err(self.fault_at(FaultKind::InvalidMemoryAccess, pc)),
      };
    }

    let raw = self
      .memory
      .load(address, width)
      .ok_or_else(|| self.fault_at(FaultKind::InvalidMemoryAccess, pc))?;

    let value = match (signed, width) {
      (true, 1) => raw as u8 as i8 as i64 as Word,
      (true, 2) => raw as u16 as i16 as i64 as Word,
      (true, 4) => raw as u32 as i32 as i64 as Word,
      _         => raw,
    };
    Ok(value)
  }

  fn store_value(&mut self, pc: Word, opcode: Opcode, address: Word, value: Word) -> Result<(), Fault> {
    use Opcode::*;
    let width = match opcode {
      Sb => 1,
      Ss => 2,
      Si => 4,
      Sw => 8,
      _  => unreachable!("not a store opcode"),
    };

    if address == IO_CELL {
      if width != 8 {
        return Err(self.fault_at(FaultKind::InvalidMemoryAccess, pc));
      }
      let emitted = self
        .output
        .write_all(&[value as u8])
        .and_then(|_| self.output.flush());
      return emitted.map_err(|_| self.fault_at(FaultKind::InvalidMemoryAccess, pc));
    }

    self
      .memory
      .store(address, value, width)
      .ok_or_else(|| self.fault_at(FaultKind::InvalidMemoryAccess, pc))
  }

  // endregion

  // region Display

  /// The register file as a table, one row per register, decimal and hex.
  pub fn register_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Decimal", ubl->"Hex"]);
    for register in ALL_REGISTERS.iter() {
      let value = self.registers[register.index()];
      table.add_row(row![
        r->format!("{} =", register),
        value,
        format!("{:#x}", value)
      ]);
    }
    table
  }

  // endregion

}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} after {} cycles at {:#x}\n{}",
      self.state, self.cycles, self.ip, self.register_table()
    )
  }
}
