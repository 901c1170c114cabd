/*!

  The assembler: source text in, binary image out.

  The pipeline, in order:

    text -> [`parser::parse_source`] -> `Item`s ->⋯

    ⋯-> label + constant binding, `data(...)` interning -> `SourceInstr`s ->⋯

    ⋯-> [`pseudo::expand`] -> `RealInstr`s -> [`resolver::resolve`] ->⋯

    ⋯-> instruction stream + data section -> `Image` (+ `DebugInfo`)

  Labels bind to source-instruction boundaries and are rewritten to
  real-instruction indices after expansion, then to byte addresses by the
  resolver's fixed point. Every error is reported before any image is
  built, so a failed assembly can never leave a partially-correct binary
  behind.

*/

use std::collections::HashMap;

use string_cache::DefaultAtom;
use thiserror::Error;

use crate::bytecode::{Image, Opcode};
use crate::register::Register;

mod data;
mod debug;
mod parser;
mod pseudo;
mod resolver;

pub use data::DataLiteral;
pub use debug::{DebugInfo, LineMarker};

use data::DataInterner;
use parser::{Item, RawOperand};
use pseudo::SourceInstr;

/// Accepted immediate range: anything a 64 bit pattern can carry.
const IMM_MIN: i128 = -(1i128 << 63);
const IMM_MAX: i128 = 1i128 << 64;

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum AsmError {
  #[error("line {line}: syntax error: {message}")]
  Syntax { line: u32, message: String },
  #[error("line {line}: unknown instruction `{name}`")]
  UnknownInstruction { line: u32, name: String },
  #[error("line {line}: `{name}` takes {expected} operand(s) but was given {found}")]
  WrongArity { line: u32, name: String, expected: usize, found: usize },
  #[error("line {line}: `{name}` needs a register in destination slot {slot}")]
  BadDestination { line: u32, name: String, slot: usize },
  #[error("line {line}: ret takes only registers")]
  RetOperands { line: u32 },
  #[error("line {line}: unresolved symbol `{name}`")]
  UnresolvedSymbol { line: u32, name: String },
  #[error("line {line}: duplicate label `{name}`")]
  DuplicateLabel { line: u32, name: String },
  #[error("line {line}: `{name}` is a label and cannot be reassigned")]
  LabelReassigned { line: u32, name: String },
  #[error("line {line}: value {value} does not fit in 64 bits")]
  ValueRange { line: u32, value: i128 },
  #[error("line {line}: skip count must be a compile-time constant")]
  NonConstantSkip { line: u32 },
  #[error("line {line}: skip target lies outside the program")]
  SkipOutOfRange { line: u32 },
  #[error("data section exceeds the 32 bit length header")]
  DataTooLarge,
}

/// A bound operand. `InstrRef` starts life as a source-instruction index
/// and is rewritten twice: to a real-instruction index after expansion,
/// then to a byte address by the resolver.
#[derive(Clone, Eq, PartialEq, Debug)]
pub(crate) enum Arg {
  Reg(Register),
  Imm(i128),
  InstrRef(usize),
}

/// One real (post-expansion) instruction awaiting layout.
#[derive(Clone, Debug)]
pub(crate) struct RealInstr {
  pub line: u32,
  pub opcode: Opcode,
  pub args: Vec<Arg>,
}

/// A successful assembly: the image, plus the debug sidecar.
#[derive(Clone, Debug)]
pub struct Program {
  pub image: Image,
  pub debug: DebugInfo,
}

// region Binding

fn check_range(line: u32, value: i128) -> Result<i128, AsmError> {
  if value < IMM_MIN || value >= IMM_MAX {
    Err(AsmError::ValueRange { line, value })
  } else {
    Ok(value)
  }
}

fn bind_operand(
  line: u32,
  operand: RawOperand,
  labels: &HashMap<DefaultAtom, usize>,
  consts: &HashMap<DefaultAtom, Arg>,
  interner: &mut DataInterner,
) -> Result<Arg, AsmError> {
  match operand {

    RawOperand::Register(register) => Ok(Arg::Reg(register)),

    RawOperand::Number(value) => Ok(Arg::Imm(check_range(line, value)?)),

    RawOperand::Symbol(name) => {
      if let Some(index) = labels.get(&name) {
        Ok(Arg::InstrRef(*index))
      } else if let Some(bound) = consts.get(&name) {
        Ok(bound.clone())
      } else {
        Err(AsmError::UnresolvedSymbol { line, name: name.to_string() })
      }
    }

    RawOperand::Blob(literal) => {
      if let DataLiteral::Words(words) = &literal {
        for word in words {
          check_range(line, *word)?;
        }
      }
      Ok(Arg::Imm(interner.intern(&literal) as i128))
    }

  }
}

// endregion

// region Validation

/// Shape checks the expansion and the encoder rely on: exact arity,
/// registers in destination slots, registers only under `ret`.
fn check_real(instr: &RealInstr) -> Result<(), AsmError> {
  if instr.opcode == Opcode::Ret {
    for arg in &instr.args {
      match arg {
        Arg::Reg(Register::Z) => {
          log::warn!("line {}: `z` in a ret mask has no effect", instr.line);
        }
        Arg::Reg(_) => {}
        _ => return Err(AsmError::RetOperands { line: instr.line }),
      }
    }
    return Ok(());
  }

  let signature = instr.opcode.signature();
  if instr.args.len() != signature.arity() {
    return Err(AsmError::WrongArity {
      line: instr.line,
      name: instr.opcode.to_string(),
      expected: signature.arity(),
      found: instr.args.len(),
    });
  }
  for slot in 0..signature.outputs {
    match instr.args[slot] {
      Arg::Reg(_) => {}
      _ => {
        return Err(AsmError::BadDestination {
          line: instr.line,
          name: instr.opcode.to_string(),
          slot,
        });
      }
    }
  }
  Ok(())
}

// endregion

/// Assembles a complete source text into an image and its debug sidecar.
pub fn assemble(source: &str) -> Result<Program, AsmError> {
  let items = parser::parse_source(source)?;

  // Label pass: labels bind to source-instruction boundaries, and are
  // visible before their definition.
  let mut labels: HashMap<DefaultAtom, usize> = HashMap::new();
  let mut source_count = 0usize;
  for item in &items {
    match item {
      Item::Label { line, name } => {
        if labels.contains_key(name) {
          return Err(AsmError::DuplicateLabel {
            line: *line,
            name: name.to_string(),
          });
        }
        labels.insert(name.clone(), source_count);
      }
      Item::Instr { .. } => source_count += 1,
      Item::Assign { .. } => {}
    }
  }

  // Binding pass, in source order: constants may be rebound, labels may
  // not; `data(...)` blobs intern as they are first seen.
  let mut consts: HashMap<DefaultAtom, Arg> = HashMap::new();
  let mut interner = DataInterner::new();
  let mut source_instrs: Vec<SourceInstr> = Vec::with_capacity(source_count);
  for item in items {
    match item {

      Item::Label { .. } => {}

      Item::Assign { line, name, value } => {
        if labels.contains_key(&name) {
          return Err(AsmError::LabelReassigned { line, name: name.to_string() });
        }
        let bound = bind_operand(line, value, &labels, &consts, &mut interner)?;
        consts.insert(name, bound);
      }

      Item::Instr { line, name, operands } => {
        let args = operands
          .into_iter()
          .map(|operand| bind_operand(line, operand, &labels, &consts, &mut interner))
          .collect::<Result<Vec<Arg>, AsmError>>()?;
        source_instrs.push(SourceInstr { line, name, args });
      }

    }
  }

  // Expansion, then the rewrite of instruction references from source
  // indices to real indices.
  let (mut real, source_to_real) = pseudo::expand(source_instrs)?;
  for instr in &mut real {
    check_real(instr)?;
    for arg in &mut instr.args {
      if let Arg::InstrRef(source_index) = arg {
        *arg = Arg::InstrRef(source_to_real[*source_index]);
      }
    }
  }

  let layout = resolver::resolve(&real)?;

  let mut debug = DebugInfo::default();
  for (i, instr) in real.iter().enumerate() {
    debug.lines.push(LineMarker { offset: layout.offsets[i], line: instr.line });
  }
  for (name, source_index) in &labels {
    debug
      .labels
      .insert(name.to_string(), layout.offsets[source_to_real[*source_index]]);
  }

  let section = interner.into_section();
  if section.len() > u32::max_value() as usize {
    return Err(AsmError::DataTooLarge);
  }
  log::debug!(
    "assembled {} instruction(s): {} code byte(s), {} data byte(s)",
    real.len(),
    layout.code.len(),
    section.len()
  );

  Ok(Program {
    image: Image::new(section, layout.code),
    debug,
  })
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::disassemble;
  use crate::machine::DATA_BASE;

  fn listing(source: &str) -> Vec<String> {
    let program = assemble(source).unwrap();
    disassemble(&program.image.code)
      .unwrap()
      .into_iter()
      .map(|(_, instruction)| instruction.to_string())
      .collect()
  }

  #[test]
  fn halt_zero_is_a_bare_header() {
    let program = assemble("halt 0\n").unwrap();
    assert!(program.image.data.is_empty());
    assert_eq!(program.image.code, vec![0x21, 0, 0, 0]);
  }

  #[test]
  fn assembly_is_deterministic() {
    let source = "loop:\n  inc a\n  jz loop, b\n  halt a\n";
    let first = assemble(source).unwrap();
    let second = assemble(source).unwrap();
    assert_eq!(first.image, second.image);
  }

  #[test]
  fn pseudo_instructions_lower_before_encoding() {
    assert_eq!(
      listing("mov a, b\ninc a\ndec b\nneg c\nge d, a, b\n"),
      vec![
        "add a, b, 0",
        "add a, a, 1",
        "add b, b, -1",
        "sub c, 0, c",
        "le d, b, a",
      ]
    );
  }

  #[test]
  fn labels_resolve_through_expansion() {
    // The push doubles in size; the label after it must account for both
    // emitted instructions.
    let lines = listing("jmp done\npush z, a\ndone:\nhalt 0\n");
    assert_eq!(lines.len(), 4);
    // jz 0..5, sw 5..9, add 9..14, halt at 14.
    assert_eq!(lines[0], "jz 14, 0");
    assert_eq!(lines[3], "halt 0");
  }

  #[test]
  fn constants_bind_and_rebind() {
    let lines = listing("size = 40\nadd a, a, size\nsize = 50\nadd b, b, size\n");
    assert_eq!(lines, vec!["add a, a, 40", "add b, b, 50"]);
  }

  #[test]
  fn constants_may_alias_labels_and_registers() {
    let lines = listing("start:\nentry = start\nsrc = b\nmov a, src\njz entry, a\n");
    assert_eq!(lines, vec!["add a, b, 0", "jz 0, a"]);
  }

  #[test]
  fn data_blobs_intern_into_the_section() {
    let program = assemble(
      "mov a, data(\"hi\")\nmov b, data(\"hi\")\nmov c, data(\"ho\")\nhalt 0\n",
    )
    .unwrap();
    assert_eq!(program.image.data, b"hi\x00ho\x00");

    let lines: Vec<String> = disassemble(&program.image.code)
      .unwrap()
      .into_iter()
      .map(|(_, instruction)| instruction.to_string())
      .collect();
    let first = format!("add a, {}, 0", DATA_BASE as i64);
    let second = format!("add b, {}, 0", DATA_BASE as i64);
    let third = format!("add c, {}, 0", DATA_BASE as i64 + 3);
    assert_eq!(lines[0], first);
    assert_eq!(lines[1], second);
    assert_eq!(lines[2], third);
  }

  #[test]
  fn debug_sidecar_tracks_lines_and_labels() {
    let program = assemble("start:\n  inc a\n  jz start, a\n  halt 0\n").unwrap();
    assert_eq!(program.debug.labels.get("start"), Some(&0));
    assert_eq!(program.debug.lines.len(), 3);
    assert_eq!(program.debug.lines[0].line, 2);
    assert_eq!(program.debug.line_at(0), Some(2));
  }

  #[test]
  fn shape_errors_are_reported_with_lines() {
    assert!(matches!(
      assemble("add a, b\n").unwrap_err(),
      AsmError::WrongArity { line: 1, expected: 3, found: 2, .. }
    ));
    assert!(matches!(
      assemble("add 1, b, c\n").unwrap_err(),
      AsmError::BadDestination { line: 1, slot: 0, .. }
    ));
    assert!(matches!(
      assemble("ret 1\n").unwrap_err(),
      AsmError::RetOperands { line: 1 }
    ));
    assert!(matches!(
      assemble("jz nowhere, a\n").unwrap_err(),
      AsmError::UnresolvedSymbol { line: 1, .. }
    ));
    assert!(matches!(
      assemble("dup:\ndup:\n").unwrap_err(),
      AsmError::DuplicateLabel { line: 2, .. }
    ));
    assert!(matches!(
      assemble("spot:\nspot = 3\n").unwrap_err(),
      AsmError::LabelReassigned { line: 2, .. }
    ));
    assert!(matches!(
      assemble("halt 0x10000000000000000\n").unwrap_err(),
      AsmError::ValueRange { line: 1, .. }
    ));
  }

}
