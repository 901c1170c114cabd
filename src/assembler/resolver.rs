/*!

  The label/size resolver and the final encoder.

  The chicken-and-egg problem this module exists for: an instruction's byte
  length depends on the immediate width chosen for each operand, but a label
  reference's value (and so the width needed to encode it) depends on the
  addresses, and thus the lengths, of the instructions before it.

  The resolution is a shrink-only fixed point:

    1. every label-valued immediate starts at the maximum width (8 bytes);
       every compile-time constant starts (and stays) at its minimal width;
    2. a linear scan assigns a tentative address to every instruction;
    3. each label immediate whose value now fits a narrower width shrinks;
    4. repeat from 2 until a pass shrinks nothing.

  Widths only ever shrink, so addresses are monotonically non-increasing
  across passes and termination is guaranteed. Data-section addresses never
  shrink below 8 bytes (the region base is far above `i32::MAX`), which is
  why interned blobs can be handed to the resolver as plain constants.

*/

use crate::bytecode::{
  narrowest_kind, pack_header, pack_ret_header, push_immediate, ImmWidth,
  Opcode, OperandKind, HEADER_BYTES,
};
use crate::register::{RegisterSet, Word};
use super::{Arg, AsmError, RealInstr};

/// The resolver's output: the encoded instruction stream, plus each
/// instruction's byte address with one trailing entry for the stream length.
pub(crate) struct Layout {
  pub code: Vec<u8>,
  pub offsets: Vec<Word>,
}

fn initial_kind(arg: &Arg) -> OperandKind {
  match arg {
    Arg::Reg(register) => OperandKind::Reg(*register),
    Arg::Imm(value)    => narrowest_kind(*value),
    Arg::InstrRef(_)   => OperandKind::Imm(ImmWidth::Eight),
  }
}

fn instruction_size(kinds: &[OperandKind]) -> Word {
  HEADER_BYTES as Word + kinds.iter().map(|kind| kind.imm_bytes() as Word).sum::<Word>()
}

/// Runs the fixed point and serializes the stream.
pub(crate) fn resolve(instrs: &[RealInstr]) -> Result<Layout, AsmError> {
  // Step 1: initial widths. `ret` has no operand kinds at all.
  let mut kinds: Vec<Vec<OperandKind>> = instrs
    .iter()
    .map(|instr| match instr.opcode {
      Opcode::Ret => vec![],
      _ => instr.args.iter().map(initial_kind).collect(),
    })
    .collect();

  let mut offsets: Vec<Word> = vec![0; instrs.len() + 1];
  let mut passes = 0u32;
  loop {
    passes += 1;

    // Step 2: tentative addresses under the current widths.
    for (i, instr_kinds) in kinds.iter().enumerate() {
      offsets[i + 1] = offsets[i] + instruction_size(instr_kinds);
    }

    // Step 3: shrink any label immediate a narrower width now fits.
    let mut changed = false;
    for (i, instr) in instrs.iter().enumerate() {
      for (j, arg) in instr.args.iter().enumerate() {
        if let Arg::InstrRef(target) = arg {
          let desired = narrowest_kind(offsets[*target] as i128);
          if desired.imm_bytes() < kinds[i][j].imm_bytes() {
            kinds[i][j] = desired;
            changed = true;
          }
        }
      }
    }

    if !changed {
      break;
    }
  }
  log::debug!(
    "label/size resolution converged after {} pass(es); {} bytes of instructions",
    passes,
    offsets[instrs.len()]
  );

  // Final serialization under the fixed-point widths.
  let mut code: Vec<u8> = Vec::with_capacity(offsets[instrs.len()] as usize);
  for (i, instr) in instrs.iter().enumerate() {
    debug_assert_eq!(code.len() as Word, offsets[i]);

    if instr.opcode == Opcode::Ret {
      let kept: RegisterSet = instr
        .args
        .iter()
        .filter_map(|arg| match arg {
          Arg::Reg(register) => Some(*register),
          _ => None,
        })
        .collect();
      code.extend_from_slice(&pack_ret_header(kept).to_le_bytes());
      continue;
    }

    code.extend_from_slice(&pack_header(instr.opcode, &kinds[i]).to_le_bytes());
    for (j, arg) in instr.args.iter().enumerate() {
      if let OperandKind::Imm(width) = kinds[i][j] {
        let value = match arg {
          Arg::Imm(value)      => *value,
          Arg::InstrRef(target) => offsets[*target] as i128,
          Arg::Reg(_)          => unreachable!("register slots carry no immediate"),
        };
        push_immediate(&mut code, width, value);
      }
    }
  }

  Ok(Layout { code, offsets })
}
