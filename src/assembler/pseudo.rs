/*!

  Pseudo-instruction expansion. Each pseudo-instruction rewrites to a fixed
  sequence of real instructions before any sizing or addressing happens, so
  labels and jump targets only ever refer to real-instruction boundaries.
  Because one source instruction can become two real ones, expansion also
  produces the source-index to real-index mapping that label references (and
  the `sz`/`snz` skip targets, which count source instructions) are rewritten
  through.

*/

use std::str::FromStr;

use crate::bytecode::Opcode;
use super::{Arg, AsmError, RealInstr};

/// An instruction as bound by the driver: symbols already resolved, but
/// pseudo mnemonics not yet rewritten.
#[derive(Clone, Debug)]
pub(crate) struct SourceInstr {
  pub line: u32,
  pub name: String,
  pub args: Vec<Arg>,
}

/**
  Expands every pseudo-instruction. Returns the real instructions plus the
  source-to-real index map; the map has one extra trailing entry so that a
  label on the end of the program still resolves (to the end of the stream).
*/
pub(crate) fn expand(source: Vec<SourceInstr>) -> Result<(Vec<RealInstr>, Vec<usize>), AsmError> {
  let count = source.len();
  let mut real: Vec<RealInstr> = vec![];
  let mut map: Vec<usize> = Vec::with_capacity(count + 1);

  for (index, instr) in source.into_iter().enumerate() {
    map.push(real.len());
    expand_one(index, count, instr, &mut real)?;
  }
  map.push(real.len());

  Ok((real, map))
}

fn expect_arity(line: u32, name: &str, args: &[Arg], expected: usize) -> Result<(), AsmError> {
  if args.len() != expected {
    Err(AsmError::WrongArity {
      line,
      name: name.to_string(),
      expected,
      found: args.len(),
    })
  } else {
    Ok(())
  }
}

fn expand_one(
  index: usize,
  count: usize,
  instr: SourceInstr,
  real: &mut Vec<RealInstr>,
) -> Result<(), AsmError> {
  let SourceInstr { line, name, args } = instr;

  match name.as_str() {

    "mov" => {
      expect_arity(line, &name, &args, 2)?;
      real.push(RealInstr {
        line,
        opcode: Opcode::Add,
        args: vec![args[0].clone(), args[1].clone(), Arg::Imm(0)],
      });
    }

    // `sal` is `shl` by another name.
    "sal" => {
      expect_arity(line, &name, &args, 3)?;
      real.push(RealInstr { line, opcode: Opcode::Shl, args });
    }

    "inc" | "dec" => {
      expect_arity(line, &name, &args, 1)?;
      let addend = if name == "inc" { 1 } else { -1 };
      real.push(RealInstr {
        line,
        opcode: Opcode::Add,
        args: vec![args[0].clone(), args[0].clone(), Arg::Imm(addend)],
      });
    }

    "neg" => {
      expect_arity(line, &name, &args, 1)?;
      real.push(RealInstr {
        line,
        opcode: Opcode::Sub,
        args: vec![args[0].clone(), Arg::Imm(0), args[0].clone()],
      });
    }

    // Greater-than comparisons are the less-than family with the source
    // operands swapped.
    "ge" | "geq" | "geu" | "gequ" => {
      expect_arity(line, &name, &args, 3)?;
      let opcode = match name.as_str() {
        "ge"   => Opcode::Le,
        "geq"  => Opcode::Leq,
        "geu"  => Opcode::Leu,
        _      => Opcode::Lequ,
      };
      real.push(RealInstr {
        line,
        opcode,
        args: vec![args[0].clone(), args[2].clone(), args[1].clone()],
      });
    }

    "jmp" => {
      expect_arity(line, &name, &args, 1)?;
      real.push(RealInstr {
        line,
        opcode: Opcode::Jz,
        args: vec![args[0].clone(), Arg::Imm(0)],
      });
    }

    // Skip the next n source instructions when the operand is zero
    // (`sz`) or nonzero (`snz`). The skip count is in source instructions,
    // which is exactly why the source-to-real map exists.
    "sz" | "snz" => {
      expect_arity(line, &name, &args, 2)?;
      let skip = match args[1] {
        Arg::Imm(value) => value,
        _ => return Err(AsmError::NonConstantSkip { line }),
      };
      let target = index as i128 + skip + 1;
      if target < 0 || target > count as i128 {
        return Err(AsmError::SkipOutOfRange { line });
      }
      let opcode = if name == "sz" { Opcode::Jz } else { Opcode::Jnz };
      real.push(RealInstr {
        line,
        opcode,
        args: vec![Arg::InstrRef(target as usize), args[0].clone()],
      });
    }

    // Both stack pseudo-instructions expand to two real instructions; the
    // stack grows upward, so `push` bumps after storing and `pop` drops
    // before loading.
    "push" => {
      expect_arity(line, &name, &args, 2)?;
      real.push(RealInstr {
        line,
        opcode: Opcode::Sw,
        args: vec![args[0].clone(), args[1].clone()],
      });
      real.push(RealInstr {
        line,
        opcode: Opcode::Add,
        args: vec![args[0].clone(), args[0].clone(), Arg::Imm(8)],
      });
    }

    "pop" => {
      expect_arity(line, &name, &args, 2)?;
      real.push(RealInstr {
        line,
        opcode: Opcode::Sub,
        args: vec![args[1].clone(), args[1].clone(), Arg::Imm(8)],
      });
      real.push(RealInstr {
        line,
        opcode: Opcode::Lw,
        args: vec![args[0].clone(), args[1].clone()],
      });
    }

    _ => {
      let opcode = Opcode::from_str(&name).map_err(|_| AsmError::UnknownInstruction {
        line,
        name: name.clone(),
      })?;
      real.push(RealInstr { line, opcode, args });
    }

  }

  Ok(())
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::register::Register;

  fn instr(name: &str, args: Vec<Arg>) -> SourceInstr {
    SourceInstr { line: 1, name: name.to_string(), args }
  }

  fn reg(r: Register) -> Arg {
    Arg::Reg(r)
  }

  #[test]
  fn mov_becomes_add_with_zero() {
    let (real, map) = expand(vec![instr("mov", vec![reg(Register::A), reg(Register::B)])]).unwrap();
    assert_eq!(real.len(), 1);
    assert_eq!(real[0].opcode, Opcode::Add);
    assert_eq!(
      real[0].args,
      vec![reg(Register::A), reg(Register::B), Arg::Imm(0)]
    );
    assert_eq!(map, vec![0, 1]);
  }

  #[test]
  fn greater_family_swaps_sources() {
    let (real, _) = expand(vec![instr(
      "ge",
      vec![reg(Register::R), reg(Register::A), reg(Register::B)],
    )])
    .unwrap();
    assert_eq!(real[0].opcode, Opcode::Le);
    assert_eq!(
      real[0].args,
      vec![reg(Register::R), reg(Register::B), reg(Register::A)]
    );
  }

  #[test]
  fn push_and_pop_split_in_two() {
    let (real, map) = expand(vec![
      instr("push", vec![reg(Register::Z), reg(Register::A)]),
      instr("pop", vec![reg(Register::B), reg(Register::Z)]),
    ])
    .unwrap();
    assert_eq!(real.len(), 4);
    assert_eq!(map, vec![0, 2, 4]);

    assert_eq!(real[0].opcode, Opcode::Sw);
    assert_eq!(real[1].opcode, Opcode::Add);
    assert_eq!(real[1].args[2], Arg::Imm(8));
    assert_eq!(real[2].opcode, Opcode::Sub);
    assert_eq!(real[2].args[2], Arg::Imm(8));
    assert_eq!(real[3].opcode, Opcode::Lw);
    assert_eq!(real[3].args, vec![reg(Register::B), reg(Register::Z)]);
  }

  #[test]
  fn skips_count_source_instructions() {
    // `sz a, 1` sits between two `push`es, each of which doubles; the skip
    // target is a source index, so it must land after the *second* pair.
    let (real, _) = expand(vec![
      instr("push", vec![reg(Register::Z), reg(Register::A)]),
      instr("sz", vec![reg(Register::A), Arg::Imm(1)]),
      instr("push", vec![reg(Register::Z), reg(Register::B)]),
      instr("halt", vec![Arg::Imm(0)]),
    ])
    .unwrap();
    assert_eq!(real[2].opcode, Opcode::Jz);
    // Source index 1 + skip 1 + 1 = source index 3, still unmapped here.
    assert_eq!(real[2].args[0], Arg::InstrRef(3));
  }

  #[test]
  fn skip_targets_must_stay_inside_the_program() {
    let error = expand(vec![instr("sz", vec![reg(Register::A), Arg::Imm(5)])]).unwrap_err();
    assert!(matches!(error, AsmError::SkipOutOfRange { line: 1 }));

    let error = expand(vec![instr("snz", vec![reg(Register::A), reg(Register::B)])]).unwrap_err();
    assert!(matches!(error, AsmError::NonConstantSkip { line: 1 }));
  }

  #[test]
  fn unknown_mnemonics_are_reported() {
    let error = expand(vec![instr("frob", vec![])]).unwrap_err();
    assert!(matches!(
      error,
      AsmError::UnknownInstruction { line: 1, ref name } if name == "frob"
    ));
  }

  #[test]
  fn real_instructions_pass_through() {
    let (real, _) = expand(vec![instr(
      "add",
      vec![reg(Register::A), reg(Register::B), Arg::Imm(5)],
    )])
    .unwrap();
    assert_eq!(real[0].opcode, Opcode::Add);
    assert_eq!(real[0].args.len(), 3);
  }

}
