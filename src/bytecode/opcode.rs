/*!

  The opcode table: every real instruction's mnemonic, 7 bit wire id, operand
  signature, and cycle cost. Pseudo-instructions never reach this table; the
  assembler rewrites them into the instructions below before sizing begins.

*/

use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// Wire id of `ret`, the one instruction whose header carries a register mask
/// instead of operand-kind codes.
pub const RET_OPCODE: u8 = 0x7f;

/// Largest ordinary opcode id; ids run contiguously from `0x00`.
pub const MAX_OPCODE: u8 = 0x22;

/**
  Opcodes of the virtual machine.

  Rust stores these variants as bytes, and the discriminant *is* the 7 bit
  wire id, so the order the opcodes are listed below is significant: changing
  it changes the binary format. `Ret` sits apart at `0x7f` because its header
  layout is unique (a 25 bit register mask rather than five operand-kind
  codes).
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq, Debug,         Hash
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
  // Arithmetic //
  Add = 0x00,
  Sub,
  Mul,
  Mulu,
  Div,
  Divu,
  // Bitwise and logical //
  And,
  Or,
  Xor,
  Not,
  // Shifts //
  Shl,
  Shr,
  Sar,
  // Comparisons, 0 or 1 into the destination //
  Cmp,
  Neq,
  Le,
  Leq,
  Leu,
  Lequ,
  // Loads, sign extending unless `u`-suffixed //
  Lb,
  Lbu,
  Ls,
  Lsu,
  Li,
  Liu,
  Lw,
  // Stores of the low 1/2/4/8 bytes //
  Sb,
  Ss,
  Si,
  Sw,
  // Control flow and the rest //
  Jz,
  Jnz,
  Call,
  Halt,
  Rand,    // Opcode 0x22

  // Register-mask return //
  Ret = RET_OPCODE,
}

/**
  An opcode's operand signature. The first `outputs` operands must be
  destination registers; the remaining `inputs` operands may be registers or
  immediates. `ret` has no signature in this sense, its operands being the
  mask itself.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Signature {
  pub outputs: usize,
  pub inputs: usize,
}

impl Signature {
  pub fn arity(&self) -> usize {
    self.outputs + self.inputs
  }
}

impl Opcode {

  pub fn code(self) -> u8 {
    Into::<u8>::into(self)
  }

  pub fn signature(self) -> Signature {
    use Opcode::*;
    let (outputs, inputs) = match self {
      | Add | Sub | And | Or | Xor | Shl | Shr | Sar
      | Cmp | Neq | Le | Leq | Leu | Lequ             => (1, 2),

      | Mul | Mulu | Div | Divu                       => (2, 2),

      Not                                             => (1, 1),

      | Lb | Lbu | Ls | Lsu | Li | Liu | Lw           => (1, 1),

      | Sb | Ss | Si | Sw                             => (0, 2),

      | Jz | Jnz                                      => (0, 2),

      | Call | Halt                                   => (0, 1),

      Rand                                            => (1, 0),

      // The mask is decoded separately; `ret` never reads operand slots.
      Ret                                             => (0, 0),
    };
    Signature { outputs, inputs }
  }

  /// Fixed cycle cost, the contest scoring currency. Memory traffic and
  /// division are deliberately expensive relative to plain ALU work.
  pub fn cycles(self) -> u64 {
    use Opcode::*;
    match self {
      | Add | Sub | And | Or | Xor | Not
      | Shl | Shr | Sar
      | Cmp | Neq | Le | Leq | Leu | Lequ   => 2,

      | Mul | Mulu                          => 6,

      | Div | Divu                          => 32,

      | Lb | Lbu | Ls | Lsu | Li | Liu | Lw
      | Sb | Ss | Si | Sw                   => 12,

      | Jz | Jnz                            => 4,

      | Call | Ret                          => 16,

      Rand                                  => 8,

      Halt                                  => 9,
    }
  }

}

/// Looks an opcode up by wire id.
pub fn opcode_from_id(id: u8) -> Option<Opcode> {
  Opcode::try_from(id).ok()
}
