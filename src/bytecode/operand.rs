/*!

  Operand-kind codes, the five 5 bit fields packed above the opcode in every
  ordinary instruction header. A kind code tells the decoder what one operand
  is and how many immediate bytes it contributes:

    0        immediate literal zero, no bytes
    1..=4    signed immediate of 1/2/4/8 bytes (the 8 byte form is a raw
             64 bit pattern, not sign extended)
    5..=30   register `a`..`z`
    31       unassigned

  Trailing zero codes are how "fewer than five operands" is expressed, so a
  kind of `Zero` and an absent operand are indistinguishable on the wire.

*/

use std::convert::TryFrom;

use crate::register::Register;

/// Bit width of one kind code.
pub const KIND_BITS: u32 = 5;

/// Mask for one kind code.
pub const KIND_MASK: u32 = (1 << KIND_BITS) - 1;

/// Kind codes `5..=30` are registers.
pub const FIRST_REGISTER_CODE: u8 = 5;

/// Width of an explicit immediate, selected by kind codes `1..=4`.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ImmWidth {
  One,
  Two,
  Four,
  Eight,
}

impl ImmWidth {

  pub fn code(self) -> u8 {
    match self {
      ImmWidth::One   => 1,
      ImmWidth::Two   => 2,
      ImmWidth::Four  => 3,
      ImmWidth::Eight => 4,
    }
  }

  pub fn from_code(code: u8) -> Option<ImmWidth> {
    match code {
      1 => Some(ImmWidth::One),
      2 => Some(ImmWidth::Two),
      3 => Some(ImmWidth::Four),
      4 => Some(ImmWidth::Eight),
      _ => None,
    }
  }

  pub fn bytes(self) -> usize {
    match self {
      ImmWidth::One   => 1,
      ImmWidth::Two   => 2,
      ImmWidth::Four  => 4,
      ImmWidth::Eight => 8,
    }
  }

}

/// A decoded 5 bit operand-kind field.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OperandKind {
  /// Immediate zero, occupying no immediate bytes.
  Zero,
  /// An explicit immediate of the given width follows in the immediate area.
  Imm(ImmWidth),
  /// A register; the operand's value lives in the register file.
  Reg(Register),
}

impl OperandKind {

  pub fn code(self) -> u8 {
    match self {
      OperandKind::Zero         => 0,
      OperandKind::Imm(width)   => width.code(),
      OperandKind::Reg(register) =>
        FIRST_REGISTER_CODE + register.index() as u8,
    }
  }

  pub fn from_code(code: u8) -> Option<OperandKind> {
    match code {
      0 => Some(OperandKind::Zero),
      1..=4 => ImmWidth::from_code(code).map(OperandKind::Imm),
      _ => {
        let register = Register::try_from(code.checked_sub(FIRST_REGISTER_CODE)?).ok()?;
        Some(OperandKind::Reg(register))
      }
    }
  }

  /// How many bytes this operand contributes to the immediate area.
  pub fn imm_bytes(self) -> usize {
    match self {
      OperandKind::Imm(width) => width.bytes(),
      _ => 0,
    }
  }

  pub fn is_register(self) -> bool {
    match self {
      OperandKind::Reg(_) => true,
      _ => false,
    }
  }

}

/**
  The narrowest kind that encodes a compile-time value exactly. Values are
  carried as `i128` so one type spans the full accepted range
  `-2^63 <= v < 2^64`; anything in `2^63 .. 2^64` only fits the raw 8 byte
  form, as do negatives below `i32::MIN`.
*/
pub fn narrowest_kind(value: i128) -> OperandKind {
  if value == 0 {
    OperandKind::Zero
  } else if -(1 << 7) <= value && value < (1 << 7) {
    OperandKind::Imm(ImmWidth::One)
  } else if -(1 << 15) <= value && value < (1 << 15) {
    OperandKind::Imm(ImmWidth::Two)
  } else if -(1 << 31) <= value && value < (1 << 31) {
    OperandKind::Imm(ImmWidth::Four)
  } else {
    OperandKind::Imm(ImmWidth::Eight)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_codes_round_trip() {
    for code in 0..=30u8 {
      let kind = OperandKind::from_code(code).unwrap();
      assert_eq!(kind.code(), code);
    }
    assert_eq!(OperandKind::from_code(31), None);
    assert_eq!(
      OperandKind::from_code(5),
      Some(OperandKind::Reg(Register::A))
    );
    assert_eq!(
      OperandKind::from_code(30),
      Some(OperandKind::Reg(Register::Z))
    );
  }

  #[test]
  fn immediate_widths() {
    assert_eq!(ImmWidth::from_code(3).unwrap().bytes(), 4);
    assert_eq!(OperandKind::Imm(ImmWidth::Eight).imm_bytes(), 8);
    assert_eq!(OperandKind::Zero.imm_bytes(), 0);
    assert_eq!(OperandKind::Reg(Register::Q).imm_bytes(), 0);
  }

  #[test]
  fn narrowest_kind_picks_minimal_signed_ranges() {
    assert_eq!(narrowest_kind(0), OperandKind::Zero);
    assert_eq!(narrowest_kind(127), OperandKind::Imm(ImmWidth::One));
    assert_eq!(narrowest_kind(-128), OperandKind::Imm(ImmWidth::One));
    assert_eq!(narrowest_kind(128), OperandKind::Imm(ImmWidth::Two));
    assert_eq!(narrowest_kind(-32768), OperandKind::Imm(ImmWidth::Two));
    assert_eq!(narrowest_kind(32768), OperandKind::Imm(ImmWidth::Four));
    assert_eq!(narrowest_kind((1 << 31) - 1), OperandKind::Imm(ImmWidth::Four));
    assert_eq!(narrowest_kind(1 << 31), OperandKind::Imm(ImmWidth::Eight));
    assert_eq!(narrowest_kind(-(1i128 << 63)), OperandKind::Imm(ImmWidth::Eight));
    assert_eq!(narrowest_kind(u64::MAX as i128), OperandKind::Imm(ImmWidth::Eight));
  }

}
