/*!

  The register file of the machine: 26 named 64 bit slots, `a` through `z`.
  A register stores a raw bit pattern. Whether those bits are read as signed,
  unsigned, or truncated to a narrower width is decided by each instruction at
  the point of use and is never recorded in the slot itself.

  At program start every register is zero except `z`, which holds the stack
  base. `z` is the conventional stack pointer: `call` snapshots every register
  *except* `z`, and no `ret` mask bit exists for it, so mutations of `z` made
  by a callee are always visible to the caller.

  On the wire a register is an operand-kind code in `5..=30`, i.e.
  `5 + index`. The `ret` instruction instead packs a `RegisterSet` over
  `a`..`y` into the 25 header bits above its opcode.

*/

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumString, IntoStaticStr};

/// A register value: a raw 64 bit word.
pub type Word = u64;

/// The number of registers in the file.
pub const REGISTER_COUNT: usize = 26;

/// How many registers a `ret` mask can name: everything but `z`.
pub const MASKABLE_COUNT: usize = REGISTER_COUNT - 1;

// The stack base (the initial value of `z`) lives with the other address
// space constants in `machine::memory`.

/**
  One of the 26 registers. The discriminant is the register's index, so the
  order of the variants is significant: it fixes both the operand-kind code
  (`5 + index`) and the bit position in a `ret` mask.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq, PartialEq, Ord, PartialOrd, Debug, Hash
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
  A, B, C, D, E, F, G, H, I, J, K, L, M,
  N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
}

/// Every register, in index order.
pub const ALL_REGISTERS: [Register; REGISTER_COUNT] = [
  Register::A, Register::B, Register::C, Register::D, Register::E,
  Register::F, Register::G, Register::H, Register::I, Register::J,
  Register::K, Register::L, Register::M, Register::N, Register::O,
  Register::P, Register::Q, Register::R, Register::S, Register::T,
  Register::U, Register::V, Register::W, Register::X, Register::Y,
  Register::Z,
];

impl Register {

  /// The register's index into the register file, `0` for `a` .. `25` for `z`.
  pub fn index(self) -> usize {
    self as usize
  }

  pub fn from_index(index: usize) -> Option<Register> {
    Register::try_from(index as u8).ok()
  }

  pub fn letter(self) -> char {
    (b'a' + self as u8) as char
  }

}

/**
  A set of registers packed as a bitmask, bit `i` standing for the register
  with index `i`. This is the payload of a `ret` header: a set bit means the
  register carries its callee value through the return, a clear bit means the
  register is restored from the caller's snapshot. Bit 25 (`z`) has no meaning
  on the wire and is masked away.
*/
#[derive(Clone, Copy, Default, Eq, PartialEq, Debug, Hash)]
pub struct RegisterSet(u32);

/// Wire mask covering the 25 maskable registers `a`..`y`.
const MASKABLE_BITS: u32 = (1 << MASKABLE_COUNT as u32) - 1;

impl RegisterSet {

  pub fn empty() -> RegisterSet {
    RegisterSet(0)
  }

  /// Builds a set from the 25 mask bits of a `ret` header. Anything above
  /// bit 24 is discarded.
  pub fn from_bits(bits: u32) -> RegisterSet {
    RegisterSet(bits & MASKABLE_BITS)
  }

  pub fn bits(self) -> u32 {
    self.0 & MASKABLE_BITS
  }

  pub fn insert(&mut self, register: Register) {
    self.0 |= (1u32 << register.index() as u32) & MASKABLE_BITS;
  }

  pub fn contains(self, register: Register) -> bool {
    self.bits() & (1u32 << register.index() as u32) != 0
  }

  pub fn is_empty(self) -> bool {
    self.bits() == 0
  }

  pub fn iter(self) -> impl Iterator<Item = Register> {
    ALL_REGISTERS.iter().copied().filter(move |r| self.contains(*r))
  }

}

impl std::iter::FromIterator<Register> for RegisterSet {
  fn from_iter<T: IntoIterator<Item = Register>>(iter: T) -> RegisterSet {
    let mut set = RegisterSet::empty();
    for register in iter {
      set.insert(register);
    }
    set
  }
}

impl Display for RegisterSet {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let names: Vec<&'static str> = self.iter().map(Into::into).collect();
    write!(f, "{}", names.join(", "))
  }
}
