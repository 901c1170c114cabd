/*!

  A tiny, fully deterministic CPU for scoring code-golf contests, together
  with the two programs that give it life: an assembler that lowers
  mnemonics into a dense bit-packed binary, and a virtual machine that
  executes that binary with cycle-exact timing.

  The machine has 26 registers `a`..`z` of 64 bits each (`z` starts at the
  stack base, everything else at zero), a byte-addressable data memory with
  heap, stack, and data regions plus one memory-mapped I/O cell, and a
  separate execution-only instruction memory. Cycle counts, the scoring
  currency, are fixed per opcode, so two conforming implementations must
  agree on every encoded byte and every executed cycle.

  The crate splits along the wire format:

    [`bytecode`]  the encoding both sides must agree on, bit for bit
    [`assembler`] text -> image: parsing, pseudo-instruction expansion,
                  data interning, and the label/size fixed point
    [`machine`]   image -> behavior: the decode/execute engine

*/

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod assembler;
pub mod bytecode;
pub mod machine;
pub mod register;

pub use assembler::{assemble, AsmError, DebugInfo, Program};
pub use bytecode::{Image, ImageError, Instruction, Opcode};
pub use machine::{Fault, FaultKind, Machine, MemoryLimits, RunState};
pub use register::{Register, RegisterSet, Word};
