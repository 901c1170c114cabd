/*!

  The wire format shared by the assembler and the virtual machine. Both sides
  must agree on these bytes bit for bit: contest scoring depends on encoded
  instruction lengths, so any drift here changes contest outcomes.

  An ordinary instruction is a 32 bit little-endian header (7 bit opcode id,
  then five 5 bit operand-kind codes, first operand in the low bits) followed
  by each explicit immediate in operand order. Registers and literal zeros
  contribute no immediate bytes, so the minimal instruction is exactly the
  4 byte header. `ret` is the single exception: id `0x7f`, with the 25 header
  bits above the opcode holding a register mask over `a`..`y`.

  Mnemonic and id mappings are carried by the `Opcode` enum itself: `strum`
  derives give the text form, `num_enum` derives give the numeric form, and
  the variant order fixes the id table.

*/

mod binary;
mod image;
mod opcode;
mod operand;

pub use binary::{
  decode_at, disassemble, pack_header, pack_ret_header, push_immediate,
  DecodeError, Instruction, Operand, HEADER_BYTES, OPERAND_SLOTS,
};
pub use image::{Image, ImageError, IMAGE_HEADER_BYTES};
pub use opcode::{opcode_from_id, Opcode, Signature, MAX_OPCODE, RET_OPCODE};
pub use operand::{narrowest_kind, ImmWidth, OperandKind};
