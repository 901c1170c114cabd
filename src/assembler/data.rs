/*!

  The data interner: deduplication of literal byte blobs into the single
  contiguous data section of the output image.

  A blob is keyed by its exact serialized content, so two `data(...)`
  operands with content-equal arguments resolve to the same absolute
  address, and the section's final size is the sum of the unique blobs'
  lengths. Addresses are absolute (data-region base plus offset) and stable
  from the moment they are first handed out, which is what lets the resolver
  treat them as ordinary compile-time constants.

*/

use std::collections::HashMap;

use crate::machine::DATA_BASE;
use crate::register::Word;

/// A `data(...)` literal as written in the source.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DataLiteral {
  /// A quoted string: UTF-8 bytes plus a trailing NUL.
  Str(String),
  /// A byte string: the bytes, verbatim.
  Bytes(Vec<u8>),
  /// A list of 64 bit integers: little-endian 8 byte groups.
  Words(Vec<i128>),
}

impl DataLiteral {

  /// The blob's serialized form, the interner's key and the bytes that land
  /// in the section.
  pub fn encode(&self) -> Vec<u8> {
    match self {

      DataLiteral::Str(text) => {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        bytes
      }

      DataLiteral::Bytes(bytes) => bytes.clone(),

      DataLiteral::Words(words) => {
        let mut bytes = Vec::with_capacity(words.len() * 8);
        for word in words {
          bytes.extend_from_slice(&(*word as u64).to_le_bytes());
        }
        bytes
      }

    }
  }

}

pub(crate) struct DataInterner {
  offsets: HashMap<Vec<u8>, Word>,
  section: Vec<u8>,
}

impl DataInterner {

  pub fn new() -> DataInterner {
    DataInterner { offsets: HashMap::new(), section: vec![] }
  }

  /// The absolute address of the blob, appending it to the section on first
  /// sight.
  pub fn intern(&mut self, literal: &DataLiteral) -> Word {
    let blob = literal.encode();
    if let Some(address) = self.offsets.get(&blob) {
      return *address;
    }
    let address = DATA_BASE + self.section.len() as Word;
    self.section.extend_from_slice(&blob);
    self.offsets.insert(blob, address);
    address
  }

  pub fn into_section(self) -> Vec<u8> {
    self.section
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strings_gain_a_trailing_nul() {
    assert_eq!(DataLiteral::Str("hi".into()).encode(), b"hi\x00");
    assert_eq!(DataLiteral::Str("".into()).encode(), b"\x00");
  }

  #[test]
  fn words_serialize_little_endian() {
    assert_eq!(
      DataLiteral::Words(vec![1, -1]).encode(),
      [1, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    );
  }

  #[test]
  fn identical_content_shares_an_address() {
    let mut interner = DataInterner::new();
    let first = interner.intern(&DataLiteral::Str("x".into()));
    let second = interner.intern(&DataLiteral::Str("x".into()));
    let other = interner.intern(&DataLiteral::Str("y".into()));
    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(first, DATA_BASE);
    assert_eq!(other, DATA_BASE + 2);

    // "x" as a string and as bytes differ (the NUL), so they are distinct.
    let raw = interner.intern(&DataLiteral::Bytes(b"x".to_vec()));
    assert_ne!(raw, first);

    // Section size is the sum of the three unique blobs.
    assert_eq!(interner.into_section().len(), 2 + 2 + 1);
  }

}
