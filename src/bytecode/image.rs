/*!

  The on-disk binary image. Layout, bit exact:

    offset 0      u32 little-endian    data section length L
    offset 4      L bytes              data section contents
    offset 4+L    instruction stream   to end of file

  The data section is copied into the data region of memory at load time;
  the instruction stream becomes the execution-only instruction memory.

*/

use thiserror::Error;

/// Byte length of the data-length header.
pub const IMAGE_HEADER_BYTES: usize = 4;

#[derive(Error, Clone, Copy, Eq, PartialEq, Debug)]
pub enum ImageError {
  #[error("image is shorter than its four byte header")]
  MissingHeader,
  #[error("image declares {declared} data bytes but only {available} are present")]
  TruncatedData { declared: usize, available: usize },
  #[error("data section of {0} bytes exceeds the u32 length header")]
  OversizedData(usize),
}

/// A loaded (or freshly assembled) binary: the data section plus the
/// instruction stream, with the length header already stripped.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Image {
  pub data: Vec<u8>,
  pub code: Vec<u8>,
}

impl Image {

  pub fn new(data: Vec<u8>, code: Vec<u8>) -> Image {
    Image { data, code }
  }

  /// Serializes to the on-disk format.
  pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
    if self.data.len() > u32::max_value() as usize {
      return Err(ImageError::OversizedData(self.data.len()));
    }
    let mut bytes = Vec::with_capacity(IMAGE_HEADER_BYTES + self.data.len() + self.code.len());
    bytes.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&self.data);
    bytes.extend_from_slice(&self.code);
    Ok(bytes)
  }

  /// Splits a file back into data section and instruction stream.
  pub fn from_bytes(bytes: &[u8]) -> Result<Image, ImageError> {
    if bytes.len() < IMAGE_HEADER_BYTES {
      return Err(ImageError::MissingHeader);
    }
    let declared =
      u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let rest = &bytes[IMAGE_HEADER_BYTES..];
    if rest.len() < declared {
      return Err(ImageError::TruncatedData { declared, available: rest.len() });
    }
    Ok(Image {
      data: rest[..declared].to_vec(),
      code: rest[declared..].to_vec(),
    })
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_round_trips() {
    let image = Image::new(vec![1, 2, 3], vec![0xaa, 0xbb]);
    let bytes = image.to_bytes().unwrap();
    assert_eq!(&bytes[..4], &[3, 0, 0, 0]);
    assert_eq!(Image::from_bytes(&bytes).unwrap(), image);
  }

  #[test]
  fn empty_data_section_is_legal() {
    let image = Image::new(vec![], vec![0x21, 0, 0, 0]);
    let bytes = image.to_bytes().unwrap();
    assert_eq!(bytes.len(), 8);
    let loaded = Image::from_bytes(&bytes).unwrap();
    assert!(loaded.data.is_empty());
    assert_eq!(loaded.code.len(), 4);
  }

  #[test]
  fn truncation_is_detected() {
    assert_eq!(Image::from_bytes(&[0, 0]), Err(ImageError::MissingHeader));
    assert_eq!(
      Image::from_bytes(&[10, 0, 0, 0, 1, 2]),
      Err(ImageError::TruncatedData { declared: 10, available: 2 })
    );
  }

}
