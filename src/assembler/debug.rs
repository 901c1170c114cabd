/*!

  The JSON debug sidecar the assembler can emit next to a binary: enough to
  symbolize an execution trace without re-running the assembler. Purely
  observational; the machine never reads it.

*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One instruction-stream byte offset and the 1-based source line it came
/// from.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
pub struct LineMarker {
  pub offset: u64,
  pub line: u32,
}

#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
pub struct DebugInfo {
  /// Every encoded instruction, in stream order.
  pub lines: Vec<LineMarker>,
  /// Resolved label addresses, by name.
  pub labels: BTreeMap<String, u64>,
}

impl DebugInfo {

  /// The source line owning the instruction at `offset`, if any.
  pub fn line_at(&self, offset: u64) -> Option<u32> {
    self
      .lines
      .iter()
      .find(|marker| marker.offset == offset)
      .map(|marker| marker.line)
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }

  pub fn from_json(text: &str) -> serde_json::Result<DebugInfo> {
    serde_json::from_str(text)
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sidecar_round_trips_through_json() {
    let mut info = DebugInfo::default();
    info.lines.push(LineMarker { offset: 0, line: 3 });
    info.lines.push(LineMarker { offset: 5, line: 4 });
    info.labels.insert("main".to_string(), 0);

    let json = info.to_json().unwrap();
    let back = DebugInfo::from_json(&json).unwrap();
    assert_eq!(back, info);
    assert_eq!(back.line_at(5), Some(4));
    assert_eq!(back.line_at(1), None);
  }

}
