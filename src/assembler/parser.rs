/*!

  The assembly text frontend. Source is line oriented; every significant
  line is one of

    name:                a label definition (names are two or more chars,
                         so they can never collide with a register)
    name = value         a compile-time constant binding
    op a, b, 123         an instruction with comma separated operands

  `#` starts a comment, a trailing `\` splices the next line on, and blank
  lines are ignored. Operands are registers (one lowercase letter), integer
  literals (decimal, `0x` hex, or a character literal, optionally negated),
  symbols bound earlier, or `data(...)` blobs: a quoted string, a `b"..."`
  byte string, or a comma separated integer list.

  Parsing produces `Item`s whose operands are still symbolic; binding
  symbols to label indices or constant values is the assembler driver's job.

*/

use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{is_not, tag, take_while, take_while_m_n},
  character::complete::{char as one_char, digit1, hex_digit1, none_of, space0},
  combinator::{all_consuming, map, map_res, opt, recognize, rest, value, verify},
  multi::{fold_many0, separated_list},
  sequence::{delimited, pair, preceded, separated_pair, terminated},
  IResult,
};
use string_cache::DefaultAtom;

use crate::register::Register;
use super::data::DataLiteral;
use super::AsmError;

/// An operand as written, before symbol binding.
#[derive(Clone, Debug)]
pub(crate) enum RawOperand {
  Register(Register),
  Number(i128),
  Symbol(DefaultAtom),
  Blob(DataLiteral),
}

/// One significant source line.
#[derive(Clone, Debug)]
pub(crate) enum Item {
  Label { line: u32, name: DefaultAtom },
  Assign { line: u32, name: DefaultAtom, value: RawOperand },
  Instr { line: u32, name: String, operands: Vec<RawOperand> },
}

// region Token parsers

fn is_name_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// One or more identifier characters; a single lowercase letter is a
/// register reference when used as an operand.
fn name(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    take_while_m_n(1, 1, is_name_start),
    take_while(is_name_continue),
  ))(input)
}

/// Identifiers that may head a line (labels, constants, mnemonics) need at
/// least two characters.
fn long_name(input: &str) -> IResult<&str, &str> {
  verify(name, |s: &str| s.len() >= 2)(input)
}

fn dec_number(input: &str) -> IResult<&str, i128> {
  map_res(digit1, i128::from_str)(input)
}

fn hex_number(input: &str) -> IResult<&str, i128> {
  map_res(
    preceded(alt((tag("0x"), tag("0X"))), hex_digit1),
    |digits| i128::from_str_radix(digits, 16),
  )(input)
}

fn number(input: &str) -> IResult<&str, i128> {
  map(
    pair(opt(one_char('-')), alt((hex_number, dec_number))),
    |(sign, magnitude)| if sign.is_some() { -magnitude } else { magnitude },
  )(input)
}

fn escape_char(input: &str) -> IResult<&str, char> {
  preceded(
    one_char('\\'),
    alt((
      value('\\', one_char('\\')),
      value('"', one_char('"')),
      value('\'', one_char('\'')),
      value('\n', one_char('n')),
      value('\t', one_char('t')),
      value('\r', one_char('r')),
      value('\0', one_char('0')),
      map_res(
        preceded(
          one_char('x'),
          take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        ),
        |digits| u8::from_str_radix(digits, 16).map(|byte| byte as char),
      ),
    )),
  )(input)
}

fn char_literal(input: &str) -> IResult<&str, i128> {
  delimited(
    one_char('\''),
    map(alt((escape_char, none_of("\\'"))), |c| c as i128),
    one_char('\''),
  )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
  delimited(
    one_char('"'),
    fold_many0(
      alt((
        map(is_not("\"\\"), |s: &str| s.to_string()),
        map(escape_char, |c| c.to_string()),
      )),
      String::new(),
      |mut acc, fragment| {
        acc.push_str(&fragment);
        acc
      },
    ),
    one_char('"'),
  )(input)
}

fn byte_string(input: &str) -> IResult<&str, Vec<u8>> {
  preceded(
    one_char('b'),
    delimited(
      one_char('"'),
      fold_many0(
        alt((
          map(is_not("\"\\"), |s: &str| s.as_bytes().to_vec()),
          // The escape set tops out at \xff, so the cast is lossless.
          map(escape_char, |c| vec![c as u32 as u8]),
        )),
        Vec::new(),
        |mut acc, fragment: Vec<u8>| {
          acc.extend_from_slice(&fragment);
          acc
        },
      ),
      one_char('"'),
    ),
  )(input)
}

fn data_literal(input: &str) -> IResult<&str, DataLiteral> {
  preceded(
    pair(tag("data"), space0),
    delimited(
      pair(one_char('('), space0),
      alt((
        map(string_literal, DataLiteral::Str),
        map(byte_string, DataLiteral::Bytes),
        map(
          separated_list(
            delimited(space0, one_char(','), space0),
            alt((number, char_literal)),
          ),
          DataLiteral::Words,
        ),
      )),
      pair(space0, one_char(')')),
    ),
  )(input)
}

fn operand(input: &str) -> IResult<&str, RawOperand> {
  alt((
    map(data_literal, RawOperand::Blob),
    map(number, RawOperand::Number),
    map(char_literal, RawOperand::Number),
    map(name, |s: &str| {
      match (s.len(), Register::from_str(s)) {
        (1, Ok(register)) => RawOperand::Register(register),
        _                 => RawOperand::Symbol(DefaultAtom::from(s)),
      }
    }),
  ))(input)
}

// endregion

// region Line parser

/// A parsed line, before its number is attached.
enum LineBody {
  Label(DefaultAtom),
  Assign(DefaultAtom, RawOperand),
  Instr(String, Vec<RawOperand>),
}

fn line_tail(input: &str) -> IResult<&str, ()> {
  value((), pair(space0, opt(pair(one_char('#'), rest))))(input)
}

fn label_line(input: &str) -> IResult<&str, LineBody> {
  map(
    terminated(terminated(long_name, space0), one_char(':')),
    |s| LineBody::Label(DefaultAtom::from(s)),
  )(input)
}

fn assign_line(input: &str) -> IResult<&str, LineBody> {
  map(
    separated_pair(
      long_name,
      delimited(space0, one_char('='), space0),
      operand,
    ),
    |(s, value)| LineBody::Assign(DefaultAtom::from(s), value),
  )(input)
}

fn instr_line(input: &str) -> IResult<&str, LineBody> {
  map(
    pair(
      long_name,
      opt(preceded(
        space0,
        separated_list(delimited(space0, one_char(','), space0), operand),
      )),
    ),
    |(mnemonic, operands)| {
      LineBody::Instr(mnemonic.to_string(), operands.unwrap_or_default())
    },
  )(input)
}

fn line(input: &str) -> IResult<&str, LineBody> {
  all_consuming(terminated(
    preceded(space0, alt((label_line, assign_line, instr_line))),
    line_tail,
  ))(input)
}

// endregion

/// Splices continuation lines, drops blanks and comments, and parses what
/// remains. Line numbers are 1-based and refer to the first physical line
/// of a spliced group.
pub(crate) fn parse_source(text: &str) -> Result<Vec<Item>, AsmError> {
  let physical: Vec<&str> = text.lines().collect();

  // Handle line continuation.
  let mut logical: Vec<(u32, String)> = vec![];
  let mut i = 0;
  while i < physical.len() {
    let line_number = (i + 1) as u32;
    let mut text = physical[i].trim_end().to_string();
    while text.ends_with('\\') && i + 1 < physical.len() {
      text.pop();
      i += 1;
      text.push_str(physical[i].trim_end());
    }
    if text.ends_with('\\') {
      text.pop();
    }
    logical.push((line_number, text));
    i += 1;
  }

  let mut items = vec![];
  for (line_number, text) in logical {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
      continue;
    }

    match line(trimmed) {
      Ok((_, LineBody::Label(name))) => {
        items.push(Item::Label { line: line_number, name });
      }
      Ok((_, LineBody::Assign(name, value))) => {
        items.push(Item::Assign { line: line_number, name, value });
      }
      Ok((_, LineBody::Instr(name, operands))) => {
        items.push(Item::Instr { line: line_number, name, operands });
      }
      Err(_) => {
        return Err(AsmError::Syntax {
          line: line_number,
          message: format!("unrecognized line `{}`", trimmed),
        });
      }
    }
  }

  Ok(items)
}


#[cfg(test)]
mod tests {
  use super::*;

  fn parse_one(text: &str) -> Item {
    let mut items = parse_source(text).unwrap();
    assert_eq!(items.len(), 1);
    items.remove(0)
  }

  #[test]
  fn labels_assignments_and_instructions() {
    match parse_one("loop:  # top of loop") {
      Item::Label { name, .. } => assert_eq!(&*name, "loop"),
      item => panic!("unexpected item {:?}", item),
    }

    match parse_one("size = 0x40") {
      Item::Assign { name, value: RawOperand::Number(64), .. } => {
        assert_eq!(&*name, "size")
      }
      item => panic!("unexpected item {:?}", item),
    }

    match parse_one("add a, b, -12") {
      Item::Instr { name, operands, .. } => {
        assert_eq!(name, "add");
        assert!(matches!(operands[0], RawOperand::Register(Register::A)));
        assert!(matches!(operands[1], RawOperand::Register(Register::B)));
        assert!(matches!(operands[2], RawOperand::Number(-12)));
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn bare_mnemonics_parse_with_no_operands() {
    match parse_one("ret") {
      Item::Instr { name, operands, .. } => {
        assert_eq!(name, "ret");
        assert!(operands.is_empty());
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn symbols_and_registers_are_distinguished_by_length() {
    match parse_one("jz done, a") {
      Item::Instr { operands, .. } => {
        assert!(matches!(&operands[0], RawOperand::Symbol(s) if &**s == "done"));
        assert!(matches!(operands[1], RawOperand::Register(Register::A)));
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn numeric_forms() {
    match parse_one("halt 'A'") {
      Item::Instr { operands, .. } => {
        assert!(matches!(operands[0], RawOperand::Number(65)));
      }
      item => panic!("unexpected item {:?}", item),
    }

    match parse_one("mov a, -0x80") {
      Item::Instr { operands, .. } => {
        assert!(matches!(operands[1], RawOperand::Number(-128)));
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn data_blob_forms() {
    match parse_one(r#"mov a, data("hi # not a comment")"#) {
      Item::Instr { operands, .. } => {
        assert!(matches!(
          &operands[1],
          RawOperand::Blob(DataLiteral::Str(s)) if s == "hi # not a comment"
        ));
      }
      item => panic!("unexpected item {:?}", item),
    }

    match parse_one(r#"mov a, data(b"\x00\xff")"#) {
      Item::Instr { operands, .. } => {
        assert!(matches!(
          &operands[1],
          RawOperand::Blob(DataLiteral::Bytes(bytes)) if bytes == &[0x00, 0xff]
        ));
      }
      item => panic!("unexpected item {:?}", item),
    }

    match parse_one("mov a, data(1, 2, -3)") {
      Item::Instr { operands, .. } => {
        assert!(matches!(
          &operands[1],
          RawOperand::Blob(DataLiteral::Words(words)) if words == &[1, 2, -3]
        ));
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn string_escapes() {
    match parse_one(r#"mov a, data("a\n\x41\"")"#) {
      Item::Instr { operands, .. } => {
        assert!(matches!(
          &operands[1],
          RawOperand::Blob(DataLiteral::Str(s)) if s == "a\nA\""
        ));
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn continuation_lines_splice() {
    let items = parse_source("add a, \\\n  b, 3\n").unwrap();
    assert_eq!(items.len(), 1);
    match &items[0] {
      Item::Instr { line, operands, .. } => {
        assert_eq!(*line, 1);
        assert_eq!(operands.len(), 3);
      }
      item => panic!("unexpected item {:?}", item),
    }
  }

  #[test]
  fn junk_is_rejected_with_its_line_number() {
    let error = parse_source("add a, b, 1\n$$$\n").unwrap_err();
    match error {
      AsmError::Syntax { line, .. } => assert_eq!(line, 2),
      error => panic!("unexpected error {:?}", error),
    }

    // A single letter cannot head a line.
    assert!(parse_source("a:").is_err());
  }

  #[test]
  fn comments_and_blanks_disappear() {
    let items = parse_source("# header\n\n   \nadd a, a, 1 # trailing\n").unwrap();
    assert_eq!(items.len(), 1);
  }

}
