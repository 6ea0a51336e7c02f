use ropey::Rope;
use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

/// A point in a text snapshot.
/// 0-indexed line, column in UTF-16 code units.
#[derive(
  Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
  pub line:      u32,
  pub character: u32,
}

impl Position {
  pub const fn new(line: u32, character: u32) -> Self {
    Self { line, character }
  }

  pub const fn zero() -> Self {
    Self {
      line:      0,
      character: 0,
    }
  }
}

impl From<(u32, u32)> for Position {
  fn from(value: (u32, u32)) -> Self {
    Position::new(value.0, value.1)
  }
}

/// Half-open span between two positions of the same snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
  pub start: Position,
  pub end:   Position,
}

impl Range {
  pub const fn new(start: Position, end: Position) -> Self {
    Self { start, end }
  }

  pub const fn point(position: Position) -> Self {
    Self {
      start: position,
      end:   position,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
  #[error("offset {offset} is past the end of the text ({len} code units)")]
  OffsetOutOfBounds { offset: usize, len: usize },
  #[error("line {line} does not exist, the text has {len_lines} lines")]
  LineOutOfBounds { line: u32, len_lines: usize },
  #[error("column {character} is past the end of line {line} ({line_len} code units)")]
  ColumnOutOfBounds {
    line:      u32,
    character: u32,
    line_len:  usize,
  },
}

/// Converts a UTF-16 offset into the line/column it falls on.
///
/// `text` must be the exact snapshot the offset was computed against.
pub fn offset_to_position(text: &Rope, offset: usize) -> Result<Position, MappingError> {
  let len = text.len_utf16_cu();
  if offset > len {
    return Err(MappingError::OffsetOutOfBounds { offset, len });
  }

  let line = text.char_to_line(text.utf16_cu_to_char(offset));
  let line_start = text.char_to_utf16_cu(text.line_to_char(line));

  Ok(Position::new(
    saturating_u32(line),
    saturating_u32(offset - line_start),
  ))
}

/// Inverse of [`offset_to_position`].
///
/// A column may point anywhere up to the start of the next line, the line
/// break included.
pub fn position_to_offset(text: &Rope, position: Position) -> Result<usize, MappingError> {
  let line = position.line as usize;
  let len_lines = text.len_lines();
  if line >= len_lines {
    return Err(MappingError::LineOutOfBounds {
      line: position.line,
      len_lines,
    });
  }

  let line_start = text.char_to_utf16_cu(text.line_to_char(line));
  let line_end = if line + 1 < len_lines {
    text.char_to_utf16_cu(text.line_to_char(line + 1))
  } else {
    text.len_utf16_cu()
  };

  let offset = line_start + position.character as usize;
  if offset > line_end {
    return Err(MappingError::ColumnOutOfBounds {
      line:      position.line,
      character: position.character,
      line_len:  line_end - line_start,
    });
  }
  Ok(offset)
}

/// Range covering `len` code units starting at `offset`.
pub fn span_to_range(text: &Rope, offset: usize, len: usize) -> Result<Range, MappingError> {
  let start = offset_to_position(text, offset)?;
  if len == 0 {
    return Ok(Range::point(start));
  }
  let end = offset_to_position(text, offset + len)?;
  Ok(Range::new(start, end))
}

/// Range spanning the whole snapshot.
pub fn full_range(text: &Rope) -> Range {
  let last_line = text.len_lines().saturating_sub(1);
  let last_line_start = text.char_to_utf16_cu(text.line_to_char(last_line));
  Range::new(
    Position::zero(),
    Position::new(
      saturating_u32(last_line),
      saturating_u32(text.len_utf16_cu() - last_line_start),
    ),
  )
}

fn saturating_u32(value: usize) -> u32 {
  u32::try_from(value).unwrap_or(u32::MAX)
}
