//! `spotless_diff` turns a document and its formatted counterpart into a
//! minimal list of edits and maps those edits to editor coordinates.
//!
//! Offsets are counted in UTF-16 code units and columns likewise, which is
//! how editor buffers index text. Lines are broken by `\n`, `\r\n` and `\r`.

pub mod diff;
pub mod position;

mod document;

pub use diff::{
  DiffEntry,
  DiffOptions,
  Operation,
};
pub use document::DocumentDiff;
pub use position::{
  MappingError,
  Position,
  Range,
};
