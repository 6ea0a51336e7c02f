//! Minimal edit scripts between a document and its formatted version.
//!
//! The texts are diffed line by line first. Every changed line hunk is then
//! refined with a character (small hunks) or word (large hunks) diff so the
//! reported entries point at exactly what the formatter touched.

use std::{
  ops::Range,
  sync::Arc,
  time::Instant,
};

use imara_diff::{
  Algorithm,
  Diff,
  IndentHeuristic,
  IndentLevel,
  InternedInput,
};
use ropey::{
  Rope,
  RopeSlice,
};
use serde::{
  Deserialize,
  Serialize,
};

use crate::position::MappingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
  Insert,
  Delete,
  Replace,
}

/// One atomic change between two versions of a text.
///
/// `offset` is a UTF-16 offset into the old text. Deleted text is always the
/// exact substring of the old text starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DiffEntry {
  Insert {
    offset:      usize,
    insert_text: String,
  },
  Delete {
    offset:      usize,
    delete_text: String,
  },
  Replace {
    offset:      usize,
    delete_text: String,
    insert_text: String,
  },
}

impl DiffEntry {
  /// Builds the entry kind matching which sides are non-empty, `None` for a
  /// no-op.
  pub fn new(offset: usize, delete_text: String, insert_text: String) -> Option<Self> {
    match (delete_text.is_empty(), insert_text.is_empty()) {
      (true, true) => None,
      (true, false) => Some(Self::Insert {
        offset,
        insert_text,
      }),
      (false, true) => Some(Self::Delete {
        offset,
        delete_text,
      }),
      (false, false) => Some(Self::Replace {
        offset,
        delete_text,
        insert_text,
      }),
    }
  }

  pub fn operation(&self) -> Operation {
    match self {
      Self::Insert { .. } => Operation::Insert,
      Self::Delete { .. } => Operation::Delete,
      Self::Replace { .. } => Operation::Replace,
    }
  }

  pub fn offset(&self) -> usize {
    match self {
      Self::Insert { offset, .. } | Self::Delete { offset, .. } | Self::Replace { offset, .. } => {
        *offset
      },
    }
  }

  pub fn delete_text(&self) -> Option<&str> {
    match self {
      Self::Insert { .. } => None,
      Self::Delete { delete_text, .. } | Self::Replace { delete_text, .. } => Some(delete_text),
    }
  }

  pub fn insert_text(&self) -> Option<&str> {
    match self {
      Self::Delete { .. } => None,
      Self::Insert { insert_text, .. } | Self::Replace { insert_text, .. } => Some(insert_text),
    }
  }

  /// Length of the deleted text in UTF-16 code units.
  pub fn delete_len(&self) -> usize {
    self
      .delete_text()
      .map_or(0, |text| text.encode_utf16().count())
  }

  /// Offset just past the deleted text.
  pub fn end_offset(&self) -> usize {
    self.offset() + self.delete_len()
  }

  fn merge(self, next: DiffEntry) -> DiffEntry {
    let offset = self.offset();
    let mut delete_text = self.delete_text().unwrap_or_default().to_owned();
    let mut insert_text = self.insert_text().unwrap_or_default().to_owned();
    delete_text.push_str(next.delete_text().unwrap_or_default());
    insert_text.push_str(next.insert_text().unwrap_or_default());
    // both sides of a merged pair cannot be empty
    DiffEntry::new(offset, delete_text, insert_text).unwrap_or(next)
  }
}

/// Limits deciding how finely a changed line hunk is diffed.
#[derive(Debug, Clone)]
pub struct DiffOptions {
  /// Tab width used when sliding hunks to line up with indentation.
  pub indent_width:      u8,
  /// Hunks spanning more lines than this are reported whole.
  pub refine_max_lines:  u32,
  /// Hunks with more chars than this, both sides together, are reported whole.
  pub refine_max_chars:  usize,
  /// A side longer than this multiple of the other marks a lopsided hunk.
  pub refine_max_growth: u32,
  pub bulk_delete_lines: u32,
  pub bulk_delete_chars: usize,
  /// Refined hunks at least this large are diffed by words instead of chars.
  pub word_threshold:    usize,
}

impl Default for DiffOptions {
  fn default() -> Self {
    const LINE_WIDTH: usize = 200;
    Self {
      indent_width:      4,
      refine_max_lines:  200,
      refine_max_chars:  200 * LINE_WIDTH,
      refine_max_growth: 5,
      bulk_delete_lines: 10,
      bulk_delete_chars: 10 * LINE_WIDTH,
      word_threshold:    1024,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refinement {
  Whole,
  Words,
  Chars,
}

impl DiffOptions {
  fn refinement(&self, lines: (u32, u32), chars: (usize, usize)) -> Refinement {
    let (old_lines, new_lines) = lines;
    // pure insertions and removals have nothing to refine
    if old_lines == 0 || new_lines == 0 {
      return Refinement::Whole;
    }

    let (old, new) = (chars.0 as u64, chars.1 as u64);
    let growth = u64::from(self.refine_max_growth);
    let too_large = u64::from(old_lines) + u64::from(new_lines) > u64::from(self.refine_max_lines)
      || old + new > self.refine_max_chars as u64;
    let bulk_delete = old > growth.saturating_mul(new)
      && (old_lines > self.bulk_delete_lines || chars.0 > self.bulk_delete_chars);
    if too_large || bulk_delete || new > growth.saturating_mul(old) {
      Refinement::Whole
    } else if old + new >= self.word_threshold as u64 {
      Refinement::Words
    } else {
      Refinement::Chars
    }
  }
}

/// A run of word chars, whitespace or punctuation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct Word(Arc<str>);

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
  Space,
  Ident,
  Punct,
}

impl CharClass {
  fn of(ch: char) -> Self {
    match ch {
      ch if ch.is_whitespace() => Self::Space,
      ch if ch.is_alphanumeric() || ch == '_' => Self::Ident,
      _ => Self::Punct,
    }
  }
}

/// Splits `chars` into words. The second vector holds the char offset each
/// word starts at, followed by the total length.
fn split_words(chars: impl Iterator<Item = char>) -> (Vec<Word>, Vec<usize>) {
  let mut words = Vec::new();
  let mut starts = vec![0];
  let mut word = String::new();
  let mut class = None;
  let mut pos = 0;

  for ch in chars {
    let next = CharClass::of(ch);
    if class.is_some_and(|class| class != next) {
      words.push(Word(Arc::from(std::mem::take(&mut word))));
      starts.push(pos);
    }
    word.push(ch);
    class = Some(next);
    pos += 1;
  }
  if !word.is_empty() {
    words.push(Word(Arc::from(word)));
    starts.push(pos);
  }
  (words, starts)
}

/// The entry replacing the `removed` chars of `old` with the `added` chars of
/// `new`.
fn entry_between(
  old: RopeSlice,
  new: RopeSlice,
  removed: Range<usize>,
  added: Range<usize>,
) -> Option<DiffEntry> {
  let offset = old.char_to_utf16_cu(removed.start);
  DiffEntry::new(
    offset,
    old.slice(removed).to_string(),
    new.slice(added).to_string(),
  )
}

fn line_span(text: RopeSlice, lines: &Range<u32>) -> Range<usize> {
  text.line_to_char(lines.start as usize)..text.line_to_char(lines.end as usize)
}

/// Turns line hunks into entries, refining each one as far as its size
/// allows.
struct Refiner<'a> {
  entries:    Vec<DiffEntry>,
  old_text:   RopeSlice<'a>,
  new_text:   RopeSlice<'a>,
  options:    &'a DiffOptions,
  chars:      InternedInput<char>,
  words:      InternedInput<Word>,
  token_diff: Diff,
}

impl Refiner<'_> {
  fn hunk(&mut self, old_lines: Range<u32>, new_lines: Range<u32>) {
    let old = line_span(self.old_text, &old_lines);
    let new = line_span(self.new_text, &new_lines);
    let refinement = self.options.refinement(
      (old_lines.end - old_lines.start, new_lines.end - new_lines.start),
      (old.len(), new.len()),
    );
    match refinement {
      Refinement::Whole => {
        self
          .entries
          .extend(entry_between(self.old_text, self.new_text, old, new));
      },
      Refinement::Words => self.by_words(old, new),
      Refinement::Chars => self.by_chars(old, new),
    }
  }

  fn by_chars(&mut self, old: Range<usize>, new: Range<usize>) {
    let Self {
      entries,
      old_text,
      new_text,
      chars,
      token_diff,
      ..
    } = self;
    chars.update_before(old_text.slice(old.clone()).chars());
    chars.update_after(new_text.slice(new.clone()).chars());
    // single chars repeat too often for histogram to pick good anchors
    token_diff.compute_with(
      Algorithm::Myers,
      &chars.before,
      &chars.after,
      chars.interner.num_tokens(),
    );
    for hunk in token_diff.hunks() {
      let removed = old.start + hunk.before.start as usize..old.start + hunk.before.end as usize;
      let added = new.start + hunk.after.start as usize..new.start + hunk.after.end as usize;
      entries.extend(entry_between(*old_text, *new_text, removed, added));
    }
    chars.clear();
  }

  fn by_words(&mut self, old: Range<usize>, new: Range<usize>) {
    let Self {
      entries,
      old_text,
      new_text,
      words,
      token_diff,
      ..
    } = self;
    let (old_words, old_starts) = split_words(old_text.slice(old.clone()).chars());
    let (new_words, new_starts) = split_words(new_text.slice(new.clone()).chars());
    words.update_before(old_words.into_iter());
    words.update_after(new_words.into_iter());
    token_diff.compute_with(
      Algorithm::Myers,
      &words.before,
      &words.after,
      words.interner.num_tokens(),
    );
    for hunk in token_diff.hunks() {
      let removed = old.start + old_starts[hunk.before.start as usize]
        ..old.start + old_starts[hunk.before.end as usize];
      let added = new.start + new_starts[hunk.after.start as usize]
        ..new.start + new_starts[hunk.after.end as usize];
      entries.extend(entry_between(*old_text, *new_text, removed, added));
    }
    words.clear();
  }
}

/// Merges entries that touch, an insertion directly followed by a deletion at
/// the same offset becomes a single replacement.
fn coalesce(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
  let mut out: Vec<DiffEntry> = Vec::with_capacity(entries.len());
  for entry in entries {
    match out.pop() {
      Some(prev) if prev.end_offset() == entry.offset() => out.push(prev.merge(entry)),
      Some(prev) => {
        out.push(prev);
        out.push(entry);
      },
      None => out.push(entry),
    }
  }
  out
}

/// Lines of a rope as diff tokens, line endings included.
struct Lines<'a>(RopeSlice<'a>);

impl<'a> imara_diff::TokenSource for Lines<'a> {
  type Token = RopeSlice<'a>;
  type Tokenizer = ropey::iter::Lines<'a>;

  fn tokenize(&self) -> Self::Tokenizer {
    self.0.lines()
  }

  fn estimate_tokens(&self) -> u32 {
    u32::try_from(self.0.len_lines()).unwrap_or(u32::MAX)
  }
}

/// Computes the entries turning `old` into `new`.
///
/// Identical texts produce no entries. Entries are offset-ascending and never
/// overlap or touch.
pub fn compute(old: &str, new: &str) -> Vec<DiffEntry> {
  if old == new {
    return Vec::new();
  }
  compare_ropes(
    &Rope::from_str(old),
    &Rope::from_str(new),
    &DiffOptions::default(),
  )
}

pub fn compare_ropes(old: &Rope, new: &Rope, options: &DiffOptions) -> Vec<DiffEntry> {
  let timer = log::log_enabled!(log::Level::Debug).then(Instant::now);
  let old_text = old.slice(..);
  let new_text = new.slice(..);
  let lines = InternedInput::new(Lines(old_text), Lines(new_text));
  let mut line_diff = Diff::compute(Algorithm::Histogram, &lines);
  line_diff.postprocess_with_heuristic(
    &lines,
    IndentHeuristic::new(|line| {
      IndentLevel::for_ascii_line(lines.interner[line].bytes(), options.indent_width)
    }),
  );

  let mut refiner = Refiner {
    entries: Vec::new(),
    old_text,
    new_text,
    options,
    chars: InternedInput::default(),
    words: InternedInput::default(),
    token_diff: Diff::default(),
  };
  for hunk in line_diff.hunks() {
    refiner.hunk(hunk.before, hunk.after);
  }
  let entries = coalesce(refiner.entries);

  if let Some(timer) = timer {
    log::debug!(
      "diffed {} lines into {} entries in {:?}",
      old_text.len_lines(),
      entries.len(),
      timer.elapsed()
    );
  }
  entries
}

/// Applies offset-ascending `entries` computed against `text`.
pub fn apply(text: &str, entries: &[DiffEntry]) -> Result<String, MappingError> {
  let mut rope = Rope::from_str(text);
  let len = rope.len_utf16_cu();
  // back to front so earlier offsets stay valid
  for entry in entries.iter().rev() {
    let end = entry.end_offset();
    if end > len {
      return Err(MappingError::OffsetOutOfBounds { offset: end, len });
    }
    let start = rope.utf16_cu_to_char(entry.offset());
    rope.remove(start..rope.utf16_cu_to_char(end));
    if let Some(insert) = entry.insert_text() {
      rope.insert(start, insert);
    }
  }
  Ok(rope.to_string())
}
