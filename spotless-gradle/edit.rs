use ropey::Rope;
use serde::Serialize;
use spotless_diff::{
  MappingError,
  Range,
  position::{
    full_range,
    position_to_offset,
  },
};

use crate::{
  document::TextDocument,
  problem::ProblemId,
};

/// Kind of the actions fixing a single problem.
pub const QUICK_FIX_KIND: &str = "quickfix";

/// Kind of the action formatting a whole document.
pub const FIX_ALL_KIND: &str = "source.fixAll.spotlessGradle";

pub const FIX_ALL_TITLE: &str = "Format code using Spotless";

/// Command running format-and-apply on the document passed as argument.
pub const FORMAT_COMMAND: &str = "spotlessGradle.format";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
  pub range:    Range,
  pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEdit {
  pub uri:     String,
  pub version: i32,
  pub edits:   Vec<TextEdit>,
}

impl DocumentEdit {
  /// Replaces the whole of `document` with `text`.
  pub fn replace_all(document: &TextDocument, text: String) -> Self {
    Self {
      uri:     document.uri.clone(),
      version: document.version,
      edits:   vec![TextEdit {
        range:    full_range(&document.text),
        new_text: text,
      }],
    }
  }

  /// Applies the edits to `text`, which must be the version they were made
  /// for.
  pub fn apply(&self, text: &Rope) -> Result<Rope, MappingError> {
    let mut spans = self
      .edits
      .iter()
      .map(|edit| {
        let start = position_to_offset(text, edit.range.start)?;
        let end = position_to_offset(text, edit.range.end)?;
        Ok((start, end, edit.new_text.as_str()))
      })
      .collect::<Result<Vec<_>, MappingError>>()?;
    spans.sort_by_key(|&(start, ..)| start);

    let mut result = text.clone();
    for (start, end, new_text) in spans.into_iter().rev() {
      let start = result.utf16_cu_to_char(start);
      let end = result.utf16_cu_to_char(end);
      result.remove(start..end);
      result.insert(start, new_text);
    }
    Ok(result)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteCommand {
  pub command: String,
  pub uri:     String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
  pub title:        String,
  pub kind:         &'static str,
  pub edit:         Option<DocumentEdit>,
  pub command:      Option<ExecuteCommand>,
  pub is_preferred: bool,
  /// Problems this action resolves.
  pub problems:     Vec<ProblemId>,
}

/// The action running format-and-apply on `document`.
pub fn fix_all_action(document: &TextDocument) -> CodeAction {
  CodeAction {
    title:        FIX_ALL_TITLE.to_string(),
    kind:         FIX_ALL_KIND,
    edit:         None,
    command:      Some(ExecuteCommand {
      command: FORMAT_COMMAND.to_string(),
      uri:     document.uri.clone(),
    }),
    is_preferred: true,
    problems:     Vec::new(),
  }
}

/// Whether the dotted action kind `kind` falls under `parent`, an empty
/// `parent` containing every kind.
pub fn kind_contains(parent: &str, kind: &str) -> bool {
  parent.is_empty()
    || kind == parent
    || kind
      .strip_prefix(parent)
      .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
  use spotless_diff::Position;

  use super::*;

  #[test]
  fn action_kinds_nest() {
    assert!(kind_contains("source", FIX_ALL_KIND));
    assert!(kind_contains("source.fixAll", FIX_ALL_KIND));
    assert!(kind_contains(FIX_ALL_KIND, FIX_ALL_KIND));
    assert!(kind_contains("", QUICK_FIX_KIND));
    assert!(!kind_contains("source.fix", FIX_ALL_KIND));
    assert!(!kind_contains(QUICK_FIX_KIND, FIX_ALL_KIND));
  }

  #[test]
  fn replace_all_covers_the_document() {
    let document = TextDocument::new("file:///a.java", "java", 2, "a\nbc");
    let edit = DocumentEdit::replace_all(&document, "x\n".into());
    assert_eq!(edit.version, 2);
    assert_eq!(
      edit.edits[0].range,
      Range::new(Position::zero(), Position::new(1, 2))
    );
    assert_eq!(edit.apply(&document.text).unwrap(), "x\n");
  }

  #[test]
  fn edits_apply_back_to_front() {
    let text = Rope::from_str("ab\ncd");
    let edit = DocumentEdit {
      uri:     "file:///a".into(),
      version: 0,
      edits:   vec![
        TextEdit {
          range:    Range::point(Position::new(1, 0)),
          new_text: "  ".into(),
        },
        TextEdit {
          range:    Range::new(Position::new(0, 1), Position::new(0, 2)),
          new_text: String::new(),
        },
      ],
    };
    assert_eq!(edit.apply(&text).unwrap(), "a\n  cd");
  }
}
