use serde::Serialize;

use crate::diff::{
  self,
  DiffEntry,
};

/// The edits turning `source` into `formatted_source`.
///
/// Offsets of `differences` are only meaningful against `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDiff {
  pub source:           String,
  pub formatted_source: String,
  pub differences:      Vec<DiffEntry>,
}

impl DocumentDiff {
  pub fn new(source: String, formatted_source: String) -> Self {
    let differences = diff::compute(&source, &formatted_source);
    Self {
      source,
      formatted_source,
      differences,
    }
  }

  /// A diff of a document the formatter left untouched.
  pub fn clean(source: String) -> Self {
    Self {
      formatted_source: source.clone(),
      source,
      differences: Vec::new(),
    }
  }

  pub fn is_clean(&self) -> bool {
    self.differences.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unchanged_document_is_clean() {
    let diff = DocumentDiff::new("abc".into(), "abc".into());
    assert!(diff.is_clean());
    assert_eq!(diff, DocumentDiff::clean("abc".into()));
  }

  #[test]
  fn differences_apply_to_source() {
    let diff = DocumentDiff::new("a  = 1;\n".into(), "a = 1;\n".into());
    assert!(!diff.is_clean());
    assert_eq!(
      diff::apply(&diff.source, &diff.differences).unwrap(),
      diff.formatted_source
    );
  }
}
