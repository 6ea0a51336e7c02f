use std::collections::HashMap;

use ropey::Rope;
use serde::Serialize;
use spotless_diff::{
  DiffEntry,
  MappingError,
  Range,
  position::span_to_range,
};

/// Name of the diagnostics collection problems are published to.
pub const DIAGNOSTICS_COLLECTION: &str = "Spotless";

/// Source tag carried by every problem.
pub const DIAGNOSTICS_SOURCE: &str = "gradle";

pub type ProblemId = u64;

/// A formatting problem positioned in the snapshot it was computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionedProblem {
  pub id:      ProblemId,
  pub range:   Range,
  pub message: String,
  pub source:  &'static str,
}

/// Makes whitespace visible in problem messages.
pub fn show_invisibles(text: &str) -> String {
  text
    .chars()
    .map(|ch| {
      match ch {
        ' ' => '·',
        '\n' => '⏎',
        '\t' => '↹',
        '\r' => '␍',
        ch => ch,
      }
    })
    .collect()
}

pub fn problem_message(entry: &DiffEntry) -> String {
  match entry {
    DiffEntry::Insert { insert_text, .. } => format!("Insert {}", show_invisibles(insert_text)),
    DiffEntry::Delete { delete_text, .. } => format!("Delete {}", show_invisibles(delete_text)),
    DiffEntry::Replace {
      delete_text,
      insert_text,
      ..
    } => {
      format!(
        "Replace {} with {}",
        show_invisibles(delete_text),
        show_invisibles(insert_text)
      )
    },
  }
}

/// Insertions map to a zero-width range, deletions and replacements to the
/// deleted text.
pub fn problem_range(snapshot: &Rope, entry: &DiffEntry) -> Result<Range, MappingError> {
  span_to_range(snapshot, entry.offset(), entry.delete_len())
}

/// Problems of one reconciliation pass together with the diff entry each of
/// them was derived from.
#[derive(Debug, Clone, Default)]
pub struct ProblemSet {
  problems: Vec<PositionedProblem>,
  entries:  HashMap<ProblemId, DiffEntry>,
}

impl ProblemSet {
  /// Positions every entry against `snapshot`, numbering problems from
  /// `first_id`. Fails as a whole if any entry cannot be mapped.
  pub fn build(
    snapshot: &Rope,
    differences: &[DiffEntry],
    first_id: ProblemId,
  ) -> Result<Self, MappingError> {
    let mut set = Self {
      problems: Vec::with_capacity(differences.len()),
      entries:  HashMap::with_capacity(differences.len()),
    };
    for (id, entry) in (first_id..).zip(differences) {
      set.problems.push(PositionedProblem {
        id,
        range: problem_range(snapshot, entry)?,
        message: problem_message(entry),
        source: DIAGNOSTICS_SOURCE,
      });
      set.entries.insert(id, entry.clone());
    }
    Ok(set)
  }

  pub fn problems(&self) -> &[PositionedProblem] {
    &self.problems
  }

  pub fn entry(&self, id: ProblemId) -> Option<&DiffEntry> {
    self.entries.get(&id)
  }

  pub fn len(&self) -> usize {
    self.problems.len()
  }

  pub fn is_empty(&self) -> bool {
    self.problems.is_empty()
  }

  /// Problems whose range is exactly `range`.
  pub fn at_range(&self, range: Range) -> impl Iterator<Item = (&PositionedProblem, &DiffEntry)> {
    self
      .problems
      .iter()
      .filter(move |problem| problem.range == range)
      .filter_map(|problem| Some((problem, self.entries.get(&problem.id)?)))
  }
}

#[cfg(test)]
mod tests {
  use spotless_diff::{
    Position,
    diff,
  };

  use super::*;

  #[test]
  fn messages_show_invisibles() {
    assert_eq!(show_invisibles("a \t\r\n"), "a·↹␍⏎");
    assert_eq!(
      problem_message(&DiffEntry::Replace {
        offset:      0,
        delete_text: "\t".into(),
        insert_text: "  ".into(),
      }),
      "Replace ↹ with ··"
    );
    assert_eq!(
      problem_message(&DiffEntry::Insert {
        offset:      0,
        insert_text: "\n".into(),
      }),
      "Insert ⏎"
    );
  }

  #[test]
  fn problems_are_positioned_against_the_snapshot() {
    let source = "class A {\nint  a;\n}";
    let formatted = "class A {\n  int a;\n}\n";
    let snapshot = Rope::from_str(source);
    let differences = diff::compute(source, formatted);

    let set = ProblemSet::build(&snapshot, &differences, 10).unwrap();
    assert_eq!(set.len(), differences.len());
    assert_eq!(set.problems()[0].id, 10);
    assert_eq!(set.problems()[0].range.start, Position::new(1, 0));
    assert!(set.problems().iter().all(|p| p.source == DIAGNOSTICS_SOURCE));

    let last = set.problems().last().unwrap();
    assert_eq!(last.range, Range::point(Position::new(2, 1)));
    assert_eq!(last.message, "Insert ⏎");
    assert_eq!(
      set.entry(last.id).unwrap().operation(),
      spotless_diff::Operation::Insert
    );
  }

  #[test]
  fn lookup_requires_exact_range() {
    let snapshot = Rope::from_str("123456");
    let differences = [DiffEntry::Delete {
      offset:      3,
      delete_text: "456".into(),
    }];
    let set = ProblemSet::build(&snapshot, &differences, 0).unwrap();
    let range = Range::new(Position::new(0, 3), Position::new(0, 6));
    assert_eq!(set.at_range(range).count(), 1);
    assert_eq!(
      set
        .at_range(Range::new(Position::new(0, 3), Position::new(0, 5)))
        .count(),
      0
    );
  }

  #[test]
  fn unmappable_entries_fail_the_whole_set() {
    let snapshot = Rope::from_str("abc");
    let differences = [
      DiffEntry::Insert {
        offset:      1,
        insert_text: "x".into(),
      },
      DiffEntry::Delete {
        offset:      2,
        delete_text: "cde".into(),
      },
    ];
    assert!(ProblemSet::build(&snapshot, &differences, 0).is_err());
  }
}
