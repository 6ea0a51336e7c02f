//! Spotless formatting surfaced as editor diagnostics, quick-fixes and a
//! format-and-apply command.
//!
//! The formatter itself is reached through a [`FormatterGateway`]. The
//! [`DiagnosticsReconciler`] turns its output into positioned problems for the
//! document snapshot the formatter saw, and the [`Formatter`] applies it to a
//! document as a single edit.

pub mod document;
pub mod edit;
pub mod features;
pub mod fix_all;
pub mod gateway;
pub mod problem;
pub mod process;
pub mod reconciler;

#[cfg(test)]
mod testing;

pub use document::TextDocument;
pub use edit::{
  CodeAction,
  DocumentEdit,
  TextEdit,
};
pub use features::{
  Feature,
  FeatureGate,
};
pub use fix_all::Formatter;
pub use gateway::{
  FormatError,
  FormatOutcome,
  FormatterGateway,
  SpotlessStatus,
};
pub use problem::{
  PositionedProblem,
  ProblemId,
  ProblemSet,
};
pub use process::GradleGateway;
pub use reconciler::{
  DiagnosticsReconciler,
  DocumentEvent,
  ReconcileError,
  ReconcileOutcome,
};
