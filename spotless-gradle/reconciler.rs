//! Keeps the published formatting problems of the active document in sync
//! with the formatter.
//!
//! Each pass formats a snapshot of the document, diffs the result against that
//! same snapshot and positions the problems against it before anything is
//! published. The published state is replaced as a whole on success and left
//! alone on failure. Only the most recently requested pass may publish, so a
//! slow pass never overwrites a newer one or state dropped by `clear`.
//! Quick-fixes are only handed out while the live document is still the
//! snapshot.

use std::{
  collections::HashMap,
  sync::Arc,
  time::Duration,
};

use parking_lot::{
  Mutex,
  RwLock,
};
use ropey::Rope;
use spotless_diff::{
  DiffEntry,
  DocumentDiff,
  MappingError,
  Range,
};
use spotless_event::{
  Debouncer,
  FlightError,
  SingleFlight,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
  document::TextDocument,
  edit::{
    CodeAction,
    DocumentEdit,
    QUICK_FIX_KIND,
    TextEdit,
    fix_all_action,
  },
  features::{
    Feature,
    FeatureGate,
  },
  gateway::{
    FormatError,
    FormatterGateway,
    format_with_cancellation,
  },
  problem::{
    DIAGNOSTICS_COLLECTION,
    PositionedProblem,
    ProblemId,
    ProblemSet,
  },
};

/// Editor events that can trigger a diagnostics pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
  Opened,
  /// The text of the active document changed. Debounced.
  Changed,
  ActiveEditorChanged,
  FormatterReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
  #[error(transparent)]
  Format(#[from] FormatError),
  #[error("unable to position problem: {0}")]
  Mapping(#[from] MappingError),
  #[error(transparent)]
  Flight(#[from] FlightError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
  /// Diagnostics are not enabled for the document.
  Skipped,
  /// The pass was cancelled or overtaken by a newer request and its result
  /// thrown away.
  Discarded,
  Published { uri: String, problems: usize },
}

type PassResult = Result<ReconcileOutcome, ReconcileError>;

struct Published {
  uri:      String,
  version:  i32,
  snapshot: Rope,
  diff:     Arc<DocumentDiff>,
  problems: ProblemSet,
}

struct State {
  current:         Option<Published>,
  next_problem_id: ProblemId,
  /// Bumped by every pass request and whenever published state is dropped.
  generation:      u64,
  /// Document of the latest pass request.
  requested:       Option<String>,
}

struct Inner<G> {
  gateway:   Arc<G>,
  features:  Arc<FeatureGate>,
  state:     RwLock<State>,
  runners:   Mutex<HashMap<String, SingleFlight<PassResult>>>,
  debouncer: Debouncer,
}

/// Owner of the published diff and problems of one diagnostics collection.
///
/// Handles are cheap to clone and share the same state.
pub struct DiagnosticsReconciler<G> {
  inner: Arc<Inner<G>>,
}

impl<G> Clone for DiagnosticsReconciler<G> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<G: FormatterGateway> DiagnosticsReconciler<G> {
  /// Must be created inside a tokio runtime. `debounce` is the quiet period
  /// after an edit before diagnostics run.
  pub fn new(gateway: Arc<G>, features: Arc<FeatureGate>, debounce: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        gateway,
        features,
        state: RwLock::new(State {
          current:         None,
          next_problem_id: 0,
          generation:      0,
          requested:       None,
        }),
        runners: Mutex::new(HashMap::new()),
        debouncer: Debouncer::new(debounce),
      }),
    }
  }

  pub fn gateway(&self) -> &Arc<G> {
    &self.inner.gateway
  }

  /// Runs a diagnostics pass in the background, failures are logged.
  pub fn run_diagnostics(&self, document: TextDocument, cancel: Option<CancellationToken>) {
    tokio::spawn(self.clone().diagnose(document, cancel));
  }

  async fn diagnose(self, document: TextDocument, cancel: Option<CancellationToken>) {
    if let Err(err) = self.reconcile(document, cancel).await {
      log::error!("Unable to provide diagnostics: {err}");
    }
  }

  /// Runs one diagnostics pass for `document` and waits for it.
  ///
  /// Passes for the same document are coalesced: a pass requested while one
  /// is running makes the running one stale, and the latest request runs
  /// once it finished. Every caller receives the result of that final pass.
  pub async fn reconcile(
    &self,
    document: TextDocument,
    cancel: Option<CancellationToken>,
  ) -> Result<ReconcileOutcome, ReconcileError> {
    if !self
      .inner
      .features
      .is_enabled(Feature::Diagnostics, &document)
    {
      return Ok(ReconcileOutcome::Skipped);
    }

    let generation = self.inner.request(&document.uri);
    let runner = self.runner(&document.uri);
    let inner = self.inner.clone();
    runner
      .run(move || async move { inner.pass(document, cancel, generation).await })
      .await?
  }

  fn runner(&self, uri: &str) -> SingleFlight<PassResult> {
    self
      .inner
      .runners
      .lock()
      .entry(uri.to_string())
      .or_insert_with(SingleFlight::coalescing)
      .clone()
  }

  /// Reacts to an editor event concerning `document`.
  pub fn handle_event(&self, event: DocumentEvent, document: TextDocument) {
    match event {
      DocumentEvent::Changed => {
        let this = self.clone();
        self
          .inner
          .debouncer
          .schedule(move || this.diagnose(document, None));
      },
      DocumentEvent::Opened | DocumentEvent::ActiveEditorChanged | DocumentEvent::FormatterReady => {
        // a pending edit belongs to the previously active document
        self.inner.debouncer.cancel();
        self.run_diagnostics(document, None);
      },
    }
  }

  /// The diff backing the published problems.
  pub fn current_diff(&self) -> Option<Arc<DocumentDiff>> {
    let state = self.inner.state.read();
    state.current.as_ref().map(|current| current.diff.clone())
  }

  /// The published diff, if it was computed for `uri`.
  pub fn current_diff_for(&self, uri: &str) -> Option<Arc<DocumentDiff>> {
    let state = self.inner.state.read();
    state
      .current
      .as_ref()
      .filter(|current| current.uri == uri)
      .map(|current| current.diff.clone())
  }

  /// Uri of the document the published problems belong to.
  pub fn current_uri(&self) -> Option<String> {
    let state = self.inner.state.read();
    state.current.as_ref().map(|current| current.uri.clone())
  }

  /// Published problems of `uri`.
  pub fn problems(&self, uri: &str) -> Vec<PositionedProblem> {
    let state = self.inner.state.read();
    match state.current.as_ref() {
      Some(current) if current.uri == uri => current.problems.problems().to_vec(),
      _ => Vec::new(),
    }
  }

  /// Fixes for the problems at exactly `range`, plus a fix-all action when
  /// the document has more than one problem.
  ///
  /// Nothing is offered once `document` moved past the version and text the
  /// problems were computed against.
  pub fn provide_quick_fixes(&self, document: &TextDocument, range: Range) -> Vec<CodeAction> {
    let state = self.inner.state.read();
    let Some(current) = state.current.as_ref() else {
      return Vec::new();
    };
    if current.uri != document.uri
      || current.version != document.version
      || current.snapshot != document.text
    {
      return Vec::new();
    }

    let mut actions: Vec<CodeAction> = current
      .problems
      .at_range(range)
      .map(|(problem, entry)| quick_fix(document, problem, entry))
      .collect();
    if !actions.is_empty() && current.problems.len() > 1 {
      actions.push(fix_all_action(document));
    }
    actions
  }

  /// Drops everything published, e.g. after the configuration changed.
  pub fn clear(&self) {
    self.inner.debouncer.cancel();
    let mut state = self.inner.state.write();
    state.current = None;
    state.generation += 1;
    drop(state);
    log::info!("Updated diagnostics (name: {DIAGNOSTICS_COLLECTION}) (total: 0)");
  }

  /// Forgets a closed document and stops its pending format runs.
  pub async fn close_document(&self, uri: &str) {
    self.inner.runners.lock().remove(uri);
    {
      let mut state = self.inner.state.write();
      if state.requested.as_deref() == Some(uri) {
        state.generation += 1;
      }
      if state
        .current
        .as_ref()
        .is_some_and(|current| current.uri == uri)
      {
        state.current = None;
      }
    }
    self.inner.gateway.cancel(uri).await;
  }
}

impl<G: FormatterGateway> Inner<G> {
  /// Starts a new generation for a pass over `uri`.
  fn request(&self, uri: &str) -> u64 {
    let mut state = self.state.write();
    state.generation += 1;
    state.requested = Some(uri.to_string());
    state.generation
  }

  async fn pass(
    &self,
    document: TextDocument,
    cancel: Option<CancellationToken>,
    generation: u64,
  ) -> PassResult {
    // everything below is computed against this snapshot, never the live text
    let source = document.text.to_string();
    let cancel = cancel.unwrap_or_default();
    let outcome = format_with_cancellation(&*self.gateway, &document, &cancel).await;
    let formatted = match outcome {
      Ok(outcome) => outcome.formatted_or(source.clone()),
      Err(FormatError::Cancelled) => return Ok(ReconcileOutcome::Discarded),
      Err(err) => return Err(err.into()),
    };

    self.publish(&document, DocumentDiff::new(source, formatted), generation)
  }

  fn publish(&self, document: &TextDocument, diff: DocumentDiff, generation: u64) -> PassResult {
    let mut state = self.state.write();
    if state.generation != generation {
      log::debug!("dropping stale diagnostics for {}", document.uri);
      return Ok(ReconcileOutcome::Discarded);
    }
    let problems = ProblemSet::build(&document.text, &diff.differences, state.next_problem_id)?;
    let total = problems.len();
    state.next_problem_id += total as ProblemId;
    state.current = Some(Published {
      uri: document.uri.clone(),
      version: document.version,
      snapshot: document.text.clone(),
      diff: Arc::new(diff),
      problems,
    });
    drop(state);

    log::info!("Updated diagnostics (name: {DIAGNOSTICS_COLLECTION}) (total: {total})");
    Ok(ReconcileOutcome::Published {
      uri:      document.uri.clone(),
      problems: total,
    })
  }
}

fn quick_fix(document: &TextDocument, problem: &PositionedProblem, entry: &DiffEntry) -> CodeAction {
  let edit = match entry {
    DiffEntry::Insert { insert_text, .. } => {
      TextEdit {
        range:    Range::point(problem.range.start),
        new_text: insert_text.clone(),
      }
    },
    DiffEntry::Replace { insert_text, .. } => {
      TextEdit {
        range:    problem.range,
        new_text: insert_text.clone(),
      }
    },
    DiffEntry::Delete { .. } => {
      TextEdit {
        range:    problem.range,
        new_text: String::new(),
      }
    },
  };

  CodeAction {
    title:        problem.message.clone(),
    kind:         QUICK_FIX_KIND,
    edit:         Some(DocumentEdit {
      uri:     document.uri.clone(),
      version: document.version,
      edits:   vec![edit],
    }),
    command:      None,
    is_preferred: false,
    problems:     vec![problem.id],
  }
}
