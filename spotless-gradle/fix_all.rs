use std::sync::Arc;

use spotless_event::SingleFlight;
use tokio_util::sync::CancellationToken;

use crate::{
  document::TextDocument,
  edit::{
    CodeAction,
    DocumentEdit,
    FIX_ALL_KIND,
    fix_all_action,
    kind_contains,
  },
  features::{
    Feature,
    FeatureGate,
  },
  gateway::{
    FormatError,
    FormatOutcome,
    FormatterGateway,
    format_with_cancellation,
  },
  reconciler::{
    DiagnosticsReconciler,
    ReconcileError,
  },
};

/// Format-and-apply.
///
/// Explicit format requests never coalesce: each one waits for the requests
/// before it and then formats the document it was given.
pub struct Formatter<G> {
  gateway:    Arc<G>,
  features:   Arc<FeatureGate>,
  reconciler: Option<DiagnosticsReconciler<G>>,
  queue:      SingleFlight<Result<FormatOutcome, FormatError>>,
}

impl<G: FormatterGateway> Formatter<G> {
  /// With a `reconciler`, its published diff is reused whenever it was
  /// computed for exactly the text being formatted.
  pub fn new(
    gateway: Arc<G>,
    features: Arc<FeatureGate>,
    reconciler: Option<DiagnosticsReconciler<G>>,
  ) -> Self {
    Self {
      gateway,
      features,
      reconciler,
      queue: SingleFlight::queued(),
    }
  }

  /// The edit replacing `document` with its formatted text, `None` when
  /// formatting is disabled for it, it is already formatted or `cancel` fired.
  pub async fn format_document(
    &self,
    document: &TextDocument,
    cancel: CancellationToken,
  ) -> Result<Option<DocumentEdit>, ReconcileError> {
    if !self.features.is_enabled(Feature::Format, document) {
      return Ok(None);
    }

    let outcome = match self.cached_outcome(document) {
      Some(outcome) => outcome,
      None => {
        let gateway = self.gateway.clone();
        let target = document.clone();
        let token = cancel.clone();
        let result = self
          .queue
          .run(move || {
            async move { format_with_cancellation(&*gateway, &target, &token).await }
          })
          .await?;
        match result {
          Ok(outcome) => outcome,
          Err(FormatError::Cancelled) => return Ok(None),
          Err(err) => return Err(err.into()),
        }
      },
    };

    if cancel.is_cancelled() {
      return Ok(None);
    }
    match outcome {
      FormatOutcome::Unchanged => Ok(None),
      FormatOutcome::Changed(text) => Ok(Some(DocumentEdit::replace_all(document, text))),
    }
  }

  fn cached_outcome(&self, document: &TextDocument) -> Option<FormatOutcome> {
    let diff = self.reconciler.as_ref()?.current_diff_for(&document.uri)?;
    if document.text != diff.source.as_str() {
      return None;
    }
    log::debug!("reusing published diff for {}", document.uri);
    Some(if diff.is_clean() {
      FormatOutcome::Unchanged
    } else {
      FormatOutcome::Changed(diff.formatted_source.clone())
    })
  }

  /// [`Formatter::format_document`] with failures logged instead of returned.
  pub async fn fix_all(
    &self,
    document: &TextDocument,
    cancel: CancellationToken,
  ) -> Option<DocumentEdit> {
    match self.format_document(document, cancel).await {
      Ok(edit) => edit,
      Err(err) => {
        log::error!("Unable to apply formatting: {err}");
        None
      },
    }
  }

  /// Source actions for `document` when the editor asks for kind `only`.
  pub fn provide_code_actions(&self, document: &TextDocument, only: Option<&str>) -> Vec<CodeAction> {
    let Some(only) = only else {
      return Vec::new();
    };
    if !kind_contains(only, FIX_ALL_KIND) && !kind_contains(FIX_ALL_KIND, only) {
      return Vec::new();
    }
    if !self.features.is_enabled(Feature::Format, document) {
      return Vec::new();
    }
    vec![fix_all_action(document)]
  }
}
