use std::{
  fmt,
  path::PathBuf,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::document::TextDocument;

/// What the formatter made of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
  /// The document is already formatted.
  Unchanged,
  /// The formatted text of the whole document.
  Changed(String),
}

impl FormatOutcome {
  /// The formatted text, `source` itself when nothing changed.
  pub fn formatted_or(self, source: String) -> String {
    match self {
      FormatOutcome::Unchanged => source,
      FormatOutcome::Changed(text) => text,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
  #[error("Document is closed or not saved, skipping formatting")]
  Untitled,
  #[error("no Gradle project found for {}", .0.display())]
  NoProject(PathBuf),
  #[error("unable to start Gradle: {0}")]
  Spawn(String),
  #[error("Gradle I/O failed: {0}")]
  Io(String),
  #[error("{0}")]
  Failed(String),
  #[error("No status received from Spotless")]
  NoStatus,
  #[error("Spotless formatting cancelled")]
  Cancelled,
}

/// Status line the Spotless IDE hook prints on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotlessStatus {
  IsClean,
  IsDirty,
  DidNotConverge,
}

impl SpotlessStatus {
  pub fn parse(status: &str) -> Option<Self> {
    match status {
      "IS CLEAN" => Some(Self::IsClean),
      "IS DIRTY" => Some(Self::IsDirty),
      "DID NOT CONVERGE" => Some(Self::DidNotConverge),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::IsClean => "IS CLEAN",
      Self::IsDirty => "IS DIRTY",
      Self::DidNotConverge => "DID NOT CONVERGE",
    }
  }
}

impl fmt::Display for SpotlessStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Interprets the output of one Spotless IDE hook run for the file `name`.
pub fn interpret_output(
  name: &str,
  stdout: String,
  stderr: &str,
) -> Result<FormatOutcome, FormatError> {
  let status = stderr.trim();
  match SpotlessStatus::parse(status) {
    Some(known) => {
      log::info!("{name}: {known}");
      match known {
        SpotlessStatus::IsDirty => Ok(FormatOutcome::Changed(stdout)),
        SpotlessStatus::IsClean => Ok(FormatOutcome::Unchanged),
        SpotlessStatus::DidNotConverge => {
          log::warn!("{name}: formatter steps did not converge, leaving the file as is");
          Ok(FormatOutcome::Unchanged)
        },
      }
    },
    None if status.is_empty() => Err(FormatError::NoStatus),
    None => Err(FormatError::Failed(status.to_string())),
  }
}

/// The external formatter.
#[async_trait]
pub trait FormatterGateway: Send + Sync + 'static {
  /// Formats the snapshot held by `document`.
  async fn format(&self, document: &TextDocument) -> Result<FormatOutcome, FormatError>;

  /// Best-effort cancellation of every pending [`FormatterGateway::format`]
  /// for the document at `uri`, e.g. once it is closed.
  async fn cancel(&self, uri: &str);
}

/// Formats `document`, giving up as soon as `cancel` fires.
///
/// Cancelling drops this request's format future, which stops its run
/// without touching other requests for the same document.
pub async fn format_with_cancellation<G>(
  gateway: &G,
  document: &TextDocument,
  cancel: &CancellationToken,
) -> Result<FormatOutcome, FormatError>
where
  G: FormatterGateway + ?Sized,
{
  if cancel.is_cancelled() {
    log::warn!("Spotless formatting cancelled");
    return Err(FormatError::Cancelled);
  }

  tokio::select! {
    biased;
    _ = cancel.cancelled() => {
      log::warn!("Spotless formatting cancelled");
      Err(FormatError::Cancelled)
    },
    outcome = gateway.format(document) => outcome,
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::testing::ScriptedGateway;

  #[test]
  fn dirty_status_returns_stdout() {
    assert_eq!(
      interpret_output("Main.java", "formatted".into(), "IS DIRTY\n"),
      Ok(FormatOutcome::Changed("formatted".into()))
    );
  }

  #[test]
  fn clean_and_unconverged_are_unchanged() {
    assert_eq!(
      interpret_output("Main.java", String::new(), "  IS CLEAN "),
      Ok(FormatOutcome::Unchanged)
    );
    assert_eq!(
      interpret_output("Main.java", "partial".into(), "DID NOT CONVERGE"),
      Ok(FormatOutcome::Unchanged)
    );
  }

  #[test]
  fn other_statuses_fail() {
    assert_eq!(
      interpret_output("Main.java", String::new(), "Unable to find file\n"),
      Err(FormatError::Failed("Unable to find file".into()))
    );
    assert_eq!(
      interpret_output("Main.java", "text".into(), " \n"),
      Err(FormatError::NoStatus)
    );
  }

  #[test]
  fn unchanged_falls_back_to_source() {
    assert_eq!(FormatOutcome::Unchanged.formatted_or("a".into()), "a");
    assert_eq!(
      FormatOutcome::Changed("b".into()).formatted_or("a".into()),
      "b"
    );
  }

  #[tokio::test(flavor = "current_thread")]
  async fn cancellation_discards_pending_result() {
    let gateway = ScriptedGateway::formatting(str::to_uppercase);
    gateway.set_delay(Duration::from_millis(200));
    let document = TextDocument::new("file:///a.java", "java", 1, "a");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      trigger.cancel();
    });

    let outcome = format_with_cancellation(&gateway, &document, &cancel).await;
    assert_eq!(outcome, Err(FormatError::Cancelled));
    assert_eq!(gateway.calls(), 1);
    assert_eq!(gateway.completed(), 0);
    // only the dropped run stops, the document is left alone
    assert_eq!(gateway.cancels(), 0);
  }

  #[tokio::test(flavor = "current_thread")]
  async fn already_cancelled_token_skips_formatter() {
    let gateway = ScriptedGateway::formatting(str::to_uppercase);
    let document = TextDocument::new("file:///a.java", "java", 1, "a");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = format_with_cancellation(&gateway, &document, &cancel).await;
    assert_eq!(outcome, Err(FormatError::Cancelled));
    assert_eq!(gateway.calls(), 0);
  }
}
