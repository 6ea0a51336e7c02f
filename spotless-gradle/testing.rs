//! In-memory formatter for driving the reconciler in tests.

use std::{
  collections::{
    HashMap,
    VecDeque,
  },
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
  time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
  document::TextDocument,
  gateway::{
    FormatError,
    FormatOutcome,
    FormatterGateway,
  },
};

/// Formats with a plain function unless a scripted result is queued.
///
/// Runs can be slowed down with [`ScriptedGateway::set_delay`] or parked
/// with [`ScriptedGateway::hold`] until [`ScriptedGateway::release`].
pub struct ScriptedGateway {
  formatter: fn(&str) -> String,
  script:    Mutex<VecDeque<Result<FormatOutcome, FormatError>>>,
  delay:     Mutex<Duration>,
  delays:    Mutex<HashMap<String, Duration>>,
  gate:      watch::Sender<bool>,
  calls:     AtomicUsize,
  completed: AtomicUsize,
  cancels:   AtomicUsize,
  seen:      Mutex<Vec<String>>,
}

impl ScriptedGateway {
  pub fn formatting(formatter: fn(&str) -> String) -> Self {
    Self {
      formatter,
      script: Mutex::new(VecDeque::new()),
      delay: Mutex::new(Duration::ZERO),
      delays: Mutex::new(HashMap::new()),
      gate: watch::Sender::new(true),
      calls: AtomicUsize::new(0),
      completed: AtomicUsize::new(0),
      cancels: AtomicUsize::new(0),
      seen: Mutex::new(Vec::new()),
    }
  }

  /// Answer the next run with `result` instead of formatting.
  pub fn push(&self, result: Result<FormatOutcome, FormatError>) {
    self.script.lock().push_back(result);
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock() = delay;
  }

  /// Overrides the delay for runs of `uri`.
  pub fn set_delay_for(&self, uri: &str, delay: Duration) {
    self.delays.lock().insert(uri.to_string(), delay);
  }

  pub fn hold(&self) {
    self.gate.send_replace(false);
  }

  pub fn release(&self) {
    self.gate.send_replace(true);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Runs that returned a result instead of being dropped.
  pub fn completed(&self) -> usize {
    self.completed.load(Ordering::SeqCst)
  }

  pub fn cancels(&self) -> usize {
    self.cancels.load(Ordering::SeqCst)
  }

  /// Texts the formatter was asked to format, in call order.
  pub fn seen(&self) -> Vec<String> {
    self.seen.lock().clone()
  }
}

#[async_trait]
impl FormatterGateway for ScriptedGateway {
  async fn format(&self, document: &TextDocument) -> Result<FormatOutcome, FormatError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let source = document.text.to_string();
    self.seen.lock().push(source.clone());

    let delay = match self.delays.lock().get(&document.uri) {
      Some(delay) => *delay,
      None => *self.delay.lock(),
    };
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    let mut gate = self.gate.subscribe();
    let _ = gate.wait_for(|open| *open).await;

    self.completed.fetch_add(1, Ordering::SeqCst);
    let scripted = self.script.lock().pop_front();
    if let Some(result) = scripted {
      return result;
    }
    let formatted = (self.formatter)(&source);
    if formatted == source {
      Ok(FormatOutcome::Unchanged)
    } else {
      Ok(FormatOutcome::Changed(formatted))
    }
  }

  async fn cancel(&self, _uri: &str) {
    self.cancels.fetch_add(1, Ordering::SeqCst);
  }
}
