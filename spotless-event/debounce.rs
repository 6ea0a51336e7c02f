//! Trailing-edge debouncing of async jobs.

use std::{
  future::Future,
  time::Duration,
};

use futures_executor::block_on;
use futures_util::{
  FutureExt,
  future::BoxFuture,
};
use tokio::{
  sync::mpsc::{
    self,
    Receiver,
    Sender,
    error::TrySendError,
  },
  time::Instant,
};

const QUEUE_DEPTH: usize = 256;

/// How long a caller may stall on a full queue before its command is dropped.
const FULL_QUEUE_WAIT: Duration = Duration::from_millis(2);

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

enum Command {
  Schedule(Job),
  Cancel,
}

/// Of all jobs scheduled within `delay` of each other only the last one runs,
/// `delay` after it was scheduled.
///
/// Cloning yields another handle to the same timer.
#[derive(Clone)]
pub struct Debouncer {
  tx:    Sender<Command>,
  delay: Duration,
}

impl Debouncer {
  /// Must be created inside a tokio runtime, otherwise scheduled jobs never run.
  pub fn new(delay: Duration) -> Self {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    if tokio::runtime::Handle::try_current().is_ok() {
      tokio::spawn(worker(rx, delay));
    } else {
      log::debug!("no tokio runtime, debounced jobs will not run");
    }
    Self { tx, delay }
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }

  /// Replaces any pending job with `job` and restarts the quiet period.
  pub fn schedule<F, Fut>(&self, job: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.send(Command::Schedule(Box::new(move || job().boxed())));
  }

  /// Drops the pending job, if any.
  pub fn cancel(&self) {
    self.send(Command::Cancel);
  }

  fn send(&self, command: Command) {
    match self.tx.try_send(command) {
      Ok(()) => {},
      Err(TrySendError::Full(command)) => {
        if block_on(self.tx.send_timeout(command, FULL_QUEUE_WAIT)).is_err() {
          log::warn!("debounce queue is full, dropping a job");
        }
      },
      Err(TrySendError::Closed(_)) => {},
    }
  }
}

async fn worker(mut rx: Receiver<Command>, delay: Duration) {
  let mut pending: Option<(Job, Instant)> = None;
  loop {
    let deadline = pending.as_ref().map(|(_, deadline)| *deadline);
    let command = match deadline {
      Some(deadline) => {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
          Ok(command) => command,
          Err(_) => {
            if let Some((job, _)) = pending.take() {
              tokio::spawn(job());
            }
            continue;
          },
        }
      },
      None => rx.recv().await,
    };

    match command {
      Some(Command::Schedule(job)) => pending = Some((job, Instant::now() + delay)),
      Some(Command::Cancel) => pending = None,
      None => break,
    }
  }
}
