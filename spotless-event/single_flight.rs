use std::{
  future::Future,
  mem,
  sync::Arc,
};

use futures_util::{
  FutureExt,
  future::BoxFuture,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

/// How calls arriving while an operation is in flight are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
  /// Every call runs its own operation, strictly after all earlier calls
  /// finished, and receives its own result.
  QueueBehind,
  /// Calls arriving during a run mark it stale. Once the run finishes the
  /// most recently submitted operation runs once more and every waiting
  /// caller receives that final result.
  CoalesceStale,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlightError {
  #[error("in-flight operation was abandoned before producing a result")]
  Abandoned,
}

type Operation<R> = Box<dyn FnOnce() -> BoxFuture<'static, R> + Send>;

struct FlightState<R> {
  running: bool,
  rerun:   Option<Operation<R>>,
  waiters: Vec<oneshot::Sender<R>>,
}

struct Inner<R> {
  policy: Policy,
  state:  Mutex<FlightState<R>>,
  queue:  tokio::sync::Mutex<()>,
}

/// Runs async operations so that at most one is outstanding at any instant.
///
/// One runner guards one logical target, e.g. a single open document.
/// Handles are cheap to clone and share the same in-flight slot.
pub struct SingleFlight<R> {
  inner: Arc<Inner<R>>,
}

impl<R> Clone for SingleFlight<R> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<R> SingleFlight<R>
where
  R: Clone + Send + 'static,
{
  pub fn new(policy: Policy) -> Self {
    Self {
      inner: Arc::new(Inner {
        policy,
        state: Mutex::new(FlightState {
          running: false,
          rerun:   None,
          waiters: Vec::new(),
        }),
        queue: tokio::sync::Mutex::new(()),
      }),
    }
  }

  pub fn coalescing() -> Self {
    Self::new(Policy::CoalesceStale)
  }

  pub fn queued() -> Self {
    Self::new(Policy::QueueBehind)
  }

  pub fn policy(&self) -> Policy {
    self.inner.policy
  }

  /// Whether an operation is currently executing.
  pub fn is_running(&self) -> bool {
    match self.inner.policy {
      Policy::QueueBehind => self.inner.queue.try_lock().is_err(),
      Policy::CoalesceStale => self.inner.state.lock().running,
    }
  }

  /// Run `operation` under this runner's policy.
  ///
  /// A failing operation should report failure through `R` (usually a
  /// `Result`); the runner returns to idle either way. Dropping the returned
  /// future only abandons the local wait, a coalesced run keeps going for the
  /// other waiters.
  pub async fn run<F, Fut>(&self, operation: F) -> Result<R, FlightError>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
  {
    let operation: Operation<R> = Box::new(move || operation().boxed());
    match self.inner.policy {
      Policy::QueueBehind => Ok(self.run_queued(operation).await),
      Policy::CoalesceStale => self.run_coalesced(operation).await,
    }
  }

  async fn run_queued(&self, operation: Operation<R>) -> R {
    // tokio's mutex is fair, so turns are handed out in arrival order
    let _turn = self.inner.queue.lock().await;
    operation().await
  }

  async fn run_coalesced(&self, operation: Operation<R>) -> Result<R, FlightError> {
    let (tx, rx) = oneshot::channel();
    let start = {
      let mut state = self.inner.state.lock();
      state.waiters.push(tx);
      if state.running {
        if state.rerun.replace(operation).is_none() {
          log::trace!("operation in flight, scheduling one coalesced rerun");
        }
        None
      } else {
        state.running = true;
        Some(operation)
      }
    };

    if let Some(operation) = start {
      tokio::spawn(drive(self.inner.clone(), operation));
    }

    rx.await.map_err(|_| FlightError::Abandoned)
  }
}

/// Resets the slot if the driving task dies without delivering a result, so
/// a panicking operation never wedges later callers.
struct DriveGuard<'a, R> {
  inner:    &'a Inner<R>,
  finished: bool,
}

impl<R> Drop for DriveGuard<'_, R> {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    let mut state = self.inner.state.lock();
    state.running = false;
    state.rerun = None;
    // dropping the senders wakes every waiter with `Abandoned`
    state.waiters.clear();
  }
}

async fn drive<R>(inner: Arc<Inner<R>>, mut operation: Operation<R>)
where
  R: Clone + Send + 'static,
{
  let mut guard = DriveGuard {
    inner:    &inner,
    finished: false,
  };

  loop {
    let result = operation().await;

    let next = {
      let mut state = inner.state.lock();
      match state.rerun.take() {
        Some(next) => Ok(next),
        None => {
          state.running = false;
          Err(mem::take(&mut state.waiters))
        },
      }
    };

    match next {
      Ok(next) => {
        log::debug!("result went stale while running, running again");
        operation = next;
      },
      Err(waiters) => {
        guard.finished = true;
        for waiter in waiters {
          let _ = waiter.send(result.clone());
        }
        return;
      },
    }
  }
}
