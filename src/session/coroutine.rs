//! Straight-line step logic on a parked thread.
//!
//! Problem code often reads most naturally as a loop that emits an action,
//! waits for the answer, and eventually returns. [`Coroutine`] runs such a
//! body on its own OS thread and exposes it through the one-step
//! [`Computation`] contract: each `advance` hands in a value and blocks until
//! the body either suspends again or returns.

use super::{Computation, Step, StepError};
use crate::message::Value;
use crate::runtime::panic_message;

use async_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use thiserror::Error;

/// Returned by [`Yielder::suspend`] once the owning session is gone.
/// Bodies should propagate it with `?` and exit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("session abandoned")]
pub struct Abandoned;

enum Outcome {
  Yielded(Value),
  Returned(Value),
  Failed(StepError),
  Panicked(String),
}

/// Handle given to a coroutine body for suspending itself.
pub struct Yielder {
  outcome_tx: Sender<Outcome>,
  resume_rx: Receiver<Option<Value>>,
}

impl Yielder {
  /// Emits `action` to the client and parks until the next resume value.
  pub fn suspend(&mut self, action: Value) -> Result<Value, Abandoned> {
    self.outcome_tx.send_blocking(Outcome::Yielded(action)).map_err(|_| Abandoned)?;
    let resumed = self.resume_rx.recv_blocking().map_err(|_| Abandoned)?;
    Ok(resumed.unwrap_or_default())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Fresh,
  Suspended,
  Finished,
}

/// A [`Computation`] backed by a dedicated thread.
///
/// Dropping the coroutine closes both channels; a body parked in
/// [`Yielder::suspend`] then receives [`Abandoned`]. A body that is busy
/// (not parked) keeps running until it next tries to suspend or returns.
pub struct Coroutine {
  name: String,
  resume_tx: Sender<Option<Value>>,
  outcome_rx: Receiver<Outcome>,
  state: State,
}

impl Coroutine {
  /// Spawns the body's thread. The body does not start executing until the
  /// first [`Computation::advance`]; the input of that call is discarded.
  pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self, StepError>
  where
    F: FnOnce(&mut Yielder) -> Result<Value, StepError> + Send + 'static,
  {
    let name = name.into();
    let (resume_tx, resume_rx) = async_channel::bounded::<Option<Value>>(1);
    let (outcome_tx, outcome_rx) = async_channel::bounded::<Outcome>(1);

    let thread_name = name.clone();
    thread::Builder::new().name(name.clone()).spawn(move || {
      if resume_rx.recv_blocking().is_err() {
        tracing::trace!(coroutine = %thread_name, "Coroutine dropped before first step");
        return;
      }
      let mut yielder = Yielder {
        outcome_tx: outcome_tx.clone(),
        resume_rx,
      };
      let outcome = match catch_unwind(AssertUnwindSafe(|| body(&mut yielder))) {
        Ok(Ok(value)) => Outcome::Returned(value),
        Ok(Err(e)) => Outcome::Failed(e),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
      };
      if outcome_tx.send_blocking(outcome).is_err() {
        tracing::trace!(coroutine = %thread_name, "Coroutine finished after its session was dropped");
      }
    })?;

    Ok(Self {
      name,
      resume_tx,
      outcome_rx,
      state: State::Fresh,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_finished(&self) -> bool {
    self.state == State::Finished
  }
}

impl Computation for Coroutine {
  fn advance(&mut self, input: Option<Value>) -> Result<Step, StepError> {
    if self.state == State::Finished {
      return Err(format!("coroutine `{}` already finished", self.name).into());
    }
    let input = if self.state == State::Fresh { None } else { input };

    let exited = || -> StepError { "coroutine thread exited unexpectedly".into() };
    self.resume_tx.send_blocking(input).map_err(|_| exited())?;
    let outcome = self.outcome_rx.recv_blocking().map_err(|_| {
      self.state = State::Finished;
      exited()
    })?;

    match outcome {
      Outcome::Yielded(action) => {
        self.state = State::Suspended;
        Ok(Step::Continue(action))
      }
      Outcome::Returned(value) => {
        self.state = State::Finished;
        Ok(Step::Complete(value))
      }
      Outcome::Failed(e) => {
        self.state = State::Finished;
        Err(e)
      }
      Outcome::Panicked(msg) => {
        self.state = State::Finished;
        Err(format!("step panicked: {}", msg).into())
      }
    }
  }
}

impl Drop for Coroutine {
  fn drop(&mut self) {
    self.resume_tx.close();
    self.outcome_rx.close();
  }
}
