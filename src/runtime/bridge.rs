// src/runtime/bridge.rs

//! Deadline-bounded execution of blocking step logic.
//!
//! The connection loop never runs step logic itself. It hands the work to the
//! [`WorkerPool`] and waits, without blocking the scheduler, for either the
//! result or the step deadline.
//!
//! Timeouts are *best-effort abandonment*, not cancellation. A job still in
//! the queue when its deadline passes is skipped. A job already running keeps
//! its worker until it returns on its own; its result is then dropped, and
//! the computation it owned is dropped with it. Step logic that never returns
//! therefore holds a worker forever.

use super::panic_message;
use super::worker_pool::WorkerPool;
use crate::error::JudgeError;

use std::time::Duration;
use thiserror::Error;

/// Default wall-clock budget for one step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a bridged step produced no value. The `Display` text is what the
/// client sees as the `exception` of an error reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFault {
  #[error("Step timed out after {0:?}")]
  Timeout(Duration),
  /// The step logic returned an error; carries its description verbatim
  /// unless it would read as a timeout (see [`StepFault::failed`]).
  #[error("{0}")]
  Failed(String),
  #[error("Step panicked: {0}")]
  Panicked(String),
  #[error("Worker pool unavailable")]
  PoolClosed,
}

impl StepFault {
  /// Prefix of every timeout description, for clients that classify replies.
  /// Reserved: no other fault's text starts with it.
  pub const TIMEOUT_PREFIX: &'static str = "Step timed out";

  /// Prefix given to step errors whose own text starts with `TIMEOUT_PREFIX`.
  pub const FAILED_PREFIX: &'static str = "Step failed: ";

  /// Wraps a step error description, keeping `TIMEOUT_PREFIX` for real timeouts.
  pub fn failed(description: impl Into<String>) -> Self {
    let description = description.into();
    if description.starts_with(Self::TIMEOUT_PREFIX) {
      StepFault::Failed(format!("{}{}", Self::FAILED_PREFIX, description))
    } else {
      StepFault::Failed(description)
    }
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, StepFault::Timeout(_))
  }
}

/// Runs jobs on a [`WorkerPool`] under a fixed deadline.
#[derive(Debug)]
pub struct ExecutionBridge {
  pool: WorkerPool,
  deadline: Duration,
}

impl ExecutionBridge {
  pub fn new(pool: WorkerPool, deadline: Duration) -> Result<Self, JudgeError> {
    if deadline.is_zero() {
      return Err(JudgeError::InvalidArgument("step deadline must be non-zero".into()));
    }
    Ok(Self { pool, deadline })
  }

  pub fn deadline(&self) -> Duration {
    self.deadline
  }

  pub fn pool(&self) -> &WorkerPool {
    &self.pool
  }

  /// Runs `job` on a worker and waits at most the deadline for it.
  ///
  /// The deadline covers time spent queued as well as time executing.
  pub async fn run<F, R>(&self, job: F) -> Result<R, StepFault>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let deadline = self.deadline;
    let waited = tokio::time::timeout(deadline, async {
      let result_rx = self.pool.submit(job).await.map_err(|e| {
        tracing::error!(error = %e, "Could not submit step to worker pool");
        StepFault::PoolClosed
      })?;
      result_rx.await.map_err(|_| StepFault::PoolClosed)
    })
    .await;

    match waited {
      Err(_elapsed) => {
        tracing::warn!(?deadline, "Step exceeded its deadline; abandoning it");
        Err(StepFault::Timeout(deadline))
      }
      Ok(Err(fault)) => Err(fault),
      Ok(Ok(Ok(value))) => Ok(value),
      Ok(Ok(Err(payload))) => {
        let msg = panic_message(payload.as_ref());
        tracing::warn!(panic = %msg, "Step panicked on worker");
        Err(StepFault::Panicked(msg))
      }
    }
  }

  /// Like [`ExecutionBridge::run`] for jobs that report their own errors.
  pub async fn try_run<F, R, E>(&self, job: F) -> Result<R, StepFault>
  where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: std::fmt::Display + Send + 'static,
  {
    self.run(job).await?.map_err(|e| StepFault::failed(e.to_string()))
  }
}
