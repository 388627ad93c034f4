// src/runtime/worker_pool.rs

use crate::error::JudgeError;

use async_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

/// Default capacity of the queue in front of the workers.
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 1024;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// What a submitted job produced: its value, or the payload of its panic.
pub type JobResult<R> = std::thread::Result<R>;

/// Fixed-size pool of OS threads for blocking work.
///
/// Jobs enter through a bounded `async-channel`; when every worker is busy
/// and the queue is full, [`WorkerPool::submit`] waits, which back-pressures
/// callers instead of failing them. Dropping the pool (or calling
/// [`WorkerPool::close`]) stops intake; workers finish the job they hold and
/// exit. Nothing ever interrupts a running job.
#[derive(Debug)]
pub struct WorkerPool {
  job_tx: Sender<Job>,
  size: usize,
  busy: Arc<AtomicUsize>,
}

impl WorkerPool {
  /// Spawns `size` workers named `{name}-{index}`.
  pub fn new(name: &str, size: usize, queue_capacity: usize) -> Result<Self, JudgeError> {
    if size == 0 {
      return Err(JudgeError::InvalidArgument("worker pool size must be at least 1".into()));
    }
    let (job_tx, job_rx) = async_channel::bounded::<Job>(queue_capacity.max(1));
    let busy = Arc::new(AtomicUsize::new(0));

    for index in 0..size {
      let rx = job_rx.clone();
      let busy = busy.clone();
      thread::Builder::new()
        .name(format!("{}-{}", name, index))
        .spawn(move || worker_loop(index, rx, busy))
        .map_err(|e| JudgeError::Internal(format!("failed to spawn worker thread: {}", e)))?;
    }
    tracing::debug!(pool = name, size, queue_capacity, "Worker pool started");

    Ok(Self { job_tx, size, busy })
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Number of workers currently executing a job.
  pub fn busy_workers(&self) -> usize {
    self.busy.load(Ordering::Relaxed)
  }

  /// Number of jobs waiting for a worker.
  pub fn queued_jobs(&self) -> usize {
    self.job_tx.len()
  }

  /// Queues `f` and returns a receiver for its outcome.
  ///
  /// If the receiver is dropped before a worker picks the job up, the job is
  /// skipped. If it is dropped while the job runs, the result is discarded
  /// when the job finishes.
  pub async fn submit<F, R>(&self, f: F) -> Result<oneshot::Receiver<JobResult<R>>, JudgeError>
  where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
  {
    let (result_tx, result_rx) = oneshot::channel::<JobResult<R>>();
    let job: Job = Box::new(move || {
      if result_tx.is_closed() {
        tracing::trace!("Skipping job abandoned while queued");
        return;
      }
      let outcome = catch_unwind(AssertUnwindSafe(f));
      if result_tx.send(outcome).is_err() {
        tracing::debug!("Discarding late job result; caller stopped waiting");
      }
    });
    self
      .job_tx
      .send(job)
      .await
      .map_err(|_| JudgeError::Internal("worker pool is closed".into()))?;
    Ok(result_rx)
  }

  /// Stops accepting jobs. Queued jobs still run.
  pub fn close(&self) {
    self.job_tx.close();
  }

  pub fn is_closed(&self) -> bool {
    self.job_tx.is_closed()
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    self.job_tx.close();
  }
}

fn worker_loop(index: usize, jobs: Receiver<Job>, busy: Arc<AtomicUsize>) {
  tracing::trace!(worker = index, "Worker started");
  while let Ok(job) = jobs.recv_blocking() {
    busy.fetch_add(1, Ordering::Relaxed);
    job();
    busy.fetch_sub(1, Ordering::Relaxed);
  }
  tracing::trace!(worker = index, "Worker exiting; job queue closed");
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicBool;
  use std::time::Duration;

  #[tokio::test]
  async fn runs_jobs_on_named_workers() {
    let pool = WorkerPool::new("test-pool", 2, 8).unwrap();
    let rx = pool
      .submit(|| thread::current().name().map(str::to_string))
      .await
      .unwrap();
    let name = rx.await.unwrap().unwrap().unwrap();
    assert!(name.starts_with("test-pool-"), "{}", name);
  }

  #[tokio::test]
  async fn panics_are_returned_not_propagated() {
    let pool = WorkerPool::new("panicky", 1, 8).unwrap();
    let rx = pool.submit(|| -> i32 { panic!("worker boom") }).await.unwrap();
    let payload = rx.await.unwrap().unwrap_err();
    assert_eq!(crate::runtime::panic_message(payload.as_ref()), "worker boom");

    // The single worker survived the panic.
    let rx = pool.submit(|| 7).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), 7);
  }

  #[tokio::test]
  async fn abandoned_queued_job_is_skipped() {
    let pool = WorkerPool::new("single", 1, 8).unwrap();
    let gate = Arc::new(AtomicBool::new(false));
    let g = gate.clone();
    let blocker = pool
      .submit(move || {
        while !g.load(Ordering::SeqCst) {
          thread::sleep(Duration::from_millis(1));
        }
      })
      .await
      .unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let r = ran.clone();
    let queued = pool.submit(move || r.store(true, Ordering::SeqCst)).await.unwrap();
    drop(queued);

    gate.store(true, Ordering::SeqCst);
    blocker.await.unwrap().unwrap();
    // Anything queued after the skipped job runs only once it has been passed over.
    let after = pool.submit(|| ()).await.unwrap();
    after.await.unwrap().unwrap();
    assert!(!ran.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn closed_pool_rejects_jobs() {
    let pool = WorkerPool::new("closing", 1, 1).unwrap();
    pool.close();
    assert!(pool.is_closed());
    assert!(pool.submit(|| ()).await.is_err());
  }

  #[test]
  fn zero_workers_is_invalid() {
    assert!(matches!(
      WorkerPool::new("none", 0, 1),
      Err(JudgeError::InvalidArgument(_))
    ));
  }
}
