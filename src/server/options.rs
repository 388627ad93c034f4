use std::net::SocketAddr;
use std::time::Duration;

use crate::error::JudgeError;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::runtime::{DEFAULT_JOB_QUEUE_CAPACITY, DEFAULT_STEP_TIMEOUT};

/// Port the evaluation server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 4001;
/// Upper bound on simultaneously served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;
/// How long `run_until` waits for open connections after shutdown is requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stock thread-pool sizing: `min(32, cpus + 4)`.
pub fn default_worker_threads() -> usize {
  let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
  (cpus + 4).min(32)
}

/// Holds validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerOptions {
  pub bind_addr: SocketAddr,
  /// Wall-clock budget for one step, including time queued for a worker.
  pub step_timeout: Duration,
  pub worker_threads: usize,
  pub job_queue_capacity: usize,
  pub max_frame_size: usize,
  pub max_connections: usize,
  pub tcp_nodelay: bool,
  pub shutdown_grace: Duration,
}

impl Default for ServerOptions {
  fn default() -> Self {
    Self {
      bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
      step_timeout: DEFAULT_STEP_TIMEOUT,
      worker_threads: default_worker_threads(),
      job_queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
      max_frame_size: DEFAULT_MAX_FRAME_SIZE,
      max_connections: DEFAULT_MAX_CONNECTIONS,
      tcp_nodelay: true, // Request/response traffic; never batch small replies
      shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
    }
  }
}

impl ServerOptions {
  pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
    self.bind_addr = addr;
    self
  }

  pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
    self.step_timeout = timeout;
    self
  }

  pub fn with_worker_threads(mut self, n: usize) -> Self {
    self.worker_threads = n;
    self
  }

  pub fn with_job_queue_capacity(mut self, n: usize) -> Self {
    self.job_queue_capacity = n;
    self
  }

  pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
    self.max_frame_size = bytes;
    self
  }

  pub fn with_max_connections(mut self, n: usize) -> Self {
    self.max_connections = n;
    self
  }

  pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
    self.tcp_nodelay = enabled;
    self
  }

  pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
    self.shutdown_grace = grace;
    self
  }

  /// Rejects settings the server cannot run with.
  pub fn validate(&self) -> Result<(), JudgeError> {
    if self.step_timeout.is_zero() {
      return Err(JudgeError::InvalidArgument("step_timeout must be non-zero".into()));
    }
    if self.worker_threads == 0 {
      return Err(JudgeError::InvalidArgument("worker_threads must be at least 1".into()));
    }
    if self.job_queue_capacity == 0 {
      return Err(JudgeError::InvalidArgument("job_queue_capacity must be at least 1".into()));
    }
    if self.max_frame_size == 0 {
      return Err(JudgeError::InvalidArgument("max_frame_size must be at least 1".into()));
    }
    if self.max_connections == 0 {
      return Err(JudgeError::InvalidArgument("max_connections must be at least 1".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    let opts = ServerOptions::default();
    assert!(opts.validate().is_ok());
    assert_eq!(opts.bind_addr.port(), DEFAULT_PORT);
    assert_eq!(opts.step_timeout, Duration::from_secs(1));
    assert!((1..=32).contains(&opts.worker_threads));
  }

  #[test]
  fn zero_values_are_rejected() {
    let base = ServerOptions::default();
    assert!(base.clone().with_step_timeout(Duration::ZERO).validate().is_err());
    assert!(base.clone().with_worker_threads(0).validate().is_err());
    assert!(base.clone().with_job_queue_capacity(0).validate().is_err());
    assert!(base.clone().with_max_frame_size(0).validate().is_err());
    assert!(base.with_max_connections(0).validate().is_err());
  }
}
